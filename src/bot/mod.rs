//! Collection bot (Bot API, long polling)
//!
//! `/collect` turns on collection for the chat it is sent in, `/stop` turns
//! it off. While active every message is appended to the chat's rolling log.

pub mod commands;
pub mod handlers;
pub mod jobs;
pub mod state;

use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use tracing::{error, info};

use crate::config::Config;
use crate::error::Result;
use crate::ocr::OcrEngine;

pub use commands::{parse_command, BotCommand};
pub use state::{CollectionSession, SessionRegistry, StartOutcome, StopOutcome, SESSIONS_FILE};

/// Shared state handed to every handler.
pub struct BotState {
    pub config: Config,
    pub registry: SessionRegistry,
    pub ocr: Option<OcrEngine>,
    /// Bot username, used to accept `/command@username`.
    pub username: Option<String>,
}

impl BotState {
    pub fn new(config: Config, ocr: Option<OcrEngine>, username: Option<String>) -> Self {
        let registry = SessionRegistry::load(config.collector.output_dir.join(SESSIONS_FILE));
        Self {
            config,
            registry,
            ocr,
            username,
        }
    }
}

pub async fn run(config: Config) -> Result<()> {
    let token = config.bot.resolve_token()?;
    let ocr = OcrEngine::from_settings(&config.ocr)?;
    let bot = Bot::new(token);

    let me = bot.get_me().await?;
    let username = me.user.username.clone();
    info!(bot = ?username, ocr = ?ocr.as_ref().map(|e| e.name()), "Bot started");

    let state = Arc::new(BotState::new(config, ocr, username));
    for session in state.registry.active_sessions().await {
        info!(chat = session.chat_id, title = %session.title, "Resuming collection");
    }

    tokio::spawn(jobs::cleanup_loop(state.config.clone()));
    if let Some(report) = state.config.bot.report.clone() {
        tokio::spawn(jobs::report_loop(bot.clone(), state.clone(), report));
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(
        |bot: Bot, msg: Message, state: Arc<BotState>| async move {
            if let Err(err) = handlers::handle_message(bot, &state, msg).await {
                error!("Handler error: {}", err);
            }
            Ok::<_, teloxide::RequestError>(())
        },
    ));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    state.registry.save().await?;
    info!("Bot stopped");
    Ok(())
}
