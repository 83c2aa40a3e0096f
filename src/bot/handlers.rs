//! Message and command handlers

use std::time::Duration;

use chrono::Utc;
use teloxide::net::Download;
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::bot::commands::{parse_command, requires_permission, BotCommand, HELP_TEXT};
use crate::bot::jobs::schedule_deletion;
use crate::bot::state::{StartOutcome, StopOutcome};
use crate::bot::BotState;
use crate::calendar::BANNER_FORMAT;
use crate::error::{Error, Result};
use crate::metrics;
use crate::writer::ChatLog;

fn chat_title(msg: &Message) -> String {
    msg.chat
        .title()
        .map(str::to_string)
        .or_else(|| msg.chat.username().map(|u| format!("@{}", u)))
        .unwrap_or_else(|| msg.chat.id.0.to_string())
}

fn sender_name(msg: &Message) -> Option<String> {
    msg.from().map(|user| user.full_name())
}

impl BotState {
    fn chat_log(&self, chat_id: i64) -> ChatLog {
        let collector = &self.config.collector;
        ChatLog::new(
            &collector.output_dir,
            chat_id,
            collector.rollover,
            collector.timezone,
            collector.max_file_size,
        )
    }

    fn self_delete_delay(&self) -> Option<Duration> {
        match self.config.bot.self_delete_after_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Send a service reply that removes itself after the configured delay.
async fn reply(bot: &Bot, state: &BotState, msg: &Message, text: &str) -> Result<()> {
    let sent = bot.send_message(msg.chat.id, text).await?;
    if let Some(delay) = state.self_delete_delay() {
        schedule_deletion(bot.clone(), sent.chat.id, sent.id, delay);
    }
    Ok(())
}

pub async fn handle_message(bot: Bot, state: &BotState, msg: Message) -> Result<()> {
    let text = msg.text().or_else(|| msg.caption()).unwrap_or_default();

    // Unknown commands, other bots' commands and plain paths are ordinary text.
    if let Some(command) = parse_command(text, state.username.as_deref()) {
        return handle_command(&bot, state, &msg, command).await;
    }

    let chat_id = msg.chat.id.0;
    if !state.registry.is_active(chat_id).await {
        return Ok(());
    }

    let ocr = match &state.ocr {
        Some(engine) if msg.photo().is_some() => match download_photo(&bot, &msg).await {
            Ok(data) => engine.try_recognize(&data, "image/jpeg").await,
            Err(err) => {
                warn!(chat = chat_id, "Photo download failed: {}", err);
                None
            }
        },
        _ => None,
    };

    let sender = sender_name(&msg);
    state
        .chat_log(chat_id)
        .append_entry(msg.date, sender.as_deref(), text, ocr.as_deref())?;
    state.registry.record_message(chat_id).await;
    metrics::record_messages_collected("bot", 1);

    Ok(())
}

/// Largest size of the message photo.
async fn download_photo(bot: &Bot, msg: &Message) -> Result<Vec<u8>> {
    let photo = msg
        .photo()
        .and_then(|sizes| sizes.iter().max_by_key(|p| p.width * p.height))
        .ok_or_else(|| Error::BotError("message has no photo".to_string()))?;

    let file = bot.get_file(photo.file.id.clone()).await?;
    let mut data = Vec::new();
    bot.download_file(&file.path, &mut data)
        .await
        .map_err(|e| Error::BotError(format!("download failed: {}", e)))?;
    Ok(data)
}

async fn handle_command(
    bot: &Bot,
    state: &BotState,
    msg: &Message,
    command: BotCommand,
) -> Result<()> {
    if state.config.bot.delete_commands {
        if let Some(delay) = state.self_delete_delay() {
            schedule_deletion(bot.clone(), msg.chat.id, msg.id, delay);
        }
    }

    let user_id = msg.from().map(|u| u.id.0 as i64).unwrap_or(0);
    if requires_permission(command) && !state.config.bot.is_allowed(user_id) {
        warn!(user = user_id, chat = msg.chat.id.0, ?command, "Command refused");
        return reply(bot, state, msg, "⛔ Недостаточно прав для управления сбором").await;
    }

    let chat_id = msg.chat.id.0;
    let tz = state.config.collector.timezone;
    let now = Utc::now();

    match command {
        BotCommand::Start | BotCommand::Help => reply(bot, state, msg, HELP_TEXT).await,
        BotCommand::Collect => {
            let title = chat_title(msg);
            match state.registry.start(chat_id, &title, now).await? {
                StartOutcome::Started => {
                    state.chat_log(chat_id).write_start_banner(now)?;
                    info!(chat = chat_id, %title, "Collection started");
                    reply(bot, state, msg, "✅ Сбор сообщений начат").await
                }
                StartOutcome::AlreadyActive(session) => {
                    let since = session.started_at.with_timezone(&tz).format(BANNER_FORMAT);
                    reply(
                        bot,
                        state,
                        msg,
                        &format!("ℹ️ Сбор уже активен с {}", since),
                    )
                    .await
                }
            }
        }
        BotCommand::Stop => match state.registry.stop(chat_id).await? {
            StopOutcome::Stopped(session) => {
                state.chat_log(chat_id).write_end_banner(now)?;
                info!(chat = chat_id, messages = session.messages, "Collection stopped");
                reply(
                    bot,
                    state,
                    msg,
                    &format!(
                        "❌ Сбор сообщений остановлен\nСохранено сообщений: {}",
                        session.messages
                    ),
                )
                .await
            }
            StopOutcome::NotActive => reply(bot, state, msg, "ℹ️ Сбор не был активирован").await,
        },
        BotCommand::Status => {
            let text = match state.registry.get(chat_id).await.filter(|s| s.active) {
                Some(session) => format!(
                    "📊 Сбор активен с {}\nСохранено сообщений: {}",
                    session.started_at.with_timezone(&tz).format(BANNER_FORMAT),
                    session.messages
                ),
                None => "ℹ️ Сбор не активен".to_string(),
            };
            reply(bot, state, msg, &text).await
        }
    }
}
