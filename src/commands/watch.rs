//! Live capture of one chat into its rolling log

use std::path::PathBuf;

use chrono::Utc;
use grammers_client::client::UpdatesConfiguration;
use grammers_client::types::update::Update;
use grammers_client::types::peer::Peer;
use grammers_client::types::Message;
use grammers_client::Client;
use tokio::signal;
use tracing::{info, warn};

use crate::chat::{find_chat, peer_id, peer_name, peer_to_input};
use crate::config::Config;
use crate::error::Result;
use crate::history::{download_attachment, TelegramHistory};
use crate::metrics;
use crate::ocr::OcrEngine;
use crate::prompt::Prompter;
use crate::session::{get_client, SessionLock};
use crate::writer::ChatLog;

#[derive(Debug, Clone, Default)]
pub struct WatchArgs {
    pub chat: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub ocr: bool,
}

pub async fn run(config: &Config, args: WatchArgs) -> Result<()> {
    let settings = &config.collector;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| settings.output_dir.clone());

    let engine = if args.ocr || config.ocr.enabled {
        let mut ocr = config.ocr.clone();
        ocr.enabled = true;
        OcrEngine::from_settings(&ocr)?
    } else {
        None
    };

    let _lock = SessionLock::for_config(config)?;
    let mut client = get_client(config).await?;

    let chat_input = match args.chat {
        Some(chat) => chat,
        None => Prompter::stdio().chat_input()?,
    };
    let peer = find_chat(&client, &chat_input, config).await?;
    let target = peer.id();
    let chat_title = peer_name(&peer);

    let log = ChatLog::new(
        &output_dir,
        peer_id(&peer),
        settings.rollover,
        settings.timezone,
        settings.max_file_size,
    );

    let updates_rx = match client.take_updates() {
        Some(rx) => rx,
        None => {
            println!("⚠️ Режим наблюдения недоступен: канал обновлений уже занят.");
            return Ok(());
        }
    };

    let mut updates = client.stream_updates(
        updates_rx,
        UpdatesConfiguration {
            catch_up: true,
            ..Default::default()
        },
    );

    log.write_start_banner(Utc::now())?;
    println!(
        "👀 Сбор сообщений из '{}' в {}. Нажмите Ctrl+C для остановки.",
        chat_title,
        log.dir().display()
    );

    let mut last_seen_id = 0;
    let mut written = 0usize;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("\nОстанавливаю сбор...");
                break;
            }
            update = updates.next() => {
                match update {
                    Ok(Update::NewMessage(msg)) => {
                        if msg.peer_id() != target || msg.id() <= last_seen_id {
                            continue;
                        }
                        last_seen_id = msg.id();

                        let ocr = match &engine {
                            Some(engine) => recognize(&client, &peer, engine, &msg).await,
                            None => None,
                        };

                        let sender = msg.sender().map(|s| peer_name(&s));
                        log.append_entry(msg.date(), sender.as_deref(), msg.text(), ocr.as_deref())?;
                        written += 1;

                        println!(
                            "[{}] {}: {}",
                            msg.date().with_timezone(&settings.timezone).format("%H:%M:%S"),
                            sender.as_deref().unwrap_or("Аноним"),
                            msg.text()
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        eprintln!("⚠️ Ошибка при получении обновлений: {}", err);
                        break;
                    }
                }
            }
        }
    }

    updates.sync_update_state();
    log.write_end_banner(Utc::now())?;
    metrics::record_messages_collected("watch", written);
    info!(chat = %chat_title, written, "Watch stopped");
    println!("✅ Записано сообщений: {}", written);

    Ok(())
}

/// OCR text of an image message, looked up again through history to
/// obtain its file location.
async fn recognize(
    client: &Client,
    peer: &Peer,
    engine: &OcrEngine,
    msg: &Message,
) -> Option<String> {
    msg.media()?;

    let mut history = TelegramHistory::new(client, peer_to_input(peer));
    let message = match history.fetch_one(msg.id()).await {
        Ok(Some(message)) if message.has_image() => message,
        Ok(_) => return None,
        Err(err) => {
            warn!(id = msg.id(), "Failed to fetch message for OCR: {}", err);
            return None;
        }
    };

    let location = message.attachment?;
    match download_attachment(client, &location).await {
        Ok(data) => engine.try_recognize(&data, "image/jpeg").await,
        Err(err) => {
            warn!(id = msg.id(), "Attachment download failed: {}", err);
            None
        }
    }
}
