//! Collect a chat's messages over a time window into a text report

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::DateTime;
use tracing::{info, warn};

use crate::calendar::{now_local, parse_local, Zone, BANNER_FORMAT};
use crate::chat::{find_chat, peer_name, peer_to_input};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::history::{collect_range, HistoryMessage, HistorySource, TelegramHistory};
use crate::metrics;
use crate::ocr::OcrEngine;
use crate::prompt::Prompter;
use crate::range::TimeRange;
use crate::session::{get_client, SessionLock};
use crate::writer::write_range_report;

#[derive(Debug, Clone, Default)]
pub struct CollectArgs {
    /// Chat id, link or @username; asked interactively when missing.
    pub chat: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub output_dir: Option<PathBuf>,
    /// Force OCR of image attachments even if disabled in config.
    pub ocr: bool,
}

/// Window given on the command line, if any.
///
/// `--from` alone runs until now; `--to` alone is rejected, as is any
/// bound later than `now`.
pub fn range_from_args(
    from: Option<&str>,
    to: Option<&str>,
    tz: &Zone,
    now: DateTime<Zone>,
) -> Result<Option<TimeRange>> {
    match (from, to) {
        (None, None) => Ok(None),
        (None, Some(_)) => Err(Error::InvalidArgument(
            "--to requires --from".to_string(),
        )),
        (Some(from), to) => {
            let start = parse_local(tz, from)?;
            let end = match to {
                Some(to) => parse_local(tz, to)?,
                None => now,
            };
            for bound in [start, end] {
                if bound > now {
                    return Err(Error::InvalidRange(format!(
                        "{} is in the future",
                        bound.format(BANNER_FORMAT)
                    )));
                }
            }
            TimeRange::new(start, end).map(Some)
        }
    }
}

pub async fn run(config: &Config, args: CollectArgs) -> Result<()> {
    let settings = &config.collector;
    let tz = settings.timezone;
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
    let client = get_client(config).await?;
    let mut prompter = Prompter::stdio();

    let chat_input = match args.chat {
        Some(chat) => chat,
        None => prompter.chat_input()?,
    };
    let peer = find_chat(&client, &chat_input, config).await?;
    let chat_title = peer_name(&peer);
    println!("✅ Найден чат: {}", chat_title);

    let now = now_local(&tz);
    let range = match range_from_args(args.from.as_deref(), args.to.as_deref(), &tz, now)? {
        Some(range) => range,
        None => prompter.select_range(now)?,
    };
    println!("\n📅 Период: {}", range.describe(&tz));

    let mut source = TelegramHistory::new(&client, peer_to_input(&peer));
    let messages = collect_range(&mut source, &range, settings.page_size, |progress| {
        println!(
            "🔄 Обработано {} сообщений, найдено {}",
            progress.scanned, progress.collected
        );
    })
    .await?;

    let ocr = match &engine {
        Some(engine) => ocr_messages(&mut source, engine, &messages).await,
        None => HashMap::new(),
    };

    let path = write_range_report(
        &output_dir,
        &settings.range_file_prefix,
        now_local(&tz),
        &messages,
        &ocr,
    )?;
    metrics::record_messages_collected("range", messages.len());

    info!(chat = %chat_title, count = messages.len(), "Range collected");
    println!("\n✅ Сохранено {} сообщений в {}", messages.len(), path.display());
    if !ocr.is_empty() {
        println!("🖼  Распознан текст на {} изображениях", ocr.len());
    }

    Ok(())
}

/// Recognised text keyed by message id. Failed downloads are skipped.
pub async fn ocr_messages<S: HistorySource>(
    source: &mut S,
    engine: &OcrEngine,
    messages: &[HistoryMessage],
) -> HashMap<i32, String> {
    let mut results = HashMap::new();

    for message in messages.iter().filter(|m| m.has_image()) {
        let Some(location) = &message.attachment else {
            continue;
        };
        let data = match source.download(location).await {
            Ok(data) => data,
            Err(err) => {
                warn!(id = message.id, "Attachment download failed: {}", err);
                continue;
            }
        };
        if let Some(text) = engine.try_recognize(&data, "image/jpeg").await {
            results.insert(message.id, text);
        }
    }

    results
}
