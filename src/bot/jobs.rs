//! Background jobs of the bot: message self-deletion, the daily report and
//! retention cleanup.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, NaiveDate, TimeZone};
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::bot::BotState;
use crate::calendar::{now_local, Rollover, Zone};
use crate::config::{Config, ReportSettings};
use crate::error::Result;
use crate::writer::{count_entries_on, trim_log_file, ChatLog};

/// Delete a message once `delay` has passed.
pub fn schedule_deletion(bot: Bot, chat_id: ChatId, message_id: MessageId, delay: Duration) {
    tokio::spawn(async move {
        sleep(delay).await;
        if let Err(err) = bot.delete_message(chat_id, message_id).await {
            debug!(chat = chat_id.0, message = message_id.0, "Delete failed: {}", err);
        }
    });
}

/// The next `hour:minute` strictly after `now`, in `now`'s zone.
pub fn next_run_at(now: DateTime<Zone>, hour: u32, minute: u32) -> DateTime<Zone> {
    let tz = now.timezone();
    let run_on = |date: NaiveDate| {
        date.and_hms_opt(hour, minute, 0)
            .and_then(|naive| tz.from_local_datetime(&naive).earliest())
    };

    let today = now.date_naive();
    match run_on(today) {
        Some(at) if at > now => at,
        _ => today
            .succ_opt()
            .and_then(run_on)
            .unwrap_or(now + chrono::Duration::days(1)),
    }
}

/// Files of one chat that belong to a report date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReport {
    pub chat_id: i64,
    pub files: Vec<PathBuf>,
    /// Entries stamped with the report date. A monthly file holds more.
    pub entries: usize,
}

/// Every chat under `output_dir` that has log files for `date`.
pub fn pending_reports(
    output_dir: &Path,
    rollover: Rollover,
    tz: Zone,
    date: NaiveDate,
) -> Result<Vec<PendingReport>> {
    if !output_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut reports = Vec::new();
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(chat_id) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<i64>().ok())
        else {
            continue;
        };

        let files = ChatLog::new(output_dir, chat_id, rollover, tz, 0).parts_for(date);
        if files.is_empty() {
            continue;
        }

        let mut entries = 0;
        for file in &files {
            entries += count_entries_on(&fs::read_to_string(file)?, date);
        }
        reports.push(PendingReport {
            chat_id,
            files,
            entries,
        });
    }

    reports.sort_by_key(|r| r.chat_id);
    Ok(reports)
}

pub fn report_caption(title: &str, date: NaiveDate, entries: usize, part: usize, parts: usize) -> String {
    let mut caption = format!(
        "📄 Отчёт за {}: {}\nСообщений: {}",
        date.format("%d.%m.%Y"),
        title,
        entries
    );
    if parts > 1 {
        caption.push_str(&format!("\nЧасть {} из {}", part, parts));
    }
    caption
}

async fn send_daily_reports(
    bot: &Bot,
    state: &BotState,
    target: &ReportSettings,
    date: NaiveDate,
) -> Result<usize> {
    let collector = &state.config.collector;
    let reports = pending_reports(
        &collector.output_dir,
        collector.rollover,
        collector.timezone,
        date,
    )?;

    let mut sent = 0;
    for report in &reports {
        let title = match state.registry.get(report.chat_id).await {
            Some(session) => session.title,
            None => report.chat_id.to_string(),
        };

        let parts = report.files.len();
        for (index, file) in report.files.iter().enumerate() {
            bot.send_document(ChatId(target.chat_id), InputFile::file(file.clone()))
                .caption(report_caption(&title, date, report.entries, index + 1, parts))
                .await?;
            sent += 1;
        }
    }

    info!(%date, files = sent, chats = reports.len(), "Daily report sent");
    Ok(sent)
}

/// Send the previous day's files every day at the configured time.
pub async fn report_loop(bot: Bot, state: Arc<BotState>, target: ReportSettings) {
    let tz = state.config.collector.timezone;

    loop {
        let now = now_local(&tz);
        let next = next_run_at(now, target.hour, target.minute);
        info!(next = %next, "Next daily report scheduled");
        sleep((next - now).to_std().unwrap_or(Duration::ZERO)).await;

        let Some(date) = next.date_naive().pred_opt() else {
            continue;
        };
        if let Err(err) = send_daily_reports(&bot, &state, &target, date).await {
            error!("Daily report failed: {}", err);
        }
    }
}

/// What a cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub files: usize,
    pub dirs: usize,
    pub log_trimmed: bool,
}

/// Remove `.txt` files under `dir` last modified more than `retention_days`
/// before `now`, then drop directories left empty. `dir` itself is kept.
pub fn cleanup_expired(dir: &Path, retention_days: u32, now: SystemTime) -> Result<CleanupStats> {
    let mut stats = CleanupStats::default();
    if retention_days == 0 || !dir.is_dir() {
        return Ok(stats);
    }

    let max_age = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
    let cutoff = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);

    for entry in WalkDir::new(dir).min_depth(1).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_txt = path.extension().and_then(|e| e.to_str()) == Some("txt");
        if !entry.file_type().is_file() || !is_txt {
            continue;
        }

        let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
        if modified.map(|m| m < cutoff).unwrap_or(false) {
            match fs::remove_file(path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed expired file");
                    stats.files += 1;
                }
                Err(err) => warn!(path = %path.display(), "Failed to remove: {}", err),
            }
        }
    }

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let empty = fs::read_dir(entry.path())
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if empty && fs::remove_dir(entry.path()).is_ok() {
            stats.dirs += 1;
        }
    }

    Ok(stats)
}

/// One retention pass over the output directory plus log trimming.
pub fn run_maintenance(config: &Config) -> Result<CleanupStats> {
    let mut stats = cleanup_expired(
        &config.collector.output_dir,
        config.bot.retention_days,
        SystemTime::now(),
    )?;
    stats.log_trimmed = trim_log_file(
        &config.bot.log_file,
        config.bot.max_log_size,
        now_local(&config.collector.timezone),
    )?;

    info!(
        files = stats.files,
        dirs = stats.dirs,
        log_trimmed = stats.log_trimmed,
        "Cleanup finished"
    );
    Ok(stats)
}

/// Run maintenance now and then every `cleanup_interval_hours`.
pub async fn cleanup_loop(config: Config) {
    let period = Duration::from_secs(config.bot.cleanup_interval_hours.max(1) * 60 * 60);
    let mut ticker = tokio::time::interval(period);

    loop {
        ticker.tick().await;
        if let Err(err) = run_maintenance(&config) {
            error!("Cleanup failed: {}", err);
        }
    }
}
