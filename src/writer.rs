//! Text output: range reports and per-chat rolling logs

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::calendar::{Rollover, Zone, BANNER_FORMAT, ENTRY_FORMAT, FILE_STAMP_FORMAT};
use crate::error::Result;
use crate::history::HistoryMessage;

pub const ANONYMOUS_SENDER: &str = "Аноним";
pub const MEDIA_PLACEHOLDER: &str = "[медиа]";

static ENTRY_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\[\d{2}\.\d{2}\.\d{4} \d{2}:\d{2}:\d{2}\]")
        .unwrap_or_else(|e| panic!("invalid entry regex: {}", e))
});

fn ocr_block(ocr: Option<&str>) -> String {
    match ocr.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .map(|line| format!("[OCR] {}\n", line))
            .collect(),
        None => String::new(),
    }
}

fn body_text(text: &str, has_media: bool) -> &str {
    if text.trim().is_empty() && has_media {
        MEDIA_PLACEHOLDER
    } else {
        text
    }
}

/// `[dd.mm.YYYY HH:MM:SS]\n{text}\n\n`
pub fn format_range_entry(message: &HistoryMessage, tz: &Zone, ocr: Option<&str>) -> String {
    format!(
        "[{}]\n{}\n{}\n",
        message.date.with_timezone(tz).format(ENTRY_FORMAT),
        body_text(&message.text, message.media.is_some()),
        ocr_block(ocr)
    )
}

/// `[dd.mm.YYYY HH:MM:SS] {sender}:\n{text}\n\n`
pub fn format_live_entry(
    date: DateTime<Utc>,
    tz: &Zone,
    sender: Option<&str>,
    text: &str,
    ocr: Option<&str>,
) -> String {
    let sender = sender
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(ANONYMOUS_SENDER);
    let text = if text.trim().is_empty() {
        MEDIA_PLACEHOLDER
    } else {
        text
    };

    format!(
        "[{}] {}:\n{}\n{}\n",
        date.with_timezone(tz).format(ENTRY_FORMAT),
        sender,
        text,
        ocr_block(ocr)
    )
}

pub fn start_banner(now: DateTime<Zone>) -> String {
    format!("=== Начало сбора {} ===\n\n", now.format(BANNER_FORMAT))
}

pub fn end_banner(now: DateTime<Zone>) -> String {
    format!("=== Конец сбора {} ===\n\n", now.format(BANNER_FORMAT))
}

/// Number of message entries in a log file's content.
pub fn count_entries(content: &str) -> usize {
    ENTRY_HEADER.find_iter(content).count()
}

/// Number of entries stamped with the local `date`.
pub fn count_entries_on(content: &str, date: NaiveDate) -> usize {
    let day = date.format("%d.%m.%Y").to_string();
    ENTRY_HEADER
        .find_iter(content)
        .filter(|header| header.as_str().get(1..11) == Some(day.as_str()))
        .count()
}

/// Write a range export to `{dir}/{prefix}_{stamp}.txt`.
///
/// `ocr` maps message ids to recognised text.
pub fn write_range_report(
    dir: &Path,
    prefix: &str,
    now: DateTime<Zone>,
    messages: &[HistoryMessage],
    ocr: &HashMap<i32, String>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_{}.txt", prefix, now.format(FILE_STAMP_FORMAT)));
    let tz = now.timezone();

    let mut writer = BufWriter::new(File::create(&path)?);
    for message in messages {
        let entry = format_range_entry(message, &tz, ocr.get(&message.id).map(String::as_str));
        writer.write_all(entry.as_bytes())?;
    }
    writer.flush()?;

    info!(path = %path.display(), messages = messages.len(), "Range report written");
    Ok(path)
}

/// Append-only log of one chat, split by calendar period and size.
#[derive(Debug, Clone)]
pub struct ChatLog {
    dir: PathBuf,
    rollover: Rollover,
    tz: Zone,
    max_file_size: u64,
}

impl ChatLog {
    pub fn new(
        output_dir: &Path,
        chat_id: i64,
        rollover: Rollover,
        tz: Zone,
        max_file_size: u64,
    ) -> Self {
        Self {
            dir: output_dir.join(chat_id.to_string()),
            rollover,
            tz,
            max_file_size,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn part_path(&self, stem: &str, part: usize) -> PathBuf {
        if part <= 1 {
            self.dir.join(format!("{}.txt", stem))
        } else {
            self.dir.join(format!("{}_{}.txt", stem, part))
        }
    }

    /// Existing parts for a local date, in write order.
    pub fn parts_for(&self, date: NaiveDate) -> Vec<PathBuf> {
        let stem = self.rollover.file_stem(date);
        (1..)
            .map(|part| self.part_path(&stem, part))
            .take_while(|path| path.exists())
            .collect()
    }

    /// File the next entry dated `date` goes to.
    pub fn target_for(&self, date: DateTime<Utc>) -> Result<PathBuf> {
        let local = date.with_timezone(&self.tz).date_naive();
        let stem = self.rollover.file_stem(local);

        let mut part = 1;
        while self.part_path(&stem, part + 1).exists() {
            part += 1;
        }

        let current = self.part_path(&stem, part);
        if self.max_file_size > 0 && current.exists() {
            let size = fs::metadata(&current)?.len();
            if size >= self.max_file_size {
                debug!(path = %current.display(), size, "Rotating chat log");
                return Ok(self.part_path(&stem, part + 1));
            }
        }
        Ok(current)
    }

    /// Append raw text to the file for `date`.
    pub fn append(&self, date: DateTime<Utc>, text: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.target_for(date)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(text.as_bytes())?;
        Ok(path)
    }

    pub fn append_entry(
        &self,
        date: DateTime<Utc>,
        sender: Option<&str>,
        text: &str,
        ocr: Option<&str>,
    ) -> Result<PathBuf> {
        let entry = format_live_entry(date, &self.tz, sender, text, ocr);
        self.append(date, &entry)
    }

    pub fn write_start_banner(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        self.append(now, &start_banner(now.with_timezone(&self.tz)))
    }

    pub fn write_end_banner(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        self.append(now, &end_banner(now.with_timezone(&self.tz)))
    }
}

/// Truncate `path` to a short header once it grows beyond `max_size` bytes.
pub fn trim_log_file(path: &Path, max_size: u64, now: DateTime<Zone>) -> Result<bool> {
    if max_size == 0 || !path.exists() {
        return Ok(false);
    }

    let size = fs::metadata(path)?.len();
    if size <= max_size {
        return Ok(false);
    }

    fs::write(
        path,
        format!(
            "=== Лог-файл очищен {} ===\n\n",
            now.format("%Y-%m-%d %H:%M:%S%:z")
        ),
    )?;
    info!(path = %path.display(), size, "Log file trimmed");
    Ok(true)
}
