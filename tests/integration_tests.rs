//! Integration tests for the tg_collector library
//!
//! These tests drive the public API across module boundaries without a
//! Telegram connection.

use std::collections::HashMap;
use std::fs;
use std::io::Cursor;

use chrono::{DateTime, Duration, TimeZone, Utc};
use grammers_tl_types as tl;
use httpmock::prelude::*;
use tempfile::TempDir;

use tg_collector::bot::jobs::{cleanup_expired, pending_reports};
use tg_collector::bot::handlers::handle_message;
use tg_collector::bot::{
    parse_command, BotCommand, BotState, SessionRegistry, StartOutcome, StopOutcome,
};
use tg_collector::calendar::{default_zone, local_datetime};
use tg_collector::chat::parse_chat_input;
use tg_collector::commands::collect::ocr_messages;
use tg_collector::history::MediaKind;
use tg_collector::ocr::OcrEngine;
use tg_collector::prompt::Prompter;
use tg_collector::writer::{count_entries, write_range_report};
use tg_collector::{
    collect_range, ChatEntity, ChatLog, Config, Error, GeminiClient, HistoryMessage,
    HistorySource, Result, Rollover, TimeRange,
};

/// Newest-first history served in pages, like messages.getHistory.
struct PagedHistory {
    messages: Vec<HistoryMessage>,
    calls: usize,
    downloads: usize,
}

impl PagedHistory {
    fn new(mut messages: Vec<HistoryMessage>) -> Self {
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        Self {
            messages,
            calls: 0,
            downloads: 0,
        }
    }
}

impl HistorySource for PagedHistory {
    async fn fetch_page(&mut self, offset_id: i32, limit: usize) -> Result<Vec<HistoryMessage>> {
        self.calls += 1;
        Ok(self
            .messages
            .iter()
            .filter(|m| offset_id == 0 || m.id < offset_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn download(&mut self, _location: &tl::enums::InputFileLocation) -> Result<Vec<u8>> {
        self.downloads += 1;
        Ok(b"jpeg bytes".to_vec())
    }
}

fn photo_location(id: i64) -> tl::enums::InputFileLocation {
    tl::types::InputPhotoFileLocation {
        id,
        access_hash: 2,
        file_reference: Vec::new(),
        thumb_size: "y".to_string(),
    }
    .into()
}

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
}

/// One message every 30 minutes through May 2024, starting 1 May 00:00 UTC.
fn may_history() -> Vec<HistoryMessage> {
    (0..31 * 48)
        .map(|i| {
            HistoryMessage::new(
                i + 1,
                utc(2024, 5, 1, 0, 0) + Duration::minutes(30 * i as i64),
                format!("message {}", i + 1),
            )
        })
        .collect()
}

// ============================================================================
// Range collection
// ============================================================================

#[tokio::test]
async fn test_collect_day_into_report() {
    let tz = default_zone();
    let range = TimeRange::new(
        local_datetime(&tz, 2024, 5, 10, 0, 0).unwrap(),
        local_datetime(&tz, 2024, 5, 10, 23, 59).unwrap(),
    )
    .unwrap();

    let mut source = PagedHistory::new(may_history());
    let messages = collect_range(&mut source, &range, 100, |_| {}).await.unwrap();

    // 48 half-hour slots in a local day.
    assert_eq!(messages.len(), 48);
    assert!(messages.windows(2).all(|w| w[0].date <= w[1].date));
    assert!(messages.iter().all(|m| range.contains(m.date)));

    // The walk stops once it passes the start instead of reading all of May.
    assert!(source.calls < 15);

    let temp = TempDir::new().unwrap();
    let now = local_datetime(&tz, 2024, 5, 11, 9, 0).unwrap();
    let path = write_range_report(temp.path(), "messages", now, &messages, &HashMap::new()).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(count_entries(&content), 48);
    assert!(content.starts_with("[10.05.2024 00:00:00]\n"));
    assert!(content.ends_with("[10.05.2024 23:30:00]\nmessage 474\n\n"));
}

#[tokio::test]
async fn test_interactive_range_drives_collection() {
    let tz = default_zone();
    let now = local_datetime(&tz, 2024, 5, 15, 12, 0).unwrap();

    // Current month, start on the 14th at 22:00, end now.
    let mut prompter = Prompter::new(Cursor::new(b"\n14\n22\n\n\n".to_vec()), Vec::new());
    let range = prompter.select_range(now).unwrap();

    let mut source = PagedHistory::new(may_history());
    let messages = collect_range(&mut source, &range, 50, |_| {}).await.unwrap();

    // 14 hours at two messages per hour, both ends inclusive.
    assert_eq!(messages.len(), 29);
    assert_eq!(messages.first().unwrap().date, range.start());
    assert_eq!(messages.last().unwrap().date, range.end());
}

#[tokio::test]
async fn test_report_includes_gemini_ocr() {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST).path("/models/gemini-2.0-flash:generateContent");
        then.status(200).json_body(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "Счёт №7\n\n\nИтого 300"}]}}]
        }));
    });

    let engine = OcrEngine::Gemini(
        GeminiClient::new("key", "gemini-2.0-flash")
            .unwrap()
            .with_base_url(&server.base_url()),
    );

    let mut photo = HistoryMessage::new(2, utc(2024, 5, 1, 10, 0), "");
    photo.media = Some(MediaKind::Photo);
    photo.attachment = Some(photo_location(1));
    // A photo without a downloadable location is left without OCR.
    let mut expired = HistoryMessage::new(3, utc(2024, 5, 1, 11, 0), "");
    expired.media = Some(MediaKind::Photo);
    let messages = vec![
        HistoryMessage::new(1, utc(2024, 5, 1, 9, 0), "text"),
        photo,
        expired,
    ];

    let mut source = PagedHistory::new(Vec::new());
    let ocr = ocr_messages(&mut source, &engine, &messages).await;
    mock.assert_calls(1);
    assert_eq!(source.downloads, 1);
    assert_eq!(ocr.len(), 1);

    let temp = TempDir::new().unwrap();
    let now = utc(2024, 5, 2, 0, 0).with_timezone(&default_zone());
    let path = write_range_report(temp.path(), "messages", now, &messages, &ocr).unwrap();
    let content = fs::read_to_string(path).unwrap();

    assert!(content.contains("[01.05.2024 13:00:00]\n[медиа]\n[OCR] Счёт №7\n[OCR] Итого 300\n\n"));
    assert!(content.ends_with("[01.05.2024 14:00:00]\n[медиа]\n\n"));
}

// ============================================================================
// Chat input
// ============================================================================

#[test]
fn test_chat_input_forms() {
    let config = Config::from_yaml("").unwrap();

    let (entity, _) = parse_chat_input("-1001234567890", &config).unwrap();
    assert_eq!(entity, ChatEntity::Channel(1234567890));

    let (entity, _) = parse_chat_input("https://t.me/rust_ru", &config).unwrap();
    assert_eq!(entity, ChatEntity::Username("rust_ru".into()));

    let (entity, _) = parse_chat_input("https://t.me/+AbCdEf123", &config).unwrap();
    assert_eq!(entity, ChatEntity::Invite("AbCdEf123".into()));

    assert!(parse_chat_input("", &config).is_err());
}

// ============================================================================
// Bot collection session
// ============================================================================

#[tokio::test]
async fn test_bot_session_writes_rolling_logs_and_reports() {
    let temp = TempDir::new().unwrap();
    let tz = default_zone();
    let chat_id = -1009876;
    let registry = SessionRegistry::load(temp.path().join("sessions.json"));
    let log = ChatLog::new(temp.path(), chat_id, Rollover::Daily, tz, 0);

    assert_eq!(parse_command("/collect", None), Some(BotCommand::Collect));
    let started = utc(2024, 5, 1, 20, 0);
    assert_eq!(
        registry.start(chat_id, "Team", started).await.unwrap(),
        StartOutcome::Started
    );
    log.write_start_banner(started).unwrap();

    // 20:30 UTC is 23:30 local, 21:30 UTC is already 2 May.
    for (at, text) in [(utc(2024, 5, 1, 20, 30), "late"), (utc(2024, 5, 1, 21, 30), "after midnight")] {
        assert!(registry.is_active(chat_id).await);
        log.append_entry(at, Some("Анна"), text, None).unwrap();
        registry.record_message(chat_id).await;
    }

    match registry.stop(chat_id).await.unwrap() {
        StopOutcome::Stopped(session) => assert_eq!(session.messages, 2),
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(registry.stop(chat_id).await.unwrap(), StopOutcome::NotActive);

    let first_day = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let second_day = chrono::NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();

    let reports = pending_reports(temp.path(), Rollover::Daily, tz, first_day).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].entries, 1);

    let reports = pending_reports(temp.path(), Rollover::Daily, tz, second_day).unwrap();
    assert_eq!(reports[0].entries, 1);
    let content = fs::read_to_string(&reports[0].files[0]).unwrap();
    assert!(content.contains("[02.05.2024 00:30:00] Анна:\nafter midnight\n"));

    // Everything expires when seen from far in the future; sessions.json stays.
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(90 * 24 * 3600);
    let stats = cleanup_expired(temp.path(), 30, later).unwrap();
    assert_eq!(stats.files, 2);
    assert!(!log.dir().exists());
    assert!(temp.path().join("sessions.json").exists());
}

// ============================================================================
// Bot handlers
// ============================================================================

const GROUP_ID: i64 = -1001;

fn group_message_json(id: i32, from: u64, text: &str) -> serde_json::Value {
    serde_json::json!({
        "message_id": id,
        "from": {"id": from, "is_bot": false, "first_name": "Иван", "last_name": "Петров"},
        "chat": {"id": GROUP_ID, "title": "Team", "type": "supergroup"},
        "date": Utc::now().timestamp(),
        "text": text,
    })
}

fn group_message(id: i32, from: u64, text: &str) -> teloxide::types::Message {
    serde_json::from_value(group_message_json(id, from, text)).unwrap()
}

fn handler_state(output_dir: &std::path::Path) -> BotState {
    let mut config =
        Config::from_yaml("bot:\n  self_delete_after_secs: 0\n  allowed_users: [42]\n").unwrap();
    config.collector.output_dir = output_dir.to_path_buf();
    BotState::new(config, None, Some("collector_bot".to_string()))
}

fn mock_bot(server: &MockServer) -> teloxide::Bot {
    teloxide::Bot::new("123:abc").set_api_url(reqwest::Url::parse(&server.base_url()).unwrap())
}

fn read_chat_logs(dir: &std::path::Path) -> String {
    let mut paths: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    paths.sort();
    paths
        .iter()
        .map(|path| fs::read_to_string(path).unwrap())
        .collect()
}

#[tokio::test]
async fn test_handlers_collect_plain_text_until_stop() {
    let server = MockServer::start_async().await;
    let replies = server
        .mock_async(|when, then| {
            when.method(POST).path_includes("SendMessage");
            then.status(200).json_body(serde_json::json!({
                "ok": true,
                "result": group_message_json(100, 42, "ok"),
            }));
        })
        .await;

    let temp = TempDir::new().unwrap();
    let state = handler_state(temp.path());
    let bot = mock_bot(&server);

    handle_message(bot.clone(), &state, group_message(1, 42, "/collect"))
        .await
        .unwrap();
    assert!(state.registry.is_active(GROUP_ID).await);

    // A path and a command for another bot are both ordinary text.
    for (id, text) in [(2, "/home/ivan/report.pdf is ready"), (3, "/collect@other_bot")] {
        handle_message(bot.clone(), &state, group_message(id, 42, text))
            .await
            .unwrap();
    }
    assert_eq!(state.registry.get(GROUP_ID).await.unwrap().messages, 2);

    handle_message(bot.clone(), &state, group_message(4, 42, "/stop@collector_bot"))
        .await
        .unwrap();
    assert!(!state.registry.is_active(GROUP_ID).await);
    replies.assert_calls_async(2).await;

    let content = read_chat_logs(&temp.path().join(GROUP_ID.to_string()));
    assert!(content.contains("=== Начало сбора "));
    assert!(content.contains(" Иван Петров:\n/home/ivan/report.pdf is ready\n\n"));
    assert!(content.contains(" Иван Петров:\n/collect@other_bot\n\n"));
    assert!(content.contains("=== Конец сбора "));
    assert_eq!(count_entries(&content), 2);
}

#[tokio::test]
async fn test_handlers_refuse_users_outside_allow_list() {
    let server = MockServer::start_async().await;
    let refusal = server
        .mock_async(|when, then| {
            when.method(POST)
                .path_includes("SendMessage")
                .body_includes("Недостаточно прав");
            then.status(200).json_body(serde_json::json!({
                "ok": true,
                "result": group_message_json(100, 42, "refused"),
            }));
        })
        .await;

    let temp = TempDir::new().unwrap();
    let state = handler_state(temp.path());
    let bot = mock_bot(&server);

    handle_message(bot.clone(), &state, group_message(1, 7, "/collect"))
        .await
        .unwrap();
    refusal.assert_calls_async(1).await;
    assert!(!state.registry.is_active(GROUP_ID).await);

    // Nothing is collected while the chat is inactive.
    handle_message(bot, &state, group_message(2, 7, "hello"))
        .await
        .unwrap();
    assert!(!temp.path().join(GROUP_ID.to_string()).exists());
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_variants_display() {
    let err = Error::InvalidRange("start after end".into());
    assert!(err.to_string().contains("start after end"));

    let err = Error::ChatNotFound("@nobody".into());
    assert!(err.to_string().contains("@nobody"));

    assert_eq!(Error::SessionLocked.to_string(), "Session is locked by another process");
}
