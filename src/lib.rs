//! Telegram Chat Message Collector Library
//!
//! This library provides tools to:
//! - Collect a chat's history over an inclusive time window into a report
//! - Capture new messages live into daily or monthly rolling logs
//! - Run a bot that toggles per-chat collection with /collect and /stop
//! - Recognise text on image attachments (tesseract or Gemini)
//! - Deliver daily reports and expire old files

pub mod bot;
pub mod calendar;
pub mod chat;
pub mod config;
pub mod error;
pub mod history;
pub mod integrations;
pub mod logging;
pub mod metrics;
pub mod ocr;
pub mod prompt;
pub mod range;
pub mod session;
pub mod writer;

// Re-export common types
pub use calendar::Rollover;
pub use config::{ChatEntity, Config};
pub use error::{Error, Result};
pub use history::{collect_range, HistoryMessage, HistorySource, PageProgress};
pub use integrations::GeminiClient;
pub use range::TimeRange;
pub use session::{check_session_exists, get_client, SessionLock};
pub use writer::ChatLog;

pub mod commands;
