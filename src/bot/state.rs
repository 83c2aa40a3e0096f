//! Per-chat collection sessions, persisted between restarts

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::Result;

pub const SESSIONS_FILE: &str = "sessions.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSession {
    pub chat_id: i64,
    pub title: String,
    pub active: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyActive(CollectionSession),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped(CollectionSession),
    NotActive,
}

/// Registry of collection sessions keyed by chat id.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<i64, CollectionSession>>,
    path: Option<PathBuf>,
}

impl SessionRegistry {
    /// In-memory registry that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            path: None,
        }
    }

    /// Restore sessions from `path`. A missing or unreadable file starts empty.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let sessions = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<CollectionSession>>(&content) {
                Ok(list) => list.into_iter().map(|s| (s.chat_id, s)).collect(),
                Err(err) => {
                    warn!(path = %path.display(), "Ignoring corrupt sessions file: {}", err);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        debug!(path = %path.display(), count = sessions.len(), "Sessions restored");
        Self {
            sessions: RwLock::new(sessions),
            path: Some(path),
        }
    }

    fn persist(&self, sessions: &HashMap<i64, CollectionSession>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut list: Vec<&CollectionSession> = sessions.values().collect();
        list.sort_by_key(|s| s.chat_id);
        fs::write(path, serde_json::to_string_pretty(&list)?)?;
        Ok(())
    }

    pub async fn start(
        &self,
        chat_id: i64,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<StartOutcome> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&chat_id).filter(|s| s.active) {
            return Ok(StartOutcome::AlreadyActive(existing.clone()));
        }

        sessions.insert(
            chat_id,
            CollectionSession {
                chat_id,
                title: title.to_string(),
                active: true,
                started_at: now,
                messages: 0,
            },
        );
        self.persist(&sessions)?;
        Ok(StartOutcome::Started)
    }

    pub async fn stop(&self, chat_id: i64) -> Result<StopOutcome> {
        let mut sessions = self.sessions.write().await;
        let stopped = match sessions.get_mut(&chat_id) {
            Some(session) if session.active => {
                session.active = false;
                session.clone()
            }
            _ => return Ok(StopOutcome::NotActive),
        };
        self.persist(&sessions)?;
        Ok(StopOutcome::Stopped(stopped))
    }

    pub async fn is_active(&self, chat_id: i64) -> bool {
        self.sessions
            .read()
            .await
            .get(&chat_id)
            .map(|s| s.active)
            .unwrap_or(false)
    }

    /// Count one written message. Returns the new total for active chats.
    pub async fn record_message(&self, chat_id: i64) -> Option<u64> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&chat_id).filter(|s| s.active)?;
        session.messages += 1;
        Some(session.messages)
    }

    pub async fn get(&self, chat_id: i64) -> Option<CollectionSession> {
        self.sessions.read().await.get(&chat_id).cloned()
    }

    pub async fn active_sessions(&self) -> Vec<CollectionSession> {
        let mut active: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.active)
            .cloned()
            .collect();
        active.sort_by_key(|s| s.chat_id);
        active
    }

    /// Write the current state, including message counters.
    pub async fn save(&self) -> Result<()> {
        let sessions = self.sessions.read().await;
        self.persist(&sessions)
    }
}
