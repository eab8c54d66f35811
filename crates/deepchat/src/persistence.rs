//! Transcript sinks. A sink is called at most once per request and is never
//! retried; callers log its errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::chat::{ChatMessage, ChatRole};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid session id {0:?}")]
    InvalidSession(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn save(&self, session_id: &str, transcript: &[ChatMessage]) -> Result<(), PersistenceError>;
}

fn check_session_id(session_id: &str) -> Result<(), PersistenceError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidSession(session_id.to_string()))
    }
}

pub const DEFAULT_MEMORY_SESSIONS: usize = 256;

#[derive(Debug, Default)]
struct Sessions {
    transcripts: HashMap<String, Vec<ChatMessage>>,
    /// Least recently saved first.
    order: VecDeque<String>,
}

/// Keeps the latest transcript of at most `capacity` sessions, dropping the
/// least recently saved one when full. Nothing survives a restart.
#[derive(Debug, Clone)]
pub struct InMemoryTranscripts {
    sessions: Arc<Mutex<Sessions>>,
    capacity: usize,
}

impl Default for InMemoryTranscripts {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_SESSIONS)
    }
}

impl InMemoryTranscripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn get(&self, session_id: &str) -> Option<Vec<ChatMessage>> {
        self.sessions.lock().await.transcripts.get(session_id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.transcripts.len()
    }
}

#[async_trait]
impl TranscriptSink for InMemoryTranscripts {
    async fn save(&self, session_id: &str, transcript: &[ChatMessage]) -> Result<(), PersistenceError> {
        check_session_id(session_id)?;
        let mut sessions = self.sessions.lock().await;
        sessions.order.retain(|id| id != session_id);
        sessions.order.push_back(session_id.to_string());
        sessions
            .transcripts
            .insert(session_id.to_string(), transcript.to_vec());
        while sessions.transcripts.len() > self.capacity {
            let Some(oldest) = sessions.order.pop_front() else {
                break;
            };
            sessions.transcripts.remove(&oldest);
            debug!(session = %oldest, "evicted in-memory transcript");
        }
        Ok(())
    }
}

/// On-disk record, one file per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChat {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Writes `<dir>/<session>.json`, overwriting the previous version. Only
/// user and assistant messages are stored.
#[derive(Debug, Clone)]
pub struct JsonFileTranscripts {
    dir: PathBuf,
}

impl JsonFileTranscripts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, PersistenceError> {
        check_session_id(session_id)?;
        Ok(self.dir.join(format!("{session_id}.json")))
    }

    pub async fn load(&self, session_id: &str) -> Result<Option<StoredChat>, PersistenceError> {
        let path = self.path_for(session_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TranscriptSink for JsonFileTranscripts {
    #[instrument(name = "transcripts.save", skip_all, fields(session = %session_id))]
    async fn save(&self, session_id: &str, transcript: &[ChatMessage]) -> Result<(), PersistenceError> {
        let path = self.path_for(session_id)?;
        let record = StoredChat {
            id: session_id.to_string(),
            messages: transcript
                .iter()
                .filter(|m| matches!(m.role, ChatRole::User | ChatRole::Assistant))
                .cloned()
                .collect(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let bytes = serde_json::to_vec_pretty(&record)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(messages = record.messages.len(), path = %path.display(), "transcript saved");
        Ok(())
    }
}
