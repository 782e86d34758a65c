//! Session persistent store
//!
//! Keeps every session in memory and rewrites the whole table to a single
//! JSON file (`{incident_id: Session}`) after each mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::Result;

use super::model::{Session, SessionStatus};

/// Thread-safe session store with file persistence
///
/// Single-writer: there is no cross-process locking on the file.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    /// Serializes mutate+write so the file always reflects mutation order
    writer: Mutex<()>,
    file_path: PathBuf,
}

impl SessionStore {
    /// Open the store, loading any existing file.
    ///
    /// A missing or unparsable file yields an empty table.
    pub async fn new(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let sessions = load(&file_path).await;
        debug!("Loaded {} sessions from {:?}", sessions.len(), file_path);

        Self {
            sessions: RwLock::new(sessions),
            writer: Mutex::new(()),
            file_path,
        }
    }

    /// Create a fresh pending session, replacing any existing record
    pub async fn create(&self, incident_id: &str) -> Result<Session> {
        let session = Session::new(incident_id);
        let created = session.clone();
        self.mutate(move |sessions| {
            sessions.insert(session.incident_id.clone(), session);
        })
        .await?;
        Ok(created)
    }

    /// Get a session by incident ID
    pub async fn get(&self, incident_id: &str) -> Option<Session> {
        self.sessions.read().await.get(incident_id).cloned()
    }

    /// Apply `f` to a session, creating it first if absent, and stamp `updated_at`
    pub async fn update<F>(&self, incident_id: &str, f: F) -> Result<Session>
    where
        F: FnOnce(&mut Session),
    {
        self.mutate(|sessions| {
            let session = sessions
                .entry(incident_id.to_string())
                .or_insert_with(|| Session::new(incident_id));
            f(session);
            session.updated_at = Utc::now();
            session.clone()
        })
        .await
    }

    /// Mark a session as running, recording the agent session ID when known
    pub async fn set_running(&self, incident_id: &str, session_id: Option<&str>) -> Result<Session> {
        self.update(incident_id, |session| {
            if let Some(id) = session_id.filter(|id| !id.is_empty()) {
                session.session_id = id.to_string();
            }
            session.status = SessionStatus::Running;
        })
        .await
    }

    /// Mark a session as completed with the agent's final answer and log
    pub async fn set_completed(
        &self,
        incident_id: &str,
        session_id: &str,
        response: &str,
        full_log: &str,
    ) -> Result<Session> {
        self.update(incident_id, |session| {
            if !session_id.is_empty() {
                session.session_id = session_id.to_string();
            }
            session.status = SessionStatus::Completed;
            session.response = response.to_string();
            session.full_log = full_log.to_string();
        })
        .await
    }

    /// Mark a session as failed; the reason is kept in `response`
    pub async fn set_failed(&self, incident_id: &str, reason: &str) -> Result<Session> {
        self.update(incident_id, |session| {
            session.status = SessionStatus::Failed;
            session.response = reason.to_string();
        })
        .await
    }

    /// Delete a session, returning it if it existed
    pub async fn delete(&self, incident_id: &str) -> Result<Option<Session>> {
        self.mutate(|sessions| sessions.remove(incident_id)).await
    }

    /// List all sessions, newest first
    pub async fn list(&self) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<Session> = sessions.values().cloned().collect();
        list.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        list
    }

    /// Mutate the table and persist the resulting snapshot.
    ///
    /// The table lock is released before any file I/O.
    async fn mutate<T>(&self, f: impl FnOnce(&mut HashMap<String, Session>) -> T) -> Result<T> {
        let _writer = self.writer.lock().await;

        let (out, content) = {
            let mut sessions = self.sessions.write().await;
            let out = f(&mut sessions);
            let content = serde_json::to_string_pretty(&*sessions)?;
            (out, content)
        };

        self.persist(content).await?;
        Ok(out)
    }

    async fn persist(&self, content: String) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.file_path, content).await?;

        Ok(())
    }
}

async fn load(path: &Path) -> HashMap<String, Session> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(_) => return HashMap::new(),
    };

    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!("Ignoring unparsable sessions file {:?}: {}", path, e);
        HashMap::new()
    })
}
