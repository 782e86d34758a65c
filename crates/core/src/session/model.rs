//! Session model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an incident session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Execution state of one incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Incident (job) identifier, unique key
    pub incident_id: String,
    /// Continuation token issued by the agent, empty until the first success
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Final answer, or the failure reason for failed sessions
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response: String,
    /// Raw event stream of the last run
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub full_log: String,
}

impl Session {
    /// Create a pending session for an incident
    pub fn new(incident_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            incident_id: incident_id.into(),
            session_id: String::new(),
            status: SessionStatus::Pending,
            started_at: now,
            updated_at: now,
            response: String::new(),
            full_log: String::new(),
        }
    }

    /// Whether the agent has issued a session ID that can be resumed
    pub fn is_resumable(&self) -> bool {
        !self.session_id.is_empty()
    }
}
