//! Error types for agent-runner

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors that can occur while running an agent job
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The per-job working directory has not been provisioned
    #[error("workspace not found: {path} (API should create it)")]
    WorkspaceNotFound { path: PathBuf },

    /// Failed to spawn or pipe the agent process
    #[error("failed to start codex: {message}")]
    SpawnFailed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// API key authentication requested without a key
    #[error("failed to authenticate codex: API key is empty")]
    ApiKeyMissing,

    /// Subscription authentication requested without access/refresh tokens
    #[error("failed to authenticate codex: ChatGPT tokens are empty")]
    TokensMissing,

    /// Subscription tokens lack the identity token the CLI requires
    #[error(
        "failed to authenticate codex: ChatGPT id_token is missing. Please re-authenticate \
         by going to Settings > OpenAI and clicking 'Authenticate with ChatGPT'"
    )]
    MissingIdToken,

    /// The login subcommand exited unsuccessfully
    #[error("failed to authenticate codex: codex login failed: {status} (output: {output})")]
    LoginFailed { status: String, output: String },

    /// The persisted credential file could not be read or written
    #[error("credential file error: {message}")]
    CredentialFile { message: String },

    /// A run for this job ID is already in flight
    #[error("job {job_id} is already running")]
    AlreadyRunning { job_id: String },

    /// The agent process failed
    #[error("codex execution failed: {message}")]
    ExecutionFailed { message: String },

    /// The agent exited cleanly but produced neither an answer nor token usage
    #[error("codex returned empty response: {message}")]
    EmptyResponse { message: String },

    /// The run was cancelled through its cancellation handle
    #[error("execution cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Create a SpawnFailed error
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a SpawnFailed error with source
    pub fn spawn_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a CredentialFile error
    pub fn credential_file(message: impl Into<String>) -> Self {
        Self::CredentialFile {
            message: message.into(),
        }
    }

    /// Create an ExecutionFailed error
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }

    /// Whether the run ended because it was cancelled rather than failing
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
