//! Device authorization flow for ChatGPT subscription login
//!
//! `codex login --device-auth` prints a verification URL and a one-time code
//! meant for a human, then blocks until the code is approved. The flow scrapes
//! both from stdout, reports them once as `pending`, and reports a terminal
//! status when the process exits, is cancelled, or runs past its deadline.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{AuthFile, SubscriptionTokens};
use crate::parser::{drain_stderr, LossyLines};
use crate::process::{describe_status, terminate, AgentCommand};

/// Registry key reserved for the device-auth flow
pub const DEVICE_AUTH_ID: &str = "device_auth";

/// Ceiling on how long a human gets to approve the code
pub const DEVICE_AUTH_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Expiry reported with the pending update, in seconds
pub const DEFAULT_EXPIRES_IN: u64 = 900;

static ANSI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("Invalid regex"));

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s\x1b]+").expect("Invalid regex"));

static USER_CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z0-9]{4,}-[A-Z0-9]{4,})\b").expect("Invalid regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAuthStatus {
    #[default]
    Pending,
    Complete,
    Expired,
    Failed,
}

/// One status report from the flow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceAuthUpdate {
    pub status: DeviceAuthStatus,
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    pub expires_in: u64,
    /// Present on `complete`
    pub tokens: Option<SubscriptionTokens>,
    pub error: Option<String>,
}

impl DeviceAuthUpdate {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            status: DeviceAuthStatus::Failed,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    fn expired() -> Self {
        Self {
            status: DeviceAuthStatus::Expired,
            error: Some("authentication timeout".to_string()),
            ..Default::default()
        }
    }
}

pub type DeviceAuthCallback = Arc<dyn Fn(DeviceAuthUpdate) + Send + Sync>;

/// Pulls the verification URL and user code out of one line of CLI output
pub trait PromptExtractor: Send + Sync {
    fn verification_url(&self, line: &str) -> Option<String>;

    fn user_code(&self, line: &str) -> Option<String>;
}

/// Matches the prompt text the Codex CLI prints today
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexPromptExtractor;

impl RegexPromptExtractor {
    fn clean(line: &str) -> String {
        ANSI_PATTERN.replace_all(line, "").trim().to_string()
    }
}

impl PromptExtractor for RegexPromptExtractor {
    fn verification_url(&self, line: &str) -> Option<String> {
        URL_PATTERN
            .find(&Self::clean(line))
            .map(|m| m.as_str().to_string())
    }

    fn user_code(&self, line: &str) -> Option<String> {
        USER_CODE_PATTERN
            .captures(&Self::clean(line))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// What has been scraped from the prompt so far
#[derive(Debug, Clone, Default)]
pub struct PromptScan {
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    pending_sent: bool,
}

impl PromptScan {
    /// Feed one line; returns the pending update the first time both the URL
    /// and the code are known, and never again after that
    pub fn feed(&mut self, line: &str, extractor: &dyn PromptExtractor) -> Option<DeviceAuthUpdate> {
        if self.verification_url.is_empty() {
            if let Some(url) = extractor.verification_url(line) {
                info!("Found verification URL: {}", url);
                self.verification_url = url;
                self.device_code = Uuid::new_v4().to_string();
            }
        }

        if self.user_code.is_empty() {
            if let Some(code) = extractor.user_code(line) {
                info!("Found user code: {}", code);
                self.user_code = code;
            }
        }

        if self.pending_sent || self.verification_url.is_empty() || self.user_code.is_empty() {
            return None;
        }
        self.pending_sent = true;

        Some(DeviceAuthUpdate {
            status: DeviceAuthStatus::Pending,
            device_code: self.device_code.clone(),
            user_code: self.user_code.clone(),
            verification_url: self.verification_url.clone(),
            expires_in: DEFAULT_EXPIRES_IN,
            tokens: None,
            error: None,
        })
    }
}

/// Read the login prompt to EOF, reporting `pending` at most once
pub async fn scan_prompt<R>(
    reader: R,
    extractor: &dyn PromptExtractor,
    on_update: &DeviceAuthCallback,
) -> PromptScan
where
    R: AsyncRead + Unpin,
{
    let mut lines = LossyLines::new(reader);
    let mut scan = PromptScan::default();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!("Device auth stdout: {}", line);
                if let Some(update) = scan.feed(&line, extractor) {
                    on_update(update);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading device auth output: {}", e);
                lines.discard().await;
                break;
            }
        }
    }

    scan
}

enum LoginExit {
    Exited(std::io::Result<std::process::ExitStatus>),
    Cancelled,
    TimedOut,
}

/// Run one device-auth login to completion and report its terminal status.
///
/// Never returns an error: every outcome, including a failed spawn, is
/// delivered through `on_update`.
pub async fn run_flow(
    command: AgentCommand,
    auth_file: AuthFile,
    extractor: Arc<dyn PromptExtractor>,
    cancel: CancellationToken,
    deadline: Duration,
    on_update: DeviceAuthCallback,
) {
    info!("Starting device auth...");

    let mut child = match command.spawn().await {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to start codex login: {}", e);
            on_update(DeviceAuthUpdate::failed(e.to_string()));
            return;
        }
    };

    let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
        (Some(stdout), Some(stderr)) => (stdout, stderr),
        _ => {
            on_update(DeviceAuthUpdate::failed("failed to capture login output"));
            return;
        }
    };

    let prompt_task = {
        let on_update = Arc::clone(&on_update);
        tokio::spawn(async move { scan_prompt(stdout, extractor.as_ref(), &on_update).await })
    };
    let stderr_task = tokio::spawn(drain_stderr(stderr));

    let exit = tokio::select! {
        status = child.wait() => LoginExit::Exited(status),
        _ = cancel.cancelled() => LoginExit::Cancelled,
        _ = tokio::time::sleep(deadline) => LoginExit::TimedOut,
    };

    let status = match exit {
        LoginExit::Exited(Ok(status)) => status,
        LoginExit::Exited(Err(e)) => {
            on_update(DeviceAuthUpdate::failed(e.to_string()));
            return;
        }
        LoginExit::Cancelled | LoginExit::TimedOut => {
            if let Err(e) = terminate(&mut child).await {
                warn!("Failed to stop codex login: {}", e);
            }
            if matches!(exit, LoginExit::Cancelled) {
                info!("Device auth cancelled");
                on_update(DeviceAuthUpdate::failed("cancelled"));
            } else {
                info!("Device auth expired");
                on_update(DeviceAuthUpdate::expired());
            }
            return;
        }
    };

    let scan = prompt_task.await.unwrap_or_default();
    let stderr_text = stderr_task.await.map(|s| s.text).unwrap_or_default();

    if !status.success() {
        let message = match stderr_text.trim() {
            "" => describe_status(&status),
            text => text.to_string(),
        };
        warn!("Device auth failed: {}", message);
        on_update(DeviceAuthUpdate::failed(message));
        return;
    }

    match auth_file.read().await {
        Ok(tokens) => {
            info!(
                "Device auth completed successfully for email: {}",
                tokens.email.as_deref().unwrap_or("unknown")
            );
            on_update(DeviceAuthUpdate {
                status: DeviceAuthStatus::Complete,
                device_code: scan.device_code,
                user_code: scan.user_code,
                verification_url: scan.verification_url,
                expires_in: 0,
                tokens: Some(tokens),
                error: None,
            });
        }
        Err(e) => {
            warn!("Failed to read auth tokens after device auth: {}", e);
            on_update(DeviceAuthUpdate::failed("failed to read tokens after authentication"));
        }
    }
}
