//! Agent runner - executes and resumes Codex jobs
//!
//! One call to [`AgentRunner::execute`] or [`AgentRunner::resume`] moves
//! through `starting → authenticating → spawned → streaming` and ends
//! completed, failed or cancelled. Nothing about a call is persisted here;
//! callers record the outcome.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{authenticator_for, AuthContext, AuthFile, Credential, SubscriptionTokens};
use crate::device_auth::{
    run_flow, DeviceAuthCallback, PromptExtractor, RegexPromptExtractor, DEVICE_AUTH_ID,
    DEVICE_AUTH_TIMEOUT,
};
use crate::error::{Result, RunnerError};
use crate::parser::{drain_stderr, drain_stdout, OutputCallback, StderrSummary, StreamParser, StreamSummary};
use crate::process::{describe_status, terminate, AgentCommand};
use crate::registry::ActiveRuns;
use crate::settings::{build_environment, login_environment, ModelSettings, ProxyPolicy};

/// Where the runner finds workspaces, credentials and the agent binary
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Parent of the per-job working directories
    pub workspace_dir: PathBuf,
    /// Gateway URL injected into the agent environment
    pub gateway_url: String,
    /// The CLI's home directory, holding `auth.json`
    pub codex_home: PathBuf,
    /// Agent executable
    pub agent_binary: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("/workspaces"),
            gateway_url: "http://mcp-gateway:8080".to_string(),
            codex_home: dirs::home_dir()
                .map(|home| home.join(".codex"))
                .unwrap_or_else(|| PathBuf::from("/home/codex/.codex")),
            agent_binary: PathBuf::from("codex"),
        }
    }
}

/// Credential and settings supplied with a job
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub credential: Option<Credential>,
    pub model: ModelSettings,
    pub proxy: ProxyPolicy,
}

/// Outcome of a successful execute or resume
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Agent session ID to resume from, empty if none was reported
    pub session_id: String,
    /// Final agent message
    pub response: String,
    /// Raw event stream
    pub full_log: String,
    pub tokens_used: u64,
    pub execution_time_ms: u64,
    /// Set when the agent rotated the subscription tokens during the run
    pub refreshed_credential: Option<SubscriptionTokens>,
}

/// Supervises agent processes, one per job ID
pub struct AgentRunner {
    config: RunnerConfig,
    active: ActiveRuns,
    extractor: Arc<dyn PromptExtractor>,
}

impl AgentRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            active: ActiveRuns::new(),
            extractor: Arc::new(RegexPromptExtractor),
        }
    }

    /// Replace the device-auth prompt scraper
    pub fn with_prompt_extractor(mut self, extractor: Arc<dyn PromptExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Number of in-flight invocations, device auth included
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Working directory for a job
    pub fn workspace_path(&self, job_id: &str) -> PathBuf {
        self.config.workspace_dir.join(job_id)
    }

    fn auth_file(&self) -> AuthFile {
        AuthFile::in_home(&self.config.codex_home)
    }

    fn home_env(&self) -> (String, String) {
        (
            "CODEX_HOME".to_string(),
            self.config.codex_home.to_string_lossy().into_owned(),
        )
    }

    /// Run a new task in the job's workspace
    pub async fn execute(
        &self,
        parent: &CancellationToken,
        job_id: &str,
        task: &str,
        options: &RunOptions,
        on_output: OutputCallback,
    ) -> Result<ExecutionResult> {
        info!("Executing job {}", job_id);
        let command = AgentCommand::exec(&self.config.agent_binary, task);
        self.run(parent, job_id, command, None, options, on_output).await
    }

    /// Continue a prior agent session with a follow-up message
    pub async fn resume(
        &self,
        parent: &CancellationToken,
        job_id: &str,
        session_id: &str,
        message: &str,
        options: &RunOptions,
        on_output: OutputCallback,
    ) -> Result<ExecutionResult> {
        info!("Resuming job {} from session {}", job_id, session_id);
        let command = AgentCommand::resume(&self.config.agent_binary, session_id, message);
        self.run(parent, job_id, command, Some(session_id), options, on_output)
            .await
    }

    /// Cancel a running job; false if nothing is registered under `job_id`
    pub fn cancel(&self, job_id: &str) -> bool {
        let cancelled = self.active.cancel(job_id);
        if cancelled {
            info!("Cancelled job {}", job_id);
        }
        cancelled
    }

    /// Start the device authorization flow in the background.
    ///
    /// Fails only if a flow is already running; every other outcome arrives
    /// through `on_update`.
    pub fn run_device_auth(
        &self,
        parent: &CancellationToken,
        settings: &ModelSettings,
        proxy: &ProxyPolicy,
        on_update: DeviceAuthCallback,
    ) -> Result<JoinHandle<()>> {
        let token = parent.child_token();
        let guard = self.active.register(DEVICE_AUTH_ID, token.clone())?;

        let mut env = login_environment(settings, proxy);
        env.push(self.home_env());
        let command = AgentCommand::device_auth(&self.config.agent_binary).envs(env);
        let auth_file = self.auth_file();
        let extractor = Arc::clone(&self.extractor);

        Ok(tokio::spawn(async move {
            let _guard = guard;
            run_flow(command, auth_file, extractor, token, DEVICE_AUTH_TIMEOUT, on_update).await;
        }))
    }

    /// Cancel a running device authorization flow
    pub fn cancel_device_auth(&self) -> bool {
        self.cancel(DEVICE_AUTH_ID)
    }

    async fn run(
        &self,
        parent: &CancellationToken,
        job_id: &str,
        command: AgentCommand,
        prior_session: Option<&str>,
        options: &RunOptions,
        on_output: OutputCallback,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();

        let workdir = self.workspace_path(job_id);
        if !tokio::fs::try_exists(&workdir).await.unwrap_or(false) {
            return Err(RunnerError::WorkspaceNotFound { path: workdir });
        }

        let token = parent.child_token();
        let _guard = self.active.register(job_id, token.clone())?;

        let credential = options.credential.as_ref().filter(|c| c.is_supplied());
        if let Some(credential) = credential {
            let authenticator = authenticator_for(credential);
            debug!("Authenticating job {} with {}", job_id, authenticator.name());
            authenticator
                .authenticate(&self.auth_context(&options.model, &options.proxy))
                .await?;
        }
        if token.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        let mut env = build_environment(&self.config.gateway_url, Some(job_id), &options.model, &options.proxy);
        env.push(self.home_env());

        let mut child = command.current_dir(&workdir).envs(env).spawn().await?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::spawn_failed("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::spawn_failed("failed to capture stderr"))?;

        let stdout_task = tokio::spawn(async move { drain_stdout(stdout, StreamParser::new(), &on_output).await });
        let stderr_task = tokio::spawn(drain_stderr(stderr));

        let exit = tokio::select! {
            status = child.wait() => Some(status),
            _ = token.cancelled() => None,
        };
        let status = match exit {
            Some(status) => Some(status?),
            None => {
                info!("Stopping job {} after cancellation", job_id);
                if let Err(e) = terminate(&mut child).await {
                    warn!("Failed to stop job {}: {}", job_id, e);
                }
                None
            }
        };

        // Both streams must be fully drained before any field is read
        let stream = stdout_task.await.unwrap_or_else(|e| {
            warn!("stdout reader for job {} failed: {}", job_id, e);
            StreamSummary::default()
        });
        let stderr = stderr_task.await.unwrap_or_else(|e| {
            warn!("stderr reader for job {} failed: {}", job_id, e);
            StderrSummary::default()
        });

        let refreshed_credential = match credential.and_then(Credential::supplied_access_token) {
            Some(supplied) => self.rotated_tokens(supplied).await,
            None => None,
        };

        check_outcome(status, token.is_cancelled(), &stream, &stderr.text)?;

        let session_id = stream
            .thread_id
            .clone()
            .or(stderr.session_hint)
            .or_else(|| prior_session.map(str::to_string))
            .unwrap_or_default();

        let result = ExecutionResult {
            session_id,
            response: stream.response,
            full_log: stream.full_log,
            tokens_used: stream.tokens_used,
            execution_time_ms: started.elapsed().as_millis() as u64,
            refreshed_credential,
        };

        info!(
            "Execution complete, response: {} chars, session: {}, tokens: {}, time: {}ms",
            result.response.len(),
            result.session_id,
            result.tokens_used,
            result.execution_time_ms
        );
        Ok(result)
    }

    fn auth_context(&self, settings: &ModelSettings, proxy: &ProxyPolicy) -> AuthContext {
        let mut env = login_environment(settings, proxy);
        env.push(self.home_env());
        AuthContext {
            agent_binary: self.config.agent_binary.clone(),
            auth_file: self.auth_file(),
            env,
        }
    }

    /// Tokens now in `auth.json`, if they differ from the ones supplied
    async fn rotated_tokens(&self, supplied_access_token: &str) -> Option<SubscriptionTokens> {
        match self.auth_file().read().await {
            Ok(tokens) if !tokens.access_token.is_empty() && tokens.access_token != supplied_access_token => {
                info!("OAuth tokens were refreshed during execution");
                Some(tokens)
            }
            Ok(_) => None,
            Err(e) => {
                debug!("Could not re-read credential file: {}", e);
                None
            }
        }
    }
}

/// Decide whether a finished run failed.
///
/// A run whose token was cancelled is reported as cancelled even when the
/// agent exited on its own first. A nonzero exit prefers the agent's own
/// error message, then stderr, then the exit status. A clean exit with no
/// answer and no token usage is still a failure.
fn check_outcome(status: Option<ExitStatus>, cancelled: bool, stream: &StreamSummary, stderr: &str) -> Result<()> {
    let status = match status {
        Some(status) if !cancelled => status,
        _ => return Err(RunnerError::Cancelled),
    };
    let stderr = stderr.trim();

    if !status.success() {
        let exit = describe_status(&status);
        let message = match (&stream.error_message, stderr) {
            (Some(message), _) => message.clone(),
            (None, "") => exit,
            (None, stderr) => format!("{}: {}", exit, stderr),
        };
        warn!("Execution failed: {}", message);
        return Err(RunnerError::execution_failed(message));
    }

    if stream.response.is_empty() && stream.tokens_used == 0 {
        let message = match (&stream.error_message, stderr) {
            (Some(message), _) => message.clone(),
            (None, "") => "agent produced no response and reported no token usage".to_string(),
            (None, stderr) => stderr.to_string(),
        };
        warn!("Execution returned empty response: {}", message);
        return Err(RunnerError::EmptyResponse { message });
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::device_auth::DeviceAuthUpdate;
    use crate::testing::fake_agent;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        runner: Arc<AgentRunner>,
        codex_home: PathBuf,
    }

    fn fixture(script: &str) -> Fixture {
        let dir = tempdir().unwrap();
        let workspaces = dir.path().join("workspaces");
        std::fs::create_dir_all(workspaces.join("inc-1")).unwrap();
        let codex_home = dir.path().join("codex-home");

        let runner = AgentRunner::new(RunnerConfig {
            workspace_dir: workspaces,
            gateway_url: "http://gateway.test".to_string(),
            codex_home: codex_home.clone(),
            agent_binary: fake_agent(dir.path(), script),
        });

        Fixture {
            _dir: dir,
            runner: Arc::new(runner),
            codex_home,
        }
    }

    fn collecting_callback() -> (OutputCallback, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: OutputCallback = Arc::new(move |snapshot: String| sink.lock().unwrap().push(snapshot));
        (callback, seen)
    }

    fn noop() -> OutputCallback {
        Arc::new(|_: String| {})
    }

    async fn execute(f: &Fixture, options: &RunOptions) -> Result<ExecutionResult> {
        f.runner
            .execute(&CancellationToken::new(), "inc-1", "check disk", options, noop())
            .await
    }

    #[tokio::test]
    async fn test_scenario_thread_and_message() {
        let f = fixture(concat!(
            "echo '{\"type\":\"thread.started\",\"thread_id\":\"t-1\"}'\n",
            "echo '{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"Cleared 4GB\"}}'\n",
        ));

        let result = execute(&f, &RunOptions::default()).await.unwrap();

        assert_eq!(result.session_id, "t-1");
        assert_eq!(result.response, "Cleared 4GB");
        assert!(result.refreshed_credential.is_none());
        assert_eq!(f.runner.active_count(), 0);
    }

    #[tokio::test]
    async fn test_scenario_silent_failure_uses_stderr() {
        let f = fixture("echo 'quota exceeded' >&2\n");

        let err = execute(&f, &RunOptions::default()).await.unwrap_err();

        assert!(matches!(err, RunnerError::EmptyResponse { .. }));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_scenario_event_error_beats_exit_status() {
        let f = fixture(concat!(
            "echo '{\"type\":\"error\",\"message\":\"rate limited\"}'\n",
            "echo 'some noise' >&2\n",
            "exit 2\n",
        ));

        let err = execute(&f, &RunOptions::default()).await.unwrap_err();

        assert!(matches!(err, RunnerError::ExecutionFailed { .. }));
        assert!(err.to_string().contains("rate limited"));
        assert!(!err.to_string().contains("exit status"));
    }

    #[tokio::test]
    async fn test_clean_exit_event_error_beats_stderr() {
        let f = fixture(concat!(
            "echo '{\"type\":\"error\",\"message\":\"rate limited\"}'\n",
            "echo 'some noise' >&2\n",
            "exit 0\n",
        ));

        let err = execute(&f, &RunOptions::default()).await.unwrap_err();

        assert!(matches!(err, RunnerError::EmptyResponse { .. }));
        assert!(err.to_string().contains("rate limited"));
        assert!(!err.to_string().contains("some noise"));
    }

    #[tokio::test]
    async fn test_clean_exit_with_nothing_reported() {
        let f = fixture("exit 0\n");

        let err = execute(&f, &RunOptions::default()).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "codex returned empty response: agent produced no response and reported no token usage"
        );
    }

    #[tokio::test]
    async fn test_invalid_stderr_bytes_do_not_break_the_run() {
        let f = fixture(concat!(
            "printf 'warn: \\377\\376 bad bytes\\n' >&2\n",
            "sleep 0.3\n",
            "i=0\n",
            "while [ $i -lt 200 ]; do echo \"stderr line $i\" >&2; i=$((i+1)); done\n",
            "echo '{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"Cleared 4GB\"}}'\n",
        ));

        let result = execute(&f, &RunOptions::default()).await.unwrap();

        assert_eq!(result.response, "Cleared 4GB");
    }

    #[tokio::test]
    async fn test_nonzero_exit_falls_back_to_stderr() {
        let f = fixture("echo 'boom' >&2\nexit 3\n");

        let err = execute(&f, &RunOptions::default()).await.unwrap_err();

        assert_eq!(err.to_string(), "codex execution failed: exit status 3: boom");
    }

    #[tokio::test]
    async fn test_scenario_missing_id_token_spawns_nothing() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("spawned");
        let f = fixture(&format!("touch {}\n", marker.display()));
        let options = RunOptions {
            credential: Some(Credential::Subscription(SubscriptionTokens {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
                ..Default::default()
            })),
            ..Default::default()
        };

        let err = execute(&f, &options).await.unwrap_err();

        assert!(matches!(err, RunnerError::MissingIdToken));
        assert!(err.to_string().contains("re-authenticate"));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_missing_workspace() {
        let f = fixture("exit 0\n");
        let err = f
            .runner
            .execute(&CancellationToken::new(), "inc-404", "task", &RunOptions::default(), noop())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::WorkspaceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_progress_relayed_cumulatively() {
        let f = fixture(concat!(
            "echo '{\"type\":\"item.completed\",\"item\":{\"type\":\"reasoning\",\"text\":\"looking\"}}'\n",
            "echo '{\"type\":\"item.completed\",\"item\":{\"type\":\"command_execution\",\"command\":\"df\",\"aggregated_output\":\"ok\"}}'\n",
            "echo '{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"done\"}}'\n",
            "echo '{\"type\":\"turn.completed\",\"usage\":{\"input_tokens\":10,\"output_tokens\":5}}'\n",
        ));
        let (callback, seen) = collecting_callback();

        let result = f
            .runner
            .execute(&CancellationToken::new(), "inc-1", "task", &RunOptions::default(), callback)
            .await
            .unwrap();

        assert_eq!(result.tokens_used, 15);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].starts_with(&seen[0]));
    }

    #[tokio::test]
    async fn test_environment_injected() {
        let f = fixture(concat!(
            "printf '{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"%s %s %s\"}}\\n' ",
            "\"$MCP_GATEWAY_URL\" \"$INCIDENT_ID\" \"$CODEX_MODEL\"\n",
        ));
        let options = RunOptions {
            model: ModelSettings {
                model: Some("gpt-5".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let result = execute(&f, &options).await.unwrap();

        assert_eq!(result.response, "http://gateway.test inc-1 gpt-5");
    }

    #[tokio::test]
    async fn test_resume_keeps_prior_session() {
        let f = fixture(concat!(
            "[ \"$2\" = resume ] || exit 9\n",
            "echo '{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"again\"}}'\n",
        ));

        let result = f
            .runner
            .resume(&CancellationToken::new(), "inc-1", "t-prior", "more?", &RunOptions::default(), noop())
            .await
            .unwrap();

        assert_eq!(result.session_id, "t-prior");
        assert_eq!(result.response, "again");
    }

    #[tokio::test]
    async fn test_stderr_session_hint() {
        let f = fixture(concat!(
            "echo 'session id: abc-123' >&2\n",
            "echo '{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"ok\"}}'\n",
        ));

        let result = execute(&f, &RunOptions::default()).await.unwrap();

        assert_eq!(result.session_id, "abc-123");
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let f = fixture("exit 0\n");
        assert!(!f.runner.cancel("nope"));
        assert_eq!(f.runner.active_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let f = fixture("echo '{\"type\":\"thread.started\",\"thread_id\":\"t-1\"}'\nsleep 30\n");
        let runner = Arc::clone(&f.runner);

        let handle = tokio::spawn(async move {
            runner
                .execute(&CancellationToken::new(), "inc-1", "task", &RunOptions::default(), noop())
                .await
        });

        for _ in 0..100 {
            if f.runner.cancel("inc-1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "execution cancelled");
        assert_eq!(f.runner.active_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_wins_over_clean_exit() {
        let f = fixture(concat!(
            "trap 'echo \"{\\\"type\\\":\\\"item.completed\\\",\\\"item\\\":{\\\"type\\\":\\\"agent_message\\\",\\\"text\\\":\\\"late\\\"}}\"; exit 0' TERM\n",
            "sleep 30 &\n",
            "wait\n",
        ));
        let runner = Arc::clone(&f.runner);

        let handle = tokio::spawn(async move {
            runner
                .execute(&CancellationToken::new(), "inc-1", "task", &RunOptions::default(), noop())
                .await
        });
        while f.runner.active_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(f.runner.cancel("inc-1"));

        assert!(handle.await.unwrap().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_outcome_cancelled_after_exit() {
        use std::os::unix::process::ExitStatusExt;

        let stream = StreamSummary {
            response: "done".to_string(),
            ..Default::default()
        };
        let clean = ExitStatus::from_raw(0);

        assert!(check_outcome(Some(clean), false, &stream, "").is_ok());
        assert!(check_outcome(Some(clean), true, &stream, "").unwrap_err().is_cancelled());
        assert!(check_outcome(None, true, &stream, "").unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_duplicate_job_rejected() {
        let f = fixture("sleep 30\n");
        let runner = Arc::clone(&f.runner);
        let parent = CancellationToken::new();
        let first_parent = parent.clone();

        let first = tokio::spawn(async move {
            runner
                .execute(&first_parent, "inc-1", "task", &RunOptions::default(), noop())
                .await
        });
        while f.runner.active_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let err = execute(&f, &RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, RunnerError::AlreadyRunning { .. }));

        parent.cancel();
        assert!(first.await.unwrap().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_rotated_tokens_reported() {
        let f = fixture(concat!(
            "cat > \"$CODEX_HOME/auth.json\" <<'EOF'\n",
            "{\"tokens\":{\"access_token\":\"rotated\",\"refresh_token\":\"r2\",\"id_token\":\"i\"}}\n",
            "EOF\n",
            "echo '{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"ok\"}}'\n",
        ));
        let options = RunOptions {
            credential: Some(Credential::Subscription(SubscriptionTokens {
                access_token: "stale-access".to_string(),
                refresh_token: "r".to_string(),
                id_token: "i".to_string(),
                ..Default::default()
            })),
            ..Default::default()
        };

        let result = execute(&f, &options).await.unwrap();

        let rotated = result.refreshed_credential.unwrap();
        assert_eq!(rotated.access_token, "rotated");
        assert_eq!(rotated.refresh_token, "r2");
        assert!(f.codex_home.join("auth.json").exists());
    }

    #[tokio::test]
    async fn test_unrotated_tokens_not_reported() {
        let f = fixture("echo '{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"ok\"}}'\n");
        let options = RunOptions {
            credential: Some(Credential::Subscription(SubscriptionTokens {
                access_token: "same".to_string(),
                refresh_token: "r".to_string(),
                id_token: "i".to_string(),
                ..Default::default()
            })),
            ..Default::default()
        };

        let result = execute(&f, &options).await.unwrap();
        assert!(result.refreshed_credential.is_none());
    }

    #[tokio::test]
    async fn test_device_auth_registry() {
        let f = fixture("echo 'https://auth.openai.com/codex/device'\necho 'ABCD-12345'\nsleep 30\n");
        let parent = CancellationToken::new();
        let on_update: DeviceAuthCallback = Arc::new(|_: DeviceAuthUpdate| {});

        let handle = f
            .runner
            .run_device_auth(&parent, &ModelSettings::default(), &ProxyPolicy::default(), Arc::clone(&on_update))
            .unwrap();
        assert!(f
            .runner
            .run_device_auth(&parent, &ModelSettings::default(), &ProxyPolicy::default(), on_update)
            .is_err());

        assert!(f.runner.cancel_device_auth());
        handle.await.unwrap();
        assert!(!f.runner.cancel_device_auth());
    }
}
