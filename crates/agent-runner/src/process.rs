//! Agent process management

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

use crate::error::{Result, RunnerError};

/// Time between SIGTERM and SIGKILL when stopping a process group
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Flags that let the agent act without approvals inside its workspace
const EXEC_FLAGS: [&str; 3] = [
    "--skip-git-repo-check",
    "--dangerously-bypass-approvals-and-sandbox",
    "--json",
];

/// One invocation of the agent executable
#[derive(Debug, Clone)]
pub struct AgentCommand {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    stdin: Option<String>,
}

impl AgentCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            stdin: None,
        }
    }

    /// `exec` a new task
    pub fn exec(program: impl Into<PathBuf>, task: &str) -> Self {
        let mut cmd = Self::new(program).arg("exec");
        for flag in EXEC_FLAGS {
            cmd = cmd.arg(flag);
        }
        cmd.arg(task)
    }

    /// `exec resume` a prior agent session with a follow-up message
    pub fn resume(program: impl Into<PathBuf>, session_id: &str, message: &str) -> Self {
        let mut cmd = Self::new(program).arg("exec").arg("resume").arg(session_id);
        for flag in EXEC_FLAGS {
            cmd = cmd.arg(flag);
        }
        cmd.arg(message)
    }

    /// `login --with-api-key`, with the key written to stdin
    pub fn api_key_login(program: impl Into<PathBuf>, api_key: &str) -> Self {
        Self::new(program)
            .arg("login")
            .arg("--with-api-key")
            .stdin(api_key)
    }

    /// `login --device-auth`
    pub fn device_auth(program: impl Into<PathBuf>) -> Self {
        Self::new(program).arg("login").arg("--device-auth")
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn envs(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    /// Text written to the child's stdin before it is closed
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Spawn with piped stdout/stderr in a new process group
    pub async fn spawn(&self) -> Result<Child> {
        info!("Spawning {:?} {}", self.program, self.args.first().map(String::as_str).unwrap_or(""));

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| {
            RunnerError::spawn_failed_with_source(
                format!("failed to spawn {}: {}", self.program.display(), e),
                e,
            )
        })?;

        if let Some(input) = &self.stdin {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| RunnerError::spawn_failed("failed to open stdin pipe"))?;
            pipe.write_all(input.as_bytes()).await?;
            // Dropping the pipe closes stdin
        }

        Ok(child)
    }
}

/// Stop a child and every process in its group, then reap it.
///
/// The group gets SIGTERM first and SIGKILL if it is still alive after
/// [`TERMINATE_GRACE`].
pub async fn terminate(child: &mut Child) -> Result<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let pgid = Pid::from_raw(pid as i32);
        debug!("Sending SIGTERM to process group {}", pid);
        let _ = killpg(pgid, Signal::SIGTERM);

        match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            Ok(status) => {
                // The leader is gone; stragglers in the group still get killed
                let _ = killpg(pgid, Signal::SIGKILL);
                return Ok(status?);
            }
            Err(_) => {
                warn!("Process group {} ignored SIGTERM, killing", pid);
                let _ = killpg(pgid, Signal::SIGKILL);
            }
        }
    }

    if let Err(e) = child.start_kill() {
        debug!("start_kill after group kill: {}", e);
    }
    Ok(child.wait().await?)
}

/// Render an exit status the way a shell reports it
pub fn describe_status(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {}", code),
        None => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    return format!("signal: {}", signal);
                }
            }
            status.to_string()
        }
    }
}
