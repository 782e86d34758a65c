//! Static API key login

use async_trait::async_trait;
use tracing::info;

use crate::error::{Result, RunnerError};
use crate::process::{describe_status, AgentCommand};

use super::{AuthContext, Authenticator};

/// Runs `codex login --with-api-key` with the key on stdin
pub struct ApiKeyLogin {
    api_key: String,
}

impl ApiKeyLogin {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Authenticator for ApiKeyLogin {
    fn name(&self) -> &'static str {
        "api_key"
    }

    async fn authenticate(&self, ctx: &AuthContext) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(RunnerError::ApiKeyMissing);
        }

        info!("Authenticating Codex CLI with API key...");

        let child = AgentCommand::api_key_login(&ctx.agent_binary, &self.api_key)
            .envs(ctx.env.iter().cloned())
            .spawn()
            .await?;
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(RunnerError::LoginFailed {
                status: describe_status(&output.status),
                output: combined.trim().to_string(),
            });
        }

        info!("Codex CLI authenticated successfully with API key");
        Ok(())
    }
}
