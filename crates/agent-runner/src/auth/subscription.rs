//! ChatGPT subscription tokens

use async_trait::async_trait;
use tracing::info;

use crate::error::{Result, RunnerError};

use super::{AuthContext, Authenticator, SubscriptionTokens};

/// Makes sure `auth.json` holds a complete token set
pub struct SubscriptionLogin {
    tokens: SubscriptionTokens,
}

impl SubscriptionLogin {
    pub fn new(tokens: SubscriptionTokens) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Authenticator for SubscriptionLogin {
    fn name(&self) -> &'static str {
        "chatgpt_subscription"
    }

    async fn authenticate(&self, ctx: &AuthContext) -> Result<()> {
        // A complete file is reused; the CLI refreshes it on its own
        if let Ok(existing) = ctx.auth_file.read().await {
            if existing.is_complete() {
                info!(
                    "Using existing auth.json with valid tokens (email: {})",
                    existing.email.as_deref().unwrap_or("unknown")
                );
                return Ok(());
            }
            if existing.id_token.is_empty() {
                info!("Existing auth.json is missing id_token, will regenerate");
            }
        }

        if self.tokens.access_token.is_empty() || self.tokens.refresh_token.is_empty() {
            return Err(RunnerError::TokensMissing);
        }
        if self.tokens.id_token.is_empty() {
            return Err(RunnerError::MissingIdToken);
        }

        info!("Authenticating Codex CLI with ChatGPT subscription tokens...");
        ctx.auth_file.write(&self.tokens).await?;
        info!("Codex CLI authenticated successfully with ChatGPT tokens");
        Ok(())
    }
}
