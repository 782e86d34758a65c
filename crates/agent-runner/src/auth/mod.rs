//! Credential strategies for the agent CLI
//!
//! Two modes exist: a static API key handed to `codex login`, and ChatGPT
//! subscription tokens written to the CLI's `auth.json`. Each is an
//! [`Authenticator`]; the runner picks one per call from the [`Credential`].

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

mod api_key;
mod file;
mod subscription;

pub use api_key::ApiKeyLogin;
pub use file::{email_from_jwt, AuthFile, AUTH_FILE_NAME};
pub use subscription::SubscriptionLogin;

/// How the coordinator wants the agent authenticated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[default]
    ApiKey,
    ChatgptSubscription,
}

/// OAuth token set for subscription auth
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SubscriptionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub expires_at: Option<String>,
    pub email: Option<String>,
}

impl SubscriptionTokens {
    /// All three tokens the CLI needs are present
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty() && !self.id_token.is_empty()
    }
}

impl fmt::Debug for SubscriptionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionTokens")
            .field("access_token", &format_args!("<{} bytes>", self.access_token.len()))
            .field("refresh_token", &format_args!("<{} bytes>", self.refresh_token.len()))
            .field("id_token", &format_args!("<{} bytes>", self.id_token.len()))
            .field("expires_at", &self.expires_at)
            .field("email", &self.email)
            .finish()
    }
}

/// Credential supplied with a job
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    Subscription(SubscriptionTokens),
}

impl Credential {
    /// Whether anything was actually supplied; an empty credential skips login
    pub fn is_supplied(&self) -> bool {
        match self {
            Self::ApiKey(key) => !key.is_empty(),
            Self::Subscription(tokens) => !tokens.access_token.is_empty(),
        }
    }

    /// Access token given at call start, used to spot a rotation afterwards
    pub fn supplied_access_token(&self) -> Option<&str> {
        match self {
            Self::Subscription(tokens) => Some(tokens.access_token.as_str()),
            Self::ApiKey(_) => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(key) => write!(f, "ApiKey(<{} bytes>)", key.len()),
            Self::Subscription(tokens) => f.debug_tuple("Subscription").field(tokens).finish(),
        }
    }
}

/// Where a strategy may run the CLI or write its files
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub agent_binary: PathBuf,
    pub auth_file: AuthFile,
    pub env: Vec<(String, String)>,
}

/// One way of making the agent CLI authenticated before it runs
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn authenticate(&self, ctx: &AuthContext) -> Result<()>;
}

/// Pick the strategy for a credential
pub fn authenticator_for(credential: &Credential) -> Box<dyn Authenticator> {
    match credential {
        Credential::ApiKey(key) => Box::new(ApiKeyLogin::new(key.clone())),
        Credential::Subscription(tokens) => Box::new(SubscriptionLogin::new(tokens.clone())),
    }
}
