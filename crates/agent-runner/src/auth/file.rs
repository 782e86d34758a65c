//! The agent CLI's persisted credential file (`auth.json`)

use std::path::{Path, PathBuf};

use base64::{
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
    Engine as _,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{Result, RunnerError};

use super::SubscriptionTokens;

pub const AUTH_FILE_NAME: &str = "auth.json";

/// Handle on `<codex home>/auth.json`
#[derive(Debug, Clone)]
pub struct AuthFile {
    path: PathBuf,
}

impl AuthFile {
    /// File inside the CLI's home directory
    pub fn in_home(codex_home: impl AsRef<Path>) -> Self {
        Self {
            path: codex_home.as_ref().join(AUTH_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read whatever tokens the file currently holds.
    ///
    /// Accepts tokens nested under `tokens` or at the top level, in snake or
    /// camel case. A missing email is recovered from the access token claims.
    pub async fn read(&self) -> Result<SubscriptionTokens> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            RunnerError::credential_file(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let root: Map<String, Value> = serde_json::from_str(&content).map_err(|e| {
            RunnerError::credential_file(format!("failed to parse {}: {}", self.path.display(), e))
        })?;

        let data = match root.get("tokens") {
            Some(Value::Object(nested)) => nested,
            _ => &root,
        };

        let mut tokens = SubscriptionTokens {
            access_token: string_field(data, &["access_token", "accessToken"]).unwrap_or_default(),
            refresh_token: string_field(data, &["refresh_token", "refreshToken"]).unwrap_or_default(),
            id_token: string_field(data, &["id_token", "idToken"]).unwrap_or_default(),
            expires_at: string_field(data, &["expires_at", "expiresAt"]),
            email: string_field(data, &["email"]).or_else(|| string_field(&root, &["email"])),
        };

        if tokens.email.is_none() && !tokens.access_token.is_empty() {
            tokens.email = email_from_jwt(&tokens.access_token);
        }

        Ok(tokens)
    }

    /// Write `tokens` in the CLI's format, readable by the owner only
    pub async fn write(&self, tokens: &SubscriptionTokens) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            create_private_dir(dir).await?;
        }

        let document = json!({
            "OPENAI_API_KEY": Value::Null,
            "tokens": {
                "access_token": tokens.access_token,
                "refresh_token": tokens.refresh_token,
                "id_token": tokens.id_token,
            },
            "last_refresh": Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        });
        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| RunnerError::credential_file(format!("failed to serialize auth data: {}", e)))?;

        write_private_file(&self.path, content.as_bytes()).await?;
        debug!("Wrote credential file {:?}", self.path);
        Ok(())
    }
}

fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(unix)]
async fn create_private_dir(dir: &Path) -> Result<()> {
    tokio::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .await
        .map_err(|e| RunnerError::credential_file(format!("failed to create auth directory: {}", e)))
}

#[cfg(not(unix))]
async fn create_private_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| RunnerError::credential_file(format!("failed to create auth directory: {}", e)))
}

#[cfg(unix)]
async fn write_private_file(path: &Path, content: &[u8]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    use tokio::io::AsyncWriteExt;

    let map_err = |e: std::io::Error| RunnerError::credential_file(format!("failed to write auth.json: {}", e));

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await
        .map_err(map_err)?;
    file.write_all(content).await.map_err(map_err)?;
    file.flush().await.map_err(map_err)?;

    // An existing file keeps its old mode on open
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(map_err)
}

#[cfg(not(unix))]
async fn write_private_file(path: &Path, content: &[u8]) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| RunnerError::credential_file(format!("failed to write auth.json: {}", e)))
}

/// Email claim of an unverified JWT.
///
/// Looks at `email`, then `https://api.openai.com/profile`.`email`.
pub fn email_from_jwt(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let payload = parts[1].trim_end_matches('=');
    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .ok()?;
    let claims: Map<String, Value> = serde_json::from_slice(&decoded).ok()?;

    claims
        .get("email")
        .and_then(Value::as_str)
        .or_else(|| {
            claims
                .get("https://api.openai.com/profile")
                .and_then(|profile| profile.get("email"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
}
