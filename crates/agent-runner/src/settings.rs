//! Per-job model settings, proxy policy and the agent process environment

use serde::{Deserialize, Serialize};

/// Outbound service classes a proxy policy can route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceClass {
    /// Model API traffic made by the agent itself
    OpenAi,
    Slack,
    Zabbix,
}

/// Which services go through the outbound proxy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyPolicy {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub no_proxy: String,
    #[serde(default)]
    pub openai_enabled: bool,
    #[serde(default)]
    pub slack_enabled: bool,
    #[serde(default)]
    pub zabbix_enabled: bool,
}

impl ProxyPolicy {
    /// Policy built from the legacy `proxy_url`/`no_proxy` pair, which only
    /// ever applied to agent traffic
    pub fn legacy(url: impl Into<String>, no_proxy: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            openai_enabled: !url.is_empty(),
            url,
            no_proxy: no_proxy.into(),
            ..Default::default()
        }
    }

    /// Whether traffic of `class` should use the proxy
    pub fn routes(&self, class: ServiceClass) -> bool {
        if self.url.is_empty() {
            return false;
        }
        match class {
            ServiceClass::OpenAi => self.openai_enabled,
            ServiceClass::Slack => self.slack_enabled,
            ServiceClass::Zabbix => self.zabbix_enabled,
        }
    }
}

/// Model overrides passed through to the agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSettings {
    pub model: Option<String>,
    pub reasoning_effort: Option<String>,
    pub base_url: Option<String>,
}

/// Extra environment variables for one agent invocation.
///
/// The child inherits the worker's environment; these are layered on top.
pub fn build_environment(
    gateway_url: &str,
    job_id: Option<&str>,
    settings: &ModelSettings,
    proxy: &ProxyPolicy,
) -> Vec<(String, String)> {
    let mut env = vec![("MCP_GATEWAY_URL".to_string(), gateway_url.to_string())];

    if let Some(job_id) = job_id {
        env.push(("INCIDENT_ID".to_string(), job_id.to_string()));
    }

    let overrides = [
        ("CODEX_MODEL", &settings.model),
        ("CODEX_REASONING_EFFORT", &settings.reasoning_effort),
        ("OPENAI_BASE_URL", &settings.base_url),
    ];
    for (key, value) in overrides {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            env.push((key.to_string(), value.to_string()));
        }
    }

    push_proxy(&mut env, proxy);
    env
}

/// Environment for the login subprocess: base URL and proxy only
pub fn login_environment(settings: &ModelSettings, proxy: &ProxyPolicy) -> Vec<(String, String)> {
    let mut env = Vec::new();
    if let Some(base_url) = settings.base_url.as_deref().filter(|v| !v.is_empty()) {
        env.push(("OPENAI_BASE_URL".to_string(), base_url.to_string()));
    }
    push_proxy(&mut env, proxy);
    env
}

fn push_proxy(env: &mut Vec<(String, String)>, proxy: &ProxyPolicy) {
    if proxy.routes(ServiceClass::OpenAi) {
        env.push(("HTTP_PROXY".to_string(), proxy.url.clone()));
        env.push(("HTTPS_PROXY".to_string(), proxy.url.clone()));
    }
    if !proxy.no_proxy.is_empty() {
        env.push(("NO_PROXY".to_string(), proxy.no_proxy.clone()));
    }
}
