//! Agent Runner - supervises Codex agent processes for incident jobs
//!
//! This crate launches the `codex` CLI once per job in a pre-provisioned
//! workspace, parses its JSON event stream into a cumulative progress log,
//! handles API key and ChatGPT subscription credentials, and runs the
//! device authorization flow.

pub mod auth;
pub mod device_auth;
mod error;
pub mod event;
pub mod parser;
pub mod process;
mod registry;
mod runner;
pub mod settings;

#[cfg(all(test, unix))]
mod testing;

pub use auth::{AuthMethod, Credential, SubscriptionTokens};
pub use device_auth::{DeviceAuthCallback, DeviceAuthStatus, DeviceAuthUpdate, PromptExtractor};
pub use error::{Result, RunnerError};
pub use parser::OutputCallback;
pub use registry::{ActiveRuns, RunGuard};
pub use runner::{AgentRunner, ExecutionResult, RunOptions, RunnerConfig};
pub use settings::{ModelSettings, ProxyPolicy, ServiceClass};
