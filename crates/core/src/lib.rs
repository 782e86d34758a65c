//! Core library for the Codex worker
//!
//! This crate contains the state the worker keeps between jobs:
//! - Session model (one record per incident)
//! - File-backed session store

pub mod error;
pub mod session;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
