//! Per-incident session state
//!
//! A session records what happened to one incident's agent run so that a
//! later `continue_incident` can resume the same agent conversation.

mod model;
mod store;

pub use model::*;
pub use store::*;
