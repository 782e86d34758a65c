//! Registry of in-flight invocations and their cancel handles

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::{Result, RunnerError};

/// Cancel handles keyed by job ID.
///
/// Critical sections are map operations only.
#[derive(Debug, Clone, Default)]
pub struct ActiveRuns {
    runs: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl ActiveRuns {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `token` under `id`, rejecting an ID that is already running.
    ///
    /// The entry lives as long as the returned guard.
    pub fn register(&self, id: &str, token: CancellationToken) -> Result<RunGuard> {
        let mut runs = self.lock();
        if runs.contains_key(id) {
            return Err(RunnerError::AlreadyRunning {
                job_id: id.to_string(),
            });
        }
        runs.insert(id.to_string(), token);

        Ok(RunGuard {
            runs: self.clone(),
            id: id.to_string(),
        })
    }

    /// Cancel the run registered under `id`; false if there is none
    pub fn cancel(&self, id: &str) -> bool {
        let token = self.lock().get(id).cloned();
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its registry entry on drop
#[derive(Debug)]
pub struct RunGuard {
    runs: ActiveRuns,
    id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runs.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_unknown_is_noop() {
        let runs = ActiveRuns::new();
        assert!(!runs.cancel("nope"));
        assert!(runs.is_empty());
    }

    #[test]
    fn test_cancel_registered() {
        let runs = ActiveRuns::new();
        let token = CancellationToken::new();
        let _guard = runs.register("inc-1", token.clone()).unwrap();

        assert!(runs.cancel("inc-1"));
        assert!(token.is_cancelled());
        // Still registered until the invocation returns
        assert_eq!(runs.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let runs = ActiveRuns::new();
        let _guard = runs.register("inc-1", CancellationToken::new()).unwrap();

        let err = runs.register("inc-1", CancellationToken::new()).unwrap_err();
        assert!(matches!(err, RunnerError::AlreadyRunning { .. }));
    }

    #[test]
    fn test_guard_removes_entry() {
        let runs = ActiveRuns::new();
        {
            let _guard = runs.register("inc-1", CancellationToken::new()).unwrap();
            assert_eq!(runs.len(), 1);
        }
        assert!(runs.is_empty());
        assert!(runs.register("inc-1", CancellationToken::new()).is_ok());
    }
}
