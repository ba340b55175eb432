// src/pipeline/run.rs

//! Ownership of the single "indexing in progress" slot.
//!
//! At most one run is active at a time. A run is identified by a generation
//! id so that a finished run never clears the slot of a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
struct ActiveRun {
    id: u64,
    token: CancellationToken,
}

/// The run slot shared by an indexing service and all of its tasks.
#[derive(Debug, Default)]
pub struct RunFlag {
    active: Mutex<Option<ActiveRun>>,
    generation: AtomicU64,
}

impl RunFlag {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn slot(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the slot for a new run.
    pub fn try_begin(self: &Arc<Self>) -> Result<RunContext> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(AppError::AlreadyRunning);
        }

        let run = ActiveRun {
            id: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
            token: CancellationToken::new(),
        };
        *slot = Some(run.clone());

        Ok(RunContext {
            id: run.id,
            token: run.token,
            flag: Arc::clone(self),
        })
    }

    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }

    /// Context of the active run, if any.
    pub fn current(self: &Arc<Self>) -> Option<RunContext> {
        self.slot().as_ref().map(|run| RunContext {
            id: run.id,
            token: run.token.clone(),
            flag: Arc::clone(self),
        })
    }

    fn release(&self, id: u64) -> bool {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(run) if run.id == id => {
                *slot = None;
                true
            }
            _ => false,
        }
    }
}

/// Handle passed down the crawl task tree of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    id: u64,
    token: CancellationToken,
    flag: Arc<RunFlag>,
}

impl RunContext {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Ask every task of the run to stop scheduling new work.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Release the slot if this run still owns it.
    pub fn finish(&self) -> bool {
        self.flag.release(self.id)
    }

    /// Cancel the run and release its slot immediately.
    pub fn abort(&self) {
        self.cancel();
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_active_run() {
        let flag = RunFlag::new();
        let run = flag.try_begin().unwrap();
        assert!(flag.is_running());
        assert!(matches!(flag.try_begin(), Err(AppError::AlreadyRunning)));

        assert!(run.finish());
        assert!(!flag.is_running());
        assert!(flag.try_begin().is_ok());
    }

    #[test]
    fn test_stale_run_does_not_release_newer() {
        let flag = RunFlag::new();
        let old = flag.try_begin().unwrap();
        old.abort();

        let new = flag.try_begin().unwrap();
        assert_ne!(old.id(), new.id());
        assert!(!old.finish());
        assert!(flag.is_running());
        assert!(!new.is_cancelled());
    }

    #[test]
    fn test_current_shares_token() {
        let flag = RunFlag::new();
        assert!(flag.current().is_none());

        let run = flag.try_begin().unwrap();
        let current = flag.current().unwrap();
        current.cancel();
        assert!(run.is_cancelled());
    }
}
