//! Cooperative cancellation and deadline checks.
//!
//! Engines poll a shared [`Guard`] between preprocessing passes, between
//! expansion steps, and between Monte Carlo trials. Observing cancellation
//! aborts the analysis with [`Error::Cancelled`]; partial results are
//! discarded by the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Guard {
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Guard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self { cancel: Arc::new(AtomicBool::new(false)), deadline: Some(deadline) }
    }

    /// A handle the owner can trip from another thread.
    pub fn canceller(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Polls the flag and the deadline.
    pub fn check(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }
}
