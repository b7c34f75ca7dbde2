//! Cooperative cancellation shared between the playback controller and the
//! collaborators it drives.
//!
//! Every synthesis the controller issues gets a fresh token. Superseding the
//! operation cancels the token; providers poll it at their own suspension
//! points and bail out with [`Cancelled`], which callers treat as a quiet
//! outcome rather than a failure.

use anyhow::Result;
use std::fmt;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn check_cancelled(&self, stage: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Cancelled { stage }.into());
        }
        Ok(())
    }

    /// Sleep for up to `duration`, waking every `poll` to look at the token.
    /// Returns `true` when the wait ended because of cancellation.
    pub fn wait_for(&self, duration: Duration, poll: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(poll.min(deadline - now));
        }
    }
}

/// Error value carried through `anyhow` when work stops because its token
/// was cancelled.
#[derive(Debug, Clone, Copy)]
pub struct Cancelled {
    pub stage: &'static str,
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation cancelled at stage={}", self.stage)
    }
}

impl std::error::Error for Cancelled {}

pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Cancelled>().is_some()
}
