//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is checked between statements and interrupts
//! retry backoff sleeps (wake-to-cancel): `cancel()` notifies waiters
//! immediately instead of letting the sleep run out.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::{Result, StrataError};

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Clonable cancellation signal shared between an operation and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake any sleeping waiter.
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock().expect("cancel lock poisoned");
        *cancelled = true;
        self.inner.wake.notify_all();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock().expect("cancel lock poisoned")
    }

    /// Fail fast at a suspension point.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Cancelled`] when the token has been cancelled.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StrataError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` when the wait ended because of cancellation.
    #[must_use]
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = std::time::Instant::now() + duration;
        let mut cancelled = self.inner.cancelled.lock().expect("cancel lock poisoned");
        while !*cancelled {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, timeout) = self
                .inner
                .wake
                .wait_timeout(cancelled, deadline - now)
                .expect("cancel lock poisoned");
            cancelled = guard;
            if timeout.timed_out() {
                return *cancelled;
            }
        }
        true
    }
}
