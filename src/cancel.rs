//! Cooperative cancellation for blocking operations.
//!
//! The engine is synchronous: operations block on lock acquisition,
//! bookkeeping queries, and transaction execution. A [`CancelToken`] is
//! threaded through every operation so a supervising thread can abort
//! pending waits, including the lock-table backoff sleeps.
//!
//! A token is cheap to clone. [`CancelToken::never`] produces a token that
//! never fires, for callers that do not need cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::MigrateError;

/// Observer side of a cancellation pair.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    wakeup: Receiver<()>,
}

/// Trigger side of a cancellation pair.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    wakeup: Sender<()>,
}

impl CancelToken {
    /// A token that can never be cancelled.
    #[must_use]
    pub fn never() -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            wakeup: crossbeam_channel::never(),
        }
    }

    /// Create a connected token/handle pair.
    #[must_use]
    pub fn pair() -> (CancelToken, CancelHandle) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = unbounded();
        (
            CancelToken {
                cancelled: Arc::clone(&cancelled),
                wakeup: rx,
            },
            CancelHandle {
                cancelled,
                wakeup: tx,
            },
        )
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Err(MigrateError::Cancelled)` if cancellation was requested.
    pub fn check(&self) -> Result<(), MigrateError> {
        if self.is_cancelled() {
            Err(MigrateError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early with an error on cancellation.
    pub fn sleep(&self, duration: Duration) -> Result<(), MigrateError> {
        self.check()?;
        match self.wakeup.recv_timeout(duration) {
            Ok(()) => Err(MigrateError::Cancelled),
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                // All handles are gone; cancellation can only have happened
                // before the disconnect, so the flag is authoritative.
                if self.is_cancelled() {
                    Err(MigrateError::Cancelled)
                } else {
                    std::thread::sleep(duration);
                    Ok(())
                }
            }
        }
    }
}

impl CancelHandle {
    /// Request cancellation. Wakes one pending sleep, if any.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.wakeup.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn never_token_sleeps_full_duration() {
        let token = CancelToken::never();
        let start = Instant::now();
        token.sleep(Duration::from_millis(30)).expect("sleep");
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn check_fails_after_cancel() {
        let (token, handle) = CancelToken::pair();
        token.check().expect("not yet cancelled");
        handle.cancel();
        assert!(matches!(token.check(), Err(MigrateError::Cancelled)));
    }

    #[test]
    fn cancel_wakes_a_pending_sleep() {
        let (token, handle) = CancelToken::pair();
        let waiter = std::thread::spawn(move || token.sleep(Duration::from_secs(10)));
        std::thread::sleep(Duration::from_millis(20));
        handle.cancel();
        let result = waiter.join().expect("join");
        assert!(matches!(result, Err(MigrateError::Cancelled)));
    }

    #[test]
    fn sleep_after_cancel_returns_immediately() {
        let (token, handle) = CancelToken::pair();
        handle.cancel();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_secs(5)).is_err());
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
