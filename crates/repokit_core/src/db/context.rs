//! Cancellation and deadline signal threaded through every database call.

use super::{DbError, DbResult};
use std::panic::RefUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Caller-owned cancellation signal with an optional deadline.
///
/// Contexts derived with [`Context::with_timeout`] or
/// [`Context::with_deadline`] share the cancellation flag of their parent, so
/// cancelling either one cancels both. A derived deadline never extends the
/// parent's deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when no deadline is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the reason this context is done, if it is.
    ///
    /// Cancellation takes precedence over an expired deadline.
    pub fn err(&self) -> Option<DbError> {
        if self.is_cancelled() {
            return Some(DbError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DbError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn check(&self) -> DbResult<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Builds the probe polled by SQLite's progress handler; returning `true`
    /// interrupts the running statement.
    pub(crate) fn interrupt_probe(&self) -> impl FnMut() -> bool + Send + RefUnwindSafe + 'static {
        let cancelled = Arc::clone(&self.cancelled);
        let deadline = self.deadline;
        move || {
            cancelled.load(Ordering::SeqCst)
                || deadline.is_some_and(|deadline| Instant::now() >= deadline)
        }
    }
}
