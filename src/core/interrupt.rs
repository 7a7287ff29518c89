//! Interruptible waiting
//!
//! Rust threads have no interrupt flag, so every blocking primitive in this
//! crate takes a [`CancellationToken`]. A blocked thread parks for at most one
//! poll interval at a time and re-checks its token and deadline between
//! slices. A cancelled token stays cancelled, so the caller still sees the
//! cancellation after the operation returns.

use crate::types::Outcome;
use parking_lot::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Why a bounded or interruptible wait ended without the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The deadline passed
    TimedOut,
    /// The cancellation token fired
    Interrupted,
}

impl From<WaitError> for Outcome {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::TimedOut => Outcome::Timeout,
            WaitError::Interrupted => Outcome::Interrupted,
        }
    }
}

/// Optional point in time after which a wait gives up
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline `timeout` from now, or none at all
    pub fn after(timeout: Option<Duration>) -> Self {
        Deadline(timeout.map(|timeout| Instant::now() + timeout))
    }

    /// A deadline that never expires
    pub fn never() -> Self {
        Deadline(None)
    }

    /// Whether the deadline has passed
    pub fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left before expiry, `None` for unbounded deadlines
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Length of the next park slice, capped by `poll`
    ///
    /// Returns `None` once the deadline has passed.
    pub fn slice(&self, poll: Duration) -> Option<Duration> {
        match self.remaining() {
            None => Some(poll),
            Some(left) if left.is_zero() => None,
            Some(left) => Some(left.min(poll)),
        }
    }
}

/// Acquire `lock` before `deadline`, giving up if `cancel` fires
///
/// A token that is already cancelled on entry fails immediately, without
/// touching the lock. Otherwise at least one acquisition attempt is made,
/// even for a deadline that has already expired.
pub fn acquire<'a, T>(
    lock: &'a Mutex<T>,
    deadline: &Deadline,
    cancel: &CancellationToken,
    poll: Duration,
) -> Result<MutexGuard<'a, T>, WaitError> {
    if cancel.is_cancelled() {
        return Err(WaitError::Interrupted);
    }

    loop {
        let slice = deadline.slice(poll).unwrap_or(Duration::ZERO);
        if let Some(guard) = lock.try_lock_for(slice) {
            return Ok(guard);
        }
        if cancel.is_cancelled() {
            return Err(WaitError::Interrupted);
        }
        if deadline.expired() {
            return Err(WaitError::TimedOut);
        }
    }
}
