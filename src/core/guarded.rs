//! Guarded suspension
//!
//! A single-value slot. Consumers block until a producer stores a value;
//! every wait re-checks the slot after waking.

use crate::config::LockConfig;
use crate::types::Interrupted;
use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Slot whose readers wait until it is filled
#[derive(Debug)]
pub struct GuardedSlot<T> {
    value: Mutex<Option<T>>,
    filled: Condvar,
    poll_interval: Duration,
}

impl<T> GuardedSlot<T> {
    /// Create an empty slot
    pub fn new(config: &LockConfig) -> Self {
        Self {
            value: Mutex::new(None),
            filled: Condvar::new(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Store `value`, replacing any previous one, and wake all waiters
    pub fn set(&self, value: T) -> Option<T> {
        let previous = self.value.lock().replace(value);
        self.filled.notify_all();
        previous
    }

    /// Whether a value is present
    pub fn is_set(&self) -> bool {
        self.value.lock().is_some()
    }

    /// Remove the value, waiting until one is present
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if `cancel` fires first; the slot is untouched.
    pub fn take(&self, cancel: &CancellationToken) -> Result<T, Interrupted> {
        self.wait_with(cancel, Option::take)
    }

    fn wait_with<R>(
        &self,
        cancel: &CancellationToken,
        mut f: impl FnMut(&mut Option<T>) -> Option<R>,
    ) -> Result<R, Interrupted> {
        let mut value = self.value.lock();
        loop {
            if cancel.is_cancelled() {
                return Err(Interrupted(()));
            }
            if let Some(found) = f(&mut *value) {
                return Ok(found);
            }
            self.filled.wait_for(&mut value, self.poll_interval);
        }
    }
}

impl<T: Clone> GuardedSlot<T> {
    /// Clone the value, waiting until one is present
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if `cancel` fires first.
    pub fn get(&self, cancel: &CancellationToken) -> Result<T, Interrupted> {
        self.wait_with(cancel, |value| value.clone())
    }
}

impl<T> Default for GuardedSlot<T> {
    fn default() -> Self {
        Self::new(&LockConfig::default())
    }
}
