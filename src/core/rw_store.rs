//! Reader-writer store with an explicit arbitration policy
//!
//! Many readers may hold the value at once; a writer holds it alone. Who is
//! admitted next when both kinds are waiting is decided by [`RwPolicy`]:
//!
//! - `ReaderPreference`: a reader enters whenever no writer is active. A
//!   steady stream of overlapping readers starves writers indefinitely.
//! - `WriterPreference`: readers also hold back while any writer is waiting,
//!   which can starve readers under a steady stream of writers.
//! - `Fair`: arrivals take a ticket and are admitted in ticket order. A run of
//!   readers at the head of the queue enters together; a writer at the head
//!   waits for the active readers to drain.
//!
//! Admission is arbitrated by a small monitor. The value itself sits in a
//! `RwLock` that is only ever taken after admission, so it never blocks.

use crate::config::{LedgerConfig, LockConfig};
use crate::types::Interrupted;
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Arbitration between waiting readers and writers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RwPolicy {
    /// Readers enter whenever no writer is active
    ReaderPreference,
    /// Waiting writers block newly arriving readers
    WriterPreference,
    /// First come, first served
    #[default]
    Fair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Reader,
    Writer,
}

#[derive(Debug, Default)]
struct Admission {
    readers: usize,
    writer: bool,
    waiting_readers: usize,
    waiting_writers: usize,
    next_ticket: u64,
    serving: u64,
    abandoned: BTreeSet<u64>,
}

impl Admission {
    fn advance(&mut self) {
        self.serving += 1;
        while self.abandoned.remove(&self.serving) {
            self.serving += 1;
        }
    }

    fn can_enter(&self, policy: RwPolicy, role: Role, ticket: u64) -> bool {
        let free = match role {
            Role::Reader => !self.writer,
            Role::Writer => !self.writer && self.readers == 0,
        };
        match policy {
            RwPolicy::ReaderPreference => free,
            RwPolicy::WriterPreference => match role {
                Role::Reader => free && self.waiting_writers == 0,
                Role::Writer => free,
            },
            RwPolicy::Fair => free && ticket == self.serving,
        }
    }

    fn waiting(&mut self, role: Role) -> &mut usize {
        match role {
            Role::Reader => &mut self.waiting_readers,
            Role::Writer => &mut self.waiting_writers,
        }
    }
}

/// Snapshot of the arbiter's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Readers currently holding the value
    pub active_readers: usize,
    /// Whether a writer currently holds the value
    pub writer_active: bool,
    /// Readers blocked on admission
    pub waiting_readers: usize,
    /// Writers blocked on admission
    pub waiting_writers: usize,
}

/// Shared value readable by many, writable by one
#[derive(Debug)]
pub struct ReadWriteStore<T> {
    value: RwLock<T>,
    admission: Mutex<Admission>,
    changed: Condvar,
    policy: RwPolicy,
    poll_interval: Duration,
}

impl<T> ReadWriteStore<T> {
    /// Create a store holding `value`
    pub fn new(value: T, policy: RwPolicy, config: &LockConfig) -> Self {
        Self {
            value: RwLock::new(value),
            admission: Mutex::new(Admission::default()),
            changed: Condvar::new(),
            policy,
            poll_interval: config.poll_interval(),
        }
    }

    /// Create a store using the `store` and `lock` sections
    pub fn from_config(value: T, config: &LedgerConfig) -> Self {
        Self::new(value, config.store.policy, &config.lock)
    }

    /// The arbitration policy
    pub fn policy(&self) -> RwPolicy {
        self.policy
    }

    /// Current reader and writer counts
    pub fn stats(&self) -> StoreStats {
        let admission = self.admission.lock();
        StoreStats {
            active_readers: admission.readers,
            writer_active: admission.writer,
            waiting_readers: admission.waiting_readers,
            waiting_writers: admission.waiting_writers,
        }
    }

    /// Run `f` with shared access
    pub fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let _pass = self.admit_uninterruptibly(Role::Reader);
        let value = self.value.read();
        f(&value)
    }

    /// Run `f` with shared access, giving up if `cancel` fires while waiting
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` without running `f`.
    pub fn read_interruptibly<R>(
        &self,
        cancel: &CancellationToken,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R, Interrupted> {
        let _pass = self.admit(Role::Reader, cancel).ok_or(Interrupted(()))?;
        let value = self.value.read();
        Ok(f(&value))
    }

    /// Replace the value with exclusive access and return the previous one
    pub fn write(&self, value: T) -> T {
        let _pass = self.admit_uninterruptibly(Role::Writer);
        let replaced = std::mem::replace(&mut *self.value.write(), value);
        tracing::debug!(policy = ?self.policy, "store written");
        replaced
    }

    /// Modify the value in place with exclusive access
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let _pass = self.admit_uninterruptibly(Role::Writer);
        let mut value = self.value.write();
        f(&mut value)
    }

    /// Replace the value, giving up if `cancel` fires while waiting
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` carrying `value` back; the store is unchanged.
    pub fn write_interruptibly(
        &self,
        value: T,
        cancel: &CancellationToken,
    ) -> Result<T, Interrupted<T>> {
        let Some(_pass) = self.admit(Role::Writer, cancel) else {
            return Err(Interrupted(value));
        };
        let replaced = std::mem::replace(&mut *self.value.write(), value);
        Ok(replaced)
    }

    fn admit_uninterruptibly(&self, role: Role) -> Pass<'_, T> {
        let mut admission = self.admission.lock();
        let ticket = self.enqueue(&mut admission, role);
        while !admission.can_enter(self.policy, role, ticket) {
            self.changed.wait(&mut admission);
        }
        self.enter(admission, role)
    }

    fn admit(&self, role: Role, cancel: &CancellationToken) -> Option<Pass<'_, T>> {
        if cancel.is_cancelled() {
            return None;
        }

        let mut admission = self.admission.lock();
        let ticket = self.enqueue(&mut admission, role);
        while !admission.can_enter(self.policy, role, ticket) {
            if cancel.is_cancelled() {
                *admission.waiting(role) -= 1;
                if self.policy == RwPolicy::Fair {
                    if admission.serving == ticket {
                        admission.advance();
                    } else {
                        admission.abandoned.insert(ticket);
                    }
                }
                self.changed.notify_all();
                tracing::debug!(?role, ticket, "store admission interrupted");
                return None;
            }
            self.changed.wait_for(&mut admission, self.poll_interval);
        }
        Some(self.enter(admission, role))
    }

    fn enqueue(&self, admission: &mut Admission, role: Role) -> u64 {
        let ticket = admission.next_ticket;
        admission.next_ticket += 1;
        *admission.waiting(role) += 1;
        ticket
    }

    fn enter(&self, mut admission: MutexGuard<'_, Admission>, role: Role) -> Pass<'_, T> {
        *admission.waiting(role) -= 1;
        match role {
            Role::Reader => admission.readers += 1,
            Role::Writer => admission.writer = true,
        }
        if self.policy == RwPolicy::Fair {
            admission.advance();
            // The next ticket may be a reader that can join right away.
            self.changed.notify_all();
        }
        Pass { store: self, role }
    }

    fn leave(&self, role: Role) {
        let mut admission = self.admission.lock();
        match role {
            Role::Reader => admission.readers -= 1,
            Role::Writer => admission.writer = false,
        }
        self.changed.notify_all();
    }
}

impl<T: Clone> ReadWriteStore<T> {
    /// Clone the current value with shared access
    pub fn read(&self) -> T {
        self.read_with(T::clone)
    }
}

/// Admission held by one reader or writer, released on drop
struct Pass<'a, T> {
    store: &'a ReadWriteStore<T>,
    role: Role,
}

impl<T> Drop for Pass<'_, T> {
    fn drop(&mut self) {
        self.store.leave(self.role);
    }
}
