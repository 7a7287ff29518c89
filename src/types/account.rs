//! Account-related types for the concurrent ledger
//!
//! This module defines the Account structure shared between competing threads.
//! The balance lives inside the account's own exclusive lock, so the only way
//! to read or modify it is to hold that lock.

use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;

/// Account identifier
///
/// Immutable and collision-free within a ledger. This is the key used for
/// global lock ordering; display names are never used for ordering.
pub type AccountId = u32;

/// Shared account state
///
/// An account owns its identity, a display name and a balance guarded by an
/// exclusive lock. It has no behavior of its own beyond accessors; the
/// withdraw, transfer and fairness components decide how the lock is taken.
#[derive(Debug)]
pub struct Account {
    /// The account ID (never changes after construction)
    id: AccountId,

    /// Human readable name, used in log output only
    name: String,

    /// Balance, reachable only through the account's lock
    balance: Mutex<Decimal>,
}

impl Account {
    /// Create a new account with the given opening balance
    ///
    /// # Arguments
    ///
    /// * `id` - The immutable account ID
    /// * `name` - Display name used in logs
    /// * `balance` - Opening balance
    pub fn new(id: AccountId, name: impl Into<String>, balance: Decimal) -> Self {
        Account {
            id,
            name: name.into(),
            balance: Mutex::new(balance),
        }
    }

    /// The immutable account ID
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// The display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The account's exclusive lock handle
    ///
    /// Callers coordinating across several accounts use this handle directly,
    /// e.g. to acquire it with a bounded wait or to release it fairly.
    pub fn lock_handle(&self) -> &Mutex<Decimal> {
        &self.balance
    }

    /// Acquire the account lock, blocking until it is available
    pub fn lock(&self) -> MutexGuard<'_, Decimal> {
        self.balance.lock()
    }

    /// Try to acquire the account lock within `timeout`
    pub fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, Decimal>> {
        self.balance.try_lock_for(timeout)
    }

    /// Read the current balance
    ///
    /// Takes the lock for the duration of the read, so the value is never an
    /// intermediate state of another thread's check-then-act sequence.
    pub fn balance(&self) -> Decimal {
        *self.balance.lock()
    }

    /// Take a consistent copy of the account for reporting
    pub fn snapshot(&self) -> AccountSnapshot {
        let balance = self.balance();
        AccountSnapshot {
            id: self.id,
            name: self.name.clone(),
            balance,
        }
    }
}

/// Point-in-time copy of an account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSnapshot {
    /// The account ID
    pub id: AccountId,

    /// The display name
    pub name: String,

    /// Balance at the time the snapshot was taken
    pub balance: Decimal,
}
