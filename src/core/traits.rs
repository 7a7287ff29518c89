//! Core traits for withdraw policies, lock ordering and hand-off queues
//!
//! These abstractions let callers swap implementations of the same contract:
//! a plain exclusive withdraw for a fair one, a monitor queue for a channel
//! queue, or the default identity order for a custom comparator.

use crate::types::{Account, Interrupted, LedgerError, Outcome};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use tokio_util::sync::CancellationToken;

/// Withdraw policy over a single account
///
/// Implementations take the account's lock in their own way (plain,
/// fair, bounded) but share the check-then-act contract: the balance is
/// debited only if it covers `amount`, atomically with the check.
pub trait Withdraw: Send + Sync {
    /// Withdraw `amount`, giving up with `Interrupted` if `cancel` fires while blocked
    fn withdraw_interruptibly(
        &self,
        account: &Account,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<Outcome, LedgerError>;
}

/// Total order over accounts used for deadlock-free lock acquisition
///
/// Every caller that locks two accounts must agree on the same order, and
/// the order must be strict: two distinct accounts never compare equal.
pub trait LockOrder: Send + Sync {
    /// Compare two accounts
    fn compare(&self, a: &Account, b: &Account) -> Ordering;
}

/// Order by immutable account ID
#[derive(Debug, Clone, Copy, Default)]
pub struct ById;

impl LockOrder for ById {
    fn compare(&self, a: &Account, b: &Account) -> Ordering {
        a.id().cmp(&b.id())
    }
}

/// Fixed-capacity FIFO buffer with blocking put/take
///
/// `put` blocks while the buffer is full and `take` blocks while it is empty.
/// A cancelled call returns without touching the buffer.
pub trait HandoffQueue<T>: Send + Sync {
    /// Insert at the tail, waiting for room
    fn put(&self, item: T, cancel: &CancellationToken) -> Result<(), Interrupted<T>>;

    /// Remove from the head, waiting for an item
    fn take(&self, cancel: &CancellationToken) -> Result<T, Interrupted>;

    /// Insert without waiting, handing the item back if the buffer is full
    fn try_put(&self, item: T) -> Result<(), T>;

    /// Remove without waiting
    fn try_take(&self) -> Option<T>;

    /// Number of buffered items
    fn len(&self) -> usize;

    /// Whether the buffer holds no items
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered items
    fn capacity(&self) -> usize;
}
