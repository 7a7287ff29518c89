//! Global lock-order transfer strategy
//!
//! Every transfer locks the lower-ordered account first. As long as all
//! callers agree on the order, no two transfers ever hold the same pair of
//! locks in opposite order, so the wait-for graph has no cycles and the
//! strategy cannot deadlock.
//!
//! The order must come from immutable identity. A comparator that ranks two
//! distinct accounts as equal, or that disagrees with itself when the
//! arguments are swapped, would silently void the guarantee; such a
//! comparator is rejected before any lock is taken.

use super::{validate, TransferReport, TransferState, TransferStrategy};
use crate::config::LockConfig;
use crate::core::balance::apply_transfer;
use crate::core::interrupt::{acquire, Deadline};
use crate::core::traits::{ById, LockOrder};
use crate::types::{Account, LedgerError, Outcome};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lock both accounts in a global total order
#[derive(Debug, Clone)]
pub struct OrderedTransfer<O: LockOrder = ById> {
    order: O,
    poll_interval: Duration,
}

impl OrderedTransfer<ById> {
    /// Create a strategy ordering accounts by ID
    pub fn new(config: &LockConfig) -> Self {
        Self::with_order(ById, config)
    }
}

impl<O: LockOrder> OrderedTransfer<O> {
    /// Create a strategy using a custom order
    ///
    /// `order` must be a strict total order shared by every caller that
    /// locks more than one account.
    pub fn with_order(order: O, config: &LockConfig) -> Self {
        Self {
            order,
            poll_interval: config.poll_interval(),
        }
    }

    fn rank(&self, from: &Account, to: &Account) -> Result<Ordering, LedgerError> {
        let forward = self.order.compare(from, to);
        let backward = self.order.compare(to, from);
        if forward == Ordering::Equal || backward != forward.reverse() {
            tracing::warn!(
                first = from.id(),
                second = to.id(),
                ?forward,
                ?backward,
                "lock order is not a strict total order"
            );
            return Err(LedgerError::inconsistent_order(from.id(), to.id()));
        }
        Ok(forward)
    }
}

impl<O: LockOrder> TransferStrategy for OrderedTransfer<O> {
    fn transfer(
        &self,
        from: &Arc<Account>,
        to: &Arc<Account>,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, LedgerError> {
        validate(from, to, amount)?;
        let from_first = self.rank(from, to)? == Ordering::Less;
        let (first, second) = if from_first { (from, to) } else { (to, from) };

        let never = Deadline::never();
        let Ok(mut first_balance) = acquire(first.lock_handle(), &never, cancel, self.poll_interval)
        else {
            return Ok(TransferReport::new(Outcome::Interrupted, TransferState::Idle));
        };
        let Ok(mut second_balance) =
            acquire(second.lock_handle(), &never, cancel, self.poll_interval)
        else {
            return Ok(TransferReport::new(
                Outcome::Interrupted,
                TransferState::FirstLockAcquired,
            ));
        };

        let (from_balance, to_balance) = if from_first {
            (&mut *first_balance, &mut *second_balance)
        } else {
            (&mut *second_balance, &mut *first_balance)
        };
        let outcome = apply_transfer((from_balance, from.id()), (to_balance, to.id()), amount)?;

        tracing::debug!(
            from = from.id(),
            to = to.id(),
            %amount,
            %outcome,
            "ordered transfer"
        );
        Ok(TransferReport::settled(outcome))
    }

    fn name(&self) -> &'static str {
        "global-order"
    }
}
