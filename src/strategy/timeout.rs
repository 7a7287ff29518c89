//! Bounded-wait transfer strategy

use super::{validate, TransferReport, TransferState, TransferStrategy};
use crate::config::LockConfig;
use crate::core::balance::apply_transfer;
use crate::core::interrupt::{acquire, Deadline};
use crate::types::{Account, LedgerError};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lock `from` then `to`, each with a bounded wait
///
/// Locks are taken in argument order, so two opposite transfers can still
/// block each other, but only until one of them times out and releases
/// what it holds. Failed attempts are not retried.
#[derive(Debug, Clone)]
pub struct TimeoutTransfer {
    lock_timeout: Duration,
    poll_interval: Duration,
}

impl TimeoutTransfer {
    /// Create a strategy waiting at most `lock.lock_timeout_ms` per lock
    pub fn new(config: &LockConfig) -> Self {
        Self {
            lock_timeout: config.lock_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

impl TransferStrategy for TimeoutTransfer {
    fn transfer(
        &self,
        from: &Arc<Account>,
        to: &Arc<Account>,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, LedgerError> {
        validate(from, to, amount)?;

        let first = Deadline::after(Some(self.lock_timeout));
        let mut from_balance =
            match acquire(from.lock_handle(), &first, cancel, self.poll_interval) {
                Ok(guard) => guard,
                Err(err) => {
                    tracing::debug!(from = from.id(), to = to.id(), ?err, "first lock not taken");
                    return Ok(TransferReport::new(err.into(), TransferState::Idle));
                }
            };

        let second = Deadline::after(Some(self.lock_timeout));
        let mut to_balance = match acquire(to.lock_handle(), &second, cancel, self.poll_interval)
        {
            Ok(guard) => guard,
            Err(err) => {
                tracing::debug!(from = from.id(), to = to.id(), ?err, "second lock not taken");
                return Ok(TransferReport::new(
                    err.into(),
                    TransferState::FirstLockAcquired,
                ));
            }
        };

        let outcome = apply_transfer(
            (&mut *from_balance, from.id()),
            (&mut *to_balance, to.id()),
            amount,
        )?;
        Ok(TransferReport::settled(outcome))
    }

    fn name(&self) -> &'static str {
        "timeout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;

    fn strategy() -> TimeoutTransfer {
        TimeoutTransfer::new(&LockConfig {
            poll_interval_ms: 2,
            lock_timeout_ms: 20,
        })
    }

    fn accounts() -> (Arc<Account>, Arc<Account>) {
        (
            Arc::new(Account::new(1, "alice", Decimal::from(100))),
            Arc::new(Account::new(2, "bob", Decimal::from(100))),
        )
    }

    #[test]
    fn test_times_out_on_first_lock() {
        let (from, to) = accounts();
        let _held = from.lock();

        let report = strategy()
            .transfer(&from, &to, Decimal::ONE, &CancellationToken::new())
            .unwrap();

        assert_eq!(report, TransferReport::new(Outcome::Timeout, TransferState::Idle));
    }

    #[test]
    fn test_times_out_on_second_lock_and_releases_first() {
        let (from, to) = accounts();
        let held = to.lock();

        let report = strategy()
            .transfer(&from, &to, Decimal::ONE, &CancellationToken::new())
            .unwrap();
        drop(held);

        assert_eq!(
            report,
            TransferReport::new(Outcome::Timeout, TransferState::FirstLockAcquired)
        );
        assert!(from.lock_handle().try_lock().is_some());
        assert_eq!(from.balance(), Decimal::from(100));
        assert_eq!(to.balance(), Decimal::from(100));
    }

    #[test]
    fn test_cancelled_token_interrupts_without_locking() {
        let (from, to) = accounts();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = strategy().transfer(&from, &to, Decimal::ONE, &cancel).unwrap();
        assert_eq!(
            report,
            TransferReport::new(Outcome::Interrupted, TransferState::Idle)
        );
    }
}
