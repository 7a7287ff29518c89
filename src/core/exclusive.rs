//! Mutual-exclusion withdraw
//!
//! The baseline correctness primitive: every withdraw and deposit takes the
//! account's single exclusive lock for the whole check-then-act sequence.
//! Only one lock is ever held, so this component cannot deadlock.

use super::balance::{apply_deposit, apply_withdrawal, ensure_non_negative};
use super::interrupt::{acquire, Deadline, WaitError};
use super::traits::Withdraw;
use crate::config::LockConfig;
use crate::types::{Account, LedgerError, Outcome};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Withdraw and deposit under the account's exclusive lock
#[derive(Debug, Clone)]
pub struct ExclusiveWithdraw {
    /// Park slice between cancellation checks
    poll_interval: Duration,
}

impl ExclusiveWithdraw {
    /// Create a withdraw component using the configured poll interval
    pub fn new(config: &LockConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
        }
    }

    /// Withdraw funds, blocking until the account lock is free
    ///
    /// # Returns
    ///
    /// * `Ok(Outcome::Success)` - the balance covered `amount` and was debited
    /// * `Ok(Outcome::InsufficientFunds)` - the balance was left unchanged
    ///
    /// # Errors
    ///
    /// Returns `NegativeAmount` for `amount < 0`, before the lock is taken.
    pub fn withdraw(&self, account: &Account, amount: Decimal) -> Result<Outcome, LedgerError> {
        ensure_non_negative(amount, "withdraw")?;

        let mut balance = account.lock();
        let outcome = apply_withdrawal(&mut balance, amount, account.id())?;

        tracing::debug!(
            account = account.id(),
            %amount,
            %outcome,
            balance = %*balance,
            "withdraw"
        );
        Ok(outcome)
    }

    /// Deposit funds, blocking until the account lock is free
    ///
    /// # Errors
    ///
    /// Returns `NegativeAmount` for `amount < 0` and `ArithmeticOverflow` if
    /// the credit cannot be represented.
    pub fn deposit(&self, account: &Account, amount: Decimal) -> Result<Outcome, LedgerError> {
        ensure_non_negative(amount, "deposit")?;

        let mut balance = account.lock();
        apply_deposit(&mut balance, amount, account.id())
    }
}

impl Default for ExclusiveWithdraw {
    fn default() -> Self {
        Self::new(&LockConfig::default())
    }
}

impl Withdraw for ExclusiveWithdraw {
    fn withdraw_interruptibly(
        &self,
        account: &Account,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<Outcome, LedgerError> {
        ensure_non_negative(amount, "withdraw")?;

        let mut balance = match acquire(
            account.lock_handle(),
            &Deadline::never(),
            cancel,
            self.poll_interval,
        ) {
            Ok(guard) => guard,
            Err(WaitError::Interrupted) | Err(WaitError::TimedOut) => {
                tracing::debug!(account = account.id(), "withdraw interrupted");
                return Ok(Outcome::Interrupted);
            }
        };

        apply_withdrawal(&mut balance, amount, account.id())
    }
}
