//! Two-party transfer strategies
//!
//! A transfer holds two account locks at once, which is where deadlock
//! lives: two transfers taking the same pair of locks in opposite order can
//! each wait forever for the other. This module defines the Strategy pattern
//! for transfers so the deadlock-avoidance approach can be selected at
//! runtime:
//!
//! - [`TimeoutTransfer`] bounds every wait and gives up instead of deadlocking
//! - [`OrderedTransfer`] takes locks in one global order, so no cycle can form
//! - [`SerializedTransfer`] runs every transfer body on one worker thread
//! - [`BackoffTransfer`] never blocks on a lock and retries after a random delay
//!
//! Every strategy shares the same commit step: with both locks held, the
//! debit and the credit are computed first and applied together, so a
//! half-applied transfer is never observable.

use crate::config::{LedgerConfig, TransferStrategyKind};
use crate::core::balance::ensure_non_negative;
use crate::types::{Account, LedgerError, Outcome};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod backoff;
pub mod ordered;
pub mod serialized;
pub mod timeout;

pub use backoff::BackoffTransfer;
pub use ordered::OrderedTransfer;
pub use serialized::SerializedTransfer;
pub use timeout::TimeoutTransfer;

/// Furthest point a transfer attempt reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// No lock held
    Idle,
    /// The first lock in acquisition order is held
    FirstLockAcquired,
    /// Both locks are held
    SecondLockAcquired,
    /// Funds moved
    Committed,
}

/// Result of one transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    /// What happened
    pub outcome: Outcome,
    /// Furthest state reached before the attempt ended
    pub reached: TransferState,
}

impl TransferReport {
    /// Report for an attempt that ended at `reached`
    pub fn new(outcome: Outcome, reached: TransferState) -> Self {
        Self { outcome, reached }
    }

    /// Report for an attempt that held both locks and ran the balance check
    pub fn settled(outcome: Outcome) -> Self {
        let reached = if outcome.is_success() {
            TransferState::Committed
        } else {
            TransferState::SecondLockAcquired
        };
        Self { outcome, reached }
    }
}

/// Transfer strategy trait for moving funds between two accounts
///
/// Implementations decide how the two account locks are acquired; they all
/// share the same validation and commit rules.
pub trait TransferStrategy: Send + Sync {
    /// Move `amount` from `from` to `to`
    ///
    /// # Arguments
    ///
    /// * `from` - Account to debit
    /// * `to` - Account to credit
    /// * `amount` - Non-negative amount to move
    /// * `cancel` - Fires to abandon the attempt while it is blocked
    ///
    /// # Returns
    ///
    /// A [`TransferReport`]. Insufficient funds, timeouts and interruptions
    /// are reported through its outcome and leave both balances unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `amount` is negative
    /// - `from` and `to` are the same account
    /// - the strategy cannot run at all (inconsistent lock order, stopped worker)
    fn transfer(
        &self,
        from: &Arc<Account>,
        to: &Arc<Account>,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, LedgerError>;

    /// Short name for log output
    fn name(&self) -> &'static str;
}

/// Reject transfers no strategy may run
pub(crate) fn validate(from: &Account, to: &Account, amount: Decimal) -> Result<(), LedgerError> {
    ensure_non_negative(amount, "transfer")?;
    if from.id() == to.id() || std::ptr::eq(from, to) {
        return Err(LedgerError::same_account(from.id()));
    }
    Ok(())
}

/// Create the transfer strategy named by `config.transfer.strategy`
///
/// # Errors
///
/// Returns an error if the serialized worker thread cannot be spawned.
pub fn create_strategy(config: &LedgerConfig) -> Result<Box<dyn TransferStrategy>, LedgerError> {
    let strategy: Box<dyn TransferStrategy> = match config.transfer.strategy {
        TransferStrategyKind::Timeout => Box::new(TimeoutTransfer::new(&config.lock)),
        TransferStrategyKind::GlobalOrder => Box::new(OrderedTransfer::new(&config.lock)),
        TransferStrategyKind::SerializedOwner => Box::new(SerializedTransfer::new(&config.lock)?),
        TransferStrategyKind::Backoff => Box::new(BackoffTransfer::new(&config.transfer)),
    };
    tracing::debug!(strategy = strategy.name(), "transfer strategy created");
    Ok(strategy)
}
