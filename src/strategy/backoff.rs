//! Randomized back-off transfer strategy
//!
//! Never blocks on a lock. Each attempt try-locks both accounts; if either is
//! busy it releases everything and sleeps before trying again. Two threads
//! retrying on a fixed delay can stay in lock-step forever, each grabbing
//! one lock and yielding it as the other grabs the second. The random jitter
//! breaks that pattern, and the exponential growth keeps contention low.

use super::{validate, TransferReport, TransferState, TransferStrategy};
use crate::config::TransferConfig;
use crate::core::balance::apply_transfer;
use crate::core::interrupt::Deadline;
use crate::types::{Account, LedgerError, Outcome};
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cap on the doubling exponent
const MAX_SHIFT: u32 = 10;

/// Cancellation is re-checked at least this often while sleeping
const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// Try-lock both accounts, retrying after a random growing delay
#[derive(Debug, Clone)]
pub struct BackoffTransfer {
    base: Duration,
    max_attempts: u32,
}

impl BackoffTransfer {
    /// Create a strategy from the transfer settings
    pub fn new(config: &TransferConfig) -> Self {
        Self {
            base: Duration::from_millis(config.backoff_base_ms),
            max_attempts: config.backoff_max_attempts.max(1),
        }
    }

    /// Random delay before retry number `attempt` (starting at 0)
    fn jitter(&self, attempt: u32) -> Duration {
        let ceiling = self.base.saturating_mul(1 << attempt.min(MAX_SHIFT));
        let micros = u64::try_from(ceiling.as_micros()).unwrap_or(u64::MAX);
        Duration::from_micros(rand::thread_rng().gen_range(0..=micros))
    }

    fn attempt(
        &self,
        from: &Account,
        to: &Account,
        amount: Decimal,
    ) -> Result<Result<TransferReport, TransferState>, LedgerError> {
        let Some(mut from_balance) = from.lock_handle().try_lock() else {
            return Ok(Err(TransferState::Idle));
        };
        let Some(mut to_balance) = to.lock_handle().try_lock() else {
            return Ok(Err(TransferState::FirstLockAcquired));
        };

        let outcome = apply_transfer(
            (&mut *from_balance, from.id()),
            (&mut *to_balance, to.id()),
            amount,
        )?;
        Ok(Ok(TransferReport::settled(outcome)))
    }
}

impl TransferStrategy for BackoffTransfer {
    fn transfer(
        &self,
        from: &Arc<Account>,
        to: &Arc<Account>,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, LedgerError> {
        validate(from, to, amount)?;

        let mut furthest = TransferState::Idle;
        for attempt in 0..self.max_attempts {
            if cancel.is_cancelled() {
                return Ok(TransferReport::new(Outcome::Interrupted, furthest));
            }

            match self.attempt(from, to, amount)? {
                Ok(report) => return Ok(report),
                Err(reached) => furthest = furthest.max(reached),
            }

            let pause = Deadline::after(Some(self.jitter(attempt)));
            while let Some(slice) = pause.slice(SLEEP_SLICE) {
                if cancel.is_cancelled() {
                    break;
                }
                thread::sleep(slice);
            }
        }

        tracing::warn!(
            from = from.id(),
            to = to.id(),
            attempts = self.max_attempts,
            "transfer gave up after repeated lock contention"
        );
        Ok(TransferReport::new(Outcome::Timeout, furthest))
    }

    fn name(&self) -> &'static str {
        "backoff"
    }
}
