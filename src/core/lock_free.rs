//! Lock-free counter and balance
//!
//! Both types are built on the compare-and-swap retry loop: read the current
//! value, compute the candidate, install it only if the value is unchanged
//! since the read, otherwise retry from the fresh value.
//!
//! # Progress
//!
//! No lock is ever held and no thread ever suspends. A CAS only fails because
//! another thread's CAS succeeded, so the system as a whole always makes
//! progress. An individual thread has no such bound: under unbounded
//! contention it can keep losing the race. This is the accepted trade-off of
//! lock-free designs; [`CasCounter::contention`] reports how often it happened.

use super::balance::ensure_non_negative;
use crate::types::{AccountId, LedgerError, Outcome};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Fractional digits an [`AtomicBalance`] can represent
pub const MAX_SCALE: u32 = 4;

/// Minor units per whole currency unit
const UNITS_PER_WHOLE: i64 = 10_000;

/// Integer counter updated through CAS retry loops
#[derive(Debug, Default)]
pub struct CasCounter {
    value: AtomicI64,
    contention: AtomicU64,
}

impl CasCounter {
    /// Create a counter starting at `initial`
    pub fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
            contention: AtomicU64::new(0),
        }
    }

    /// Current value
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Add one and return the new value
    ///
    /// Always succeeds eventually. Wraps on overflow.
    pub fn increment(&self) -> i64 {
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            let next = current.wrapping_add(1);
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => {
                    self.contention.fetch_add(1, Ordering::Relaxed);
                    current = actual;
                }
            }
        }
    }

    /// Add one with a single hardware fetch-add and return the new value
    pub fn fetch_increment(&self) -> i64 {
        self.value.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Replace the value with `f(current)` when `f` accepts it
    ///
    /// `f` returning `None` means the predicate does not hold for the value it
    /// was shown; the loop stops with `NotApplicable` instead of retrying.
    /// `f` may run more than once when other threads update concurrently, and
    /// is always shown the freshest value.
    pub fn transform_if<F>(&self, mut f: F) -> Outcome
    where
        F: FnMut(i64) -> Option<i64>,
    {
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            let Some(next) = f(current) else {
                return Outcome::NotApplicable;
            };
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Outcome::Success,
                Err(actual) => {
                    self.contention.fetch_add(1, Ordering::Relaxed);
                    current = actual;
                }
            }
        }
    }

    /// Double the value if it is even
    ///
    /// Odd values, and doublings that would overflow, report `NotApplicable`.
    pub fn multiply_if_even(&self) -> Outcome {
        self.transform_if(|value| {
            if value % 2 == 0 {
                value.checked_mul(2)
            } else {
                None
            }
        })
    }

    /// Number of CAS attempts that lost a race and had to retry
    pub fn contention(&self) -> u64 {
        self.contention.load(Ordering::Relaxed)
    }
}

/// Account balance held in an atomic integer of minor units
///
/// Withdrawals are CAS retry loops: the sufficiency check and the debit are
/// one atomic step because the CAS only succeeds against the exact value that
/// was checked.
#[derive(Debug)]
pub struct AtomicBalance {
    id: AccountId,
    units: AtomicI64,
}

impl AtomicBalance {
    /// Create a balance for account `id`
    ///
    /// # Errors
    ///
    /// Returns `InvalidPrecision` if `balance` has more than four fractional
    /// digits, or `ArithmeticOverflow` if it does not fit in minor units.
    pub fn new(id: AccountId, balance: Decimal) -> Result<Self, LedgerError> {
        let units = to_units(balance, id, "open")?;
        Ok(Self {
            id,
            units: AtomicI64::new(units),
        })
    }

    /// The account ID
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// Current balance
    pub fn balance(&self) -> Decimal {
        Decimal::new(self.units.load(Ordering::Acquire), MAX_SCALE)
    }

    /// Withdraw `amount` if the balance covers it at the instant of the CAS
    ///
    /// # Errors
    ///
    /// Returns `NegativeAmount` or `InvalidPrecision` for amounts the balance
    /// cannot represent.
    pub fn withdraw(&self, amount: Decimal) -> Result<Outcome, LedgerError> {
        ensure_non_negative(amount, "withdraw")?;
        let amount = to_units(amount, self.id, "withdraw")?;

        let mut current = self.units.load(Ordering::Acquire);
        loop {
            if current < amount {
                return Ok(Outcome::InsufficientFunds);
            }
            match self.units.compare_exchange_weak(
                current,
                current - amount,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(Outcome::Success),
                Err(actual) => current = actual,
            }
        }
    }

    /// Deposit `amount`
    ///
    /// # Errors
    ///
    /// Returns `NegativeAmount`, `InvalidPrecision`, or `ArithmeticOverflow`
    /// if the new balance does not fit.
    pub fn deposit(&self, amount: Decimal) -> Result<Outcome, LedgerError> {
        ensure_non_negative(amount, "deposit")?;
        let amount = to_units(amount, self.id, "deposit")?;

        let mut current = self.units.load(Ordering::Acquire);
        loop {
            let next = current
                .checked_add(amount)
                .ok_or_else(|| LedgerError::arithmetic_overflow("deposit", self.id))?;
            match self.units.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(Outcome::Success),
                Err(actual) => current = actual,
            }
        }
    }
}

fn to_units(amount: Decimal, account: AccountId, operation: &str) -> Result<i64, LedgerError> {
    let normalized = amount.normalize();
    if normalized.scale() > MAX_SCALE {
        return Err(LedgerError::invalid_precision(amount, MAX_SCALE));
    }

    normalized
        .checked_mul(Decimal::from(UNITS_PER_WHOLE))
        .and_then(|units| units.to_i64())
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, account))
}
