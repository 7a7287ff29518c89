//! Error types for the concurrent ledger
//!
//! Errors here are caller bugs or infrastructure failures, never contention.
//! Contention results (insufficient funds, conflicts, timeouts) are reported
//! through [`Outcome`](super::Outcome) instead.
//!
//! # Error Categories
//!
//! - **Contract violations**: negative amounts, self-transfers, a lock order that is
//!   not a total order, zero-capacity queues. Rejected before any shared state is touched.
//! - **Arithmetic errors**: overflow while crediting a balance
//! - **Registry errors**: duplicate or unknown account IDs
//! - **Infrastructure errors**: stopped executor, configuration I/O and parsing

use super::account::AccountId;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Main error type for the ledger toolkit
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// A negative amount was passed to a balance operation
    #[error("Negative amount {amount} rejected for {operation}")]
    NegativeAmount {
        /// The rejected amount
        amount: Decimal,
        /// Operation that rejected it
        operation: String,
    },

    /// An amount has more fractional digits than the atomic balance can hold
    #[error("Amount {amount} exceeds {max_scale} fractional digits")]
    InvalidPrecision {
        /// The rejected amount
        amount: Decimal,
        /// Maximum supported scale
        max_scale: u32,
    },

    /// A transfer named the same account on both sides
    #[error("Transfer from account {account} to itself is not allowed")]
    SameAccount {
        /// The account ID
        account: AccountId,
    },

    /// The configured lock order did not give a strict, antisymmetric answer
    #[error("Lock order is not a total order for accounts {first} and {second}")]
    InconsistentOrder {
        /// First account of the pair
        first: AccountId,
        /// Second account of the pair
        second: AccountId,
    },

    /// Arithmetic overflow would occur
    #[error("Arithmetic overflow in {operation} for account {account}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Account ID
        account: AccountId,
    },

    /// A bounded queue was configured with no room for items
    #[error("Queue capacity must be at least 1")]
    ZeroCapacity,

    /// The serialized transfer worker is no longer running
    #[error("Transfer executor has stopped")]
    ExecutorStopped,

    /// An account with this ID is already registered
    #[error("Account {account} already exists")]
    DuplicateAccount {
        /// Account ID
        account: AccountId,
    },

    /// No account with this ID is registered
    #[error("Account {account} not found")]
    AccountNotFound {
        /// Account ID
        account: AccountId,
    },

    /// I/O error while reading configuration
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// Configuration could not be parsed or is invalid
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the problem
        message: String,
    },
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(error: toml::de::Error) -> Self {
        LedgerError::ConfigError {
            message: error.message().to_string(),
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    /// Create a NegativeAmount error
    pub fn negative_amount(amount: Decimal, operation: &str) -> Self {
        LedgerError::NegativeAmount {
            amount,
            operation: operation.to_string(),
        }
    }

    /// Create an InvalidPrecision error
    pub fn invalid_precision(amount: Decimal, max_scale: u32) -> Self {
        LedgerError::InvalidPrecision { amount, max_scale }
    }

    /// Create a SameAccount error
    pub fn same_account(account: AccountId) -> Self {
        LedgerError::SameAccount { account }
    }

    /// Create an InconsistentOrder error
    pub fn inconsistent_order(first: AccountId, second: AccountId) -> Self {
        LedgerError::InconsistentOrder { first, second }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, account: AccountId) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            account,
        }
    }

    /// Create a DuplicateAccount error
    pub fn duplicate_account(account: AccountId) -> Self {
        LedgerError::DuplicateAccount { account }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(account: AccountId) -> Self {
        LedgerError::AccountNotFound { account }
    }

    /// Create a ConfigError
    pub fn config(message: impl Into<String>) -> Self {
        LedgerError::ConfigError {
            message: message.into(),
        }
    }
}

/// A blocking queue or store operation was cancelled
///
/// Carries back whatever the caller handed in (the item for a `put`, the new
/// value for a `write`) so nothing is lost. The shared structure is unchanged.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Interrupted<T = ()>(pub T);

impl<T> Interrupted<T> {
    /// Recover the payload that was not delivered
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Interrupted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Interrupted { .. }")
    }
}

impl<T> fmt::Display for Interrupted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("blocking operation was interrupted")
    }
}

impl<T> std::error::Error for Interrupted<T> {}
