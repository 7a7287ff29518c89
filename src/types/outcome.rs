//! Operation outcomes
//!
//! Every balance-touching operation reports one of these values. They are
//! defined results, not errors: insufficient funds, a version conflict or a
//! timed-out lock wait are all normal answers under contention.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of a withdraw, transfer, counter or optimistic update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The operation was applied
    Success,

    /// The balance was below the requested amount at the instant of the check
    InsufficientFunds,

    /// A conditional transform's predicate did not hold; nothing was retried
    NotApplicable,

    /// An optimistic update saw a different version than expected
    Conflict,

    /// A bounded lock wait expired before the lock was acquired
    Timeout,

    /// The wait timed out and the fallback path recorded the attempt instead
    Deferred,

    /// The caller's cancellation token fired while blocked
    Interrupted,
}

impl Outcome {
    /// Whether the operation changed shared state
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Outcome::Success => "success",
            Outcome::InsufficientFunds => "insufficient funds",
            Outcome::NotApplicable => "not applicable",
            Outcome::Conflict => "conflict",
            Outcome::Timeout => "timeout",
            Outcome::Deferred => "deferred",
            Outcome::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}
