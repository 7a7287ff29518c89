//! Types module
//!
//! Contains core data structures used throughout the toolkit.
//! This module organizes types into logical submodules:
//! - `account`: The shared account entity and its identity
//! - `outcome`: Expected results of every balance-touching operation
//! - `error`: Contract-violation errors and the cancellation marker

pub mod account;
pub mod error;
pub mod outcome;

pub use account::{Account, AccountId, AccountSnapshot};
pub use error::{Interrupted, LedgerError};
pub use outcome::Outcome;
