//! Configuration module
//!
//! Runtime configuration for every primitive in the toolkit, loaded from TOML.
//! Missing sections and fields fall back to defaults, so an empty file is a
//! valid configuration.

mod settings;

pub use settings::{
    BatchConfig, LedgerConfig, LockConfig, QueueConfig, QueueKind, StoreConfig, TransferConfig,
    TransferStrategyKind, WithdrawConfig,
};

use crate::types::LedgerError;
use std::fs;
use std::path::Path;

/// Load and validate a configuration file
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, or names a
/// setting that cannot be repaired (e.g. a zero queue capacity).
pub fn load_config(path: &Path) -> Result<LedgerConfig, LedgerError> {
    let contents = fs::read_to_string(path)?;
    LedgerConfig::from_toml_str(&contents)
}
