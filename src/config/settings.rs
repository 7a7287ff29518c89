use crate::core::fair::DEFAULT_MISSED_CAPACITY;
use crate::core::{RwPolicy, WithdrawPolicy};
use crate::types::LedgerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transfer strategies available for two-account operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStrategyKind {
    /// Bounded wait on each lock, give up on expiry
    Timeout,
    /// Acquire locks in ascending account ID order
    #[default]
    GlobalOrder,
    /// Run every transfer on one dedicated worker thread
    SerializedOwner,
    /// Try-lock both sides, back off with random jitter on failure
    Backoff,
}

/// Bounded queue implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueKind {
    /// Explicit mutex + condition variables
    #[default]
    Monitor,
    /// Bounded blocking channel
    Channel,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Lock acquisition settings shared by every blocking primitive
    pub lock: LockConfig,
    /// Two-account transfer settings
    pub transfer: TransferConfig,
    /// Fair / timeout withdraw settings
    pub withdraw: WithdrawConfig,
    /// Producer-consumer queue settings
    pub queue: QueueConfig,
    /// Reader-writer store settings
    pub store: StoreConfig,
    /// Async batch settings
    pub batch: BatchConfig,
}

/// Lock acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// How long a blocked thread parks before re-checking its cancellation token
    pub poll_interval_ms: u64,
    /// Bounded wait per lock for the timeout transfer strategy
    pub lock_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5,
            lock_timeout_ms: 100,
        }
    }
}

impl LockConfig {
    /// Park slice between cancellation checks
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Bounded wait per lock
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Transfer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Which strategy `create_strategy` builds
    pub strategy: TransferStrategyKind,
    /// Smallest back-off sleep for the back-off strategy
    pub backoff_base_ms: u64,
    /// Attempts before the back-off strategy reports a timeout
    pub backoff_max_attempts: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            strategy: TransferStrategyKind::GlobalOrder,
            backoff_base_ms: 1,
            backoff_max_attempts: 16,
        }
    }
}

/// Withdraw policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawConfig {
    /// Admit waiting withdrawals in arrival order
    pub fair: bool,
    /// Give up waiting after this long and take the fallback path
    pub timeout_ms: Option<u64>,
    /// Most recent missed attempts kept for inspection
    pub missed_capacity: usize,
}

impl Default for WithdrawConfig {
    fn default() -> Self {
        Self {
            fair: false,
            timeout_ms: Some(1000),
            missed_capacity: DEFAULT_MISSED_CAPACITY,
        }
    }
}

impl WithdrawConfig {
    /// The policy these settings describe
    pub fn policy(&self) -> WithdrawPolicy {
        WithdrawPolicy {
            fair: self.fair,
            timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of buffered items
    pub capacity: usize,
    /// Which implementation to build
    pub kind: QueueKind,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            kind: QueueKind::Monitor,
        }
    }
}

/// Reader-writer store settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Arbitration between waiting readers and writers
    pub policy: RwPolicy,
}

/// Async batch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of transfers running at once
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: num_cpus::get(),
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for malformed TOML or unknown enum values, and
    /// `ZeroCapacity` for a queue that could never hold an item.
    pub fn from_toml_str(contents: &str) -> Result<Self, LedgerError> {
        let config: LedgerConfig = toml::from_str(contents)?;
        config.validated()
    }

    /// Repair settings that have a sensible default and reject the rest
    ///
    /// Zero poll intervals, zero back-off attempts and zero batch concurrency
    /// fall back to their defaults with a warning.
    pub fn validated(mut self) -> Result<Self, LedgerError> {
        if self.queue.capacity == 0 {
            return Err(LedgerError::ZeroCapacity);
        }

        if self.lock.poll_interval_ms == 0 {
            let default = LockConfig::default().poll_interval_ms;
            tracing::warn!(
                "Invalid lock.poll_interval_ms (0), using default ({})",
                default
            );
            self.lock.poll_interval_ms = default;
        }

        if self.transfer.backoff_max_attempts == 0 {
            let default = TransferConfig::default().backoff_max_attempts;
            tracing::warn!(
                "Invalid transfer.backoff_max_attempts (0), using default ({})",
                default
            );
            self.transfer.backoff_max_attempts = default;
        }

        if self.batch.max_concurrent == 0 {
            let default = BatchConfig::default().max_concurrent;
            tracing::warn!(
                "Invalid batch.max_concurrent (0), using default ({})",
                default
            );
            self.batch.max_concurrent = default;
        }

        Ok(self)
    }
}
