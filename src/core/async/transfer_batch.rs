//! Concurrent batch execution of transfers for async callers
//!
//! This module provides the `TransferBatch` struct, which runs many transfer
//! requests concurrently from async code without blocking the runtime.
//!
//! # Design
//!
//! Transfer strategies block on account locks, so every transfer runs on
//! tokio's blocking pool. A semaphore bounds how many run at once; the
//! default is one per CPU. All in-flight transfers share one cancellation
//! token, so [`TransferBatch::cancel`] interrupts every transfer still
//! waiting for a lock.
//!
//! # Architecture
//!
//! ```text
//! TransferBatch
//!     ├── Arc<Ledger>                 (account lookup)
//!     ├── Arc<dyn TransferStrategy>   (lock acquisition policy)
//!     ├── Arc<Semaphore>              (concurrency bound)
//!     └── CancellationToken           (shared interruption)
//! ```

use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::BatchConfig;
use crate::core::Ledger;
use crate::strategy::{TransferReport, TransferStrategy};
use crate::types::{AccountId, LedgerError};

/// One transfer to run as part of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    /// Account to debit
    pub from: AccountId,
    /// Account to credit
    pub to: AccountId,
    /// Amount to move
    pub amount: Decimal,
}

impl TransferRequest {
    /// Create a request
    pub fn new(from: AccountId, to: AccountId, amount: Decimal) -> Self {
        Self { from, to, amount }
    }
}

/// Result of running a single transfer request
///
/// Contains the original request and the result of running it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferResult {
    /// The request that was run
    pub request: TransferRequest,

    /// The report, or the error that prevented the transfer from running
    pub result: Result<TransferReport, LedgerError>,
}

/// Runs batches of transfers on the blocking pool with bounded parallelism
///
/// `TransferBatch` is cloneable; clones share the semaphore and the
/// cancellation token.
#[derive(Clone)]
pub struct TransferBatch {
    ledger: Arc<Ledger>,
    strategy: Arc<dyn TransferStrategy>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl TransferBatch {
    /// Create a new TransferBatch
    ///
    /// # Arguments
    ///
    /// * `ledger` - Registry used to resolve account IDs
    /// * `strategy` - Strategy every transfer runs under
    /// * `config` - Batch settings; `max_concurrent` bounds parallel transfers
    pub fn new(
        ledger: Arc<Ledger>,
        strategy: Arc<dyn TransferStrategy>,
        config: &BatchConfig,
    ) -> Self {
        Self {
            ledger,
            strategy,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            cancel: CancellationToken::new(),
        }
    }

    /// Interrupt every transfer of this batch that is still waiting
    ///
    /// Transfers started after cancellation report `Interrupted` immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run a single request on the blocking pool
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` for unknown IDs, any error the strategy
    /// reports, or `ExecutorStopped` if the runtime is shutting down.
    pub async fn process_one(
        &self,
        request: TransferRequest,
    ) -> Result<TransferReport, LedgerError> {
        let from = self.ledger.get(request.from)?;
        let to = self.ledger.get(request.to)?;

        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| LedgerError::ExecutorStopped)?;

        let strategy = Arc::clone(&self.strategy);
        let cancel = self.cancel.clone();
        let transfer = move || strategy.transfer(&from, &to, request.amount, &cancel);
        tokio::task::spawn_blocking(transfer)
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "transfer task failed");
                LedgerError::ExecutorStopped
            })?
    }

    /// Run a batch of requests concurrently
    ///
    /// # Returns
    ///
    /// One `TransferResult` per request, in request order. Failures are
    /// captured per request and do not stop the rest of the batch.
    pub async fn process_batch(&self, requests: Vec<TransferRequest>) -> Vec<TransferResult> {
        let tasks = requests.into_iter().map(|request| async move {
            let result = self.process_one(request).await;
            TransferResult { request, result }
        });

        let results = join_all(tasks).await;
        tracing::debug!(
            strategy = self.strategy.name(),
            transfers = results.len(),
            "batch processed"
        );
        results
    }
}

impl std::fmt::Debug for TransferBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferBatch")
            .field("strategy", &self.strategy.name())
            .field("available_permits", &self.permits.available_permits())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
