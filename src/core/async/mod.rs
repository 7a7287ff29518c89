//! Asynchronous facade over the blocking components
//!
//! The lock-based components block their calling thread. Async callers reach
//! them through this module, which moves the blocking work onto tokio's
//! blocking pool:
//!
//! - **TransferBatch**: concurrent execution of many transfers with bounded
//!   parallelism and shared cancellation

pub mod transfer_batch;

pub use transfer_batch::{TransferBatch, TransferRequest, TransferResult};
