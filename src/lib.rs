//! Rust Concurrent Ledger Library
//! # Overview
//!
//! This library provides the building blocks for safely sharing mutable
//! account state between threads: exclusive and lock-free balance updates,
//! deadlock-free two-party transfers, starvation-aware withdraws, bounded
//! producer/consumer queues and a reader-writer store with an explicit policy.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Outcome, LedgerError)
//! - [`config`] - TOML configuration for every component
//! - [`core`] - Concurrency components:
//!   - [`core::exclusive`] - Withdraw under the account's exclusive lock
//!   - [`core::lock_free`] / [`core::optimistic`] - CAS loops and optimistic updates
//!   - [`core::fair`] - Fair-queuing and timeout policies for withdraw
//!   - [`core::handoff`] - Bounded hand-off queues
//!   - [`core::rw_store`] - Reader-writer store
//!   - [`core::guarded`] - Guarded suspension slot
//!   - [`core::ledger`] - Account registry
//! - [`strategy`] - Pluggable deadlock-avoidance strategies for transfers
//! - [`telemetry`] - Log subscriber setup
//!
//! # Outcomes and errors
//!
//! Contention results are values, not errors. Every balance-touching
//! operation returns an [`Outcome`]:
//!
//! - **Success**: the operation took effect
//! - **InsufficientFunds**: the balance did not cover the amount; nothing changed
//! - **NotApplicable**: a conditional update's predicate did not hold
//! - **Conflict**: an optimistic update lost to a concurrent one
//! - **Timeout**: a bounded wait expired; nothing changed
//! - **Deferred**: a timeout fallback ran instead of the operation
//! - **Interrupted**: the caller's cancellation token fired while blocked
//!
//! [`LedgerError`] is reserved for caller bugs and infrastructure failures:
//! negative amounts, self-transfers, inconsistent lock orders and the like.
//!
//! # Cancellation
//!
//! Blocking operations take a `tokio_util::sync::CancellationToken`.
//! Cancelling it wakes the blocked call, which returns without side effects.

// Module declarations
pub mod config;
pub mod core;
pub mod strategy;
pub mod telemetry;
pub mod types;

pub use config::{load_config, LedgerConfig};
pub use self::core::{
    AtomicBalance, BoundedHandoffQueue, CasCounter, ChannelHandoffQueue, ExclusiveWithdraw,
    FairOrTimeoutWithdraw, GuardedSlot, HandoffQueue, Ledger, ReadWriteStore, RwPolicy,
    TransferBatch, VersionedEntity, WithdrawPolicy,
};
pub use strategy::{create_strategy, TransferReport, TransferState, TransferStrategy};
pub use types::{Account, AccountId, AccountSnapshot, Interrupted, LedgerError, Outcome};
