//! Core concurrency components
//!
//! This module contains the shared-state primitives:
//! - `traits` - Trait abstractions for interchangeable implementations
//! - `balance` - Check-then-act balance arithmetic shared by the lock-based components
//! - `interrupt` - Deadlines and cancellable lock acquisition
//! - `exclusive` - Withdraw and deposit under the account's exclusive lock
//! - `lock_free` - CAS retry loops over atomic integers
//! - `optimistic` - Versioned and timestamped optimistic updates
//! - `fair` - Fair-queuing and timeout policies for withdraw
//! - `handoff` - Bounded producer/consumer queues
//! - `rw_store` - Reader-writer value with an arbitration policy
//! - `guarded` - Guarded suspension slot
//! - `ledger` - Concurrent account registry
//! - `async` - Async facade for batches of transfers

pub mod r#async;
pub mod balance;
pub mod exclusive;
pub mod fair;
pub mod guarded;
pub mod handoff;
pub mod interrupt;
pub mod ledger;
pub mod lock_free;
pub mod optimistic;
pub mod rw_store;
pub mod traits;

pub use exclusive::ExclusiveWithdraw;
pub use fair::{FairOrTimeoutWithdraw, MissedAttempt, WithdrawPolicy};
pub use guarded::GuardedSlot;
pub use handoff::{create_queue, BoundedHandoffQueue, ChannelHandoffQueue};
pub use ledger::Ledger;
pub use lock_free::{AtomicBalance, CasCounter};
pub use optimistic::{
    OptimisticCell, Stamp, Stamped, TimestampedEntity, Version, VersionedEntity, WallClock,
};
pub use r#async::{TransferBatch, TransferRequest, TransferResult};
pub use rw_store::{ReadWriteStore, RwPolicy, StoreStats};
pub use traits::{ById, HandoffQueue, LockOrder, Withdraw};
