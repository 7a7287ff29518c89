//! Benchmark suite for comparing shared-state primitives under contention
//!
//! Each benchmark spawns a fixed number of threads that hammer one shared
//! component, so the numbers compare coordination cost rather than the
//! arithmetic itself.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//! ```
//!
//! # Groups
//!
//! - Counter increments: CAS retry loop vs. hardware fetch-add
//! - Withdraws: exclusive lock vs. lock-free balance
//! - Transfers: every deadlock-avoidance strategy over a small ring of accounts
//! - Hand-off: monitor queue vs. channel queue

use rust_concurrent_ledger::config::{LedgerConfig, QueueKind, TransferStrategyKind};
use rust_concurrent_ledger::core::handoff::create_queue;
use rust_concurrent_ledger::{
    create_strategy, Account, AtomicBalance, CasCounter, ExclusiveWithdraw, Ledger,
};
use rust_decimal::Decimal;
use std::thread;
use tokio_util::sync::CancellationToken;

const THREADS: usize = 4;
const OPS_PER_THREAD: usize = 1_000;

fn main() {
    divan::main();
}

/// Run `op` `OPS_PER_THREAD` times on each of `THREADS` threads
fn contend<F>(op: F)
where
    F: Fn(usize) + Sync,
{
    thread::scope(|scope| {
        for worker in 0..THREADS {
            let op = &op;
            scope.spawn(move || {
                for n in 0..OPS_PER_THREAD {
                    op(worker * OPS_PER_THREAD + n);
                }
            });
        }
    });
}

/// Increments through the compare-and-set retry loop
#[divan::bench]
fn counter_cas_increment() {
    let counter = CasCounter::new(0);
    contend(|_| {
        counter.increment();
    });
    assert_eq!(counter.get(), (THREADS * OPS_PER_THREAD) as i64);
}

/// Increments through a single fetch-add
#[divan::bench]
fn counter_fetch_increment() {
    let counter = CasCounter::new(0);
    contend(|_| {
        counter.fetch_increment();
    });
    assert_eq!(counter.get(), (THREADS * OPS_PER_THREAD) as i64);
}

/// Withdraws under the account's exclusive lock
#[divan::bench]
fn withdraw_exclusive() {
    let account = Account::new(1, "bench", Decimal::from(1_000_000));
    let withdraw = ExclusiveWithdraw::default();
    contend(|_| {
        withdraw
            .withdraw(&account, Decimal::ONE)
            .expect("Withdraw failed");
    });
}

/// Withdraws through a CAS loop on the atomic balance
#[divan::bench]
fn withdraw_lock_free() {
    let balance = AtomicBalance::new(1, Decimal::from(1_000_000)).expect("Invalid balance");
    contend(|_| {
        balance.withdraw(Decimal::ONE).expect("Withdraw failed");
    });
}

/// Transfers around a ring of accounts, one run per strategy
#[divan::bench(args = [
    TransferStrategyKind::Timeout,
    TransferStrategyKind::GlobalOrder,
    TransferStrategyKind::SerializedOwner,
    TransferStrategyKind::Backoff,
])]
fn transfer_ring(kind: TransferStrategyKind) {
    const ACCOUNTS: usize = 8;
    let ledger = Ledger::new();
    let accounts: Vec<_> = (0..ACCOUNTS)
        .map(|n| {
            ledger
                .open(format!("ring-{n}"), Decimal::from(10_000))
                .expect("Failed to open account")
        })
        .collect();
    let mut config = LedgerConfig::default();
    config.transfer.strategy = kind;
    let strategy = create_strategy(&config).expect("Failed to create strategy");
    let cancel = CancellationToken::new();

    contend(|n| {
        let from = n % ACCOUNTS;
        let to = (from + 1 + n % 3) % ACCOUNTS;
        strategy
            .transfer(&accounts[from], &accounts[to], Decimal::ONE, &cancel)
            .expect("Transfer failed");
    });
}

/// One producer and one consumer passing items through a small queue
#[divan::bench(args = [QueueKind::Monitor, QueueKind::Channel])]
fn handoff_pipeline(kind: QueueKind) {
    const ITEMS: usize = 10_000;
    let mut config = LedgerConfig::default();
    config.queue.kind = kind;
    let queue = create_queue::<usize>(&config).expect("Failed to create queue");
    let cancel = CancellationToken::new();

    thread::scope(|scope| {
        scope.spawn(|| {
            for item in 0..ITEMS {
                queue.put(item, &cancel).expect("Put interrupted");
            }
        });
        for _ in 0..ITEMS {
            queue.take(&cancel).expect("Take interrupted");
        }
    });
}
