//! Concurrency property tests
//!
//! These tests drive the public API from many threads at once and check the
//! invariants that must hold for every interleaving:
//! - No lost updates and no negative balances under concurrent withdraws
//! - No deadlock for ordered transfers over many accounts
//! - Conservation of the total balance under concurrent transfers
//! - Queue occupancy stays within `0..=capacity`, and FIFO order holds
//! - CAS increments are never lost
//! - Exactly one of two racing optimistic updates wins
//!
//! Each transfer property is run once per strategy.

#[cfg(test)]
mod tests {
    use rand::Rng;
    use rstest::rstest;
    use rust_concurrent_ledger::config::{LedgerConfig, LockConfig, QueueKind, TransferStrategyKind};
    use rust_concurrent_ledger::core::handoff::create_queue;
    use rust_concurrent_ledger::core::optimistic::Version;
    use rust_concurrent_ledger::core::{
        AtomicBalance, CasCounter, ExclusiveWithdraw, FairOrTimeoutWithdraw, Ledger,
        VersionedEntity, Withdraw, WithdrawPolicy,
    };
    use rust_concurrent_ledger::strategy::create_strategy;
    use rust_concurrent_ledger::types::{Account, Outcome};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const THREADS: usize = 8;

    /// Upper bound for runs that must finish; exceeding it means a deadlock
    const LIVENESS_BOUND: Duration = Duration::from_secs(30);

    fn fast_config() -> LedgerConfig {
        let mut config = LedgerConfig::default();
        config.lock = LockConfig {
            poll_interval_ms: 1,
            lock_timeout_ms: 50,
        };
        config
    }

    fn strategy_config(kind: TransferStrategyKind) -> LedgerConfig {
        let mut config = fast_config();
        config.transfer.strategy = kind;
        config
    }

    /// Run `work` on a helper thread and fail if it does not finish in time
    fn within_bound<F>(work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let (done, finished) = crossbeam_channel::bounded(1);
        let runner = thread::spawn(move || {
            work();
            let _ = done.send(());
        });
        finished
            .recv_timeout(LIVENESS_BOUND)
            .expect("run did not complete in time, likely deadlocked");
        runner.join().expect("worker panicked");
    }

    /// Withdraw random amounts from one account on every thread and return
    /// the sum of the amounts that succeeded
    fn hammer_withdraws<F>(withdraw: F) -> Decimal
    where
        F: Fn(Decimal) -> Outcome + Sync,
    {
        thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        let mut rng = rand::thread_rng();
                        let mut succeeded = Decimal::ZERO;
                        for _ in 0..200 {
                            let amount = Decimal::from(rng.gen_range(1..=9));
                            if withdraw(amount).is_success() {
                                succeeded += amount;
                            }
                        }
                        succeeded
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        })
    }

    #[test]
    fn test_exclusive_withdraws_lose_no_updates() {
        let initial = Decimal::from(5_000);
        let account = Account::new(1, "shared", initial);
        let withdraw = ExclusiveWithdraw::default();

        let succeeded = hammer_withdraws(|amount| withdraw.withdraw(&account, amount).unwrap());

        assert_eq!(account.balance(), initial - succeeded);
        assert!(account.balance() >= Decimal::ZERO);
    }

    #[test]
    fn test_atomic_withdraws_lose_no_updates() {
        let initial = Decimal::from(5_000);
        let balance = AtomicBalance::new(1, initial).unwrap();

        let succeeded = hammer_withdraws(|amount| balance.withdraw(amount).unwrap());

        assert_eq!(balance.balance(), initial - succeeded);
        assert!(balance.balance() >= Decimal::ZERO);
    }

    #[rstest]
    #[case::exclusive(Box::new(ExclusiveWithdraw::default()))]
    #[case::fair(Box::new(FairOrTimeoutWithdraw::new(
        WithdrawPolicy::fair(),
        &LockConfig::default(),
    )))]
    #[case::fair_with_timeout(Box::new(FairOrTimeoutWithdraw::new(
        WithdrawPolicy::fair_with_timeout(Duration::from_secs(10)),
        &LockConfig::default(),
    )))]
    fn test_withdraw_policies_never_overdraw(#[case] withdraw: Box<dyn Withdraw>) {
        let initial = Decimal::from(300);
        let account = Account::new(1, "shared", initial);
        let cancel = CancellationToken::new();

        let succeeded = hammer_withdraws(|amount| {
            withdraw
                .withdraw_interruptibly(&account, amount, &cancel)
                .unwrap()
        });

        assert_eq!(account.balance(), initial - succeeded);
        assert!(account.balance() >= Decimal::ZERO);
    }

    #[test]
    fn test_two_withdrawals_of_sixty_from_hundred() {
        for _ in 0..100 {
            let account = Account::new(1, "alice", Decimal::from(100));
            let withdraw = ExclusiveWithdraw::default();
            let start = Barrier::new(2);

            let outcomes: Vec<Outcome> = thread::scope(|scope| {
                let handles: Vec<_> = (0..2)
                    .map(|_| {
                        scope.spawn(|| {
                            start.wait();
                            withdraw.withdraw(&account, Decimal::from(60)).unwrap()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert!(outcomes.contains(&Outcome::Success));
            assert!(outcomes.contains(&Outcome::InsufficientFunds));
            assert_eq!(account.balance(), Decimal::from(40));
        }
    }

    #[test]
    fn test_ordered_transfers_complete_without_deadlock() {
        const ACCOUNTS: usize = 10;
        let ledger = Ledger::new();
        let accounts: Vec<_> = (0..ACCOUNTS)
            .map(|n| ledger.open(format!("acct-{n}"), Decimal::from(1_000)).unwrap())
            .collect();
        let config = strategy_config(TransferStrategyKind::GlobalOrder);
        let strategy = create_strategy(&config).unwrap();

        within_bound(move || {
            thread::scope(|scope| {
                for _ in 0..THREADS {
                    let accounts = &accounts;
                    let strategy = &strategy;
                    scope.spawn(move || {
                        let mut rng = rand::thread_rng();
                        let cancel = CancellationToken::new();
                        for _ in 0..500 {
                            let from = rng.gen_range(0..ACCOUNTS);
                            let to = (from + rng.gen_range(1..ACCOUNTS)) % ACCOUNTS;
                            let amount = Decimal::from(rng.gen_range(1..=50));
                            strategy
                                .transfer(&accounts[from], &accounts[to], amount, &cancel)
                                .unwrap();
                        }
                    });
                }
            });
        });

        assert_eq!(ledger.total_balance(), Decimal::from(10_000));
    }

    #[rstest]
    #[case::timeout(TransferStrategyKind::Timeout)]
    #[case::global_order(TransferStrategyKind::GlobalOrder)]
    #[case::serialized_owner(TransferStrategyKind::SerializedOwner)]
    #[case::backoff(TransferStrategyKind::Backoff)]
    fn test_transfers_conserve_total(#[case] kind: TransferStrategyKind) {
        const ACCOUNTS: usize = 4;
        let ledger = Ledger::new();
        let accounts: Vec<_> = (0..ACCOUNTS)
            .map(|n| ledger.open(format!("acct-{n}"), Decimal::from(500)).unwrap())
            .collect();
        let strategy = create_strategy(&strategy_config(kind)).unwrap();
        let initial = ledger.total_balance();

        thread::scope(|scope| {
            for worker in 0..THREADS {
                let accounts = &accounts;
                let strategy = &strategy;
                scope.spawn(move || {
                    let cancel = CancellationToken::new();
                    for round in 0..100 {
                        // Neighbouring workers deliberately run opposite directions.
                        let from = (worker + round) % ACCOUNTS;
                        let to = if worker % 2 == 0 {
                            (from + 1) % ACCOUNTS
                        } else {
                            (from + ACCOUNTS - 1) % ACCOUNTS
                        };
                        strategy
                            .transfer(&accounts[from], &accounts[to], Decimal::from(7), &cancel)
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(ledger.total_balance(), initial);
        assert!(ledger
            .snapshots()
            .iter()
            .all(|snapshot| snapshot.balance >= Decimal::ZERO));
    }

    #[rstest]
    #[case::monitor(QueueKind::Monitor)]
    #[case::channel(QueueKind::Channel)]
    fn test_queue_occupancy_stays_in_bounds(#[case] kind: QueueKind) {
        const CAPACITY: usize = 5;
        const PER_PRODUCER: u64 = 500;
        let mut config = fast_config();
        config.queue.capacity = CAPACITY;
        config.queue.kind = kind;
        let queue = create_queue::<u64>(&config).unwrap();
        let cancel = CancellationToken::new();
        let producing = AtomicBool::new(true);

        let consumed: u64 = thread::scope(|scope| {
            let queue = queue.as_ref();
            let cancel = &cancel;
            let producing = &producing;

            scope.spawn(move || {
                while producing.load(Ordering::Acquire) {
                    let len = queue.len();
                    assert!(len <= CAPACITY, "queue held {len} items");
                    thread::yield_now();
                }
            });

            let producers: Vec<_> = (0..4u64)
                .map(|p| {
                    scope.spawn(move || {
                        for n in 0..PER_PRODUCER {
                            queue.put(p * PER_PRODUCER + n, cancel).unwrap();
                        }
                    })
                })
                .collect();
            let consumers: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(move || {
                        (0..PER_PRODUCER)
                            .map(|_| queue.take(cancel).unwrap())
                            .sum::<u64>()
                    })
                })
                .collect();

            for producer in producers {
                producer.join().unwrap();
            }
            let consumed = consumers.into_iter().map(|c| c.join().unwrap()).sum();
            producing.store(false, Ordering::Release);
            consumed
        });

        let total = 4 * PER_PRODUCER;
        assert_eq!(consumed, total * (total - 1) / 2);
        assert!(queue.is_empty());
    }

    #[rstest]
    #[case::monitor(QueueKind::Monitor)]
    #[case::channel(QueueKind::Channel)]
    fn test_single_producer_single_consumer_order(#[case] kind: QueueKind) {
        let mut config = fast_config();
        config.queue.capacity = 2;
        config.queue.kind = kind;
        let queue = create_queue::<u32>(&config).unwrap();
        let cancel = CancellationToken::new();

        let received: Vec<u32> = thread::scope(|scope| {
            scope.spawn(|| {
                for item in 0..1_000 {
                    queue.put(item, &cancel).unwrap();
                }
            });
            (0..1_000).map(|_| queue.take(&cancel).unwrap()).collect()
        });

        assert_eq!(received, (0..1_000).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrent_increments_reach_exact_total() {
        let counter = CasCounter::new(-17);

        thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    for _ in 0..10_000 {
                        counter.increment();
                    }
                });
            }
        });

        assert_eq!(counter.get(), -17 + (THREADS as i64) * 10_000);
    }

    #[test]
    fn test_racing_versioned_updates_one_conflicts() {
        for _ in 0..200 {
            let entity = VersionedEntity::new(1, String::from("v0"));
            assert_eq!(entity.update(Version(0), String::from("v1")), Outcome::Success);
            let start = Barrier::new(2);

            let outcomes: Vec<Outcome> = thread::scope(|scope| {
                let handles: Vec<_> = ["left", "right"]
                    .into_iter()
                    .map(|writer| {
                        let entity = &entity;
                        let start = &start;
                        scope.spawn(move || {
                            let expected = entity.stamp();
                            start.wait();
                            entity.update(expected, writer.to_string())
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(
                outcomes.iter().filter(|o| **o == Outcome::Success).count(),
                1
            );
            assert_eq!(
                outcomes.iter().filter(|o| **o == Outcome::Conflict).count(),
                1
            );
            assert_eq!(entity.stamp(), Version(2));
        }
    }
    #[rstest]
    #[case::exclusive(Box::new(ExclusiveWithdraw::default()))]
    #[case::fair(Box::new(FairOrTimeoutWithdraw::new(
        WithdrawPolicy::fair(),
        &LockConfig::default(),
    )))]
    fn test_interrupted_withdraw_leaves_balance(#[case] withdraw: Box<dyn Withdraw>) {
        let account = Account::new(1, "held", Decimal::from(50));
        let cancel = CancellationToken::new();

        let outcome = {
            let _held = account.lock();
            thread::scope(|scope| {
                let waiter = scope.spawn(|| {
                    withdraw.withdraw_interruptibly(&account, Decimal::from(10), &cancel)
                });
                thread::sleep(Duration::from_millis(30));
                cancel.cancel();
                waiter.join().unwrap()
            })
        };

        assert_eq!(outcome, Ok(Outcome::Interrupted));
        assert_eq!(account.balance(), Decimal::from(50));
    }

    #[test]
    fn test_global_ledger_is_shared() {
        let first = Ledger::global();
        let second = Ledger::global();
        let opened = first.open("global-shared", Decimal::from(3)).unwrap();

        let seen = thread::spawn(move || second.get(opened.id()).map(|a| a.balance()))
            .join()
            .unwrap();

        assert_eq!(seen, Ok(Decimal::from(3)));
    }
}
