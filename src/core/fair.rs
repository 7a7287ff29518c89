//! Fair and timeout-bounded withdraw
//!
//! Starvation avoidance layered on the exclusive withdraw. Two independent
//! policies, which may be combined:
//!
//! - **Fair**: requesters are admitted to the account lock in arrival order
//!   through a per-account ticket gate, and the lock is released with a fair
//!   hand-off to the next parked thread.
//! - **Timeout**: the total wait is bounded. On expiry the attempt is logged
//!   and recorded as missed, and the caller gets `Deferred` instead of
//!   blocking indefinitely. The record keeps only the most recent misses,
//!   up to a fixed capacity.
//!
//! # Limitations
//!
//! Ordering covers requesters going through this component. Code that locks
//! the account directly can still barge in ahead of the queue, and a thread
//! holding the head ticket can delay everyone behind it for as long as the
//! scheduler keeps it off the CPU.

use super::balance::{apply_withdrawal, ensure_non_negative};
use super::interrupt::{acquire, Deadline, WaitError};
use super::traits::Withdraw;
use crate::config::{LedgerConfig, LockConfig};
use crate::types::{Account, AccountId, LedgerError, Outcome};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, MutexGuard};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// How a withdraw waits for the account lock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WithdrawPolicy {
    /// Admit waiters in arrival order
    pub fair: bool,
    /// Give up after this long and take the fallback path
    pub timeout: Option<Duration>,
}

impl WithdrawPolicy {
    /// Arrival-order admission, unbounded wait
    pub fn fair() -> Self {
        Self {
            fair: true,
            timeout: None,
        }
    }

    /// Bounded wait, no ordering guarantee
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            fair: false,
            timeout: Some(timeout),
        }
    }

    /// Arrival-order admission with a bounded wait
    pub fn fair_with_timeout(timeout: Duration) -> Self {
        Self {
            fair: true,
            timeout: Some(timeout),
        }
    }
}

/// A withdraw that gave up waiting and was deferred
#[derive(Debug, Clone, PartialEq)]
pub struct MissedAttempt {
    /// Account the withdraw targeted
    pub account: AccountId,
    /// Requested amount
    pub amount: Decimal,
    /// How long the caller waited before giving up
    pub waited: Duration,
}

/// Missed attempts kept when no capacity is configured
pub const DEFAULT_MISSED_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct GateState {
    next_ticket: u64,
    serving: u64,
    abandoned: BTreeSet<u64>,
}

impl GateState {
    fn advance(&mut self) {
        self.serving += 1;
        while self.abandoned.remove(&self.serving) {
            self.serving += 1;
        }
    }
}

/// FIFO admission for one account
#[derive(Debug, Default)]
struct TicketGate {
    state: Mutex<GateState>,
    turn: Condvar,
}

impl TicketGate {
    fn enter(
        &self,
        deadline: &Deadline,
        cancel: &CancellationToken,
        poll: Duration,
    ) -> Result<GateTurn<'_>, WaitError> {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while state.serving != ticket {
            if cancel.is_cancelled() {
                state.abandoned.insert(ticket);
                return Err(WaitError::Interrupted);
            }
            let Some(slice) = deadline.slice(poll) else {
                state.abandoned.insert(ticket);
                return Err(WaitError::TimedOut);
            };
            self.turn.wait_for(&mut state, slice);
        }

        Ok(GateTurn { gate: self })
    }

    fn leave(&self) {
        self.state.lock().advance();
        self.turn.notify_all();
    }
}

/// Head-of-queue position, handed to the next ticket on drop
struct GateTurn<'a> {
    gate: &'a TicketGate,
}

impl Drop for GateTurn<'_> {
    fn drop(&mut self) {
        self.gate.leave();
    }
}

/// Withdraw with fair admission and/or a bounded wait
#[derive(Debug)]
pub struct FairOrTimeoutWithdraw {
    policy: WithdrawPolicy,
    poll_interval: Duration,
    gates: DashMap<AccountId, Arc<TicketGate>>,
    missed: Mutex<VecDeque<MissedAttempt>>,
    missed_capacity: usize,
}

impl FairOrTimeoutWithdraw {
    /// Create a withdraw component with the given policy
    pub fn new(policy: WithdrawPolicy, config: &LockConfig) -> Self {
        Self {
            policy,
            poll_interval: config.poll_interval(),
            gates: DashMap::new(),
            missed: Mutex::new(VecDeque::new()),
            missed_capacity: DEFAULT_MISSED_CAPACITY,
        }
    }

    /// Create a withdraw component from the `withdraw` and `lock` sections
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.withdraw.policy(), &config.lock)
            .with_missed_capacity(config.withdraw.missed_capacity)
    }

    /// Keep at most `capacity` missed attempts, dropping the oldest first
    pub fn with_missed_capacity(mut self, capacity: usize) -> Self {
        self.missed_capacity = capacity;
        self
    }

    /// The active policy
    pub fn policy(&self) -> WithdrawPolicy {
        self.policy
    }

    /// Withdraw funds under the configured policy, without cancellation
    ///
    /// # Returns
    ///
    /// * `Outcome::Success` / `Outcome::InsufficientFunds` - the lock was acquired
    /// * `Outcome::Deferred` - the timeout expired and the fallback ran
    ///
    /// # Errors
    ///
    /// Returns `NegativeAmount` for `amount < 0`.
    pub fn withdraw(&self, account: &Account, amount: Decimal) -> Result<Outcome, LedgerError> {
        self.withdraw_interruptibly(account, amount, &CancellationToken::new())
    }

    /// Recent withdraw attempts that gave up waiting, oldest first
    pub fn missed_attempts(&self) -> Vec<MissedAttempt> {
        self.missed.lock().iter().cloned().collect()
    }

    /// Remove and return the recorded missed attempts, oldest first
    pub fn drain_missed_attempts(&self) -> Vec<MissedAttempt> {
        self.missed.lock().drain(..).collect()
    }

    fn gate_for(&self, account: AccountId) -> Arc<TicketGate> {
        self.gates.entry(account).or_default().clone()
    }

    fn fallback(&self, account: &Account, amount: Decimal, started: Instant) -> Outcome {
        let waited = started.elapsed();
        tracing::warn!(
            account = account.id(),
            name = account.name(),
            %amount,
            waited_ms = waited.as_millis() as u64,
            "could not acquire account lock in time, deferring withdraw"
        );
        if self.missed_capacity > 0 {
            let mut missed = self.missed.lock();
            if missed.len() >= self.missed_capacity {
                missed.pop_front();
            }
            missed.push_back(MissedAttempt {
                account: account.id(),
                amount,
                waited,
            });
        }
        Outcome::Deferred
    }
}

impl Withdraw for FairOrTimeoutWithdraw {
    fn withdraw_interruptibly(
        &self,
        account: &Account,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<Outcome, LedgerError> {
        ensure_non_negative(amount, "withdraw")?;

        let started = Instant::now();
        let deadline = Deadline::after(self.policy.timeout);

        let gate = self.policy.fair.then(|| self.gate_for(account.id()));
        let _turn = match gate.as_deref() {
            Some(gate) => match gate.enter(&deadline, cancel, self.poll_interval) {
                Ok(turn) => Some(turn),
                Err(WaitError::TimedOut) => return Ok(self.fallback(account, amount, started)),
                Err(WaitError::Interrupted) => return Ok(Outcome::Interrupted),
            },
            None => None,
        };

        let lock = account.lock_handle();
        let mut balance = match acquire(lock, &deadline, cancel, self.poll_interval) {
            Ok(guard) => guard,
            Err(WaitError::TimedOut) => return Ok(self.fallback(account, amount, started)),
            Err(WaitError::Interrupted) => return Ok(Outcome::Interrupted),
        };

        let outcome = apply_withdrawal(&mut balance, amount, account.id());
        if self.policy.fair {
            MutexGuard::unlock_fair(balance);
        }
        outcome
    }
}
