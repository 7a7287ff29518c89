//! Serialized-owner transfer strategy
//!
//! One worker thread owns the execution of every transfer body. Callers
//! submit a job over a channel and block for the reply, so at most one
//! transfer from this strategy is ever in flight. Concurrency is traded for a
//! guarantee that two of its transfers can never wait on each other.
//!
//! The worker still takes the two account locks in ID order, so it stays
//! deadlock-free next to other strategies working on the same accounts.
//!
//! # Cancellation
//!
//! Each job carries a claim flag that the caller and the worker race to
//! flip. If the caller abandons the job first, the worker skips it and it
//! never runs. If the worker claims it first, the worker watches the caller's
//! token while it waits for the account locks and gives the job up with
//! `Interrupted` if the token fires before both are held. Once both locks
//! are held the commit runs to completion and the caller gets its result.

use super::{validate, TransferReport, TransferState, TransferStrategy};
use crate::config::LockConfig;
use crate::core::balance::apply_transfer;
use crate::core::interrupt::{acquire, Deadline};
use crate::types::{Account, LedgerError, Outcome};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const ABANDONED: u8 = 2;

type Reply = Result<TransferReport, LedgerError>;

struct Job {
    from: Arc<Account>,
    to: Arc<Account>,
    amount: Decimal,
    claim: Arc<AtomicU8>,
    cancel: CancellationToken,
    reply: Sender<Reply>,
}

/// Run every transfer on a single dedicated worker thread
#[derive(Debug)]
pub struct SerializedTransfer {
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    poll_interval: Duration,
}

impl SerializedTransfer {
    /// Spawn the worker thread
    ///
    /// # Errors
    ///
    /// Returns `IoError` if the thread cannot be spawned.
    pub fn new(config: &LockConfig) -> Result<Self, LedgerError> {
        let (jobs, queue) = crossbeam_channel::unbounded();
        let poll_interval = config.poll_interval();
        let worker = thread::Builder::new()
            .name("serialized-transfer".to_string())
            .spawn(move || run_worker(queue, poll_interval))?;

        Ok(Self {
            jobs: Some(jobs),
            worker: Some(worker),
            poll_interval,
        })
    }

    /// Stop accepting jobs and wait for the worker to drain the queue
    pub fn shutdown(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("serialized transfer worker panicked");
            }
        }
    }
}

impl Drop for SerializedTransfer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(queue: Receiver<Job>, poll: Duration) {
    tracing::debug!("serialized transfer worker started");
    for job in queue {
        if job
            .claim
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(
                from = job.from.id(),
                to = job.to.id(),
                amount = %job.amount,
                "skipping abandoned transfer"
            );
            continue;
        }

        let reply = execute(&job, poll);
        // The caller stops listening only after abandoning, which cannot
        // happen once the job is claimed.
        let _ = job.reply.send(reply);
    }
    tracing::debug!("serialized transfer worker stopped");
}

fn execute(job: &Job, poll: Duration) -> Reply {
    let from_first = job.from.id() < job.to.id();
    let (first, second) = if from_first {
        (&job.from, &job.to)
    } else {
        (&job.to, &job.from)
    };

    let deadline = Deadline::never();
    let mut first_balance = match acquire(first.lock_handle(), &deadline, &job.cancel, poll) {
        Ok(guard) => guard,
        Err(err) => {
            tracing::debug!(
                from = job.from.id(),
                to = job.to.id(),
                "claimed transfer interrupted"
            );
            return Ok(TransferReport::new(err.into(), TransferState::Idle));
        }
    };
    let mut second_balance = match acquire(second.lock_handle(), &deadline, &job.cancel, poll) {
        Ok(guard) => guard,
        Err(err) => {
            tracing::debug!(
                from = job.from.id(),
                to = job.to.id(),
                "claimed transfer interrupted"
            );
            return Ok(TransferReport::new(err.into(), TransferState::FirstLockAcquired));
        }
    };
    let (from_balance, to_balance) = if from_first {
        (&mut *first_balance, &mut *second_balance)
    } else {
        (&mut *second_balance, &mut *first_balance)
    };

    let outcome = apply_transfer(
        (from_balance, job.from.id()),
        (to_balance, job.to.id()),
        job.amount,
    )?;
    Ok(TransferReport::settled(outcome))
}

impl TransferStrategy for SerializedTransfer {
    fn transfer(
        &self,
        from: &Arc<Account>,
        to: &Arc<Account>,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, LedgerError> {
        validate(from, to, amount)?;
        if cancel.is_cancelled() {
            return Ok(TransferReport::new(Outcome::Interrupted, TransferState::Idle));
        }

        let claim = Arc::new(AtomicU8::new(PENDING));
        let (reply, replies) = crossbeam_channel::bounded(1);
        let job = Job {
            from: Arc::clone(from),
            to: Arc::clone(to),
            amount,
            claim: Arc::clone(&claim),
            cancel: cancel.clone(),
            reply,
        };

        let jobs = self.jobs.as_ref().ok_or(LedgerError::ExecutorStopped)?;
        jobs.send(job).map_err(|_| LedgerError::ExecutorStopped)?;

        loop {
            if cancel.is_cancelled()
                && claim
                    .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                tracing::debug!(from = from.id(), to = to.id(), "transfer abandoned before it ran");
                return Ok(TransferReport::new(Outcome::Interrupted, TransferState::Idle));
            }

            match replies.recv_timeout(self.poll_interval) {
                Ok(reply) => return reply,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(LedgerError::ExecutorStopped),
            }
        }
    }

    fn name(&self) -> &'static str {
        "serialized-owner"
    }
}
