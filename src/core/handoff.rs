//! Bounded hand-off queues
//!
//! Producer/consumer buffers with a fixed capacity. Producers block while the
//! buffer is full, consumers block while it is empty, and each side wakes the
//! other after changing the count.
//!
//! Two implementations share the [`HandoffQueue`] contract:
//!
//! - [`BoundedHandoffQueue`] is a monitor: one mutex around a `VecDeque` and
//!   two condition variables, one per wait condition.
//! - [`ChannelHandoffQueue`] delegates to a bounded crossbeam channel.

use super::interrupt::Deadline;
use super::traits::HandoffQueue;
use crate::config::{LedgerConfig, LockConfig, QueueKind};
use crate::types::{Interrupted, LedgerError};
use crossbeam_channel::{
    Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError, TrySendError,
};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Monitor-based bounded FIFO buffer
#[derive(Debug)]
pub struct BoundedHandoffQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
    poll_interval: Duration,
}

impl<T> BoundedHandoffQueue<T> {
    /// Create a queue holding at most `capacity` items
    ///
    /// # Errors
    ///
    /// Returns `ZeroCapacity` for `capacity == 0`.
    pub fn new(capacity: usize, config: &LockConfig) -> Result<Self, LedgerError> {
        if capacity == 0 {
            return Err(LedgerError::ZeroCapacity);
        }

        Ok(Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
            poll_interval: config.poll_interval(),
        })
    }
}

impl<T: Send> HandoffQueue<T> for BoundedHandoffQueue<T> {
    fn put(&self, item: T, cancel: &CancellationToken) -> Result<(), Interrupted<T>> {
        if cancel.is_cancelled() {
            return Err(Interrupted(item));
        }

        let mut items = self.items.lock();
        while items.len() >= self.capacity {
            if cancel.is_cancelled() {
                tracing::debug!(capacity = self.capacity, "put interrupted while full");
                return Err(Interrupted(item));
            }
            self.not_full.wait_for(&mut items, self.poll_interval);
        }

        items.push_back(item);
        tracing::trace!(len = items.len(), "put");
        self.not_empty.notify_all();
        Ok(())
    }

    fn take(&self, cancel: &CancellationToken) -> Result<T, Interrupted> {
        if cancel.is_cancelled() {
            return Err(Interrupted(()));
        }

        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                tracing::trace!(len = items.len(), "take");
                self.not_full.notify_all();
                return Ok(item);
            }
            if cancel.is_cancelled() {
                tracing::debug!("take interrupted while empty");
                return Err(Interrupted(()));
            }
            self.not_empty.wait_for(&mut items, self.poll_interval);
        }
    }

    fn try_put(&self, item: T) -> Result<(), T> {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return Err(item);
        }
        items.push_back(item);
        self.not_empty.notify_all();
        Ok(())
    }

    fn try_take(&self) -> Option<T> {
        let mut items = self.items.lock();
        let item = items.pop_front()?;
        self.not_full.notify_all();
        Some(item)
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Bounded FIFO buffer over a crossbeam channel
#[derive(Debug)]
pub struct ChannelHandoffQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: usize,
    poll_interval: Duration,
}

impl<T> ChannelHandoffQueue<T> {
    /// Create a queue holding at most `capacity` items
    ///
    /// # Errors
    ///
    /// Returns `ZeroCapacity` for `capacity == 0`. A zero-capacity crossbeam
    /// channel is a rendezvous channel, which buffers nothing.
    pub fn new(capacity: usize, config: &LockConfig) -> Result<Self, LedgerError> {
        if capacity == 0 {
            return Err(LedgerError::ZeroCapacity);
        }

        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Ok(Self {
            sender,
            receiver,
            capacity,
            poll_interval: config.poll_interval(),
        })
    }
}

// The queue owns both ends, so neither side can ever observe a disconnect.
impl<T: Send> HandoffQueue<T> for ChannelHandoffQueue<T> {
    fn put(&self, mut item: T, cancel: &CancellationToken) -> Result<(), Interrupted<T>> {
        loop {
            if cancel.is_cancelled() {
                return Err(Interrupted(item));
            }
            match self.sender.send_timeout(item, self.poll_interval) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back))
                | Err(SendTimeoutError::Disconnected(back)) => item = back,
            }
        }
    }

    fn take(&self, cancel: &CancellationToken) -> Result<T, Interrupted> {
        loop {
            if cancel.is_cancelled() {
                return Err(Interrupted(()));
            }
            match self.receiver.recv_timeout(self.poll_interval) {
                Ok(item) => return Ok(item),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
            }
        }
    }

    fn try_put(&self, item: T) -> Result<(), T> {
        self.sender.try_send(item).map_err(|err| match err {
            TrySendError::Full(item) | TrySendError::Disconnected(item) => item,
        })
    }

    fn try_take(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn len(&self) -> usize {
        self.receiver.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Take with a bounded wait, for callers that poll a queue between other work
///
/// Returns `Ok(None)` when `timeout` passes with the queue still empty.
///
/// # Errors
///
/// Returns `Interrupted` if `cancel` fires first.
pub fn take_within<T>(
    queue: &dyn HandoffQueue<T>,
    timeout: Duration,
    cancel: &CancellationToken,
    poll: Duration,
) -> Result<Option<T>, Interrupted> {
    let deadline = Deadline::after(Some(timeout));
    loop {
        if cancel.is_cancelled() {
            return Err(Interrupted(()));
        }
        if let Some(item) = queue.try_take() {
            return Ok(Some(item));
        }
        match deadline.slice(poll) {
            Some(slice) => std::thread::sleep(slice),
            None => return Ok(None),
        }
    }
}

/// Create the queue implementation selected by configuration
///
/// # Errors
///
/// Returns `ZeroCapacity` if the configured capacity is zero.
pub fn create_queue<T: Send + 'static>(
    config: &LedgerConfig,
) -> Result<Box<dyn HandoffQueue<T>>, LedgerError> {
    let capacity = config.queue.capacity;
    match config.queue.kind {
        QueueKind::Monitor => Ok(Box::new(BoundedHandoffQueue::new(capacity, &config.lock)?)),
        QueueKind::Channel => Ok(Box::new(ChannelHandoffQueue::new(capacity, &config.lock)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::thread;

    fn lock_config() -> LockConfig {
        LockConfig {
            poll_interval_ms: 2,
            ..LockConfig::default()
        }
    }

    fn queue(kind: QueueKind, capacity: usize) -> Box<dyn HandoffQueue<u32>> {
        let mut config = LedgerConfig::default();
        config.lock = lock_config();
        config.queue.kind = kind;
        config.queue.capacity = capacity;
        create_queue(&config).unwrap()
    }

    #[rstest]
    #[case::monitor(QueueKind::Monitor)]
    #[case::channel(QueueKind::Channel)]
    fn test_zero_capacity_rejected(#[case] kind: QueueKind) {
        let mut config = LedgerConfig::default();
        config.queue.kind = kind;
        config.queue.capacity = 0;
        assert!(matches!(
            create_queue::<u32>(&config),
            Err(LedgerError::ZeroCapacity)
        ));
    }

    #[rstest]
    #[case::monitor(QueueKind::Monitor)]
    #[case::channel(QueueKind::Channel)]
    fn test_try_put_respects_capacity(#[case] kind: QueueKind) {
        let queue = queue(kind, 2);
        assert_eq!(queue.try_put(1), Ok(()));
        assert_eq!(queue.try_put(2), Ok(()));
        assert_eq!(queue.try_put(3), Err(3));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.capacity(), 2);

        assert_eq!(queue.try_take(), Some(1));
        assert_eq!(queue.try_take(), Some(2));
        assert_eq!(queue.try_take(), None);
        assert!(queue.is_empty());
    }

    #[rstest]
    #[case::monitor(QueueKind::Monitor)]
    #[case::channel(QueueKind::Channel)]
    fn test_single_producer_order_preserved(#[case] kind: QueueKind) {
        let queue = queue(kind, 3);
        let cancel = CancellationToken::new();

        let taken: Vec<u32> = thread::scope(|scope| {
            scope.spawn(|| {
                for item in 0..100 {
                    queue.put(item, &cancel).unwrap();
                    assert!(queue.len() <= 3);
                }
            });
            (0..100).map(|_| queue.take(&cancel).unwrap()).collect()
        });

        assert_eq!(taken, (0..100).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[rstest]
    #[case::monitor(QueueKind::Monitor)]
    #[case::channel(QueueKind::Channel)]
    fn test_put_on_full_queue_interrupted_returns_item(#[case] kind: QueueKind) {
        let queue = queue(kind, 1);
        let cancel = CancellationToken::new();
        queue.try_put(7).unwrap();

        let result = thread::scope(|scope| {
            let handle = scope.spawn(|| queue.put(8, &cancel));
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
            handle.join().unwrap()
        });

        assert_eq!(result.map_err(Interrupted::into_inner), Err(8));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.try_take(), Some(7));
    }

    #[rstest]
    #[case::monitor(QueueKind::Monitor)]
    #[case::channel(QueueKind::Channel)]
    fn test_take_with_cancelled_token_returns_at_once(#[case] kind: QueueKind) {
        let queue = queue(kind, 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(queue.take(&cancel).is_err());
        assert!(queue.is_empty());
    }

    #[rstest]
    #[case::monitor(QueueKind::Monitor)]
    #[case::channel(QueueKind::Channel)]
    fn test_take_blocked_on_empty_queue_interrupted(#[case] kind: QueueKind) {
        let queue = queue(kind, 1);
        let cancel = CancellationToken::new();

        let result = thread::scope(|scope| {
            let handle = scope.spawn(|| queue.take(&cancel));
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
            handle.join().unwrap()
        });

        assert!(result.is_err());
        assert!(queue.is_empty());

        let live = CancellationToken::new();
        queue.put(9, &live).unwrap();
        assert_eq!(queue.take(&live), Ok(9));
    }

    #[rstest]
    #[case::monitor(QueueKind::Monitor)]
    #[case::channel(QueueKind::Channel)]
    fn test_blocked_take_woken_by_put(#[case] kind: QueueKind) {
        let queue = queue(kind, 1);
        let cancel = CancellationToken::new();

        let item = thread::scope(|scope| {
            let handle = scope.spawn(|| queue.take(&cancel));
            thread::sleep(Duration::from_millis(20));
            queue.put(42, &cancel).unwrap();
            handle.join().unwrap()
        });

        assert_eq!(item, Ok(42));
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_take_within_times_out_on_empty_queue() {
        let queue = queue(QueueKind::Monitor, 1);
        let cancel = CancellationToken::new();
        let taken = take_within(
            queue.as_ref(),
            Duration::from_millis(10),
            &cancel,
            Duration::from_millis(2),
        )
        .unwrap();
        assert_eq!(taken, None);

        queue.try_put(5).unwrap();
        let taken = take_within(
            queue.as_ref(),
            Duration::from_millis(10),
            &cancel,
            Duration::from_millis(2),
        )
        .unwrap();
        assert_eq!(taken, Some(5));
    }
}
