//! Optimistic concurrency cells
//!
//! An [`OptimisticCell`] holds a payload together with a stamp. Writers
//! present the stamp they read; the update commits only if the stamp is
//! still current, otherwise it reports `Conflict` and the caller decides
//! whether to re-read and retry. The commit is a single atomic pointer
//! compare-and-swap, so no lock is held at any point.
//!
//! Two stamp kinds are provided:
//!
//! - [`Version`]: a counter incremented exactly once per successful update
//! - [`WallClock`]: milliseconds since the Unix epoch, never decreasing. Two
//!   updates within the same millisecond share a stamp, so a stale writer
//!   holding that stamp is not detected. This coarser granularity is the
//!   price of using a clock instead of a counter.

use crate::types::Outcome;
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Entity identifier
pub type EntityId = u64;

/// Marker compared on every optimistic update
pub trait Stamp: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Stamp of a freshly created entity
    fn initial() -> Self;

    /// Stamp to install after a successful update from `self`
    fn advance(self) -> Self;
}

/// Monotonic update counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u64);

impl Stamp for Version {
    fn initial() -> Self {
        Version(0)
    }

    fn advance(self) -> Self {
        Version(self.0 + 1)
    }
}

/// Wall-clock milliseconds, never moving backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WallClock(pub u64);

impl WallClock {
    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl Stamp for WallClock {
    fn initial() -> Self {
        WallClock(Self::now())
    }

    fn advance(self) -> Self {
        WallClock(Self::now().max(self.0))
    }
}

/// Payload with the stamp it was committed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamped<T, S> {
    /// Stamp current writers must present
    pub stamp: S,
    /// The committed payload
    pub payload: T,
}

/// Entity updated by optimistic compare-and-swap
pub struct OptimisticCell<T, S: Stamp> {
    id: EntityId,
    current: ArcSwap<Stamped<T, S>>,
}

/// Entity guarded by a version counter
pub type VersionedEntity<T> = OptimisticCell<T, Version>;

/// Entity guarded by a wall-clock timestamp
pub type TimestampedEntity<T> = OptimisticCell<T, WallClock>;

impl<T, S: Stamp> OptimisticCell<T, S> {
    /// Create an entity with the initial stamp
    pub fn new(id: EntityId, payload: T) -> Self {
        Self {
            id,
            current: ArcSwap::from_pointee(Stamped {
                stamp: S::initial(),
                payload,
            }),
        }
    }

    /// The entity ID
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Current payload and stamp
    pub fn read(&self) -> Arc<Stamped<T, S>> {
        self.current.load_full()
    }

    /// Current stamp
    pub fn stamp(&self) -> S {
        self.current.load().stamp
    }

    /// Commit `payload` if the current stamp is still `expected`
    ///
    /// # Returns
    ///
    /// * `Outcome::Success` - the payload was installed and the stamp advanced
    /// * `Outcome::Conflict` - another update committed since `expected` was read
    pub fn update(&self, expected: S, payload: T) -> Outcome {
        let next = Arc::new(Stamped {
            stamp: expected.advance(),
            payload,
        });
        self.commit(expected, next)
    }

    /// Re-read and retry until an update built by `f` commits
    ///
    /// Returns the stamp the final update was committed under.
    pub fn update_with_retry<F>(&self, mut f: F) -> S
    where
        F: FnMut(&T) -> T,
    {
        loop {
            let snapshot = self.read();
            let stamp = snapshot.stamp.advance();
            let next = Arc::new(Stamped {
                stamp,
                payload: f(&snapshot.payload),
            });
            if self.commit(snapshot.stamp, next).is_success() {
                return stamp;
            }
        }
    }

    fn commit(&self, expected: S, next: Arc<Stamped<T, S>>) -> Outcome {
        let mut current = self.current.load_full();
        loop {
            if current.stamp != expected {
                tracing::trace!(
                    entity = self.id,
                    ?expected,
                    actual = ?current.stamp,
                    "optimistic conflict"
                );
                return Outcome::Conflict;
            }

            let previous = self.current.compare_and_swap(&current, Arc::clone(&next));
            if Arc::ptr_eq(&*previous, &current) {
                return Outcome::Success;
            }
            current = Arc::clone(&*previous);
        }
    }
}

impl<T: fmt::Debug, S: Stamp> fmt::Debug for OptimisticCell<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticCell")
            .field("id", &self.id)
            .field("current", &*self.current.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_versioned_update_advances_by_one() {
        let entity = VersionedEntity::new(1, "initial".to_string());
        assert_eq!(entity.stamp(), Version(0));

        assert_eq!(entity.update(Version(0), "first".to_string()), Outcome::Success);
        let snapshot = entity.read();
        assert_eq!(snapshot.stamp, Version(1));
        assert_eq!(snapshot.payload, "first");
    }

    #[test]
    fn test_stale_version_conflicts() {
        let entity = VersionedEntity::new(1, 10);
        entity.update(Version(0), 11);

        assert_eq!(entity.update(Version(0), 12), Outcome::Conflict);
        assert_eq!(entity.read().payload, 11);
        assert_eq!(entity.stamp(), Version(1));
    }

    #[test]
    fn test_concurrent_updates_from_same_version() {
        for _ in 0..50 {
            let entity = VersionedEntity::new(7, 0u32);
            let barrier = Barrier::new(2);

            let outcomes: Vec<Outcome> = thread::scope(|scope| {
                let handles: Vec<_> = (1..=2u32)
                    .map(|writer| {
                        let entity = &entity;
                        let barrier = &barrier;
                        scope.spawn(move || {
                            let expected = entity.stamp();
                            barrier.wait();
                            entity.update(expected, writer)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(outcomes.iter().filter(|o| **o == Outcome::Success).count(), 1);
            assert_eq!(outcomes.iter().filter(|o| **o == Outcome::Conflict).count(), 1);
            assert_eq!(entity.stamp(), Version(1));
        }
    }

    #[test]
    fn test_update_with_retry_under_contention() {
        let entity = VersionedEntity::new(3, 0u64);

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..250 {
                        entity.update_with_retry(|value| value + 1);
                    }
                });
            }
        });

        let snapshot = entity.read();
        assert_eq!(snapshot.payload, 1_000);
        assert_eq!(snapshot.stamp, Version(1_000));
    }

    #[test]
    fn test_timestamped_update_checks_stamp() {
        let entity = TimestampedEntity::new(9, "draft");
        let stamp = entity.stamp();

        assert_eq!(entity.update(stamp, "published"), Outcome::Success);
        assert!(entity.stamp() >= stamp);

        let stale = WallClock(stamp.0.saturating_sub(1));
        assert_eq!(entity.update(stale, "overwritten"), Outcome::Conflict);
        assert_eq!(entity.read().payload, "published");
    }
}
