//! Deferred expiry actions
//!
//! Memoized wrappers never run their own timers. They hand a one-shot action to a
//! [`Scheduler`], which runs it once the entry's timeout has elapsed. The default
//! [`TokioScheduler`] spawns a sleeping task on the current tokio runtime, while
//! [`ManualScheduler`] drives a virtual clock that tests advance explicitly.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tracing::warn;

/// Furthest the virtual clock reports past its origin; keeps `now()` representable
const MAX_CLOCK_OFFSET: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A one-shot action run by a scheduler
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Runs actions after a delay
///
/// Implementations must never run an action before `now() + delay` has been reached.
pub trait Scheduler: Send + Sync {
    /// Current time on the scheduler's clock
    fn now(&self) -> Instant;

    /// Runs `action` once, after `delay` has elapsed
    ///
    /// Returns false if the action was dropped without being scheduled.
    fn schedule(&self, delay: Duration, action: Action) -> bool;
}

/// Schedules actions as tasks on the ambient tokio runtime
///
/// Time is read from `tokio::time`, so a paused test clock applies to both the expiry
/// deadlines and the spawned timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn schedule(&self, delay: Duration, action: Action) -> bool {
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    action();
                });
                true
            }
            Err(_) => {
                warn!(?delay, "no tokio runtime available, expiry timer not scheduled");
                false
            }
        }
    }
}

struct Pending {
    due: Duration,
    seq: u64,
    action: Action,
}

struct ManualClock {
    origin: Instant,
    elapsed: Duration,
    next_seq: u64,
    pending: Vec<Pending>,
}

/// A scheduler driven by a virtual clock
///
/// Nothing happens until [`ManualScheduler::advance`] moves the clock forward. Every
/// action whose deadline falls at or before the new time then runs, earliest first.
/// Clones share the same clock.
#[derive(Clone)]
pub struct ManualScheduler {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualScheduler {
    /// Creates a scheduler whose clock starts at the current instant
    pub fn new() -> Self {
        Self {
            clock: Arc::new(Mutex::new(ManualClock {
                origin: Instant::now(),
                elapsed: Duration::ZERO,
                next_seq: 0,
                pending: Vec::new(),
            })),
        }
    }

    /// Time elapsed on the virtual clock since creation
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Number of actions that have not fired yet
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Moves the clock forward by `by`, running every action that comes due
    ///
    /// Actions run without the clock locked, with the clock set to their own deadline,
    /// so they may schedule further actions.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().elapsed.saturating_add(by);

        loop {
            let action = {
                let mut clock = self.lock();
                let next = clock
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by_key(|(_, p)| (p.due, p.seq))
                    .map(|(index, _)| index);

                match next {
                    Some(index) => {
                        let pending = clock.pending.swap_remove(index);
                        clock.elapsed = clock.elapsed.max(pending.due);
                        pending.action
                    }
                    None => {
                        clock.elapsed = target;
                        break;
                    }
                }
            };
            action();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.lock();
        f.debug_struct("ManualScheduler")
            .field("elapsed", &clock.elapsed)
            .field("pending", &clock.pending.len())
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        let clock = self.lock();
        clock.origin + clock.elapsed.min(MAX_CLOCK_OFFSET)
    }

    fn schedule(&self, delay: Duration, action: Action) -> bool {
        let mut clock = self.lock();
        let due = clock.elapsed.saturating_add(delay);
        let seq = clock.next_seq;
        clock.next_seq += 1;
        clock.pending.push(Pending { due, seq, action });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Action) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        let make = move || -> Action {
            let handle = Arc::clone(&handle);
            Box::new(move || {
                handle.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, make)
    }

    #[test]
    fn test_manual_scheduler_fires_at_deadline_inclusive() {
        let scheduler = ManualScheduler::new();
        let (count, action) = counter();

        scheduler.schedule(Duration::from_millis(1000), action());

        scheduler.advance(Duration::from_millis(999));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(Duration::from_millis(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_manual_scheduler_runs_actions_in_deadline_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (label, delay) in [("late", 30u64), ("early", 10), ("middle", 20)] {
            let order = Arc::clone(&order);
            scheduler.schedule(
                Duration::from_millis(delay),
                Box::new(move || order.lock().unwrap().push(label)),
            );
        }

        scheduler.advance(Duration::from_millis(100));
        assert_eq!(*order.lock().unwrap(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_manual_scheduler_clock_tracks_advances() {
        let scheduler = ManualScheduler::new();
        let start = scheduler.now();

        scheduler.advance(Duration::from_millis(250));

        assert_eq!(scheduler.elapsed(), Duration::from_millis(250));
        assert_eq!(scheduler.now() - start, Duration::from_millis(250));
    }

    #[test]
    fn test_manual_scheduler_action_can_schedule_more_work() {
        let scheduler = ManualScheduler::new();
        let (count, action) = counter();
        let inner = scheduler.clone();
        let follow_up = action();

        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                inner.schedule(Duration::from_millis(10), follow_up);
            }),
        );

        scheduler.advance(Duration::from_millis(15));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        scheduler.advance(Duration::from_millis(5));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_fires_after_delay() {
        let scheduler = TokioScheduler;
        let (count, action) = counter();

        scheduler.schedule(Duration::from_millis(500), action());

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tokio_scheduler_without_runtime_does_not_panic() {
        let (count, action) = counter();
        assert!(!TokioScheduler.schedule(Duration::ZERO, action()));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_manual_scheduler_saturates_huge_delays() {
        let scheduler = ManualScheduler::new();
        let (count, action) = counter();
        let start = scheduler.now();

        assert!(scheduler.schedule(Duration::MAX, action()));
        scheduler.advance(Duration::from_secs(1));
        scheduler.advance(Duration::MAX);

        assert_eq!(scheduler.elapsed(), Duration::MAX);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(scheduler.now() >= start);
    }
}
