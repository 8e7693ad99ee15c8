use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Local, NaiveDateTime, TimeDelta};

/// Source of the current local wall-clock time
pub trait Clock: Send + Sync + 'static {
    /// Current local time
    fn now(&self) -> NaiveDateTime;
}

/// The system clock, in the local time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to
///
/// Clones share the same time, so a test can keep one and hand the other to
/// a [`SchedulerEngine`](super::SchedulerEngine).
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    /// Creates a clock stopped at `now`
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Jumps to `now`
    pub fn set(&self, now: NaiveDateTime) {
        *self.lock() = now;
    }

    /// Moves forward by `delta`
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.lock();
        *now += delta;
    }

    fn lock(&self) -> MutexGuard<'_, NaiveDateTime> {
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.lock()
    }
}
