use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use canopy_types::InsertAt;

/// Internal mutable state of the version clock.
struct ClockState {
    /// Last-issued physical millisecond timestamp.
    physical_ms: u64,
    /// Logical counter for versions within the same physical millisecond.
    logical: u32,
}

/// Hybrid logical clock issuing block versions.
///
/// Wall-clock milliseconds alone are too coarse to order versions written
/// back to back, so the clock pairs them with a logical counter. Safe for
/// concurrent use across threads via an internal [`Mutex`].
///
/// # Rules
///
/// - **Tick**: `physical = max(wall_clock, state.physical)`. If physical
///   advanced, `logical = 0`; otherwise `logical += 1`. When the counter
///   would leave [`InsertAt::LOGICAL_SPAN`] the tick borrows the next
///   millisecond instead.
/// - **Observe**: a version read back from storage moves the state forward
///   so later ticks sort after it.
/// - **Guarantee**: every tick is strictly greater than every earlier tick
///   and every observed version.
pub struct VersionClock {
    state: Mutex<ClockState>,
}

impl VersionClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                physical_ms: 0,
                logical: 0,
            }),
        }
    }

    /// Issue the next version.
    pub fn tick(&self) -> InsertAt {
        let wall = wall_clock_ms();
        let mut state = self.state.lock().expect("version clock mutex poisoned");

        if wall > state.physical_ms {
            state.physical_ms = wall;
            state.logical = 0;
        } else if state.logical + 1 < InsertAt::LOGICAL_SPAN {
            state.logical += 1;
        } else {
            // Counter exhausted for this millisecond.
            state.physical_ms += 1;
            state.logical = 0;
        }

        InsertAt::new(state.physical_ms, state.logical)
    }

    /// Move the clock past a version that was issued elsewhere.
    pub fn observe(&self, seen: InsertAt) {
        let mut state = self.state.lock().expect("version clock mutex poisoned");
        let current = InsertAt::new(state.physical_ms, state.logical);
        if seen > current {
            state.physical_ms = seen.physical_ms();
            state.logical = seen.logical();
        }
    }
}

impl Default for VersionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub(crate) fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Current wall-clock time as the signed millisecond value stored in
/// timestamp columns.
pub fn now_ms() -> i64 {
    wall_clock_ms() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FAR_FUTURE_MS: u64 = 1 << 50;

    #[test]
    fn monotonic_across_rapid_calls() {
        let clock = VersionClock::new();
        let mut prev = clock.tick();
        for _ in 0..5000 {
            let next = clock.tick();
            assert!(next > prev, "clock must be strictly monotonic: {prev:?} >= {next:?}");
            prev = next;
        }
    }

    #[test]
    fn logical_increments_within_same_physical() {
        let clock = VersionClock::new();
        {
            let mut state = clock.state.lock().unwrap();
            state.physical_ms = FAR_FUTURE_MS;
            state.logical = 0;
        }
        let t1 = clock.tick();
        let t2 = clock.tick();

        assert_eq!(t1.physical_ms(), FAR_FUTURE_MS);
        assert_eq!(t1.logical(), 1);
        assert_eq!(t2.logical(), 2);
    }

    #[test]
    fn exhausted_counter_borrows_next_millisecond() {
        let clock = VersionClock::new();
        {
            let mut state = clock.state.lock().unwrap();
            state.physical_ms = FAR_FUTURE_MS;
            state.logical = InsertAt::LOGICAL_SPAN - 1;
        }
        let t = clock.tick();
        assert_eq!(t.physical_ms(), FAR_FUTURE_MS + 1);
        assert_eq!(t.logical(), 0);
    }

    #[test]
    fn observe_moves_clock_forward() {
        let clock = VersionClock::new();
        let seen = InsertAt::new(FAR_FUTURE_MS, 7);
        clock.observe(seen);
        let next = clock.tick();
        assert!(next > seen, "tick after observe must sort later: {next:?} vs {seen:?}");
        assert_eq!(next, InsertAt::new(FAR_FUTURE_MS, 8));
    }

    #[test]
    fn observe_ignores_older_versions() {
        let clock = VersionClock::new();
        let first = clock.tick();
        clock.observe(InsertAt::new(1, 0));
        assert!(clock.tick() > first);
    }

    #[test]
    fn concurrent_ticks_are_unique() {
        use std::sync::Arc;
        use std::thread;

        let clock = Arc::new(VersionClock::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let clock = Arc::clone(&clock);
            handles.push(thread::spawn(move || {
                (0..200).map(|_| clock.tick()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<InsertAt> = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }

        let len = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), len, "all versions must be unique across threads");
    }

    proptest! {
        #[test]
        fn tick_after_any_observed_version_is_later(physical in 0u64..FAR_FUTURE_MS, logical in 0u32..InsertAt::LOGICAL_SPAN) {
            let clock = VersionClock::new();
            let seen = InsertAt::new(physical, logical);
            clock.observe(seen);
            prop_assert!(clock.tick() > seen);
        }
    }
}
