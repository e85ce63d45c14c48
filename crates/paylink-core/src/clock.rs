//! Millisecond clocks for signed-call timestamps

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the millisecond timestamp embedded in signed calls
pub trait Clock: Send + Sync + Debug {
    fn now_ms(&self) -> i64;
}

/// Wall clock that never returns the same value twice
///
/// Two calls signed through the same clock always carry distinct
/// timestamps, even within one millisecond or across a backwards step of the
/// system clock.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        let wall = chrono::Utc::now().timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wall.max(last + 1))
            })
            .unwrap_or(wall);
        wall.max(previous + 1)
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_strictly_increases() {
        let clock = SystemClock::new();
        let mut previous = clock.now_ms();
        for _ in 0..1000 {
            let next = clock.now_ms();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(42);
        assert_eq!(clock.now_ms(), 42);
    }
}
