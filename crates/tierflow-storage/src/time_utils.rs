use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Get current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Millisecond clock that never hands out the same value twice.
///
/// Record keys embed the timestamp, so two writes inside one millisecond
/// must still get distinct keys.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wall-clock millis, bumped past the previous reading when needed.
    pub fn next_ms(&self) -> i64 {
        let now = now_ms();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_is_strictly_increasing() {
        let clock = MonotonicClock::new();
        let mut previous = clock.next_ms();
        for _ in 0..1_000 {
            let next = clock.next_ms();
            assert!(next > previous);
            previous = next;
        }
    }
}
