//! Time utilities for `trunkr`

use crate::types::UnixSeconds;
use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" for trailing-window computations
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in whole Unix seconds
    fn now(&self) -> UnixSeconds;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixSeconds {
        Utc::now().timestamp()
    }
}

/// Clock that only moves when told to
///
/// Cloned handles share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `now`
    #[must_use]
    pub fn new(now: UnixSeconds) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, now: UnixSeconds) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by `seconds`
    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UnixSeconds {
        self.now.load(Ordering::SeqCst)
    }
}

/// Format Unix seconds as local wall-clock time (`HH:MM:SS`)
#[must_use]
pub fn format_clock_time(timestamp: UnixSeconds) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0).map_or_else(
        || timestamp.to_string(),
        |dt| dt.with_timezone(&Local).format("%H:%M:%S").to_string(),
    )
}

/// Format an elapsed number of seconds as `MM:SS`, or `H:MM:SS` past an hour
#[must_use]
pub fn format_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(1000);
        let handle = clock.clone();

        handle.advance(5);
        assert_eq!(clock.now(), 1005);

        clock.set(2000);
        assert_eq!(handle.now(), 2000);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now() > 1_577_836_800);
    }

    #[rstest]
    #[case(0, "00:00")]
    #[case(5, "00:05")]
    #[case(65, "01:05")]
    #[case(3600, "1:00:00")]
    #[case(3725, "1:02:05")]
    #[case(-3, "00:00")]
    fn test_format_elapsed(#[case] seconds: i64, #[case] expected: &str) {
        assert_eq!(format_elapsed(seconds), expected);
    }

    #[test]
    fn test_format_clock_time_shape() {
        let formatted = format_clock_time(1_700_000_000);
        assert_eq!(formatted.len(), 8);
        assert_eq!(formatted.matches(':').count(), 2);
    }
}
