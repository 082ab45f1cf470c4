//! Midnight quiet window
//!
//! Some inverters reset their daily counters at midnight and answer with
//! garbage for a few minutes around it. Polling is suspended from 23:57 until
//! `wake_minutes` past midnight.

use std::time::Duration;

use chrono::{NaiveTime, Timelike};

/// Longest single sleep, so the window is re-checked regularly
pub const MAX_MIDNIGHT_NAP: Duration = Duration::from_secs(30);

const QUIET_FROM_MINUTE: u32 = 57;

/// How long to sleep at `now`, or `None` when outside the quiet window
pub fn midnight_sleep(now: NaiveTime, wake_minutes: u32) -> Option<Duration> {
    let into_day = Duration::from_secs(u64::from(now.num_seconds_from_midnight()))
        + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));

    let remaining = if now.hour() == 23 && now.minute() >= QUIET_FROM_MINUTE {
        Duration::from_secs(24 * 3600).saturating_sub(into_day)
    } else if now.hour() == 0 && now.minute() < wake_minutes {
        Duration::from_secs(u64::from(wake_minutes) * 60).saturating_sub(into_day)
    } else {
        return None;
    };

    Some(remaining.min(MAX_MIDNIGHT_NAP))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_outside_window() {
        assert_eq!(midnight_sleep(at(12, 0, 0), 5), None);
        assert_eq!(midnight_sleep(at(23, 56, 59), 5), None);
        assert_eq!(midnight_sleep(at(0, 5, 0), 5), None);
    }

    #[test]
    fn test_before_midnight() {
        assert_eq!(midnight_sleep(at(23, 57, 0), 5), Some(MAX_MIDNIGHT_NAP));
        assert_eq!(
            midnight_sleep(at(23, 59, 50), 5),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_after_midnight() {
        assert_eq!(midnight_sleep(at(0, 0, 0), 5), Some(MAX_MIDNIGHT_NAP));
        assert_eq!(
            midnight_sleep(at(0, 4, 45), 5),
            Some(Duration::from_secs(15))
        );
        assert_eq!(midnight_sleep(at(0, 0, 10), 0), None);
    }
}
