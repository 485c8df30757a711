//! Signal phase timing arithmetic.
//!
//! SPaT carries phase start/end marks as tenths of a second since the top of
//! the UTC hour, and the message timestamp as minute-of-year plus
//! milliseconds-of-minute. Everything here is relative to "now" within the hour.

use serde::Serialize;

/// TimeMark value meaning "unknown".
pub const UNKNOWN_TIME_MARK: i32 = 36001;

/// Keeps remaining times at an exact threshold from rounding to a negative value.
const EPSILON: f64 = 1e-3;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Derived timing for one phase, in seconds. `start` and `elapsed` are -1
/// when the start mark is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseTiming {
    pub start: f64,
    pub min_end_remaining: f64,
    pub max_end_remaining: f64,
    pub elapsed: f64,
}

/// Seconds since the top of the hour for a SPaT timestamp.
pub fn seconds_into_hour(minute_of_year: u32, ms_of_minute: u16) -> f64 {
    (minute_of_year % 60) as f64 * 60.0 + ms_of_minute as f64 / 1000.0
}

fn remaining(end_tenths: i32, now: f64) -> f64 {
    let end = end_tenths as f64 / 10.0;
    ((end - now) + EPSILON).max(0.0)
}

/// Compute start, remaining, and elapsed seconds for one phase.
pub fn phase_timing(
    minute_of_year: u32,
    ms_of_minute: u16,
    start_time: i32,
    min_end_time: i32,
    max_end_time: i32,
) -> PhaseTiming {
    let now = seconds_into_hour(minute_of_year, ms_of_minute);

    let min_end_remaining = remaining(min_end_time, now);
    let max_end_remaining = remaining(max_end_time, now);

    let (start, elapsed) = if start_time >= 0 && start_time != UNKNOWN_TIME_MARK {
        let mut start = start_time as f64 / 10.0;
        // Started in the previous hour
        if start > now {
            start -= SECONDS_PER_HOUR;
        }
        (start, (now - start).max(0.0))
    } else {
        (-1.0, -1.0)
    };

    PhaseTiming {
        start,
        min_end_remaining,
        max_end_remaining,
        elapsed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_seconds_into_hour() {
        assert!(approx(seconds_into_hour(0, 0), 0.0));
        assert!(approx(seconds_into_hour(61, 0), 60.0));
        assert!(approx(seconds_into_hour(1, 40_000), 100.0));
        assert!(approx(seconds_into_hour(59, 59_999), 3599.999));
    }

    #[test]
    fn test_unknown_start() {
        let t = phase_timing(61, 0, UNKNOWN_TIME_MARK, 0, 0);
        assert_eq!(t.start, -1.0);
        assert_eq!(t.elapsed, -1.0);
    }

    #[test]
    fn test_negative_start_is_unknown() {
        let t = phase_timing(61, 0, -5, 0, 0);
        assert_eq!(t.start, -1.0);
        assert_eq!(t.elapsed, -1.0);
    }

    #[test]
    fn test_min_end_at_now_never_negative() {
        // now = 100s, minEnd = 100.0s
        let t = phase_timing(1, 40_000, 0, 1000, 1000);
        assert!(approx(t.min_end_remaining, 0.001));
        assert!(approx(t.max_end_remaining, 0.001));
    }

    #[test]
    fn test_end_in_past_clamped() {
        let t = phase_timing(1, 40_000, 0, 500, 900);
        assert_eq!(t.min_end_remaining, 0.0);
        assert_eq!(t.max_end_remaining, 0.0);
    }

    #[test]
    fn test_remaining_future() {
        // now = 100s, minEnd = 112.5s, maxEnd = 130s
        let t = phase_timing(1, 40_000, 900, 1125, 1300);
        assert!(approx(t.min_end_remaining, 12.501));
        assert!(approx(t.max_end_remaining, 30.001));
        assert!(approx(t.start, 90.0));
        assert!(approx(t.elapsed, 10.0));
    }

    #[test]
    fn test_start_hour_wraparound() {
        // now = 5s, start = 3595s -> began 10s ago in the previous hour
        let t = phase_timing(0, 5_000, 35_950, 100, 200);
        assert!(approx(t.start, -5.0));
        assert!(approx(t.elapsed, 10.0));
    }

    #[test]
    fn test_minute_of_year_reduced_mod_60() {
        let a = phase_timing(7, 1_000, 300, 600, 900);
        let b = phase_timing(7 + 60 * 24, 1_000, 300, 600, 900);
        assert_eq!(a, b);
    }
}
