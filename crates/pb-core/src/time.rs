//! Time utilities for pbuild
//!
//! Elapsed-time formatting shared by the dashboard, the plain logger and the
//! final summary.

use std::time::Duration;

/// Format an elapsed duration as `MM:SS`, or `HH:MM:SS` past one hour.
///
/// The duration is rounded to the nearest second first.
///
/// # Examples
/// ```
/// use pb_core::time::format_elapsed;
/// use std::time::Duration;
///
/// assert_eq!(format_elapsed(Duration::from_secs(75)), "01:15");
/// assert_eq!(format_elapsed(Duration::from_secs(3725)), "01:02:05");
/// ```
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = rounded_secs(elapsed);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Whole seconds in `elapsed`, rounded half up
pub fn rounded_secs(elapsed: Duration) -> u64 {
    (elapsed + Duration::from_millis(500)).as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_minutes_and_seconds() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00");
        assert_eq!(format_elapsed(Duration::from_secs(59)), "00:59");
        assert_eq!(format_elapsed(Duration::from_secs(600)), "10:00");
    }

    #[test]
    fn test_format_switches_to_hours() {
        assert_eq!(format_elapsed(Duration::from_secs(3599)), "59:59");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "01:00:00");
    }

    #[test]
    fn test_rounds_to_nearest_second() {
        assert_eq!(format_elapsed(Duration::from_millis(1499)), "00:01");
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "00:02");
        assert_eq!(format_elapsed(Duration::from_millis(3599_600)), "01:00:00");
    }
}
