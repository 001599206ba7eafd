//! Human-readable durations for crossing gaps and trip lengths
//!
//! Gaps between crossings are mostly seconds to minutes; trip lengths reach
//! hours; residual-pool gaps between a vehicle's separate trips can span days.

use chrono::Duration;

/// Format selection thresholds (seconds)
const SHORT_FORMAT_MAX: i64 = 100; // < 100s → X.XXs
const MEDIUM_FORMAT_MAX: i64 = 6000; // < 100m → M:SS
const LONG_FORMAT_MAX: i64 = 90000; // < 25h → H:MM:SS
                                    // >= 25h → X.XXd

/// Format whole seconds with a layout chosen by magnitude
///
/// # Examples
///
/// ```
/// use tollscope_common::human_time::format_seconds;
///
/// assert_eq!(format_seconds(45), "45.00s");
/// assert_eq!(format_seconds(330), "5:30");
/// assert_eq!(format_seconds(3661), "1:01:01");
/// assert_eq!(format_seconds(604800), "7d");
/// ```
pub fn format_seconds(seconds: i64) -> String {
    let is_negative = seconds < 0;
    let abs_seconds = seconds.abs();

    let formatted = if abs_seconds < SHORT_FORMAT_MAX {
        format!("{:.2}s", abs_seconds as f64)
    } else if abs_seconds < MEDIUM_FORMAT_MAX {
        format!("{}:{:02}", abs_seconds / 60, abs_seconds % 60)
    } else if abs_seconds < LONG_FORMAT_MAX {
        let hours = abs_seconds / 3600;
        let mins = (abs_seconds % 3600) / 60;
        let secs = abs_seconds % 60;
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        let days = abs_seconds as f64 / 86400.0;
        let rounded = (days * 100.0).round() / 100.0;
        if (rounded - rounded.floor()).abs() < 0.001 {
            format!("{:.0}d", rounded)
        } else if (rounded * 10.0 - (rounded * 10.0).floor()).abs() < 0.001 {
            format!("{:.1}d", rounded)
        } else {
            format!("{:.2}d", rounded)
        }
    };

    if is_negative {
        format!("-{}", formatted)
    } else {
        formatted
    }
}

/// Format a chrono duration, truncated to whole seconds
pub fn format_duration(duration: Duration) -> String {
    format_seconds(duration.num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_format() {
        assert_eq!(format_seconds(0), "0.00s");
        assert_eq!(format_seconds(99), "99.00s");
    }

    #[test]
    fn test_medium_format() {
        assert_eq!(format_seconds(100), "1:40");
        assert_eq!(format_seconds(1800), "30:00");
        assert_eq!(format_seconds(5999), "99:59");
    }

    #[test]
    fn test_long_format() {
        assert_eq!(format_seconds(6000), "1:40:00");
        assert_eq!(format_seconds(89999), "24:59:59");
    }

    #[test]
    fn test_days_format() {
        assert_eq!(format_seconds(90000), "1.04d");
        assert_eq!(format_seconds(604800), "7d");
        assert_eq!(format_seconds(613786), "7.1d");
    }

    #[test]
    fn test_negative_values() {
        assert_eq!(format_seconds(-5), "-5.00s");
        assert_eq!(format_seconds(-7200), "-2:00:00");
    }

    #[test]
    fn test_format_duration_truncates() {
        assert_eq!(format_duration(Duration::milliseconds(45_900)), "45.00s");
        assert_eq!(format_duration(Duration::minutes(31)), "31:00");
    }
}
