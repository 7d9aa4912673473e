//! Solve time formatting and parsing
//!
//! All formatting rounds to centiseconds (half up) and prints "DNF" for
//! did-not-finish times. Negative values (an inspection countdown past zero)
//! are printed with a leading minus sign.

use crate::model::SolveTime;

fn split(ms: i64) -> (&'static str, i64, i64, i64) {
    let sign = if ms < 0 { "-" } else { "" };
    let centis = (ms.abs() + 5) / 10;
    (sign, centis / 6000, (centis / 100) % 60, centis % 100)
}

/// Seconds form: `12.34`, `75.23`
pub fn format_seconds(time: impl Into<SolveTime>) -> String {
    match time.into() {
        SolveTime::Dnf => "DNF".to_string(),
        SolveTime::Finished(ms) => {
            let (sign, minutes, seconds, centis) = split(ms);
            format!("{}{}.{:02}", sign, minutes * 60 + seconds, centis)
        }
    }
}

/// Fixed minutes form: `01:15.23`
pub fn format_minutes(time: impl Into<SolveTime>) -> String {
    match time.into() {
        SolveTime::Dnf => "DNF".to_string(),
        SolveTime::Finished(ms) => {
            let (sign, minutes, seconds, centis) = split(ms);
            format!("{}{:02}:{:02}.{:02}", sign, minutes, seconds, centis)
        }
    }
}

/// Compact form: seconds under one minute (after rounding), `m:ss.cc` above
pub fn format_time(time: impl Into<SolveTime>) -> String {
    match time.into() {
        SolveTime::Dnf => "DNF".to_string(),
        SolveTime::Finished(ms) => match split(ms) {
            (sign, 0, seconds, centis) => format!("{}{}.{:02}", sign, seconds, centis),
            (sign, minutes, seconds, centis) => {
                format!("{}{}:{:02}.{:02}", sign, minutes, seconds, centis)
            }
        },
    }
}

/// Parse `ss.cc` or `m:ss.cc` into milliseconds, rounded to the nearest 10
///
/// Returns `None` for malformed input, negative values, and seconds of 60
/// or more in the minute form.
pub fn parse_time(input: &str) -> Option<i64> {
    let input = input.trim();

    let ms = match input.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: i64 = minutes.trim().parse().ok()?;
            let seconds: f64 = seconds.trim().parse().ok()?;
            if minutes < 0 || !(0.0..60.0).contains(&seconds) {
                return None;
            }
            60_000.0 * minutes as f64 + 1000.0 * seconds
        }
        None => {
            let seconds: f64 = input.parse().ok()?;
            if !seconds.is_finite() || seconds < 0.0 {
                return None;
            }
            1000.0 * seconds
        }
    };
    if ms >= (i64::MAX / 2) as f64 {
        return None;
    }

    Some(10 * ((ms as i64 + 5) / 10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(12345), "12.35");
        assert_eq!(format_seconds(75230), "75.23");
        assert_eq!(format_seconds(0), "0.00");
        assert_eq!(format_seconds(-1500), "-1.50");
        assert_eq!(format_seconds(SolveTime::Dnf), "DNF");
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(75230), "01:15.23");
        assert_eq!(format_minutes(9870), "00:09.87");
        assert_eq!(format_minutes(SolveTime::Dnf), "DNF");
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(9870), "9.87");
        assert_eq!(format_time(59994), "59.99");
        assert_eq!(format_time(75230), "1:15.23");
        assert_eq!(format_time(600_000), "10:00.00");
        assert_eq!(format_time(-61_000), "-1:01.00");
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("12.34"), Some(12340));
        assert_eq!(parse_time(" 1:15.23 "), Some(75230));
        assert_eq!(parse_time("0.005"), Some(10));
        assert_eq!(parse_time("7"), Some(7000));
        assert_eq!(parse_time("1:60.00"), None);
        assert_eq!(parse_time("-3.00"), None);
        assert_eq!(parse_time("-1:03.00"), None);
        assert_eq!(parse_time("abc"), None);
        assert_eq!(parse_time("1e300"), None);
        assert_eq!(parse_time("999999999999999999:00"), None);
        assert_eq!(parse_time(""), None);
    }

    #[test]
    fn test_round_trip() {
        for ms in [75230, 9870, 100, 3_599_990] {
            assert_eq!(parse_time(&format_time(ms)), Some(ms));
        }
    }
}
