//! Date/time literal parsing for time predicates.
//!
//! Literals resolve to whole milliseconds since the epoch and are then scaled
//! to nanoseconds, so sub-millisecond digits never widen or narrow a range.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const NANOS_PER_MILLI: i64 = 1_000_000;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // No offset: interpret as UTC.
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    // Accept YYYY-MM-DD as midnight UTC
    let d = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?))
}

/// Parse a date/time literal into epoch nanoseconds (millisecond precision).
///
/// Returns `None` for text that is not a recognized date/time, or whose value
/// does not fit in `i64` nanoseconds.
pub fn parse_time_literal(text: &str) -> Option<i64> {
    let dt = parse_utc(text.trim())?;
    dt.timestamp_millis().checked_mul(NANOS_PER_MILLI)
}

#[cfg(test)]
mod tests {
    use super::*;

    const APR_10_14H: i64 = 1_744_293_600_000_000_000;

    #[test]
    fn parses_supported_shapes_to_nanos() {
        assert_eq!(parse_time_literal("2025-04-10T14:00:00"), Some(APR_10_14H));
        assert_eq!(parse_time_literal("2025-04-10T14:00:00Z"), Some(APR_10_14H));
        assert_eq!(parse_time_literal("2025-04-10 14:00:00"), Some(APR_10_14H));
        assert_eq!(parse_time_literal("2025-04-10T14:00"), Some(APR_10_14H));
        assert_eq!(parse_time_literal("2025-04-10T16:00:00+02:00"), Some(APR_10_14H));
        assert_eq!(parse_time_literal("2025-04-10T16:00:00+0200"), Some(APR_10_14H));
        assert_eq!(
            parse_time_literal("2025-04-10"),
            Some(APR_10_14H - 14 * 3_600_000_000_000)
        );
    }

    #[test]
    fn truncates_to_milliseconds() {
        assert_eq!(
            parse_time_literal("2025-04-10T14:00:00.123456789Z"),
            Some(APR_10_14H + 123_000_000)
        );
    }

    #[test]
    fn rejects_non_dates() {
        assert_eq!(parse_time_literal("yesterday"), None);
        assert_eq!(parse_time_literal("2025-13-01"), None);
        assert_eq!(parse_time_literal(""), None);
    }

    #[test]
    fn out_of_range_years_do_not_overflow() {
        assert_eq!(parse_time_literal("9999-12-31T00:00:00Z"), None);
    }
}
