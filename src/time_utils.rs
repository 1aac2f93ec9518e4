// SPDX-License-Identifier: MIT

//! Shared helpers for parsing activity timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parse an activity timestamp from the formats the remote APIs return.
///
/// iGPSport serves RFC 3339 in activity details but a bare dotted date
/// ("2024.11.20") in list rows; Garmin serves "2024-11-20 09:30:00" GMT.
/// Naive timestamps are taken as UTC.
pub fn parse_activity_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    // iGPSport list rows carry only a dotted date
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y.%m.%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_activity_timestamp("2024-11-20T09:30:00+08:00").unwrap();
        assert_eq!(dt.hour(), 1); // 09:30 +08:00 is 01:30 UTC
    }

    #[test]
    fn test_parse_naive_datetime() {
        let dt = parse_activity_timestamp("2024-11-20 09:30:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-11-20T09:30:00+00:00");

        let dt = parse_activity_timestamp("2024-11-20T09:30:00").unwrap();
        assert_eq!(dt.hour(), 9);
    }

    #[test]
    fn test_parse_dotted_date() {
        let dt = parse_activity_timestamp("2024.11.20").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-11-20T00:00:00+00:00");
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_activity_timestamp("not a date").is_none());
        assert!(parse_activity_timestamp("").is_none());
    }
}
