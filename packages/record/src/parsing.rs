//! Date and coordinate parsing shared by every event reader.

use chrono::{DateTime, Datelike as _, NaiveDate, NaiveDateTime, NaiveTime, Timelike as _};
use vz_record_models::DatePart;

/// Datetime formats tried, in order, after RFC 3339.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Date-only formats, interpreted as midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Parses an event timestamp into local wall-clock time.
///
/// Timestamps with a UTC offset keep their local time (the offset is
/// dropped, not applied), so an event at `00:45-05:00` on January 1st stays
/// on January 1st. A trailing `Z` is accepted on every format.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.naive_local());
    }

    let s = s.strip_suffix('Z').unwrap_or(s);

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Extracts the bucket value for a timestamp.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn date_part_value(timestamp: &NaiveDateTime, part: DatePart) -> u32 {
    match part {
        DatePart::Week => timestamp.iso_week().week(),
        DatePart::Month => timestamp.month(),
        DatePart::Day => timestamp.day(),
        DatePart::Weekday => timestamp.weekday().num_days_from_monday(),
        DatePart::Hour => timestamp.hour(),
        DatePart::Year => timestamp.year().max(0) as u32,
    }
}

/// Reads a coordinate that may be stored as a JSON number or a numeric
/// string.
#[must_use]
pub fn coordinate(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_keeping_local_time() {
        let ts = parse_timestamp("2015-01-01T00:45:00-05:00").unwrap();
        assert_eq!(ts.to_string(), "2015-01-01 00:45:00");
    }

    #[test]
    fn parses_naive_and_date_only_formats() {
        assert_eq!(
            parse_timestamp("2016-03-04T05:06:07.250").unwrap().to_string(),
            "2016-03-04 05:06:07.250"
        );
        assert_eq!(
            parse_timestamp("2016-03-04 05:06:07").unwrap().to_string(),
            "2016-03-04 05:06:07"
        );
        assert_eq!(
            parse_timestamp("01/01/2015 00:00:00Z").unwrap().to_string(),
            "2015-01-01 00:00:00"
        );
        assert_eq!(parse_timestamp("2016-03-04").unwrap().to_string(), "2016-03-04 00:00:00");
        assert_eq!(parse_timestamp("3/4/2016").unwrap().to_string(), "2016-03-04 00:00:00");
    }

    #[test]
    fn rejects_garbage_timestamps() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2016-13-40").is_none());
    }

    #[test]
    fn extracts_iso_week() {
        // 2015-01-01 is a Thursday, so it falls in ISO week 1.
        let ts = parse_timestamp("2015-01-01T00:45:00").unwrap();
        assert_eq!(date_part_value(&ts, DatePart::Week), 1);

        // 2016-01-01 is a Friday and belongs to week 53 of 2015.
        let ts = parse_timestamp("2016-01-01").unwrap();
        assert_eq!(date_part_value(&ts, DatePart::Week), 53);

        let ts = parse_timestamp("2015-10-20T00:45:00").unwrap();
        assert_eq!(date_part_value(&ts, DatePart::Week), 43);
    }

    #[test]
    fn extracts_other_date_parts() {
        let ts = parse_timestamp("2015-10-20T13:45:00").unwrap();
        assert_eq!(date_part_value(&ts, DatePart::Month), 10);
        assert_eq!(date_part_value(&ts, DatePart::Day), 20);
        assert_eq!(date_part_value(&ts, DatePart::Weekday), 1);
        assert_eq!(date_part_value(&ts, DatePart::Hour), 13);
        assert_eq!(date_part_value(&ts, DatePart::Year), 2015);
    }

    #[test]
    fn reads_numeric_and_string_coordinates() {
        let loc = serde_json::json!({"latitude": "42.365", "longitude": -71.106});
        assert!((coordinate(loc.get("latitude")).unwrap() - 42.365).abs() < f64::EPSILON);
        assert!((coordinate(loc.get("longitude")).unwrap() - -71.106).abs() < f64::EPSILON);
        assert!(coordinate(loc.get("altitude")).is_none());
        assert!(coordinate(Some(&serde_json::json!("north"))).is_none());
    }
}
