//! Event counts per segment and time bucket.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use vz_record_models::{BucketCounts, DatePart, SegmentId};

use crate::RecordError;
use crate::parsing::date_part_value;
use crate::record::timestamp_field;

/// Half-open date window `[start, end)` applied before counting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    /// Events before this instant are dropped.
    pub start: Option<NaiveDateTime>,
    /// Events at or after this instant are dropped.
    pub end: Option<NaiveDateTime>,
}

impl DateWindow {
    /// Builds a window from optional year bounds: from January 1st of
    /// `start_year` up to (not including) January 1st of `end_year`.
    #[must_use]
    pub fn from_years(start_year: Option<i32>, end_year: Option<i32>) -> Self {
        let jan_first = |year: i32| {
            NaiveDate::from_ymd_opt(year, 1, 1).map(|d| d.and_time(NaiveTime::MIN))
        };
        Self {
            start: start_year.and_then(jan_first),
            end: end_year.and_then(jan_first),
        }
    }

    /// Whether the timestamp falls inside the window.
    #[must_use]
    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        self.start.is_none_or(|start| *timestamp >= start)
            && self.end.is_none_or(|end| *timestamp < end)
    }
}

/// What to count and how to bucket it.
#[derive(Debug, Clone, Copy)]
pub struct CountOptions<'a> {
    /// Field holding the event timestamp.
    pub date_field: &'a str,
    /// Field holding the segment id to group by.
    pub id_field: &'a str,
    /// Calendar part used as the time bucket.
    pub date_part: DatePart,
    /// Optional date filter.
    pub window: DateWindow,
}

/// Counts events per (segment id, date-part value).
///
/// Every record's timestamp must parse; the first bad one aborts the whole
/// count. Records without a segment id are not counted.
///
/// # Errors
///
/// Returns an error if any record is not an object or has a missing or
/// malformed timestamp.
pub fn count_events(records: &[Value], options: &CountOptions<'_>) -> Result<BucketCounts, RecordError> {
    let mut counts = BucketCounts::new();
    let mut unassigned = 0_u64;
    let mut outside_window = 0_u64;

    for (index, record) in records.iter().enumerate() {
        let Value::Object(properties) = record else {
            return Err(RecordError::NotAnObject { index });
        };

        let timestamp = timestamp_field(properties, options.date_field, index)?;

        let Some(segment_id) = properties.get(options.id_field).and_then(SegmentId::from_json) else {
            unassigned += 1;
            continue;
        };

        if !options.window.contains(&timestamp) {
            outside_window += 1;
            continue;
        }

        let bucket = date_part_value(&timestamp, options.date_part);
        *counts.entry((segment_id, bucket)).or_insert(0) += 1;
    }

    if unassigned > 0 {
        log::info!("{unassigned} records have no {} and were not counted", options.id_field);
    }
    if outside_window > 0 {
        log::info!("{outside_window} records fall outside the date window and were not counted");
    }

    Ok(counts)
}

/// Reads an event file and counts its events per segment and time bucket.
///
/// # Errors
///
/// Returns an error if the file cannot be read or any record fails to
/// count (see [`count_events`]).
pub fn read_records(path: &Path, options: &CountOptions<'_>) -> Result<BucketCounts, RecordError> {
    let records = crate::read_event_values(path)?;
    log::info!("Total number of records in {}: {}", path.display(), records.len());
    log::info!("Aggregating by {}", options.date_part);
    count_events(&records, options)
}
