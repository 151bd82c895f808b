//! Per-location crash rollups and per-segment record grouping.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr as _;

use serde_json::Value;
use vz_record_models::{CrashRollup, LocationGroup, SegmentId, TravelMode};

use crate::{Record, RecordError};

/// Field holding a crash's travel mode.
const MODE_FIELD: &str = "mode";

/// Summarizes crashes by exact location.
///
/// Groups appear in the order their location is first seen. Each group
/// counts its crashes per [`TravelMode`] and joins the raw crash timestamps
/// with commas, in input order. Crashes with an unknown mode only count
/// toward the total.
///
/// # Errors
///
/// Returns [`RecordError::MissingField`] if a crash has no timestamp.
pub fn make_crash_rollup(crashes: &[Record]) -> Result<Vec<CrashRollup>, RecordError> {
    let mut rollups: Vec<CrashRollup> = Vec::new();
    let mut dates: Vec<Vec<String>> = Vec::new();
    let mut by_location: HashMap<(u64, u64), usize> = HashMap::new();

    for (index, crash) in crashes.iter().enumerate() {
        let (longitude, latitude) = crash.lng_lat();
        let date_field = crash.kind().default_timestamp_field();
        let date = match crash.properties().get(date_field) {
            Some(Value::String(s)) => s.clone(),
            None | Some(Value::Null) => {
                return Err(RecordError::MissingField {
                    index,
                    field: date_field.to_string(),
                });
            }
            Some(other) => other.to_string(),
        };

        let slot = *by_location
            .entry((longitude.to_bits(), latitude.to_bits()))
            .or_insert_with(|| {
                rollups.push(CrashRollup {
                    longitude,
                    latitude,
                    total_crashes: 0,
                    pedestrian: 0,
                    bike: 0,
                    vehicle: 0,
                    crash_dates: String::new(),
                });
                dates.push(Vec::new());
                rollups.len() - 1
            });

        let rollup = &mut rollups[slot];
        rollup.total_crashes += 1;

        let mode = crash
            .properties()
            .get(MODE_FIELD)
            .and_then(Value::as_str)
            .and_then(|m| TravelMode::from_str(m.trim()).ok());
        match mode {
            Some(TravelMode::Pedestrian) => rollup.pedestrian += 1,
            Some(TravelMode::Bike) => rollup.bike += 1,
            Some(TravelMode::Vehicle) => rollup.vehicle += 1,
            None => {}
        }

        dates[slot].push(date);
    }

    for (rollup, crash_dates) in rollups.iter_mut().zip(dates) {
        rollup.crash_dates = crash_dates.join(",");
    }

    Ok(rollups)
}

/// Groups raw records by segment id.
///
/// Each group counts its records and, for every field in `other_fields`,
/// collects that field's values from the records that carry it. A field
/// that no record in a group carries is left out of that group entirely.
/// Records without a segment id are skipped. The records themselves are
/// not modified.
#[must_use]
pub fn group_by_location(
    records: &[Value],
    id_field: &str,
    other_fields: &[&str],
) -> BTreeMap<SegmentId, LocationGroup> {
    let mut groups: BTreeMap<SegmentId, LocationGroup> = BTreeMap::new();

    for record in records {
        let Some(id) = record.get(id_field).and_then(SegmentId::from_json) else {
            continue;
        };

        let group = groups.entry(id).or_default();
        group.count += 1;

        for &field in other_fields {
            if let Some(value) = record.get(field) {
                group
                    .fields
                    .entry(field.to_string())
                    .or_default()
                    .push(value.clone());
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use vz_record_models::EventKind;

    use super::*;

    fn crash(date: &str, lat: f64, lng: f64, mode: &str) -> Record {
        let value = serde_json::json!({
            "id": 1,
            "dateOccurred": date,
            "location": {"latitude": lat, "longitude": lng},
            "mode": mode,
        });
        Record::from_value(EventKind::Crash, 0, value).unwrap()
    }

    #[test]
    fn rolls_up_crashes_per_location() {
        let crashes = vec![
            crash("2015-01-01T00:45:00-05:00", 42.365, -71.106, "vehicle"),
            crash("2015-04-15T00:45:00-05:00", 42.365, -71.106, "pedestrian"),
            crash("2015-10-20T00:45:00-05:00", 42.365, -71.106, "vehicle"),
            crash("2015-01-01T01:12:00-05:00", 42.361, -71.097, "bike"),
            crash("2015-01-01T01:54:00-05:00", 42.396, -71.127, "bike"),
            crash("2015-01-01T01:54:00-05:00", 42.396, -71.127, "vehicle"),
        ];

        let rollups = make_crash_rollup(&crashes).unwrap();
        assert_eq!(rollups.len(), 3);

        let totals: Vec<u64> = rollups.iter().map(|r| r.total_crashes).collect();
        let pedestrian: Vec<u64> = rollups.iter().map(|r| r.pedestrian).collect();
        let bike: Vec<u64> = rollups.iter().map(|r| r.bike).collect();
        let vehicle: Vec<u64> = rollups.iter().map(|r| r.vehicle).collect();
        assert_eq!(totals, vec![3, 1, 2]);
        assert_eq!(pedestrian, vec![1, 0, 0]);
        assert_eq!(bike, vec![0, 1, 1]);
        assert_eq!(vehicle, vec![2, 0, 1]);

        assert_eq!(
            rollups[0].crash_dates,
            "2015-01-01T00:45:00-05:00,2015-04-15T00:45:00-05:00,2015-10-20T00:45:00-05:00"
        );
        assert_eq!(rollups[1].crash_dates, "2015-01-01T01:12:00-05:00");
        assert!((rollups[2].longitude - -71.127).abs() < f64::EPSILON);
        assert!((rollups[2].latitude - 42.396).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_modes_only_count_toward_total() {
        let crashes = vec![crash("2015-01-01", 42.0, -71.0, "scooter")];
        let rollups = make_crash_rollup(&crashes).unwrap();
        assert_eq!(rollups[0].total_crashes, 1);
        assert_eq!(rollups[0].vehicle + rollups[0].bike + rollups[0].pedestrian, 0);
    }

    fn grouped_records() -> Vec<Value> {
        vec![
            serde_json::json!({"near_id": "001", "key1": "value1", "key2": "value2"}),
            serde_json::json!({"near_id": "2", "key1": "test"}),
            serde_json::json!({"near_id": "001", "key1": "testtest", "key2": "abc"}),
        ]
    }

    #[test]
    fn groups_counts_by_segment_id() {
        let records = grouped_records();
        let before = records.clone();
        let groups = group_by_location(&records, "near_id", &[]);

        assert_eq!(records, before);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&SegmentId::from("001")].count, 2);
        assert_eq!(groups[&SegmentId::from("2")].count, 1);
        assert!(groups[&SegmentId::from("001")].fields.is_empty());
    }

    #[test]
    fn collects_other_fields_and_omits_absent_ones() {
        let groups = group_by_location(&grouped_records(), "near_id", &["key1", "key2"]);

        let first = &groups[&SegmentId::from("001")];
        assert_eq!(
            first.fields["key1"],
            vec![serde_json::json!("value1"), serde_json::json!("testtest")]
        );
        assert_eq!(
            first.fields["key2"],
            vec![serde_json::json!("value2"), serde_json::json!("abc")]
        );

        let second = &groups[&SegmentId::from("2")];
        assert_eq!(second.fields["key1"], vec![serde_json::json!("test")]);
        assert!(!second.fields.contains_key("key2"));

        let serialized = serde_json::to_value(second).unwrap();
        assert_eq!(serialized, serde_json::json!({"count": 1, "key1": ["test"]}));
    }

    #[test]
    fn skips_records_without_an_id() {
        let records = vec![serde_json::json!({"key1": "x"}), serde_json::json!({"near_id": null})];
        assert!(group_by_location(&records, "near_id", &["key1"]).is_empty());
    }
}
