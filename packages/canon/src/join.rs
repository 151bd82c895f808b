//! Nearest-segment join and the crash rollup layer.

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry};
use serde_json::Value;
use vz_record::Record;
use vz_record_models::{CrashRollup, EventKind};
use vz_spatial::SegmentIndex;

use crate::CanonError;

/// Outcome of joining one event file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinSummary {
    /// Records assigned a segment.
    pub matched: usize,
    /// Records left without a segment.
    pub unmatched: usize,
}

/// Assigns each record the id of its nearest segment.
///
/// Records farther than `tolerance` metres from every segment have any
/// existing `near_id` cleared.
pub fn join_events(index: &SegmentIndex, records: &mut [Record], tolerance: Option<f64>) -> JoinSummary {
    let mut summary = JoinSummary::default();

    for record in records.iter_mut() {
        let nearest = index.nearest(record.point(), tolerance).map(|(id, _)| id);
        if nearest.is_some() {
            summary.matched += 1;
        } else {
            summary.unmatched += 1;
        }
        record.set_near_id(nearest);
    }

    summary
}

/// Reads an event file, joins every record to its nearest segment, and
/// writes the joined records.
///
/// # Errors
///
/// Returns an error if the input cannot be read, a record has no valid
/// location, or the output cannot be written.
pub fn join_file(
    kind: EventKind,
    input: &Path,
    output: &Path,
    index: &SegmentIndex,
    tolerance: Option<f64>,
) -> Result<(Vec<Record>, JoinSummary), CanonError> {
    log::info!("Joining {kind} records from {}", input.display());
    let values = vz_record::read_event_values(input)?;
    let mut records = Record::from_values(kind, values)?;

    let summary = join_events(index, &mut records, tolerance);
    log::info!(
        "Matched {} of {} {kind} records to a segment ({} unmatched)",
        summary.matched,
        records.len(),
        summary.unmatched
    );

    let joined: Vec<Value> = records
        .iter()
        .map(|record| Value::Object(record.properties().clone()))
        .collect();
    vz_record::write_event_values(output, &joined)?;
    log::info!("Wrote joined {kind} records to {}", output.display());

    Ok((records, summary))
}

/// Converts crash rollups to a `GeoJSON` point layer.
///
/// # Errors
///
/// Returns an error if a rollup cannot be serialized.
pub fn rollup_feature_collection(rollups: &[CrashRollup]) -> Result<FeatureCollection, CanonError> {
    let features = rollups
        .iter()
        .map(|rollup| {
            let mut properties = match serde_json::to_value(rollup)? {
                Value::Object(properties) => properties,
                _ => serde_json::Map::new(),
            };
            properties.remove("longitude");
            properties.remove("latitude");

            Ok(Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::Point(vec![
                    rollup.longitude,
                    rollup.latitude,
                ]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>, CanonError>>()?;

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Writes the crash rollup layer as `GeoJSON`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_rollup(path: &Path, rollups: &[CrashRollup]) -> Result<(), CanonError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let collection = rollup_feature_collection(rollups)?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &collection)?;
    writer.flush()?;
    log::info!("Wrote {} crash locations to {}", rollups.len(), path.display());
    Ok(())
}
