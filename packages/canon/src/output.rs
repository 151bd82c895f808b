//! CSV writers for the canonical dataset and the adjacency table.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::Value;
use vz_record_models::{AdjacencyRow, CanonicalRow, NEAR_ID_FIELD, SegmentId};

use crate::CanonError;

/// Field on a snapped ATR station holding its street address.
const ATR_ADDRESS_FIELD: &str = "orig";

fn create_parent_dirs(path: &Path) -> Result<(), CanonError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Writes canonical rows as CSV with header
/// `segment_id,week,crash,concern,<feature...>`.
///
/// Missing feature values are written as empty cells.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_canonical_csv<W: Write>(
    writer: W,
    feature_columns: &[String],
    rows: &[CanonicalRow],
) -> Result<W, CanonError> {
    let mut csv = csv::WriterBuilder::new().from_writer(writer);

    let mut header = vec!["segment_id", "week", "crash", "concern"];
    header.extend(feature_columns.iter().map(String::as_str));
    csv.write_record(&header)?;

    for row in rows {
        let mut record = Vec::with_capacity(4 + row.features.len());
        record.push(row.segment_id.to_string());
        record.push(row.week.to_string());
        record.push(row.crash.to_string());
        record.push(row.concern.to_string());
        record.extend(
            row.features
                .iter()
                .map(|value| value.map_or_else(String::new, |v| v.to_string())),
        );
        csv.write_record(&record)?;
    }

    csv.flush()?;
    csv.into_inner().map_err(|e| CanonError::Io(e.into_error()))
}

/// Writes the canonical dataset as a gzip-compressed CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_canonical_gz(
    path: &Path,
    feature_columns: &[String],
    rows: &[CanonicalRow],
) -> Result<(), CanonError> {
    create_parent_dirs(path)?;
    let file = File::create(path)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let encoder = write_canonical_csv(encoder, feature_columns, rows)?;
    encoder.finish()?.flush()?;
    log::info!("Wrote {} canonical rows to {}", rows.len(), path.display());
    Ok(())
}

/// Reads snapped ATR stations into a map of segment id to addresses.
///
/// A missing file yields an empty map with a warning. Stations without a
/// segment id are skipped.
///
/// # Errors
///
/// Returns an error if the file exists but is not a JSON array.
pub fn read_atrs(path: &Path) -> Result<BTreeMap<SegmentId, Vec<String>>, CanonError> {
    if !path.exists() {
        log::warn!("No ATR file at {}; adjacency addresses will be empty", path.display());
        return Ok(BTreeMap::new());
    }

    let value: Value = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    let Value::Array(stations) = value else {
        return Err(CanonError::InvalidInput {
            path: path.display().to_string(),
            message: "expected a JSON array of ATR stations".to_string(),
        });
    };

    let mut atrs: BTreeMap<SegmentId, Vec<String>> = BTreeMap::new();
    for station in &stations {
        let Some(segment_id) = station.get(NEAR_ID_FIELD).and_then(SegmentId::from_json) else {
            continue;
        };
        let address = match station.get(ATR_ADDRESS_FIELD) {
            Some(Value::String(s)) => s.clone(),
            None | Some(Value::Null) => continue,
            Some(other) => other.to_string(),
        };
        atrs.entry(segment_id).or_default().push(address);
    }

    log::info!("Read {} ATR stations from {}", stations.len(), path.display());
    Ok(atrs)
}

/// Left-joins (segment id, `orig_id`) pairs with ATR addresses.
///
/// A segment with several ATRs yields one row per ATR; a segment with none
/// yields one row with no address.
#[must_use]
pub fn build_adjacency(
    pairs: &[(SegmentId, Option<String>)],
    atrs: &BTreeMap<SegmentId, Vec<String>>,
) -> Vec<AdjacencyRow> {
    let mut rows = Vec::with_capacity(pairs.len());

    for (segment_id, orig_id) in pairs {
        match atrs.get(segment_id) {
            Some(addresses) if !addresses.is_empty() => {
                rows.extend(addresses.iter().map(|address| AdjacencyRow {
                    segment_id: segment_id.clone(),
                    orig_id: orig_id.clone(),
                    atr_address: Some(address.clone()),
                }));
            }
            _ => rows.push(AdjacencyRow {
                segment_id: segment_id.clone(),
                orig_id: orig_id.clone(),
                atr_address: None,
            }),
        }
    }

    rows
}

/// Writes the adjacency table as CSV with header
/// `segment_id,orig_id,atr_address`.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_adjacency_csv<W: Write>(writer: W, rows: &[AdjacencyRow]) -> Result<W, CanonError> {
    let mut csv = csv::WriterBuilder::new().has_headers(true).from_writer(writer);
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    csv.into_inner().map_err(|e| CanonError::Io(e.into_error()))
}

/// Writes the adjacency table to a file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_adjacency_file(path: &Path, rows: &[AdjacencyRow]) -> Result<(), CanonError> {
    create_parent_dirs(path)?;
    let file = File::create(path)?;
    write_adjacency_csv(BufWriter::new(file), rows)?.flush()?;
    log::info!("Wrote {} adjacency rows to {}", rows.len(), path.display());
    Ok(())
}
