//! Road feature table built from intersection and non-intersection
//! segments.
//!
//! Intersections come as a JSON object mapping each intersection id to the
//! property sets of every line that meets there. Non-intersection segments
//! come as `GeoJSON` features, one per segment. Both are flattened into
//! rows keyed by segment id, concatenated, and reduced so that every
//! segment id ends up with exactly one value per feature column.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};
use vz_record_models::{Reducer, SegmentId};
use vz_spatial::SegmentFeature;

use crate::CanonError;

/// Property linking a segment back to its source map feature.
const ORIG_ID_FIELD: &str = "orig_id";

/// One source row: a segment id and its raw properties.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub segment_id: SegmentId,
    pub properties: Map<String, Value>,
}

/// Aggregated road features, one row per distinct segment id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoadFeatures {
    /// Feature column names, in output order.
    pub columns: Vec<String>,
    /// Integer feature values per segment, aligned with `columns`.
    pub rows: BTreeMap<SegmentId, Vec<Option<i64>>>,
}

impl RoadFeatures {
    /// Number of distinct segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Flattens the intersection JSON object into rows tagged with their
/// intersection id.
///
/// # Errors
///
/// Returns [`CanonError::InvalidInput`] if the value is not an object of
/// arrays of objects.
pub fn flatten_intersections(inters: &Value, source: &str) -> Result<Vec<FeatureRow>, CanonError> {
    let invalid = |message: String| CanonError::InvalidInput {
        path: source.to_string(),
        message,
    };

    let Value::Object(by_id) = inters else {
        return Err(invalid("expected an object keyed by intersection id".to_string()));
    };

    let mut rows = Vec::new();
    for (id, lines) in by_id {
        let Some(segment_id) = SegmentId::from_json(&Value::String(id.clone())) else {
            return Err(invalid("empty intersection id".to_string()));
        };
        let Value::Array(lines) = lines else {
            return Err(invalid(format!("intersection {id} is not a list of property sets")));
        };
        for line in lines {
            let Value::Object(properties) = line else {
                return Err(invalid(format!("intersection {id} has a non-object property set")));
            };
            rows.push(FeatureRow {
                segment_id: segment_id.clone(),
                properties: properties.clone(),
            });
        }
    }

    Ok(rows)
}

/// Turns non-intersection segment features into rows keyed by their id.
#[must_use]
pub fn non_intersection_rows(features: &[SegmentFeature]) -> Vec<FeatureRow> {
    features
        .iter()
        .map(|feature| FeatureRow {
            segment_id: feature.id.clone(),
            properties: feature.properties.clone(),
        })
        .collect()
}

/// Combines values from duplicate segment rows.
///
/// Returns `None` when there are no values to combine.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn reduce(reducer: Reducer, values: &[f64]) -> Option<f64> {
    let (&first, rest) = values.split_first()?;
    Some(match reducer {
        Reducer::Max => rest.iter().copied().fold(first, f64::max),
        Reducer::Min => rest.iter().copied().fold(first, f64::min),
        Reducer::Sum => values.iter().sum(),
        Reducer::Mean => values.iter().sum::<f64>() / values.len() as f64,
        Reducer::First => first,
        Reducer::Last => *values.last()?,
    })
}

/// Reads a feature value as a number. Missing and null values are `None`.
fn numeric_value(
    segment_id: &SegmentId,
    column: &str,
    value: Option<&Value>,
) -> Result<Option<f64>, CanonError> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(Some(v)),
        Some(_) => Ok(None),
        None => Err(CanonError::NonNumericFeature {
            segment_id: segment_id.to_string(),
            column: column.to_string(),
            value: value.map_or_else(String::new, ToString::to_string),
        }),
    }
}

/// Fails if a non-empty source table lacks one of the requested columns.
fn require_columns(columns: &[String], rows: &[FeatureRow], table: &str) -> Result<(), CanonError> {
    if rows.is_empty() {
        return Ok(());
    }
    for column in columns {
        if !rows.iter().any(|row| row.properties.contains_key(column)) {
            return Err(CanonError::MissingFeature {
                column: column.clone(),
                table: table.to_string(),
            });
        }
    }
    Ok(())
}

/// Aggregates intersection and non-intersection rows into one feature row
/// per segment id.
///
/// Duplicate segment ids are combined per column with `reducer`; the
/// result is truncated to an integer.
///
/// # Errors
///
/// Returns [`CanonError::MissingFeature`] if a requested column is absent
/// from a non-empty source table, and [`CanonError::NonNumericFeature`] if
/// a value cannot be read as a number.
#[allow(clippy::cast_possible_truncation)]
pub fn aggregate_features(
    columns: &[String],
    inters: &[FeatureRow],
    non_inters: &[FeatureRow],
    reducer: Reducer,
) -> Result<RoadFeatures, CanonError> {
    require_columns(columns, inters, "intersection")?;
    require_columns(columns, non_inters, "non-intersection")?;

    let mut collected: BTreeMap<SegmentId, Vec<Vec<f64>>> = BTreeMap::new();

    for row in inters.iter().chain(non_inters) {
        let values = collected
            .entry(row.segment_id.clone())
            .or_insert_with(|| vec![Vec::new(); columns.len()]);

        for (slot, column) in values.iter_mut().zip(columns) {
            if let Some(v) = numeric_value(&row.segment_id, column, row.properties.get(column))? {
                slot.push(v);
            }
        }
    }

    let rows = collected
        .into_iter()
        .map(|(segment_id, values)| {
            let reduced = values
                .iter()
                .map(|vs| reduce(reducer, vs).map(|v| v.trunc() as i64))
                .collect();
            (segment_id, reduced)
        })
        .collect();

    Ok(RoadFeatures {
        columns: columns.to_vec(),
        rows,
    })
}

/// Extracts (segment id, `orig_id`) pairs in source order, intersections
/// first.
#[must_use]
pub fn adjacency_pairs(inters: &[FeatureRow], non_inters: &[FeatureRow]) -> Vec<(SegmentId, Option<String>)> {
    inters
        .iter()
        .chain(non_inters)
        .map(|row| {
            let orig_id = match row.properties.get(ORIG_ID_FIELD) {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => SegmentId::from_json(other).map(|id| id.to_string()),
            };
            (row.segment_id.clone(), orig_id)
        })
        .collect()
}

/// Builds the road feature table and adjacency pairs from the segment
/// files.
///
/// # Errors
///
/// Returns an error if either file cannot be read or parsed, or if
/// aggregation fails (see [`aggregate_features`]).
pub fn road_make(
    columns: &[String],
    inters_path: &Path,
    non_inters_path: &Path,
    reducer: Reducer,
) -> Result<(RoadFeatures, Vec<(SegmentId, Option<String>)>), CanonError> {
    log::info!("Reading {}", inters_path.display());
    let inters_json: Value = serde_json::from_reader(std::io::BufReader::new(
        std::fs::File::open(inters_path)?,
    ))?;
    let inters = flatten_intersections(&inters_json, &inters_path.display().to_string())?;

    log::info!("Reading {}", non_inters_path.display());
    let non_inters = non_intersection_rows(&vz_spatial::load_segment_features(non_inters_path)?);

    log::info!(
        "Combining {} intersection rows and {} non-intersection rows",
        inters.len(),
        non_inters.len()
    );

    let features = aggregate_features(columns, &inters, &non_inters, reducer)?;
    log::info!(
        "Road features being included: {} ({} segments, reducer {reducer})",
        columns.join(", "),
        features.len()
    );

    Ok((features, adjacency_pairs(&inters, &non_inters)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["AADT".to_string(), "SPEEDLIMIT".to_string()]
    }

    fn row(id: &str, props: &Value) -> FeatureRow {
        FeatureRow {
            segment_id: SegmentId::from(id),
            properties: props.as_object().unwrap().clone(),
        }
    }

    #[test]
    fn flattens_intersections_into_tagged_rows() {
        let inters = serde_json::json!({
            "10": [{"AADT": 100, "SPEEDLIMIT": 25}, {"AADT": 300, "SPEEDLIMIT": 30}],
            "11": [{"AADT": 50, "SPEEDLIMIT": 20}]
        });
        let rows = flatten_intersections(&inters, "inters.json").unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.segment_id.as_str()).collect();
        assert_eq!(ids, vec!["10", "10", "11"]);
    }

    #[test]
    fn rejects_malformed_intersections() {
        assert!(flatten_intersections(&serde_json::json!([1, 2]), "x").is_err());
        assert!(flatten_intersections(&serde_json::json!({"1": {"AADT": 1}}), "x").is_err());
        assert!(flatten_intersections(&serde_json::json!({"1": [3]}), "x").is_err());
    }

    #[test]
    fn max_reducer_keeps_the_largest_duplicate() {
        let inters = vec![row("7", &serde_json::json!({"AADT": 5, "SPEEDLIMIT": 30}))];
        let non_inters = vec![row("7", &serde_json::json!({"AADT": 9, "SPEEDLIMIT": 25}))];

        let features = aggregate_features(&columns(), &inters, &non_inters, Reducer::Max).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features.rows[&SegmentId::from("7")], vec![Some(9), Some(30)]);
    }

    #[test]
    fn other_reducers_combine_duplicates() {
        let inters = vec![
            row("7", &serde_json::json!({"AADT": 5, "SPEEDLIMIT": 30})),
            row("7", &serde_json::json!({"AADT": 8, "SPEEDLIMIT": 20})),
        ];
        let non_inters = vec![row("7", &serde_json::json!({"AADT": "9", "SPEEDLIMIT": 25}))];
        let id = SegmentId::from("7");

        let sum = aggregate_features(&columns(), &inters, &non_inters, Reducer::Sum).unwrap();
        assert_eq!(sum.rows[&id], vec![Some(22), Some(75)]);

        let min = aggregate_features(&columns(), &inters, &non_inters, Reducer::Min).unwrap();
        assert_eq!(min.rows[&id], vec![Some(5), Some(20)]);

        let first = aggregate_features(&columns(), &inters, &non_inters, Reducer::First).unwrap();
        assert_eq!(first.rows[&id], vec![Some(5), Some(30)]);

        let last = aggregate_features(&columns(), &inters, &non_inters, Reducer::Last).unwrap();
        assert_eq!(last.rows[&id], vec![Some(9), Some(25)]);

        let mean = aggregate_features(&columns(), &inters, &non_inters, Reducer::Mean).unwrap();
        assert_eq!(mean.rows[&id], vec![Some(7), Some(25)]);
    }

    #[test]
    fn null_values_are_ignored_by_the_reducer() {
        let inters = vec![row("1", &serde_json::json!({"AADT": null, "SPEEDLIMIT": 30}))];
        let non_inters = vec![
            row("1", &serde_json::json!({"AADT": 400, "SPEEDLIMIT": null})),
            row("2", &serde_json::json!({"AADT": null, "SPEEDLIMIT": 20})),
        ];

        let features = aggregate_features(&columns(), &inters, &non_inters, Reducer::Max).unwrap();
        assert_eq!(features.rows[&SegmentId::from("1")], vec![Some(400), Some(30)]);
        assert_eq!(features.rows[&SegmentId::from("2")], vec![None, Some(20)]);
    }

    #[test]
    fn missing_column_is_a_configuration_error() {
        let inters = vec![row("1", &serde_json::json!({"AADT": 1}))];
        let non_inters = vec![row("2", &serde_json::json!({"AADT": 1, "SPEEDLIMIT": 20}))];

        let err = aggregate_features(&columns(), &inters, &non_inters, Reducer::Max).unwrap_err();
        assert!(matches!(
            err,
            CanonError::MissingFeature { ref column, ref table }
                if column == "SPEEDLIMIT" && table == "intersection"
        ));
    }

    #[test]
    fn empty_source_tables_skip_the_column_check() {
        let non_inters = vec![row("2", &serde_json::json!({"AADT": 1, "SPEEDLIMIT": 20}))];
        let features = aggregate_features(&columns(), &[], &non_inters, Reducer::Max).unwrap();
        assert_eq!(features.len(), 1);
    }

    #[test]
    fn non_numeric_values_are_fatal() {
        let non_inters = vec![row("2", &serde_json::json!({"AADT": "busy", "SPEEDLIMIT": 20}))];
        let err = aggregate_features(&columns(), &[], &non_inters, Reducer::Max).unwrap_err();
        assert!(matches!(err, CanonError::NonNumericFeature { ref column, .. } if column == "AADT"));
    }

    #[test]
    fn collects_adjacency_pairs_in_source_order() {
        let inters = vec![row("10", &serde_json::json!({"orig_id": 55}))];
        let non_inters = vec![
            row("3", &serde_json::json!({"orig_id": "a-1"})),
            row("4", &serde_json::json!({})),
        ];
        let pairs = adjacency_pairs(&inters, &non_inters);
        assert_eq!(
            pairs,
            vec![
                (SegmentId::from("10"), Some("55".to_string())),
                (SegmentId::from("3"), Some("a-1".to_string())),
                (SegmentId::from("4"), None),
            ]
        );
    }

    #[test]
    fn reduce_handles_empty_input() {
        assert!(reduce(Reducer::Max, &[]).is_none());
        assert_eq!(reduce(Reducer::Max, &[5.0, 9.0]), Some(9.0));
    }
}
