#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index for nearest road segment lookups.
//!
//! Loads road segment lines from `GeoJSON`, projects them into Web
//! Mercator, builds an R-tree over their envelopes, and answers "which
//! segment is closest to this point" queries. Used by the join stage to
//! assign a `near_id` to every crash and concern.

pub mod projection;

use std::path::Path;

use geo::{BoundingRect as _, Closest, ClosestPoint as _, MultiLineString, Point};
use geojson::GeoJson;
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use vz_record_models::SegmentId;

/// Errors that can occur while loading segment geometry.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// I/O error reading a segment file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON parse error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The document was valid `GeoJSON` but not a `FeatureCollection`.
    #[error("Expected a GeoJSON FeatureCollection in {path}")]
    NotFeatureCollection {
        /// Source the document was read from.
        path: String,
    },
}

/// A road segment read from a `GeoJSON` feature.
#[derive(Debug, Clone)]
pub struct SegmentFeature {
    /// Segment id from the feature's `id` property.
    pub id: SegmentId,
    /// Segment geometry in Web Mercator metres.
    pub geometry: MultiLineString<f64>,
    /// All feature properties, untouched.
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// A segment stored in the R-tree.
struct SegmentEntry {
    id: SegmentId,
    envelope: AABB<[f64; 2]>,
    geometry: MultiLineString<f64>,
}

impl RTreeObject for SegmentEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for SegmentEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let query = Point::new(point[0], point[1]);
        self.geometry
            .0
            .iter()
            .filter_map(|line| match line.closest_point(&query) {
                Closest::Intersection(p) | Closest::SinglePoint(p) => {
                    let dx = p.x() - query.x();
                    let dy = p.y() - query.y();
                    Some(dx.mul_add(dx, dy * dy))
                }
                Closest::Indeterminate => None,
            })
            .fold(f64::INFINITY, f64::min)
    }
}

/// Nearest-segment index over projected road segment lines.
pub struct SegmentIndex {
    segments: RTree<SegmentEntry>,
}

impl SegmentIndex {
    /// Builds an index from already-projected segment features.
    ///
    /// Segments with empty geometry are skipped.
    #[must_use]
    pub fn new(features: &[SegmentFeature]) -> Self {
        let entries: Vec<SegmentEntry> = features
            .iter()
            .filter_map(|feature| {
                let envelope = compute_envelope(&feature.geometry)?;
                Some(SegmentEntry {
                    id: feature.id.clone(),
                    envelope,
                    geometry: feature.geometry.clone(),
                })
            })
            .collect();

        Self {
            segments: RTree::bulk_load(entries),
        }
    }

    /// Loads one or more segment `GeoJSON` files and builds the index.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be read or parsed.
    pub fn load(paths: &[&Path]) -> Result<Self, SpatialError> {
        let mut features = Vec::new();
        for path in paths {
            let loaded = load_segment_features(path)?;
            log::info!("Loaded {} segments from {}", loaded.len(), path.display());
            features.extend(loaded);
        }
        let index = Self::new(&features);
        log::info!("Built segment index with {} segments", index.len());
        Ok(index)
    }

    /// Number of indexed segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.size()
    }

    /// Whether the index holds no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.size() == 0
    }

    /// Finds the segment closest to a projected point.
    ///
    /// Returns the segment id and the distance in metres. When
    /// `max_distance` is set, segments farther than it are not considered.
    #[must_use]
    pub fn nearest(&self, point: Point<f64>, max_distance: Option<f64>) -> Option<(&SegmentId, f64)> {
        let query = [point.x(), point.y()];
        let (entry, distance_2) = self.segments.nearest_neighbor_iter_with_distance_2(&query).next()?;
        let distance = distance_2.sqrt();

        if let Some(max) = max_distance
            && distance > max
        {
            return None;
        }

        Some((&entry.id, distance))
    }
}

/// Reads segment features from a `GeoJSON` file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid `GeoJSON`, or
/// is not a `FeatureCollection`.
pub fn load_segment_features(path: &Path) -> Result<Vec<SegmentFeature>, SpatialError> {
    let contents = std::fs::read_to_string(path)?;
    parse_segment_features(&contents, &path.display().to_string())
}

/// Parses segment features from a `GeoJSON` string.
///
/// Line geometry is projected from WGS84 into Web Mercator. Features
/// without an id or without line geometry are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the string is not a `GeoJSON` `FeatureCollection`.
pub fn parse_segment_features(
    geojson_str: &str,
    source: &str,
) -> Result<Vec<SegmentFeature>, SpatialError> {
    let geojson: GeoJson = geojson_str.parse()?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(SpatialError::NotFeatureCollection {
            path: source.to_string(),
        });
    };

    let mut features = Vec::with_capacity(collection.features.len());
    let mut skipped = 0_usize;

    for feature in collection.features {
        let properties = feature.properties.clone().unwrap_or_default();

        let id = properties
            .get("id")
            .and_then(SegmentId::from_json)
            .or_else(|| feature_id(feature.id.as_ref()));
        let Some(id) = id else {
            skipped += 1;
            continue;
        };

        let Some(geometry) = feature.geometry.and_then(to_multi_line_string) else {
            log::warn!("Segment {id} in {source} has no line geometry, skipping");
            skipped += 1;
            continue;
        };

        features.push(SegmentFeature {
            id,
            geometry: projection::project_lines(&geometry),
            properties,
        });
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} features without an id or line geometry in {source}");
    }

    Ok(features)
}

/// Falls back to the top-level `GeoJSON` feature id.
fn feature_id(id: Option<&geojson::feature::Id>) -> Option<SegmentId> {
    match id? {
        geojson::feature::Id::String(s) => SegmentId::from_json(&serde_json::Value::String(s.clone())),
        geojson::feature::Id::Number(n) => SegmentId::from_json(&serde_json::Value::Number(n.clone())),
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiLineString`].
/// Handles both `LineString` and `MultiLineString` geometry types.
fn to_multi_line_string(geometry: geojson::Geometry) -> Option<MultiLineString<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiLineString(mls) => Some(mls),
        geo::Geometry::LineString(ls) => Some(MultiLineString(vec![ls])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiLineString`].
fn compute_envelope(lines: &MultiLineString<f64>) -> Option<AABB<[f64; 2]>> {
    lines
        .bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}
