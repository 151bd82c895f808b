//! A single crash or concern event.

use chrono::NaiveDateTime;
use geo::Point;
use serde_json::{Map, Value};
use vz_record_models::{EventKind, NEAR_ID_FIELD, SegmentId};

use crate::RecordError;
use crate::parsing::{coordinate, parse_timestamp};

/// A point event: its raw properties plus the location projected into
/// Web Mercator.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    kind: EventKind,
    longitude: f64,
    latitude: f64,
    point: Point<f64>,
    properties: Map<String, Value>,
}

impl Record {
    /// Wraps a raw event object.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MissingLocation`] if the object has no
    /// `location` with numeric `latitude` and `longitude`.
    pub fn new(kind: EventKind, properties: Map<String, Value>) -> Result<Self, RecordError> {
        let location = properties
            .get("location")
            .ok_or_else(|| RecordError::MissingLocation {
                message: "no location field".to_string(),
            })?;

        let latitude = coordinate(location.get("latitude")).ok_or_else(|| {
            RecordError::MissingLocation {
                message: format!("invalid latitude in {location}"),
            }
        })?;
        let longitude = coordinate(location.get("longitude")).ok_or_else(|| {
            RecordError::MissingLocation {
                message: format!("invalid longitude in {location}"),
            }
        })?;

        Ok(Self {
            kind,
            longitude,
            latitude,
            point: vz_spatial::projection::to_web_mercator(longitude, latitude),
            properties,
        })
    }

    /// Wraps the record at `index` of an event file.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object or has no location.
    pub fn from_value(kind: EventKind, index: usize, value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Object(properties) => Self::new(kind, properties),
            _ => Err(RecordError::NotAnObject { index }),
        }
    }

    /// Wraps every record of an event file.
    ///
    /// # Errors
    ///
    /// Returns the first record error encountered.
    pub fn from_values(kind: EventKind, values: Vec<Value>) -> Result<Vec<Self>, RecordError> {
        values
            .into_iter()
            .enumerate()
            .map(|(index, value)| Self::from_value(kind, index, value))
            .collect()
    }

    /// Whether this is a crash or a concern.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Location in Web Mercator metres.
    #[must_use]
    pub const fn point(&self) -> Point<f64> {
        self.point
    }

    /// Location as WGS84 `(longitude, latitude)`.
    #[must_use]
    pub const fn lng_lat(&self) -> (f64, f64) {
        (self.longitude, self.latitude)
    }

    /// Raw event properties.
    #[must_use]
    pub const fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Consumes the record, returning its properties.
    #[must_use]
    pub fn into_properties(self) -> Map<String, Value> {
        self.properties
    }

    /// Parses the timestamp from this kind's standard field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is missing or not a parseable date.
    pub fn timestamp(&self) -> Result<NaiveDateTime, RecordError> {
        self.timestamp_from(self.kind.default_timestamp_field(), 0)
    }

    /// Parses the timestamp from an arbitrary field. `index` is only used
    /// for error reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is missing or not a parseable date.
    pub fn timestamp_from(&self, field: &str, index: usize) -> Result<NaiveDateTime, RecordError> {
        timestamp_field(&self.properties, field, index)
    }

    /// The nearest segment id, if the record has been joined.
    #[must_use]
    pub fn near_id(&self) -> Option<SegmentId> {
        self.properties.get(NEAR_ID_FIELD).and_then(SegmentId::from_json)
    }

    /// Sets or clears the nearest segment id.
    pub fn set_near_id(&mut self, near_id: Option<&SegmentId>) {
        match near_id {
            Some(id) => {
                self.properties
                    .insert(NEAR_ID_FIELD.to_string(), Value::String(id.to_string()));
            }
            None => {
                self.properties.remove(NEAR_ID_FIELD);
            }
        }
    }
}

/// Reads and parses a timestamp field from raw properties.
///
/// # Errors
///
/// Returns [`RecordError::MissingField`] if the field is absent or null and
/// [`RecordError::Timestamp`] if it cannot be parsed.
pub fn timestamp_field(
    properties: &Map<String, Value>,
    field: &str,
    index: usize,
) -> Result<NaiveDateTime, RecordError> {
    let raw = match properties.get(field) {
        None | Some(Value::Null) => {
            return Err(RecordError::MissingField {
                index,
                field: field.to_string(),
            });
        }
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    parse_timestamp(&raw).ok_or_else(|| RecordError::Timestamp {
        index,
        field: field.to_string(),
        value: raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crash() -> Map<String, Value> {
        let Value::Object(map) = serde_json::json!({
            "id": 1,
            "dateOccurred": "2015-01-01T00:45:00-05:00",
            "location": {"latitude": 42.30, "longitude": -71.07},
            "mode": "vehicle"
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn projects_location_on_construction() {
        let record = Record::new(EventKind::Crash, crash()).unwrap();
        assert!((record.point().x() - -7_911_476.210_677_952).abs() < 1e-3);
        assert!((record.point().y() - 5_206_024.461_292_35).abs() < 1e-3);
        assert_eq!(record.lng_lat(), (-71.07, 42.30));
    }

    #[test]
    fn reads_kind_specific_timestamp() {
        let record = Record::new(EventKind::Crash, crash()).unwrap();
        assert_eq!(record.timestamp().unwrap().to_string(), "2015-01-01 00:45:00");

        let concern = Record::new(EventKind::Concern, crash()).unwrap();
        assert!(matches!(
            concern.timestamp(),
            Err(RecordError::MissingField { ref field, .. }) if field == "dateCreated"
        ));
    }

    #[test]
    fn rejects_missing_location() {
        let mut props = crash();
        props.remove("location");
        assert!(matches!(
            Record::new(EventKind::Crash, props),
            Err(RecordError::MissingLocation { .. })
        ));

        let mut props = crash();
        props.insert("location".to_string(), serde_json::json!({"latitude": 42.3}));
        assert!(Record::new(EventKind::Crash, props).is_err());
    }

    #[test]
    fn rejects_non_object_values() {
        let err = Record::from_value(EventKind::Crash, 3, serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, RecordError::NotAnObject { index: 3 }));
    }

    #[test]
    fn sets_and_clears_near_id() {
        let mut record = Record::new(EventKind::Crash, crash()).unwrap();
        assert!(record.near_id().is_none());

        record.set_near_id(Some(&SegmentId::from("17")));
        assert_eq!(record.near_id(), Some(SegmentId::from("17")));
        assert_eq!(record.properties().get("near_id"), Some(&serde_json::json!("17")));

        record.set_near_id(None);
        assert!(record.near_id().is_none());
    }

    #[test]
    fn malformed_timestamp_names_the_field() {
        let mut props = crash();
        props.insert("dateOccurred".to_string(), serde_json::json!("not a date"));
        let record = Record::new(EventKind::Crash, props).unwrap();
        let err = record.timestamp_from("dateOccurred", 4).unwrap_err();
        assert!(matches!(
            err,
            RecordError::Timestamp { index: 4, ref value, .. } if value == "not a date"
        ));
    }
}
