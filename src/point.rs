//! Point shapes carried through the library.
//!
//! Producers hand points in as one of two wire-native shapes: a JSON
//! property map ([`JsonPoint`]) or an OpenTSDB telnet sample
//! ([`OpenTsdbPoint`]). Everything downstream of the submission APIs
//! moves them around as the tagged [`Payload`] variant.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Aggregation applied by the flattener to same-identity samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlatOperation {
    Avg,
    Sum,
    Count,
    Max,
    Min,
}

impl FlatOperation {
    /// Maps a raw operation id to an operation.
    ///
    /// Ids follow the wire convention: 0 avg, 1 sum, 2 count, 3 max,
    /// 4 min. Anything else is rejected.
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(Self::Avg),
            1 => Ok(Self::Sum),
            2 => Ok(Self::Count),
            3 => Ok(Self::Max),
            4 => Ok(Self::Min),
            other => Err(Error::UnknownOperation(other)),
        }
    }

    pub(crate) fn id(self) -> u8 {
        match self {
            Self::Avg => 0,
            Self::Sum => 1,
            Self::Count => 2,
            Self::Max => 3,
            Self::Min => 4,
        }
    }

    /// Short name used in logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Max => "max",
            Self::Min => "min",
        }
    }
}

/// A single JSON property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Float(f64),
    Integer(i64),
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Text(v) => serializer.serialize_str(v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Integer(v) => serializer.serialize_i64(*v),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

/// A point expressed as an ordered property map, serialized to one JSON
/// object on the wire. `name` identifies the point schema and takes part
/// in the identity hash but is not serialized itself.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPoint {
    pub name: String,
    pub properties: Vec<(String, PropertyValue)>,
}

impl JsonPoint {
    pub fn new(name: impl Into<String>, properties: Vec<(String, PropertyValue)>) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }

    /// Returns the value stored under `key`, if any.
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Appends a property, keeping insertion order.
    pub fn push_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.push((key.into(), value.into()));
    }
}

impl Serialize for JsonPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.properties.len()))?;
        for (key, value) in &self.properties {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A point in the OpenTSDB telnet shape: one metric, one timestamp, one
/// value and a flat tag set.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenTsdbPoint {
    pub metric: String,
    pub timestamp: i64,
    pub value: f64,
    pub tags: Vec<(String, String)>,
}

impl OpenTsdbPoint {
    pub fn new(
        metric: impl Into<String>,
        timestamp: i64,
        value: f64,
        tags: Vec<(String, String)>,
    ) -> Self {
        Self {
            metric: metric.into(),
            timestamp,
            value,
            tags,
        }
    }
}

/// The outgoing item carried through the transport buffer.
///
/// A closed variant set over the known point shapes; the wire layers
/// reject the shape they do not speak at serialization time.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(JsonPoint),
    OpenTsdb(OpenTsdbPoint),
}

impl Payload {
    /// Name of the carried shape, for error messages.
    pub(crate) fn shape(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::OpenTsdb(_) => "opentsdb",
        }
    }
}

impl From<JsonPoint> for Payload {
    fn from(p: JsonPoint) -> Self {
        Self::Json(p)
    }
}

impl From<OpenTsdbPoint> for Payload {
    fn from(p: OpenTsdbPoint) -> Self {
        Self::OpenTsdb(p)
    }
}

/// A sample ready for the flattening process: the fingerprint is already
/// computed over the identity fields plus the operation, and the payload
/// holds the original shape stripped of its timestamp and value.
#[derive(Debug, Clone)]
pub struct FlattenerPoint {
    pub(crate) fingerprint: String,
    pub(crate) operation: FlatOperation,
    pub(crate) timestamp: i64,
    pub(crate) payload: Payload,
    pub(crate) value: f64,
}

impl FlattenerPoint {
    /// The identity fingerprint of this sample.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The sample value to be aggregated.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Current wall clock as whole seconds since the epoch.
pub(crate) fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
