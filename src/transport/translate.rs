//! Translation between the producer point shapes and the shapes the
//! flattener and accumulator work on.
//!
//! JSON points locate their timestamp and value by the configured
//! property names; OpenTSDB points carry them structurally. Identity
//! hashing covers the schema or metric name, every identity property or
//! tag, and (for flattened samples) the aggregation operation.

use crate::config::{DataTransformerConfig, JsonMappingConfig};
use crate::error::{Error, Result};
use crate::hash::{fingerprint, HashField};
use crate::point::{
    epoch_seconds, FlatOperation, FlattenerPoint, JsonPoint, OpenTsdbPoint, Payload,
    PropertyValue,
};

/// A payload translated for accumulation: the identity fingerprint (when
/// requested) and the original shape stripped down to identity fields.
pub(crate) struct AccumulatedPoint {
    pub fingerprint: Option<String>,
    pub payload: Payload,
}

fn expect_json(item: &Payload) -> Result<&JsonPoint> {
    match item {
        Payload::Json(point) => Ok(point),
        other => Err(Error::Translation(format!(
            "expected a json point, got {}",
            other.shape()
        ))),
    }
}

fn expect_opentsdb(item: &Payload) -> Result<&OpenTsdbPoint> {
    match item {
        Payload::OpenTsdb(point) => Ok(point),
        other => Err(Error::Translation(format!(
            "expected an opentsdb point, got {}",
            other.shape()
        ))),
    }
}

// --- JSON shape ---

fn json_hash_fields<'a>(
    point: &'a JsonPoint,
    operation: Option<FlatOperation>,
    mapping: &JsonMappingConfig,
) -> Vec<HashField<'a>> {
    let mut fields = Vec::with_capacity(2 + point.properties.len() * 2);
    fields.push(HashField::Text(&point.name));
    if let Some(operation) = operation {
        fields.push(HashField::Operation(operation));
    }

    for (key, value) in &point.properties {
        if key == &mapping.timestamp_property || key == &mapping.value_property {
            continue;
        }
        fields.push(HashField::Text(key));
        fields.push(match value {
            PropertyValue::Text(v) => HashField::Text(v),
            PropertyValue::Float(v) => HashField::Float(*v),
            PropertyValue::Integer(v) => HashField::Integer(*v),
        });
    }

    fields
}

/// The identity-only copy of a JSON point: everything except the
/// timestamp and value properties.
fn json_identity(point: &JsonPoint, mapping: &JsonMappingConfig) -> JsonPoint {
    JsonPoint {
        name: point.name.clone(),
        properties: point
            .properties
            .iter()
            .filter(|(key, _)| {
                key != &mapping.timestamp_property && key != &mapping.value_property
            })
            .cloned()
            .collect(),
    }
}

fn json_value(point: &JsonPoint, mapping: &JsonMappingConfig) -> Result<f64> {
    match point.property(&mapping.value_property) {
        Some(PropertyValue::Float(v)) => Ok(*v),
        Some(other) => Err(Error::Translation(format!(
            "expecting a float as value for property {}: {other:?}",
            mapping.value_property
        ))),
        None => Err(Error::Translation(format!(
            "value property {} was not found",
            mapping.value_property
        ))),
    }
}

fn json_timestamp(point: &JsonPoint, mapping: &JsonMappingConfig) -> Result<i64> {
    match point.property(&mapping.timestamp_property) {
        Some(PropertyValue::Integer(v)) => Ok(*v),
        Some(other) => Err(Error::Translation(format!(
            "expecting an integer as value for property {}: {other:?}",
            mapping.timestamp_property
        ))),
        None => Ok(epoch_seconds()),
    }
}

pub(crate) fn json_to_flattener_point(
    config: &DataTransformerConfig,
    mapping: &JsonMappingConfig,
    item: &Payload,
    operation: FlatOperation,
) -> Result<FlattenerPoint> {
    let point = expect_json(item)?;
    let value = json_value(point, mapping)?;
    let timestamp = json_timestamp(point, mapping)?;
    let hash = fingerprint(config, &json_hash_fields(point, Some(operation), mapping))?;

    Ok(FlattenerPoint {
        fingerprint: hash,
        operation,
        timestamp,
        payload: Payload::Json(json_identity(point, mapping)),
        value,
    })
}

pub(crate) fn flattener_point_to_json(
    mapping: &JsonMappingConfig,
    point: &FlattenerPoint,
) -> Result<Payload> {
    let mut item = expect_json(&point.payload)?.clone();
    item.push_property(mapping.timestamp_property.clone(), point.timestamp);
    item.push_property(mapping.value_property.clone(), point.value);
    Ok(Payload::Json(item))
}

pub(crate) fn json_to_accumulated(
    config: &DataTransformerConfig,
    mapping: &JsonMappingConfig,
    item: &Payload,
    calculate_hash: bool,
) -> Result<AccumulatedPoint> {
    let point = expect_json(item)?;

    let hash = if calculate_hash {
        Some(fingerprint(
            config,
            &json_hash_fields(point, None, mapping),
        )?)
    } else {
        None
    };

    Ok(AccumulatedPoint {
        fingerprint: hash,
        payload: Payload::Json(json_identity(point, mapping)),
    })
}

pub(crate) fn accumulated_to_json(
    mapping: &JsonMappingConfig,
    payload: &Payload,
    count: u64,
) -> Result<Payload> {
    let mut item = expect_json(payload)?.clone();
    item.push_property(mapping.timestamp_property.clone(), epoch_seconds());
    item.push_property(mapping.value_property.clone(), count as f64);
    Ok(Payload::Json(item))
}

// --- OpenTSDB shape ---

fn opentsdb_hash_fields<'a>(
    point: &'a OpenTsdbPoint,
    operation: Option<FlatOperation>,
) -> Vec<HashField<'a>> {
    let mut fields = Vec::with_capacity(2 + point.tags.len() * 2);
    fields.push(HashField::Text(&point.metric));
    for (key, value) in &point.tags {
        fields.push(HashField::Text(key));
        fields.push(HashField::Text(value));
    }
    if let Some(operation) = operation {
        fields.push(HashField::Operation(operation));
    }
    fields
}

pub(crate) fn opentsdb_to_flattener_point(
    config: &DataTransformerConfig,
    item: &Payload,
    operation: FlatOperation,
) -> Result<FlattenerPoint> {
    let point = expect_opentsdb(item)?;

    let timestamp = if point.timestamp > 0 {
        point.timestamp
    } else {
        epoch_seconds()
    };

    let hash = fingerprint(config, &opentsdb_hash_fields(point, Some(operation)))?;

    Ok(FlattenerPoint {
        fingerprint: hash,
        operation,
        timestamp,
        payload: Payload::OpenTsdb(OpenTsdbPoint {
            timestamp,
            ..point.clone()
        }),
        value: point.value,
    })
}

pub(crate) fn flattener_point_to_opentsdb(point: &FlattenerPoint) -> Result<Payload> {
    let mut item = expect_opentsdb(&point.payload)?.clone();
    item.timestamp = point.timestamp;
    item.value = point.value;
    Ok(Payload::OpenTsdb(item))
}

pub(crate) fn opentsdb_to_accumulated(
    config: &DataTransformerConfig,
    item: &Payload,
    calculate_hash: bool,
) -> Result<AccumulatedPoint> {
    let point = expect_opentsdb(item)?;

    let hash = if calculate_hash {
        Some(fingerprint(config, &opentsdb_hash_fields(point, None))?)
    } else {
        None
    };

    Ok(AccumulatedPoint {
        fingerprint: hash,
        payload: Payload::OpenTsdb(point.clone()),
    })
}

pub(crate) fn accumulated_to_opentsdb(payload: &Payload, count: u64) -> Result<Payload> {
    let mut item = expect_opentsdb(payload)?.clone();
    item.timestamp = epoch_seconds();
    item.value = count as f64;
    Ok(Payload::OpenTsdb(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlgorithm;
    use std::time::Duration;

    fn transformer_config() -> DataTransformerConfig {
        DataTransformerConfig {
            cycle_duration: Duration::from_secs(1),
            hashing_algorithm: HashAlgorithm::Sha256,
            hash_size: 0,
            point_value_buffer_size: 32,
            name: String::new(),
        }
    }

    fn mapping() -> JsonMappingConfig {
        JsonMappingConfig {
            timestamp_property: "timestamp".into(),
            value_property: "value".into(),
        }
    }

    fn json_item(value: f64, timestamp: i64) -> Payload {
        Payload::Json(JsonPoint::new(
            "number",
            vec![
                ("metric".into(), "cpu.load".into()),
                ("value".into(), value.into()),
                ("timestamp".into(), timestamp.into()),
                ("tags".into(), "host=a1".into()),
            ],
        ))
    }

    #[test]
    fn test_json_flattener_point_strips_timestamp_and_value() {
        let cfg = transformer_config();
        let point =
            json_to_flattener_point(&cfg, &mapping(), &json_item(2.5, 1_500_000_000), FlatOperation::Sum)
                .expect("translate");

        assert_eq!(point.value, 2.5);
        assert_eq!(point.timestamp, 1_500_000_000);

        let Payload::Json(identity) = &point.payload else {
            panic!("expected a json payload");
        };
        assert!(identity.property("value").is_none());
        assert!(identity.property("timestamp").is_none());
        assert!(identity.property("metric").is_some());
    }

    #[test]
    fn test_json_same_identity_same_fingerprint() {
        let cfg = transformer_config();
        let first =
            json_to_flattener_point(&cfg, &mapping(), &json_item(1.0, 10), FlatOperation::Sum)
                .unwrap();
        let second =
            json_to_flattener_point(&cfg, &mapping(), &json_item(99.0, 20), FlatOperation::Sum)
                .unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);

        let other_op =
            json_to_flattener_point(&cfg, &mapping(), &json_item(1.0, 10), FlatOperation::Avg)
                .unwrap();
        assert_ne!(first.fingerprint, other_op.fingerprint);
    }

    #[test]
    fn test_json_missing_value_is_a_translation_error() {
        let cfg = transformer_config();
        let item = Payload::Json(JsonPoint::new(
            "number",
            vec![("metric".into(), "cpu.load".into())],
        ));
        let err =
            json_to_flattener_point(&cfg, &mapping(), &item, FlatOperation::Sum).unwrap_err();
        assert!(matches!(err, Error::Translation(_)));
    }

    #[test]
    fn test_json_missing_timestamp_defaults_to_now() {
        let cfg = transformer_config();
        let item = Payload::Json(JsonPoint::new(
            "number",
            vec![
                ("metric".into(), "cpu.load".into()),
                ("value".into(), 1.0.into()),
            ],
        ));
        let point =
            json_to_flattener_point(&cfg, &mapping(), &item, FlatOperation::Sum).unwrap();
        assert!(point.timestamp > 0);
    }

    #[test]
    fn test_json_flattener_roundtrip_appends_properties() {
        let cfg = transformer_config();
        let point =
            json_to_flattener_point(&cfg, &mapping(), &json_item(2.5, 77), FlatOperation::Sum)
                .unwrap();
        let Payload::Json(out) = flattener_point_to_json(&mapping(), &point).unwrap() else {
            panic!("expected a json payload");
        };

        assert_eq!(out.property("timestamp"), Some(&PropertyValue::Integer(77)));
        assert_eq!(out.property("value"), Some(&PropertyValue::Float(2.5)));
    }

    #[test]
    fn test_json_accumulated_roundtrip_uses_count() {
        let cfg = transformer_config();
        let acc = json_to_accumulated(&cfg, &mapping(), &json_item(5.0, 1), true).unwrap();
        assert!(acc.fingerprint.is_some());

        let Payload::Json(out) = accumulated_to_json(&mapping(), &acc.payload, 42).unwrap() else {
            panic!("expected a json payload");
        };
        assert_eq!(out.property("value"), Some(&PropertyValue::Float(42.0)));
    }

    #[test]
    fn test_json_accumulated_without_hash() {
        let cfg = transformer_config();
        let acc = json_to_accumulated(&cfg, &mapping(), &json_item(5.0, 1), false).unwrap();
        assert!(acc.fingerprint.is_none());
    }

    #[test]
    fn test_opentsdb_flattener_point() {
        let cfg = transformer_config();
        let item = Payload::OpenTsdb(OpenTsdbPoint::new(
            "cpu.load",
            1_500_000_000,
            3.5,
            vec![("host".into(), "a1".into())],
        ));

        let point = opentsdb_to_flattener_point(&cfg, &item, FlatOperation::Max).unwrap();
        assert_eq!(point.value, 3.5);
        assert_eq!(point.timestamp, 1_500_000_000);

        let Payload::OpenTsdb(out) = flattener_point_to_opentsdb(&point).unwrap() else {
            panic!("expected an opentsdb payload");
        };
        assert_eq!(out.value, 3.5);
    }

    #[test]
    fn test_opentsdb_zero_timestamp_defaults_to_now() {
        let cfg = transformer_config();
        let item = Payload::OpenTsdb(OpenTsdbPoint::new("m", 0, 1.0, vec![]));
        let point = opentsdb_to_flattener_point(&cfg, &item, FlatOperation::Sum).unwrap();
        assert!(point.timestamp > 0);
    }

    #[test]
    fn test_opentsdb_rejects_json_shape() {
        let cfg = transformer_config();
        let item = json_item(1.0, 1);
        assert!(matches!(
            opentsdb_to_flattener_point(&cfg, &item, FlatOperation::Sum),
            Err(Error::Translation(_))
        ));
    }

    #[test]
    fn test_opentsdb_tags_change_fingerprint() {
        let cfg = transformer_config();
        let a = Payload::OpenTsdb(OpenTsdbPoint::new(
            "m",
            1,
            1.0,
            vec![("host".into(), "a1".into())],
        ));
        let b = Payload::OpenTsdb(OpenTsdbPoint::new(
            "m",
            1,
            1.0,
            vec![("host".into(), "a2".into())],
        ));

        let fa = opentsdb_to_flattener_point(&cfg, &a, FlatOperation::Sum).unwrap();
        let fb = opentsdb_to_flattener_point(&cfg, &b, FlatOperation::Sum).unwrap();
        assert_ne!(fa.fingerprint, fb.fingerprint);
    }
}
