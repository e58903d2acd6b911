//! Wire text rendering.
//!
//! JSON points render through `serde_json` into a working buffer sized
//! by the configured hint; OpenTSDB points render into the fixed
//! `put <metric> <timestamp> <value> <tags…>` telnet line.

use crate::error::{Error, Result};
use crate::point::{JsonPoint, OpenTsdbPoint};

/// Renders one JSON point as a single JSON object.
pub(crate) fn json_object(point: &JsonPoint, buffer_size: usize) -> Result<String> {
    let mut buf = Vec::with_capacity(buffer_size);
    serde_json::to_writer(&mut buf, point)?;
    // serde_json never emits invalid UTF-8.
    String::from_utf8(buf).map_err(|e| Error::Translation(e.to_string()))
}

/// Renders a window of JSON points as one JSON array.
pub(crate) fn json_array<'a>(
    points: impl Iterator<Item = &'a JsonPoint>,
    buffer_size: usize,
) -> Result<String> {
    let mut buf = Vec::with_capacity(buffer_size);
    serde_json::to_writer(&mut buf, &points.collect::<Vec<_>>())?;
    String::from_utf8(buf).map_err(|e| Error::Translation(e.to_string()))
}

/// Appends one telnet `put` line for the given point.
pub(crate) fn opentsdb_line(point: &OpenTsdbPoint, out: &mut String) {
    out.push_str("put ");
    out.push_str(&point.metric);
    out.push(' ');
    out.push_str(&point.timestamp.to_string());
    out.push(' ');
    out.push_str(&format_value(point.value));
    for (key, value) in &point.tags {
        out.push(' ');
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out.push('\n');
}

/// Formats a sample value without a spurious trailing `.0` for whole
/// numbers, matching what OpenTSDB-style backends parse.
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::PropertyValue;

    fn sample_point() -> OpenTsdbPoint {
        OpenTsdbPoint::new(
            "cpu.load",
            1_500_000_000,
            1.5,
            vec![
                ("host".into(), "a1".into()),
                ("rack".into(), "r7".into()),
            ],
        )
    }

    #[test]
    fn test_opentsdb_line_format() {
        let mut out = String::new();
        opentsdb_line(&sample_point(), &mut out);
        assert_eq!(out, "put cpu.load 1500000000 1.5 host=a1 rack=r7\n");
    }

    #[test]
    fn test_opentsdb_line_whole_value() {
        let mut out = String::new();
        let mut point = sample_point();
        point.value = 11.0;
        opentsdb_line(&point, &mut out);
        assert_eq!(out, "put cpu.load 1500000000 11 host=a1 rack=r7\n");
    }

    #[test]
    fn test_json_array_wraps_objects() {
        let a = JsonPoint::new("n", vec![("value".into(), PropertyValue::Float(1.0))]);
        let b = JsonPoint::new("n", vec![("value".into(), PropertyValue::Integer(2))]);
        let payload = json_array([&a, &b].into_iter(), 64).unwrap();
        assert_eq!(payload, r#"[{"value":1.0},{"value":2}]"#);
    }
}
