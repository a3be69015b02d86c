use ekm_client::MeterSnapshot;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::pipeline::PipelineError;

/// Canonical bytes of a snapshot together with their SHA-256 digest.
#[derive(Debug, Clone)]
pub struct CanonicalDigest {
    bytes: Vec<u8>,
    digest: [u8; 32],
}

impl CanonicalDigest {
    pub fn of(snapshot: &MeterSnapshot) -> Result<Self, PipelineError> {
        let bytes = canonical_bytes(snapshot)?;
        let digest = Sha256::digest(&bytes).into();
        Ok(Self { bytes, digest })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }
}

/// Encode a snapshot as compact JSON with every object's keys sorted.
///
/// Rules:
/// - keys in byte order (equal to code point order for UTF-8), at every depth;
/// - no whitespace between tokens;
/// - numbers as their shortest round-trip decimal text (`120.0`, `1234.5`, `7`);
/// - strings UTF-8 verbatim, escaping only `"`, `\` and control characters.
///
/// Logically equal snapshots always produce identical bytes.
pub fn canonical_bytes(snapshot: &MeterSnapshot) -> Result<Vec<u8>, PipelineError> {
    if let Some(field) = snapshot.first_non_finite() {
        return Err(PipelineError::Signing(format!(
            "field `{field}` is not a finite number"
        )));
    }

    let value = serde_json::to_value(snapshot)
        .map_err(|e| PipelineError::Signing(format!("snapshot is not serializable: {e}")))?;

    let mut out = Vec::with_capacity(512);
    write_value(&value, &mut out)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<(), PipelineError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_str(s, out)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            // Sorted here rather than relying on the map's iteration order.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_str(key, out)?;
                out.push(b':');
                write_value(item, out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_str(s: &str, out: &mut Vec<u8>) -> Result<(), PipelineError> {
    serde_json::to_writer(&mut *out, s)
        .map_err(|e| PipelineError::Signing(format!("failed to encode string: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn m1_snapshot() -> MeterSnapshot {
        let mut meter_data = Map::new();
        meter_data.insert("kwh".to_string(), json!(1234.5));
        MeterSnapshot {
            meter_name: "M1".to_string(),
            meter_data,
            meter_day_of_week: "Monday".to_string(),
            reading_date: "2024-06-09".to_string(),
            model: "Pulse v.4".to_string(),
            address: "123 Main St".to_string(),
            firmware: "1.0.0".to_string(),
            total_watt_hour: 1000.0,
            voltage: 120.0,
            amps: 10.0,
            total_power_watts: 1200.0,
            ct_ratio: 1.0,
            frequency_hz: 60.0,
        }
    }

    fn canonical_string(snapshot: &MeterSnapshot) -> String {
        String::from_utf8(canonical_bytes(snapshot).unwrap()).unwrap()
    }

    #[test]
    fn encodes_sorted_compact_json() {
        assert_eq!(
            canonical_string(&m1_snapshot()),
            concat!(
                r#"{"address":"123 Main St","amps":10.0,"ct_ratio":1.0,"firmware":"1.0.0","#,
                r#""frequency_hz":60.0,"meter_data":{"kwh":1234.5},"meter_day_of_week":"Monday","#,
                r#""meter_name":"M1","model":"Pulse v.4","reading_date":"2024-06-09","#,
                r#""total_power_watts":1200.0,"total_watt_hour":1000.0,"voltage":120.0}"#
            )
        );
    }

    #[test]
    fn digest_is_sha256_of_canonical_bytes() {
        let d = CanonicalDigest::of(&m1_snapshot()).unwrap();
        assert_eq!(
            hex::encode(d.digest()),
            "8e3c84c053824a1c6d4e87b33a44436a84caf37ec17469b5ea4e14fc8309ef3b"
        );
        assert_eq!(d.bytes(), canonical_bytes(&m1_snapshot()).unwrap().as_slice());
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut a = m1_snapshot();
        let mut b = m1_snapshot();
        a.meter_data = Map::new();
        b.meter_data = Map::new();
        for (k, v) in [("kwh", json!(1.5)), ("kvarh", json!(2)), ("peak", json!({"z": 1, "a": 2}))] {
            a.meter_data.insert(k.to_string(), v);
        }
        for (k, v) in [("peak", json!({"a": 2, "z": 1})), ("kvarh", json!(2)), ("kwh", json!(1.5))] {
            b.meter_data.insert(k.to_string(), v);
        }

        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }

    #[test]
    fn nested_values_are_canonical_too() {
        let mut s = m1_snapshot();
        s.meter_data = serde_json::from_str(r#"{"b": {"z": [1, {"y": null, "x": true}], "a": "α"}, "a": 7}"#).unwrap();

        let text = canonical_string(&s);
        assert!(
            text.contains(r#""meter_data":{"a":7,"b":{"a":"α","z":[1,{"x":true,"y":null}]}}"#),
            "{text}"
        );
    }

    #[test]
    fn non_ascii_text_is_kept_verbatim() {
        let mut s = m1_snapshot();
        s.meter_name = "Zähler-1".to_string();
        s.address = "Straße 5, Zürich".to_string();

        let text = canonical_string(&s);
        assert!(text.contains(r#""address":"Straße 5, Zürich""#));
        assert!(text.contains(r#""meter_name":"Zähler-1""#));
        assert!(!text.contains("\\u"));
    }

    #[test]
    fn control_characters_and_quotes_are_escaped() {
        let mut s = m1_snapshot();
        s.model = "a\"b\\c\nd".to_string();
        assert!(canonical_string(&s).contains(r#""model":"a\"b\\c\nd""#));
    }

    #[test]
    fn non_finite_measurement_is_a_signing_error() {
        let mut s = m1_snapshot();
        s.voltage = f64::NAN;
        match canonical_bytes(&s) {
            Err(PipelineError::Signing(msg)) => assert!(msg.contains("voltage"), "{msg}"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
