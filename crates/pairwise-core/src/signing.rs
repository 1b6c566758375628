//! Canonical JSON and signed-data encoding.
//!
//! Signed data is an 8-byte big-endian timestamp followed by the canonical
//! JSON of the signed value. Both peers must produce identical bytes, so
//! object keys are sorted and no whitespace is emitted.

use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;

const TIMESTAMP_LENGTH: usize = 8;

/// Canonicalize a value: sorted keys, no whitespace.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&json, &mut out)?;
    Ok(out.into_bytes())
}

/// Encode a value as signed data prefixed with `timestamp`.
pub fn encode_signed_data<T: Serialize>(timestamp: u64, value: &T) -> Result<Vec<u8>> {
    let mut data = timestamp.to_be_bytes().to_vec();
    data.extend(canonicalize(value)?);
    Ok(data)
}

/// Split signed data back into its timestamp and JSON value.
pub fn decode_signed_data(data: &[u8]) -> Result<(u64, Value)> {
    if data.len() <= TIMESTAMP_LENGTH {
        return Err(Error::InvalidSignature);
    }
    let (prefix, json) = data.split_at(TIMESTAMP_LENGTH);
    let mut timestamp = [0u8; TIMESTAMP_LENGTH];
    timestamp.copy_from_slice(prefix);
    Ok((u64::from_be_bytes(timestamp), serde_json::from_slice(json)?))
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // serde_json escapes strings exactly once, which keeps the
                // encoding stable across peers.
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_order() {
        let value = json!({"verkey": "b", "did": "a"});
        assert_eq!(canonicalize(&value).unwrap(), b"{\"did\":\"a\",\"verkey\":\"b\"}");
    }

    #[test]
    fn test_nested_canonical() {
        let value = json!({"z": {"b": [2, 1], "a": "x\"y"}, "a": []});
        assert_eq!(
            canonicalize(&value).unwrap(),
            b"{\"a\":[],\"z\":{\"a\":\"x\\\"y\",\"b\":[2,1]}}"
        );
    }

    #[test]
    fn test_signed_data_roundtrip() {
        let value = json!({"did": "abc", "verkey": "def"});
        let data = encode_signed_data(1_700_000_000, &value).unwrap();

        let (timestamp, decoded) = decode_signed_data(&data).unwrap();
        assert_eq!(timestamp, 1_700_000_000);
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_truncated_signed_data_rejected() {
        assert!(decode_signed_data(&[0u8; 8]).is_err());
    }
}
