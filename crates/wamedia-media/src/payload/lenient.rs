//! Deserializers for the loosely-typed numbers and byte blobs Evolution
//! forwards from Baileys.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::data_uri::{encode_base64, DataUri};

/// Accept `123`, `"123"`, or a protobuf Long `{"low": 123, "high": 0}`.
pub(super) fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_u64))
}

pub(super) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => {
            let low = map.get("low").and_then(Value::as_i64)? as u32 as u64;
            let high = map.get("high").and_then(Value::as_i64).unwrap_or(0) as u32 as u64;
            Some((high << 32) | low)
        }
        _ => None,
    }
}

/// Normalize a byte blob to standard base64.
///
/// Baileys byte fields reach the webhook in one of four shapes depending on
/// the Evolution version: a base64 string, a JSON array of bytes, a Node
/// `Buffer` (`{"type": "Buffer", "data": [...]}`), or an index-keyed object
/// (`{"0": 255, "1": 216, ...}`).
pub fn bytes_to_base64(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            match DataUri::parse(s) {
                Some(uri) if uri.is_base64 => Some(uri.payload),
                _ => Some(s.to_string()),
            }
        }
        Value::Array(items) => byte_array(items).map(|b| encode_base64(&b)),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("data") {
                return byte_array(items).map(|b| encode_base64(&b));
            }
            let mut indexed: Vec<(usize, u8)> = Vec::with_capacity(map.len());
            for (k, v) in map {
                let idx = k.parse::<usize>().ok()?;
                let byte = v.as_u64().filter(|b| *b <= 255)? as u8;
                indexed.push((idx, byte));
            }
            if indexed.is_empty() {
                return None;
            }
            indexed.sort_by_key(|(i, _)| *i);
            let bytes: Vec<u8> = indexed.into_iter().map(|(_, b)| b).collect();
            Some(encode_base64(&bytes))
        }
        _ => None,
    }
}

fn byte_array(items: &[Value]) -> Option<Vec<u8>> {
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|v| v.as_u64().filter(|b| *b <= 255).map(|b| b as u8))
        .collect()
}
