//! Decoding of an upstream `/debug/vars` document into a [`Snapshot`].
//!
//! `cmdline` and `memstats` have a fixed schema and fail loudly when the shape
//! is wrong. Every other top-level key is sorted into one of the four free-form
//! buckets by the JSON type of its value; shapes that fit none are skipped.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::types::Snapshot;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON object at the top level, got {0}")]
    NotAnObject(&'static str),
    #[error("unexpected shape for `{key}`: {source}")]
    Field {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode a raw response body, stamping the result with `time`.
pub fn decode_snapshot(body: &[u8], time: DateTime<Utc>) -> Result<Snapshot, DecodeError> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Object(map) => decode_object(map, time),
        other => Err(DecodeError::NotAnObject(kind(&other))),
    }
}

pub fn decode_object(map: Map<String, Value>, time: DateTime<Utc>) -> Result<Snapshot, DecodeError> {
    let mut snap = Snapshot::empty(time);
    for (key, value) in map {
        match key.as_str() {
            "cmdline" => {
                snap.cmdline = serde_json::from_value(value)
                    .map_err(|source| DecodeError::Field { key: "cmdline", source })?;
            }
            "memstats" => {
                snap.memstats = serde_json::from_value(value)
                    .map_err(|source| DecodeError::Field { key: "memstats", source })?;
            }
            _ => classify(&mut snap, key, value),
        }
    }
    Ok(snap)
}

fn classify(snap: &mut Snapshot, key: String, value: Value) {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                snap.numbers.insert(key, f);
            }
        }
        Value::String(s) => {
            snap.strings.insert(key, s);
        }
        Value::Object(obj) => {
            // Mixed objects are split: numeric members and string members land
            // in their own bucket under the same key.
            let mut nums = BTreeMap::new();
            let mut strs = BTreeMap::new();
            for (sub, v) in obj {
                match v {
                    Value::Number(n) => {
                        if let Some(f) = n.as_f64() {
                            nums.insert(sub, f);
                        }
                    }
                    Value::String(s) => {
                        strs.insert(sub, s);
                    }
                    other => debug!(key = %key, member = %sub, kind = kind(&other), "skipping nested value"),
                }
            }
            if !nums.is_empty() {
                snap.number_maps.insert(key.clone(), nums);
            }
            if !strs.is_empty() {
                snap.string_maps.insert(key, strs);
            }
        }
        other => debug!(key = %key, kind = kind(&other), "skipping unsupported value"),
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
