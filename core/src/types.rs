//! Record shapes handed back to callers.
//!
//! # Design
//! Entities have no fixed schema, so rows are JSON objects. `Record` keeps
//! the service's field order (serde_json is built with `preserve_order`) and
//! the original value types. Key lookups and deletes return a
//! `StringRecord`, where every value has been turned into text.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// One row of an entity with its original JSON value types.
pub type Record = Map<String, Value>;

/// One row of an entity with every value rendered as text.
pub type StringRecord = BTreeMap<String, String>;

/// Text form of a JSON value: strings unquoted, `null` empty, everything
/// else as compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn to_string_record(record: &Record) -> StringRecord {
    record
        .iter()
        .map(|(k, v)| (k.clone(), value_to_text(v)))
        .collect()
}
