//! JSON shapes exchanged with callers.
//!
//! Targets are objects naming a `collection` and optionally a `data_object`
//! within it. Results are the same shape, decorated with extra members.

use serde_json::{json, Value};

use baton_types::{join_path, split_path, EntityKind, RemotePath};

use crate::error::{logged, BatonError, BatonResult, ErrorReport};

pub const COLLECTION_KEY: &str = "collection";
pub const DATA_OBJECT_KEY: &str = "data_object";
pub const AVUS_KEY: &str = "avus";
pub const ACCESS_KEY: &str = "access";
pub const CHECKSUM_KEY: &str = "checksum";
pub const SIZE_KEY: &str = "size";
pub const CONTENTS_KEY: &str = "contents";
pub const ERROR_KEY: &str = "error";

/// An optional string member; present but non-string is an error.
pub fn optional_str<'a>(json: &'a Value, key: &str) -> BatonResult<Option<&'a str>> {
    match json.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(logged(BatonError::InvalidJson(format!(
            "{key} is not a string: {other}"
        )))),
    }
}

/// A required string member.
pub fn required_str<'a>(json: &'a Value, key: &str) -> BatonResult<&'a str> {
    optional_str(json, key)?
        .ok_or_else(|| logged(BatonError::InvalidJson(format!("missing {key} in {json}"))))
}

/// An optional array of strings.
pub fn optional_str_array(json: &Value, key: &str) -> BatonResult<Option<Vec<String>>> {
    let items = match json.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(logged(BatonError::InvalidJson(format!(
                "{key} is not an array: {other}"
            ))))
        }
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(logged(BatonError::InvalidJson(format!(
                "{key} element is not a string: {other}"
            )))),
        })
        .collect::<BatonResult<Vec<_>>>()
        .map(Some)
}

/// The path named by a target object.
pub fn target_path(json: &Value) -> BatonResult<String> {
    if !json.is_object() {
        return Err(logged(BatonError::InvalidJson(format!(
            "target is not a JSON object: {json}"
        ))));
    }
    let collection = required_str(json, COLLECTION_KEY)?;
    Ok(match optional_str(json, DATA_OBJECT_KEY)? {
        Some(name) => join_path(collection, name),
        None => collection.to_string(),
    })
}

/// A target object for an absolute path of known kind.
pub fn entity_json(kind: EntityKind, path: &str) -> Value {
    match kind {
        EntityKind::Collection => json!({ COLLECTION_KEY: path }),
        EntityKind::DataObject => {
            let (collection, name) = split_path(path);
            json!({ COLLECTION_KEY: collection, DATA_OBJECT_KEY: name })
        }
    }
}

/// A target object for a resolved path. Missing paths are described as
/// collections.
pub fn path_json(path: &RemotePath) -> Value {
    entity_json(path.kind().unwrap_or(EntityKind::Collection), path.resolved())
}

/// Attach `report` to `target` as its `error` member.
pub fn add_error(target: &mut Value, report: &ErrorReport) {
    if let Some(obj) = target.as_object_mut() {
        obj.insert(ERROR_KEY.to_string(), json!({"code": report.code, "message": report.message}));
    }
}
