//! Request and response structures for RPC calls.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use baton_types::{AccessLevel, Avu, EntityKind, MetadataOp, MetadataOperation};

/// Request-modifier keywords understood by the server.
pub mod keywords {
    /// Compute and register a checksum for the stored bytes.
    pub const REG_CHKSUM_KW: &str = "regChksum";
    /// Request a lock of the given type.
    pub const LOCK_TYPE_KW: &str = "lockType";
    /// Value of [`LOCK_TYPE_KW`] for an exclusive write lock.
    pub const WRITE_LOCK_TYPE: &str = "write";
    /// Overwrite or remove without further checks.
    pub const FORCE_FLAG_KW: &str = "forceFlag";
    /// Apply a collection operation recursively.
    pub const RECURSIVE_OPR_KW: &str = "recursiveOpr";
    /// Preferred storage resource for new data.
    pub const DEST_RESC_NAME_KW: &str = "destRescName";
}

/// Keyword/value modifiers attached to a request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValPairs(BTreeMap<String, String>);

impl KeyValPairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How a data object is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    #[default]
    ReadOnly,
    WriteOnly,
}

/// Input for data object open, put, checksum and unlink calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObjInp {
    pub path: String,
    pub open_mode: OpenMode,
    pub create_mode: u32,
    /// Expected size, zero when unknown.
    pub data_size: u64,
    pub cond: KeyValPairs,
}

impl DataObjInp {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            open_mode: OpenMode::ReadOnly,
            create_mode: 0o750,
            data_size: 0,
            cond: KeyValPairs::new(),
        }
    }

    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.open_mode = mode;
        self
    }

    pub fn with_keyword(mut self, key: &str, value: &str) -> Self {
        self.cond.add(key, value);
        self
    }
}

/// Input for calls on an already-open data object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenedDataObjInp {
    pub fd: i32,
    /// Number of bytes to transfer in the next read or write.
    pub len: usize,
}

/// Input for collection create and remove calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollInp {
    pub path: String,
    pub cond: KeyValPairs,
}

impl CollInp {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cond: KeyValPairs::new(),
        }
    }

    pub fn with_keyword(mut self, key: &str, value: &str) -> Self {
        self.cond.add(key, value);
        self
    }
}

/// Input for a single AVU add/remove.
///
/// `unit` is always present; the empty string means "no unit".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModAvuMetadataInp {
    pub operation: MetadataOp,
    pub entity: EntityKind,
    pub path: String,
    pub attribute: String,
    pub value: String,
    pub unit: String,
}

impl ModAvuMetadataInp {
    pub fn new(operation: MetadataOp, entity: EntityKind, path: impl Into<String>, avu: &Avu) -> Self {
        Self {
            operation,
            entity,
            path: path.into(),
            attribute: avu.attribute.clone(),
            value: avu.value.clone(),
            unit: avu.unit.clone(),
        }
    }

    pub fn avu(&self) -> Avu {
        Avu::with_unit(&self.attribute, &self.value, &self.unit)
    }
}

/// Input for an all-or-nothing batch of AVU operations on one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicMetadataInp {
    pub entity: EntityKind,
    pub path: String,
    pub operations: Vec<MetadataOperation>,
}

/// Input for an ACL change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModAccessControlInp {
    pub recursive: bool,
    pub access_level: AccessLevel,
    pub user_name: String,
    /// Zone of `user_name`; the server's own zone when absent.
    pub zone: Option<String>,
    pub path: String,
}

/// Output of a stat call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjStat {
    pub kind: EntityKind,
    pub size: u64,
    pub owner: String,
    pub checksum: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyval_pairs() {
        let mut kv = KeyValPairs::new();
        assert!(kv.is_empty());
        kv.add(keywords::FORCE_FLAG_KW, "");
        kv.add(keywords::LOCK_TYPE_KW, keywords::WRITE_LOCK_TYPE);
        assert_eq!(kv.len(), 2);
        assert!(kv.contains("forceFlag"));
        assert_eq!(kv.get("lockType"), Some("write"));
        assert_eq!(kv.get("regChksum"), None);
    }

    #[test]
    fn data_obj_inp_defaults() {
        let inp = DataObjInp::new("/z/a").with_mode(OpenMode::WriteOnly);
        assert_eq!(inp.open_mode, OpenMode::WriteOnly);
        assert_eq!(inp.create_mode, 0o750);
        assert_eq!(inp.data_size, 0);
        assert!(inp.cond.is_empty());
    }

    #[test]
    fn avu_request_keeps_empty_unit() {
        let inp = ModAvuMetadataInp::new(
            MetadataOp::Add,
            EntityKind::DataObject,
            "/z/a",
            &Avu::new("attr", "val"),
        );
        assert_eq!(inp.unit, "");
        assert_eq!(inp.avu(), Avu::new("attr", "val"));
    }
}
