//! Remote namespace paths.
//!
//! A [`RemotePath`] pairs the string a user typed with the absolute path it
//! resolved to and, when the server confirmed the path exists, the kind of
//! entity found there. The kind is taken from the server response, never
//! guessed from the string, and cannot be changed once the path is built.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest absolute path the server accepts.
pub const MAX_NAME_LEN: usize = 1088;

/// The two kinds of entity in the remote namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Directory-like container.
    Collection,
    /// File-like object with content.
    DataObject,
}

impl EntityKind {
    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::DataObject => "data object",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A user-supplied path and its resolved form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemotePath {
    input: String,
    resolved: String,
    kind: Option<EntityKind>,
}

impl RemotePath {
    /// A path the server reported as existing with the given kind.
    pub fn existing(input: impl Into<String>, resolved: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            input: input.into(),
            resolved: resolved.into(),
            kind: Some(kind),
        }
    }

    /// A syntactically valid path the server reported as absent.
    pub fn missing(input: impl Into<String>, resolved: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            resolved: resolved.into(),
            kind: None,
        }
    }

    /// The string as originally supplied.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// The absolute, normalized path.
    pub fn resolved(&self) -> &str {
        &self.resolved
    }

    /// Entity kind, if the path exists.
    pub fn kind(&self) -> Option<EntityKind> {
        self.kind
    }

    pub fn exists(&self) -> bool {
        self.kind.is_some()
    }

    pub fn is_collection(&self) -> bool {
        self.kind == Some(EntityKind::Collection)
    }

    pub fn is_data_object(&self) -> bool {
        self.kind == Some(EntityKind::DataObject)
    }

    /// Parent collection of the resolved path.
    pub fn parent(&self) -> &str {
        split_path(&self.resolved).0
    }

    /// Final component of the resolved path.
    pub fn name(&self) -> &str {
        split_path(&self.resolved).1
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resolved)
    }
}

/// Normalize `raw` into an absolute path, joining relative input onto `cwd`.
///
/// Empty components and `.` are dropped, `..` removes the previous component
/// (and stops at the root).
pub fn normalize_path(raw: &str, cwd: &str) -> Result<String, TypeError> {
    let invalid = |reason: &str| TypeError::InvalidPath {
        path: raw.to_string(),
        reason: reason.to_string(),
    };

    if raw.trim().is_empty() {
        return Err(invalid("path must not be empty"));
    }
    if raw.contains('\0') {
        return Err(invalid("path must not contain NUL"));
    }

    let joined = if raw.starts_with('/') {
        raw.to_string()
    } else {
        if !cwd.starts_with('/') {
            return Err(invalid("relative path without an absolute working collection"));
        }
        format!("{cwd}/{raw}")
    };

    let mut parts: Vec<&str> = Vec::new();
    for component in joined.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            c => parts.push(c),
        }
    }

    let normalized = format!("/{}", parts.join("/"));
    if normalized.len() > MAX_NAME_LEN {
        return Err(invalid(&format!("longer than {MAX_NAME_LEN} bytes")));
    }
    Ok(normalized)
}

/// Split an absolute path into parent collection and final component.
///
/// The root splits into (`"/"`, `""`).
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Join a collection path and a child name.
pub fn join_path(collection: &str, name: &str) -> String {
    if collection.ends_with('/') {
        format!("{collection}{name}")
    } else {
        format!("{collection}/{name}")
    }
}
