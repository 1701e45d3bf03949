//! Serializable namespace state backing [`InMemoryServer`](crate::InMemoryServer).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use baton_types::{join_path, md5_hex, split_path, AccessControlEntry, AccessLevel, Avu, EntityKind};

/// One collection or data object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub kind: EntityKind,
    pub owner: String,
    #[serde(default)]
    pub avus: Vec<Avu>,
    /// Grants, each with the zone filled in.
    #[serde(default)]
    pub acl: Vec<AccessControlEntry>,
    #[serde(default, with = "hex")]
    pub content: Vec<u8>,
    #[serde(default)]
    pub checksum: Option<String>,
}

impl CatalogEntry {
    pub fn new(kind: EntityKind, owner: &str, zone: &str) -> Self {
        Self {
            kind,
            owner: owner.to_string(),
            avus: Vec::new(),
            acl: vec![AccessControlEntry::new(owner, Some(zone.to_string()), AccessLevel::Own)],
            content: Vec::new(),
            checksum: None,
        }
    }

    /// Level granted to `user` in `zone`.
    pub fn access_for(&self, user: &str, zone: &str) -> AccessLevel {
        self.acl
            .iter()
            .filter(|e| e.owner == user && e.zone.as_deref() == Some(zone))
            .map(|e| e.level)
            .max()
            .unwrap_or(AccessLevel::Null)
    }

    /// Replace the grant for `user#zone`; `Null` removes it.
    pub fn set_access(&mut self, user: &str, zone: &str, level: AccessLevel) {
        self.acl
            .retain(|e| !(e.owner == user && e.zone.as_deref() == Some(zone)));
        if level != AccessLevel::Null {
            self.acl
                .push(AccessControlEntry::new(user, Some(zone.to_string()), level));
        }
    }

    pub fn set_content(&mut self, content: Vec<u8>, register_checksum: bool) {
        self.checksum = register_checksum.then(|| md5_hex(&content));
        self.content = content;
    }
}

/// A specific query registered by an administrator.
///
/// Argument `i` must equal column `arg_columns[i]` of a row for the row to be
/// returned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificQueryDefinition {
    pub arg_columns: Vec<usize>,
    pub rows: Vec<Vec<String>>,
}

/// The full namespace of one zone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub zone: String,
    /// The user every request is made as.
    pub user: String,
    pub entries: BTreeMap<String, CatalogEntry>,
    #[serde(default)]
    pub specific_queries: BTreeMap<String, SpecificQueryDefinition>,
}

impl Catalog {
    /// A catalog holding `/`, `/<zone>`, `/<zone>/home` and the user's home
    /// collection, all owned by `user`.
    pub fn new(zone: &str, user: &str) -> Self {
        let mut catalog = Self {
            zone: zone.to_string(),
            user: user.to_string(),
            entries: BTreeMap::new(),
            specific_queries: BTreeMap::new(),
        };
        for path in ["/".to_string(), format!("/{zone}"), format!("/{zone}/home")] {
            catalog.insert_collection(&path);
        }
        catalog.insert_collection(&catalog.home());
        catalog
    }

    /// The user's home collection.
    pub fn home(&self) -> String {
        format!("/{}/home/{}", self.zone, self.user)
    }

    pub fn get(&self, path: &str) -> Option<&CatalogEntry> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut CatalogEntry> {
        self.entries.get_mut(path)
    }

    pub fn is_collection(&self, path: &str) -> bool {
        self.get(path).map(|e| e.kind) == Some(EntityKind::Collection)
    }

    fn insert_collection(&mut self, path: &str) {
        let entry = CatalogEntry::new(EntityKind::Collection, &self.user, &self.zone);
        self.entries.entry(path.to_string()).or_insert(entry);
    }

    /// Create a collection and any missing ancestors, bypassing checks.
    pub fn create_collection_all(&mut self, path: &str) {
        let mut current = String::from("/");
        self.insert_collection("/");
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current = join_path(&current, component);
            self.insert_collection(&current);
        }
    }

    /// Store a data object, creating parent collections, bypassing checks.
    pub fn insert_data_object(&mut self, path: &str, content: &[u8]) {
        self.create_collection_all(split_path(path).0);
        let mut entry = CatalogEntry::new(EntityKind::DataObject, &self.user, &self.zone);
        entry.set_content(content.to_vec(), true);
        self.entries.insert(path.to_string(), entry);
    }

    /// Paths of immediate children of `collection`.
    pub fn children(&self, collection: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|p| p.as_str() != "/" && split_path(p).0 == collection)
            .cloned()
            .collect()
    }

    /// Paths strictly below `collection`.
    pub fn descendants(&self, collection: &str) -> Vec<String> {
        let prefix = if collection.ends_with('/') {
            collection.to_string()
        } else {
            format!("{collection}/")
        };
        self.entries
            .keys()
            .filter(|p| p.starts_with(&prefix) && p.as_str() != collection)
            .cloned()
            .collect()
    }

    /// Level the session user holds on `path`.
    pub fn user_access(&self, path: &str) -> AccessLevel {
        self.get(path)
            .map(|e| e.access_for(&self.user, &self.zone))
            .unwrap_or(AccessLevel::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_catalog_has_home() {
        let c = Catalog::new("z", "alice");
        assert_eq!(c.home(), "/z/home/alice");
        assert!(c.is_collection("/"));
        assert!(c.is_collection("/z"));
        assert!(c.is_collection("/z/home/alice"));
        assert_eq!(c.user_access("/z/home/alice"), AccessLevel::Own);
    }

    #[test]
    fn insert_data_object_creates_parents() {
        let mut c = Catalog::new("z", "u");
        c.insert_data_object("/z/a/b/f.txt", b"abc");
        assert!(c.is_collection("/z/a"));
        assert!(c.is_collection("/z/a/b"));
        let entry = c.get("/z/a/b/f.txt").unwrap();
        assert_eq!(entry.kind, EntityKind::DataObject);
        assert_eq!(entry.checksum.as_deref(), Some("900150983cd24fb0d6963f7d28e17f72"));
    }

    #[test]
    fn children_and_descendants() {
        let mut c = Catalog::new("z", "u");
        c.insert_data_object("/z/a/f1", b"");
        c.insert_data_object("/z/a/b/f2", b"");
        assert_eq!(c.children("/z/a"), vec!["/z/a/b".to_string(), "/z/a/f1".to_string()]);
        assert_eq!(c.descendants("/z/a").len(), 3);
        assert!(c.children("/").contains(&"/z".to_string()));
    }

    #[test]
    fn set_access_replaces_and_removes() {
        let mut e = CatalogEntry::new(EntityKind::DataObject, "u", "z");
        e.set_access("bob", "z", AccessLevel::Read);
        assert_eq!(e.access_for("bob", "z"), AccessLevel::Read);
        e.set_access("bob", "z", AccessLevel::Write);
        assert_eq!(e.access_for("bob", "z"), AccessLevel::Write);
        assert_eq!(e.acl.len(), 2);
        e.set_access("bob", "z", AccessLevel::Null);
        assert_eq!(e.access_for("bob", "z"), AccessLevel::Null);
        assert_eq!(e.acl.len(), 1);
    }

    #[test]
    fn catalog_serde_roundtrip_keeps_content() {
        let mut c = Catalog::new("z", "u");
        c.insert_data_object("/z/f", &[0, 1, 255]);
        let json = serde_json::to_string(&c).unwrap();
        let back: Catalog = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("/z/f").unwrap().content, vec![0, 1, 255]);
    }
}
