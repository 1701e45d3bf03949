use serde::{Deserialize, Serialize};

/// What to do when a locally computed checksum disagrees with the server's.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// Log a warning and report the transfer as successful.
    #[default]
    Warn,
    /// Report the transfer as failed.
    Fail,
}

/// Options recognised by write, create and remove operations.
///
/// Each flag maps to one server-side request keyword.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOptions {
    /// Ask the server to compute and register a checksum for stored bytes.
    pub checksum_on_write: bool,
    /// Hold an exclusive write lock for the duration of a transfer.
    pub write_lock: bool,
    /// Create or remove collections recursively.
    pub recursive: bool,
    /// Remove without moving to trash.
    pub force: bool,
    /// Checksum verification policy after a streamed transfer.
    pub checksum_policy: ChecksumPolicy,
}

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checksum(mut self) -> Self {
        self.checksum_on_write = true;
        self
    }

    pub fn with_write_lock(mut self) -> Self {
        self.write_lock = true;
        self
    }

    pub fn with_recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }
}

/// Extra detail to include when describing paths in list and search results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    pub avu: bool,
    pub acl: bool,
    pub checksum: bool,
    pub size: bool,
    /// For collections, include immediate children.
    pub contents: bool,
}

impl ListOptions {
    pub fn any_decoration(&self) -> bool {
        self.avu || self.acl || self.checksum || self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_off() {
        let o = OperationOptions::default();
        assert!(!o.checksum_on_write && !o.write_lock && !o.recursive && !o.force);
        assert_eq!(o.checksum_policy, ChecksumPolicy::Warn);
    }

    #[test]
    fn builder() {
        let o = OperationOptions::new()
            .with_checksum()
            .with_recursive()
            .with_checksum_policy(ChecksumPolicy::Fail);
        assert!(o.checksum_on_write);
        assert!(o.recursive);
        assert!(!o.force);
        assert_eq!(o.checksum_policy, ChecksumPolicy::Fail);
    }

    #[test]
    fn policy_serde_names() {
        let p: ChecksumPolicy = serde_json::from_str("\"fail\"").unwrap();
        assert_eq!(p, ChecksumPolicy::Fail);
    }

    #[test]
    fn list_decoration() {
        assert!(!ListOptions::default().any_decoration());
        let o = ListOptions {
            size: true,
            ..Default::default()
        };
        assert!(o.any_decoration());
    }
}
