use serde::{Deserialize, Serialize};

/// Session environment used to resolve relative paths and scope queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientEnv {
    pub user: String,
    pub zone: String,
    /// Home collection, `/<zone>/home/<user>` unless configured.
    pub home: String,
    /// Working collection that relative paths are joined to.
    pub cwd: String,
    pub default_resource: Option<String>,
}

impl ClientEnv {
    pub fn new(zone: &str, user: &str) -> Self {
        let home = format!("/{zone}/home/{user}");
        Self {
            user: user.to_string(),
            zone: zone.to_string(),
            cwd: home.clone(),
            home,
            default_resource: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }
}

impl Default for ClientEnv {
    fn default() -> Self {
        Self::new("testZone", "irods")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_and_cwd_default_to_user_home() {
        let env = ClientEnv::new("z", "alice");
        assert_eq!(env.home, "/z/home/alice");
        assert_eq!(env.cwd, "/z/home/alice");
        assert_eq!(env.with_cwd("/z/tmp").cwd, "/z/tmp");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let env: ClientEnv = serde_json::from_str(r#"{"cwd": "/testZone/x"}"#).unwrap();
        assert_eq!(env.cwd, "/testZone/x");
        assert_eq!(env.user, "irods");
        assert!(env.default_resource.is_none());
    }
}
