use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use baton_client::ClientEnv;
use baton_rpc::{Catalog, InMemoryServer};
use baton_types::ChecksumPolicy;

/// Default transfer buffer, 1 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub session: ClientEnv,
    pub transfer: TransferConfig,
    pub sandbox: SandboxConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub buffer_size: usize,
    pub checksum_policy: ChecksumPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            checksum_policy: ChecksumPolicy::Warn,
        }
    }
}

/// Where the local catalog lives between runs. Without a state file every run
/// starts from an empty zone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub state_file: Option<PathBuf>,
}

impl CliConfig {
    /// Load from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Open the catalog named by the sandbox state file, or a fresh one for
    /// the session's zone and user.
    pub fn open_sandbox(&self) -> anyhow::Result<InMemoryServer> {
        let catalog = match &self.sandbox.state_file {
            Some(path) if path.exists() => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read sandbox {}", path.display()))?;
                let catalog: Catalog = serde_json::from_str(&text)
                    .with_context(|| format!("invalid sandbox {}", path.display()))?;
                debug!(path = %path.display(), entries = catalog.entries.len(), "opened sandbox");
                catalog
            }
            _ => Catalog::new(&self.session.zone, &self.session.user),
        };
        Ok(InMemoryServer::from_catalog(catalog))
    }

    /// Persist `server`'s catalog if a state file is configured.
    pub fn save_sandbox(&self, server: InMemoryServer) -> anyhow::Result<()> {
        let Some(path) = &self.sandbox.state_file else {
            return Ok(());
        };
        let catalog = server.into_catalog();
        let text = serde_json::to_string_pretty(&catalog)?;
        fs::write(path, text)
            .with_context(|| format!("failed to write sandbox {}", path.display()))?;
        info!(path = %path.display(), entries = catalog.entries.len(), "saved sandbox");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = CliConfig::default();
        assert_eq!(c.session.zone, "testZone");
        assert_eq!(c.session.home, "/testZone/home/irods");
        assert_eq!(c.transfer.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(c.transfer.checksum_policy, ChecksumPolicy::Warn);
        assert!(c.sandbox.state_file.is_none());
    }

    #[test]
    fn partial_toml() {
        let c = CliConfig::from_toml_str(
            r#"
            [session]
            zone = "seq"
            user = "alice"
            home = "/seq/home/alice"
            cwd = "/seq/home/alice/runs"

            [transfer]
            checksum_policy = "fail"
            "#,
        )
        .unwrap();
        assert_eq!(c.session.user, "alice");
        assert_eq!(c.session.cwd, "/seq/home/alice/runs");
        assert_eq!(c.transfer.checksum_policy, ChecksumPolicy::Fail);
        assert_eq!(c.transfer.buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn bad_toml_rejected() {
        assert!(CliConfig::from_toml_str("[transfer]\nbuffer_size = \"big\"").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn sandbox_persists_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CliConfig::default();
        config.sandbox.state_file = Some(dir.path().join("state.json"));

        let mut server = config.open_sandbox().unwrap();
        server.seed_data_object("/testZone/home/irods/a.txt", b"abc");
        config.save_sandbox(server).unwrap();

        let reopened = config.open_sandbox().unwrap();
        assert_eq!(reopened.content("/testZone/home/irods/a.txt"), Some(&b"abc"[..]));
    }

    #[test]
    fn no_state_file_starts_empty() {
        let config = CliConfig::default();
        let server = config.open_sandbox().unwrap();
        assert!(server.exists("/testZone/home/irods"));
        config.save_sandbox(server).unwrap();
    }
}
