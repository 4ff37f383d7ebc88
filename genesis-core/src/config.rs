use crate::digest::DigestAlgorithm;
use crate::error::{GenesisError, Result};
use crate::locator::ArtifactKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name this node reports itself as when broadcasting digests.
    pub server_name: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub backup_db_path: PathBuf,
    pub attestations_path: PathBuf,
    pub static_files_path: PathBuf,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    pub shared_secret: String,
    #[serde(default = "default_max_concurrent_transfers")]
    pub max_concurrent_transfers: usize,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub units_path: PathBuf,
    #[serde(default)]
    pub peers: Vec<PeerMirror>,
    #[serde(default)]
    pub dynamic_files: Vec<DynamicFileConfig>,
    #[serde(default)]
    pub static_files: Vec<StaticFileConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMirror {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicFileConfig {
    pub kind: ArtifactKind,
    #[serde(default)]
    pub fullsync: bool,
    #[serde(default)]
    pub snapsync: bool,
    #[serde(default)]
    pub block_history: String,
    #[serde(default)]
    pub evm_history: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticFileConfig {
    pub name: String,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub epoch: u64,
    #[serde(default)]
    pub block: u64,
    #[serde(default)]
    pub fullsync: bool,
    #[serde(default)]
    pub snapsync: bool,
    #[serde(default)]
    pub block_history: String,
    #[serde(default)]
    pub evm_history: String,
    #[serde(default)]
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_round_timeout_secs")]
    pub round_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_rounds")]
    pub max_concurrent_rounds: usize,
    #[serde(default)]
    pub digest: DigestAlgorithm,
    #[serde(default = "default_peer_request_timeout_secs")]
    pub peer_request_timeout_secs: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            round_timeout_secs: default_round_timeout_secs(),
            max_concurrent_rounds: default_max_concurrent_rounds(),
            digest: DigestAlgorithm::default(),
            peer_request_timeout_secs: default_peer_request_timeout_secs(),
        }
    }
}

impl ConsensusConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_secs)
    }

    pub fn peer_request_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_request_timeout_secs)
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_buffer_size() -> usize {
    64 * 1024
}

fn default_max_concurrent_transfers() -> usize {
    64
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_round_timeout_secs() -> u64 {
    60 * 60
}

fn default_max_concurrent_rounds() -> usize {
    4
}

fn default_peer_request_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("GENESIS"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shared_secret.trim().is_empty() {
            return Err(GenesisError::Config(
                "shared_secret cannot be empty".to_string(),
            ));
        }

        if self.buffer_size == 0 {
            return Err(GenesisError::Config(
                "buffer_size must be greater than zero".to_string(),
            ));
        }

        if self.max_concurrent_transfers == 0 || self.consensus.max_concurrent_rounds == 0 {
            return Err(GenesisError::Config(
                "concurrency limits must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.name.is_empty() || category.name.contains('-') {
                return Err(GenesisError::Config(format!(
                    "invalid category name '{}': must be non-empty and contain no '-'",
                    category.name
                )));
            }

            if !seen.insert(category.name.as_str()) {
                return Err(GenesisError::Config(format!(
                    "duplicate category: {}",
                    category.name
                )));
            }

            let mut kinds = HashSet::new();
            for file in &category.dynamic_files {
                if !kinds.insert(file.kind) {
                    return Err(GenesisError::Config(format!(
                        "category '{}' lists dynamic kind {} more than once",
                        category.name, file.kind
                    )));
                }
            }

            for peer in &category.peers {
                if peer.name.trim().is_empty() || peer.url.trim().is_empty() {
                    return Err(GenesisError::Config(format!(
                        "peer in category '{}' needs both name and url",
                        category.name
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn category(&self, name: &str) -> Option<&CategoryConfig> {
        self.categories.iter().find(|category| category.name == name)
    }
}

impl CategoryConfig {
    pub fn kinds(&self) -> impl Iterator<Item = ArtifactKind> + '_ {
        self.dynamic_files.iter().map(|file| file.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
server_name: node-a
db_path: /var/lib/genesis/db.json
backup_db_path: /var/lib/genesis/db.backup.json
attestations_path: /var/lib/genesis/md5
static_files_path: /var/lib/genesis/static
shared_secret: hunter2
consensus:
  poll_interval_secs: 5
  digest: sha256
categories:
  - name: mainnet
    units_path: /srv/units/mainnet
    peers:
      - name: node-b
        url: http://node-b:8080
    dynamic_files:
      - kind: full-mpt
      - kind: pruned
        snapsync: true
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml_with_defaults() {
        let file = write_config(SAMPLE);
        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.server_name, "node-a");
        assert_eq!(config.buffer_size, 64 * 1024);
        assert_eq!(config.consensus.poll_interval_secs, 5);
        assert_eq!(config.consensus.round_timeout_secs, 3600);
        assert_eq!(config.consensus.digest, DigestAlgorithm::Sha256);

        let category = config.category("mainnet").unwrap();
        let kinds: Vec<_> = category.kinds().collect();
        assert_eq!(kinds, vec![ArtifactKind::Full, ArtifactKind::Pruned]);
        assert_eq!(category.peers[0].name, "node-b");
    }

    #[test]
    fn test_rejects_dashed_category_name() {
        let file = write_config(&SAMPLE.replace("name: mainnet", "name: main-net"));
        let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, GenesisError::Config(_)));
    }

    #[test]
    fn test_rejects_repeated_dynamic_kind() {
        let file = write_config(&SAMPLE.replace(
            "      - kind: pruned\n",
            "      - kind: full\n      - kind: pruned\n",
        ));
        let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
        let GenesisError::Config(message) = err else {
            panic!("expected config error, got {err:?}");
        };
        assert!(message.contains("full"), "{message}");
    }

    #[test]
    fn test_rejects_empty_secret() {
        let file = write_config(&SAMPLE.replace("shared_secret: hunter2", "shared_secret: \"\""));
        assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
    }
}
