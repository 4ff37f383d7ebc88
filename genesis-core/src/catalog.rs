//! Read-only summary of everything downloadable, served by the listing endpoint.

use crate::config::{CategoryConfig, Config, DynamicFileConfig, StaticFileConfig};
use crate::locator::{self, ArtifactKind};
use crate::storage::{AttestationStore, UnitLedger};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub name: String,
    pub description: String,
    pub dynamic_files: Vec<DynamicFileConfig>,
    pub static_files: Vec<StaticFileConfig>,
}

impl From<&CategoryConfig> for CategorySummary {
    fn from(category: &CategoryConfig) -> Self {
        Self {
            name: category.name.clone(),
            description: category.description.clone(),
            dynamic_files: category.dynamic_files.clone(),
            static_files: category.static_files.clone(),
        }
    }
}

/// A downloadable genesis file, static or assembled from units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenesisArtifact {
    pub category: String,
    #[serde(rename = "static")]
    pub is_static: bool,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ArtifactKind>,
    /// Attestation file name, empty until peers agreed.
    #[serde(rename = "md5")]
    pub attestation: String,
    pub epoch: u64,
    pub block: u64,
    pub fullsync: bool,
    pub snapsync: bool,
    pub block_history: String,
    pub evm_history: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSnapshot {
    pub categories: Vec<CategorySummary>,
    pub genesis_files: Vec<GenesisArtifact>,
    pub generated_at: DateTime<Utc>,
}

impl Default for CatalogSnapshot {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            genesis_files: Vec::new(),
            generated_at: Utc::now(),
        }
    }
}

pub struct Catalog {
    config: Arc<Config>,
    ledger: Arc<UnitLedger>,
    attestations: AttestationStore,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
}

impl Catalog {
    pub fn new(config: Arc<Config>, ledger: Arc<UnitLedger>, attestations: AttestationStore) -> Self {
        Self {
            config,
            ledger,
            attestations,
            snapshot: RwLock::new(Arc::new(CatalogSnapshot::default())),
        }
    }

    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Rebuild the snapshot from the ledger and the filesystem.
    pub async fn refresh(&self) -> Arc<CatalogSnapshot> {
        let mut genesis_files = Vec::new();

        for category in &self.config.categories {
            for file in &category.static_files {
                genesis_files.push(GenesisArtifact {
                    category: category.name.clone(),
                    is_static: true,
                    name: file.name.clone(),
                    kind: None,
                    attestation: file.md5.clone(),
                    epoch: file.epoch,
                    block: file.block,
                    fullsync: file.fullsync,
                    snapsync: file.snapsync,
                    block_history: file.block_history.clone(),
                    evm_history: file.evm_history.clone(),
                    file_size: file.file_size,
                });
            }

            let Some(latest) = self.ledger.latest_for(&category.name).await.as_unit() else {
                tracing::debug!("Category {} has no units yet", category.name);
                continue;
            };

            for file in &category.dynamic_files {
                let attestation = if self
                    .attestations
                    .exists(&category.name, latest.epoch, file.kind)
                    .await
                {
                    self.attestations
                        .file_name(&category.name, latest.epoch, file.kind)
                } else {
                    String::new()
                };

                let units = locator::resolve(file.kind, latest.index, &category.units_path);

                genesis_files.push(GenesisArtifact {
                    category: category.name.clone(),
                    is_static: false,
                    name: locator::artifact_file_name(&category.name, latest.epoch, file.kind),
                    kind: Some(file.kind),
                    attestation,
                    epoch: latest.epoch,
                    block: 0,
                    fullsync: file.fullsync,
                    snapsync: file.snapsync,
                    block_history: file.block_history.clone(),
                    evm_history: file.evm_history.clone(),
                    file_size: total_size(&units).await,
                });
            }
        }

        let snapshot = Arc::new(CatalogSnapshot {
            categories: self.config.categories.iter().map(CategorySummary::from).collect(),
            genesis_files,
            generated_at: Utc::now(),
        });

        *self.snapshot.write().await = snapshot.clone();
        snapshot
    }
}

async fn total_size(units: &[std::path::PathBuf]) -> u64 {
    let mut total = 0;
    for unit in units {
        match tokio::fs::metadata(unit).await {
            Ok(meta) => total += meta.len(),
            Err(error) => {
                tracing::warn!("Cannot stat unit {}: {}", unit.display(), error);
            }
        }
    }
    total
}
