use crate::error::{GenesisError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// One registered unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub index: u64,
    pub epoch: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCategory {
    pub category_name: String,
    pub units: Vec<Unit>,
}

/// On-disk ledger document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDocument {
    pub units_categories: Vec<UnitCategory>,
}

/// Latest `(epoch, index)` of a category, `(-1, -1)` when nothing is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatestUnit {
    pub epoch: i64,
    pub index: i64,
}

impl LatestUnit {
    pub const NONE: LatestUnit = LatestUnit {
        epoch: -1,
        index: -1,
    };

    pub fn is_none(&self) -> bool {
        self.index < 0
    }

    pub fn as_unit(&self) -> Option<Unit> {
        if self.is_none() {
            return None;
        }
        Some(Unit {
            index: self.index as u64,
            epoch: self.epoch as u64,
        })
    }
}

impl From<Unit> for LatestUnit {
    fn from(unit: Unit) -> Self {
        Self {
            epoch: unit.epoch as i64,
            index: unit.index as i64,
        }
    }
}

/// Locations of the ledger and its pre-mutation backup.
#[derive(Debug, Clone)]
pub struct LedgerFiles {
    pub path: PathBuf,
    pub backup_path: PathBuf,
}

/// Per-category append-only registry of units.
///
/// Appends hold the write lock across validation, backup and commit, so
/// concurrent registrations for the same category serialize and a failed
/// write leaves the in-memory state untouched.
pub struct UnitLedger {
    files: LedgerFiles,
    document: RwLock<LedgerDocument>,
}

impl UnitLedger {
    /// Load the ledger, adding empty entries for `categories` it does not know.
    ///
    /// A missing file starts an empty ledger; a file that fails to parse is an
    /// error.
    pub async fn load(files: LedgerFiles, categories: &[String]) -> Result<Self> {
        let mut document = match fs::read(&files.path).await {
            Ok(bytes) => serde_json::from_slice::<LedgerDocument>(&bytes)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "No ledger at {}, starting with an empty one",
                    files.path.display()
                );
                LedgerDocument::default()
            }
            Err(error) => return Err(error.into()),
        };

        for (position, entry) in document.units_categories.iter().enumerate() {
            for (expected, unit) in entry.units.iter().enumerate() {
                if unit.index != expected as u64 {
                    return Err(GenesisError::Config(format!(
                        "ledger entry {} ({}) is not contiguous at unit {}",
                        position, entry.category_name, expected
                    )));
                }
            }
        }

        for name in categories {
            if !document
                .units_categories
                .iter()
                .any(|entry| &entry.category_name == name)
            {
                document.units_categories.push(UnitCategory {
                    category_name: name.clone(),
                    units: Vec::new(),
                });
            }
        }

        Ok(Self::with_document(files, document))
    }

    pub fn with_document(files: LedgerFiles, document: LedgerDocument) -> Self {
        Self {
            files,
            document: RwLock::new(document),
        }
    }

    /// Register unit `index` for `category`.
    ///
    /// Accepted only when `index` equals the number of units already
    /// registered. The pre-mutation ledger is written to the backup location
    /// before the mutated ledger replaces the primary file.
    pub async fn append(&self, category: &str, index: u64, epoch: u64) -> Result<LatestUnit> {
        let mut document = self.document.write().await;

        let position = document
            .units_categories
            .iter()
            .position(|entry| entry.category_name == category)
            .ok_or_else(|| GenesisError::CategoryNotFound(category.to_string()))?;

        let expected = document.units_categories[position].units.len() as u64;
        if index != expected {
            return Err(GenesisError::SequenceGap {
                category: category.to_string(),
                expected,
                got: index,
            });
        }

        write_atomic(&self.files.backup_path, &serde_json::to_vec(&*document)?).await?;

        let mut next = document.clone();
        let unit = Unit { index, epoch };
        next.units_categories[position].units.push(unit);
        write_atomic(&self.files.path, &serde_json::to_vec(&next)?).await?;

        *document = next;

        tracing::debug!(
            "Ledger appended unit {} (epoch {}) to {}",
            index,
            epoch,
            category
        );
        Ok(unit.into())
    }

    pub async fn latest_for(&self, category: &str) -> LatestUnit {
        let document = self.document.read().await;
        document
            .units_categories
            .iter()
            .find(|entry| entry.category_name == category)
            .and_then(|entry| entry.units.last().copied())
            .map(LatestUnit::from)
            .unwrap_or(LatestUnit::NONE)
    }

    /// Newest unit of `category` belonging to `epoch`.
    pub async fn unit_for_epoch(&self, category: &str, epoch: u64) -> Option<Unit> {
        let document = self.document.read().await;
        document
            .units_categories
            .iter()
            .find(|entry| entry.category_name == category)?
            .units
            .iter()
            .rev()
            .find(|unit| unit.epoch == epoch)
            .copied()
    }

    pub async fn len(&self, category: &str) -> Option<usize> {
        let document = self.document.read().await;
        document
            .units_categories
            .iter()
            .find(|entry| entry.category_name == category)
            .map(|entry| entry.units.len())
    }

    pub async fn snapshot(&self) -> LedgerDocument {
        self.document.read().await.clone()
    }

    pub fn files(&self) -> &LedgerFiles {
        &self.files
    }
}

/// Write to a temporary sibling, fsync, then rename over `path`.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, path).await?;
    Ok(())
}
