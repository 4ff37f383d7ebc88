use crate::digest::DigestAlgorithm;
use crate::error::Result;
use crate::locator::{ArtifactKind, artifact_file_name};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use ulid::Ulid;

/// Attestation files, one per `(category, epoch, kind)`.
///
/// The presence of a file is the durable record that every peer agreed on the
/// digest it contains.
#[derive(Debug, Clone)]
pub struct AttestationStore {
    base_path: PathBuf,
    algorithm: DigestAlgorithm,
}

impl AttestationStore {
    pub fn new(base_path: PathBuf, algorithm: DigestAlgorithm) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            algorithm,
        })
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn file_name(&self, category: &str, epoch: u64, kind: ArtifactKind) -> String {
        format!(
            "{}.{}",
            artifact_file_name(category, epoch, kind),
            self.algorithm.extension()
        )
    }

    pub fn path(&self, category: &str, epoch: u64, kind: ArtifactKind) -> PathBuf {
        self.base_path.join(self.file_name(category, epoch, kind))
    }

    pub async fn exists(&self, category: &str, epoch: u64, kind: ArtifactKind) -> bool {
        fs::try_exists(self.path(category, epoch, kind))
            .await
            .unwrap_or(false)
    }

    pub async fn read(&self, category: &str, epoch: u64, kind: ArtifactKind) -> Result<Option<String>> {
        match fs::read_to_string(self.path(category, epoch, kind)).await {
            Ok(digest) => Ok(Some(digest)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Persist `digest` unless an attestation already exists.
    ///
    /// Returns `false` when another round got there first; the existing file
    /// is never overwritten.
    pub async fn write_if_absent(
        &self,
        category: &str,
        epoch: u64,
        kind: ArtifactKind,
        digest: &str,
    ) -> Result<bool> {
        let path = self.path(category, epoch, kind);
        let temp_path = self.base_path.join(format!(
            ".{}.{}.partial",
            self.file_name(category, epoch, kind),
            Ulid::new()
        ));

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(digest.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        // hard_link fails with AlreadyExists instead of replacing the target
        let linked = match fs::hard_link(&temp_path, &path).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(error) => Err(error),
        };
        let _ = fs::remove_file(&temp_path).await;

        let written = linked?;
        if written {
            tracing::info!("Wrote attestation {}", path.display());
        }
        Ok(written)
    }
}
