use crate::config::Config;
use crate::locator;
use crate::storage::UnitLedger;
use crate::streamer::{ByteRange, RangeStreamer, Transfer};
use crate::Result;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct ReadArtifactOperation {
    config: Arc<Config>,
    ledger: Arc<UnitLedger>,
    streamer: RangeStreamer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// `<category>-<epoch>-<kind>.g`, assembled from ledger units.
    Dynamic(String),
    /// A file under the static files directory.
    Static(String),
    /// A file under the attestations directory.
    Attestation(String),
}

#[derive(Debug, Clone)]
pub struct ReadArtifactOperationRequest {
    pub source: ArtifactSource,
    pub range: Option<ByteRange>,
}

#[derive(Debug)]
pub struct ReadArtifactOperationResult {
    pub file_name: String,
    pub transfer: Transfer,
}

#[derive(Debug)]
pub enum ReadArtifactOperationOutcome {
    Found(ReadArtifactOperationResult),
    NotFound,
}

impl ReadArtifactOperation {
    pub fn new(config: Arc<Config>, ledger: Arc<UnitLedger>, streamer: RangeStreamer) -> Self {
        Self {
            config,
            ledger,
            streamer,
        }
    }

    pub fn streamer(&self) -> RangeStreamer {
        self.streamer
    }

    /// Resolve a download request to its backing files.
    ///
    /// Missing backing files map to `NotFound`; range errors propagate so the
    /// caller can answer with the artifact's total size.
    pub async fn run(&self, request: ReadArtifactOperationRequest) -> Result<ReadArtifactOperationOutcome> {
        let ReadArtifactOperationRequest { source, range } = request;

        let (file_name, paths) = match &source {
            ArtifactSource::Dynamic(name) => match self.resolve_dynamic(name).await {
                Some(paths) => (name.clone(), paths),
                None => return Ok(ReadArtifactOperationOutcome::NotFound),
            },
            ArtifactSource::Static(name) => match confined(&self.config.static_files_path, name) {
                Some(path) => (base_name(name), vec![path]),
                None => return Ok(ReadArtifactOperationOutcome::NotFound),
            },
            ArtifactSource::Attestation(name) => {
                match confined(&self.config.attestations_path, name) {
                    Some(path) => (base_name(name), vec![path]),
                    None => return Ok(ReadArtifactOperationOutcome::NotFound),
                }
            }
        };

        match self.streamer.prepare(paths, range).await {
            Ok(transfer) => Ok(ReadArtifactOperationOutcome::Found(ReadArtifactOperationResult {
                file_name,
                transfer,
            })),
            Err(error) if error.is_not_found() => {
                tracing::info!("Artifact {:?} unavailable: {}", source, error);
                Ok(ReadArtifactOperationOutcome::NotFound)
            }
            Err(error) => Err(error),
        }
    }

    async fn resolve_dynamic(&self, name: &str) -> Option<Vec<PathBuf>> {
        let stem = name.strip_suffix(".g").unwrap_or(name);
        let mut parts = stem.splitn(3, '-');
        let category = parts.next()?;
        let epoch = parts.next()?.parse::<u64>().ok()?;
        let kind = parts.next()?;

        let category_config = self.config.category(category)?;
        let unit = self.ledger.unit_for_epoch(category, epoch).await?;

        let paths = locator::resolve_named(kind, unit.index, &category_config.units_path);
        if paths.is_empty() {
            tracing::debug!("Unknown artifact kind {} requested", kind);
            return None;
        }
        Some(paths)
    }
}

/// Join `relative` onto `root`, refusing anything that could escape it.
fn confined(root: &Path, relative: &str) -> Option<PathBuf> {
    if relative.is_empty() {
        return None;
    }
    let relative = Path::new(relative);
    for component in relative.components() {
        match component {
            Component::Normal(_) => {}
            _ => return None,
        }
    }
    if relative
        .to_str()
        .is_some_and(|raw| raw.split('/').any(str::is_empty))
    {
        return None;
    }
    Some(root.join(relative))
}

fn base_name(relative: &str) -> String {
    relative.rsplit('/').next().unwrap_or(relative).to_string()
}
