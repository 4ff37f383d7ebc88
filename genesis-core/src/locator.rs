//! Mapping from an artifact kind to the unit files that make it up.
//!
//! A genesis artifact is never stored as one file. It is the concatenation of
//! unit files laid out under a category's `units_path`:
//!
//! ```text
//! <units_path>/blocks/brs-<index>.g
//! <units_path>/epochs/ers-<index>.g
//! <units_path>/evm/evm-<index>.g
//! ```
//!
//! Nothing here touches the filesystem; missing files surface when the
//! artifact is streamed or hashed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Unit sub-streams, in the order they are concatenated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitType {
    Blocks,
    Epochs,
    Evm,
}

impl UnitType {
    pub const ALL: [UnitType; 3] = [UnitType::Blocks, UnitType::Epochs, UnitType::Evm];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Epochs => "epochs",
            Self::Evm => "evm",
        }
    }

    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Blocks => "brs",
            Self::Epochs => "ers",
            Self::Evm => "evm",
        }
    }

    pub fn unit_path(self, units_path: &Path, index: u64) -> PathBuf {
        units_path
            .join(self.dir_name())
            .join(format!("{}-{}.g", self.file_prefix(), index))
    }
}

/// Assembly rule for a downloadable artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Every unit type, full history.
    #[serde(rename = "full", alias = "full-mpt")]
    Full,
    /// Full block and epoch history, EVM state only at the latest unit.
    #[serde(rename = "pruned", alias = "pruned-mpt")]
    Pruned,
    /// Block and epoch history, no EVM state.
    #[serde(rename = "none", alias = "no-mpt", alias = "minimal")]
    Minimal,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Pruned => "pruned",
            Self::Minimal => "none",
        }
    }

    /// Accepts the canonical names and the legacy `*-mpt` spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "full" | "full-mpt" => Some(Self::Full),
            "pruned" | "pruned-mpt" => Some(Self::Pruned),
            "none" | "no-mpt" | "minimal" => Some(Self::Minimal),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown artifact kind: {}", s))
    }
}

/// Ordered unit files composing `kind` when `latest_index` is the newest unit.
pub fn resolve(kind: ArtifactKind, latest_index: u64, units_path: &Path) -> Vec<PathBuf> {
    let mut units = Vec::new();

    for unit_type in UnitType::ALL {
        match (kind, unit_type) {
            (ArtifactKind::Minimal, UnitType::Evm) => {}
            (ArtifactKind::Pruned, UnitType::Evm) => {
                units.push(unit_type.unit_path(units_path, latest_index));
            }
            _ => {
                units.extend((0..=latest_index).map(|index| unit_type.unit_path(units_path, index)));
            }
        }
    }

    units
}

/// Like [`resolve`] but keyed by the kind's wire name. Unknown names resolve
/// to nothing, which callers treat as not found.
pub fn resolve_named(kind: &str, latest_index: u64, units_path: &Path) -> Vec<PathBuf> {
    match ArtifactKind::from_name(kind) {
        Some(kind) => resolve(kind, latest_index, units_path),
        None => Vec::new(),
    }
}

/// File name clients download a dynamic artifact under.
pub fn artifact_file_name(category: &str, epoch: u64, kind: ArtifactKind) -> String {
    format!("{}-{}-{}.g", category, epoch, kind)
}
