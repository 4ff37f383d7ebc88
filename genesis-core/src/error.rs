use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Unit file missing: {}", .0.display())]
    UnitMissing(PathBuf),

    #[error("Unit file truncated: {}", .0.display())]
    TruncatedUnit(PathBuf),

    #[error("Sequence gap in category {category}: expected index {expected}, got {got}")]
    SequenceGap {
        category: String,
        expected: u64,
        got: u64,
    },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Range not satisfiable: {from}-{to:?} of {total}")]
    RangeNotSatisfiable {
        from: u64,
        to: Option<u64>,
        total: u64,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GenesisError {
    /// True for the errors a caller sees as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CategoryNotFound(_) | Self::ArtifactNotFound(_) | Self::UnitMissing(_)
        )
    }
}

impl From<reqwest::Error> for GenesisError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.to_string())
    }
}

impl From<config::ConfigError> for GenesisError {
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GenesisError>;
