use serde::{Deserialize, Serialize};
use sha2::digest::DynDigest;

/// Content hash used for attestations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }

    pub fn hasher(self) -> ArtifactHasher {
        let inner: Box<dyn DynDigest + Send> = match self {
            Self::Md5 => Box::new(md5::Md5::default()),
            Self::Sha256 => Box::new(sha2::Sha256::default()),
        };
        ArtifactHasher { inner, bytes: 0 }
    }
}

/// Incremental hasher over a concatenated artifact. Order sensitive.
pub struct ArtifactHasher {
    inner: Box<dyn DynDigest + Send>,
    bytes: u64,
}

impl ArtifactHasher {
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.bytes += data.len() as u64;
    }

    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Hex-encoded digest.
    pub fn finalize(self) -> String {
        hex::encode(self.inner.finalize())
    }
}
