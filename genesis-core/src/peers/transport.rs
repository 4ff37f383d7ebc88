use crate::error::{GenesisError, Result};
use crate::locator::ArtifactKind;
use crate::peers::PeerRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Digest report exchanged between mirrors. Field names match the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashReport {
    pub hash: String,
    #[serde(rename = "password")]
    pub shared_secret: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    /// Name of the node that computed `hash`.
    #[serde(rename = "name")]
    pub origin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAck {
    Accepted,
    /// The peer has no record for our (category, kind, name).
    Unknown,
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send_report(&self, peer: &PeerRecord, report: &HashReport) -> Result<PeerAck>;
}

pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn report_url(peer: &PeerRecord) -> String {
        format!("{}/hash/", peer.url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn send_report(&self, peer: &PeerRecord, report: &HashReport) -> Result<PeerAck> {
        let url = Self::report_url(peer);
        let response = self.client.post(&url).json(report).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(PeerAck::Unknown);
        }

        if !status.is_success() {
            return Err(GenesisError::Http(format!(
                "peer {} answered {} for {}",
                peer.peer, status, url
            )));
        }

        Ok(PeerAck::Accepted)
    }
}
