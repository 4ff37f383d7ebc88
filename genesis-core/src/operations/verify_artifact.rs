use crate::catalog::Catalog;
use crate::config::Config;
use crate::locator::{self, ArtifactKind};
use crate::peers::{HashReport, PeerAck, PeerRecord, PeerTable, PeerTransport};
use crate::storage::AttestationStore;
use crate::streamer::{RangeStreamer, TransferOutcome};
use crate::{GenesisError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Phases of a consensus round, in order. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Queued,
    Computing,
    Broadcasting,
    AwaitingQuorum,
    Attested,
    AlreadyAttested,
    Abandoned,
}

impl RoundPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Attested | Self::AlreadyAttested | Self::Abandoned)
    }
}

#[derive(Debug, Clone)]
pub struct VerifyArtifactOperationRequest {
    pub category: String,
    pub kind: ArtifactKind,
    pub epoch: u64,
    pub latest_index: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyArtifactOperationOutcome {
    Attested { digest: String },
    AlreadyAttested,
    Abandoned { digest: Option<String>, reason: String },
}

#[derive(Debug, Clone, Copy)]
pub struct QuorumSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

/// Hashes a freshly produced artifact, exchanges the digest with the
/// category's peer mirrors and writes the attestation once all of them agree.
#[derive(Clone)]
pub struct VerifyArtifactOperation {
    config: Arc<Config>,
    peer_table: Arc<PeerTable>,
    transport: Arc<dyn PeerTransport>,
    attestations: AttestationStore,
    catalog: Arc<Catalog>,
    streamer: RangeStreamer,
    quorum: QuorumSettings,
}

impl VerifyArtifactOperation {
    pub fn new(
        config: Arc<Config>,
        peer_table: Arc<PeerTable>,
        transport: Arc<dyn PeerTransport>,
        attestations: AttestationStore,
        catalog: Arc<Catalog>,
    ) -> Self {
        let quorum = QuorumSettings {
            poll_interval: config.consensus.poll_interval(),
            timeout: config.consensus.round_timeout(),
        };
        let streamer = RangeStreamer::new(config.buffer_size);

        Self {
            config,
            peer_table,
            transport,
            attestations,
            catalog,
            streamer,
            quorum,
        }
    }

    pub fn with_quorum_settings(mut self, quorum: QuorumSettings) -> Self {
        self.quorum = quorum;
        self
    }

    pub async fn run<F>(
        &self,
        request: VerifyArtifactOperationRequest,
        observe: F,
    ) -> Result<VerifyArtifactOperationOutcome>
    where
        F: Fn(RoundPhase, Option<&str>) + Send + Sync,
    {
        let VerifyArtifactOperationRequest {
            category,
            kind,
            epoch,
            latest_index,
            cancel,
        } = request;

        let category_config = self
            .config
            .category(&category)
            .ok_or_else(|| GenesisError::CategoryNotFound(category.clone()))?;

        if self.attestations.exists(&category, epoch, kind).await {
            tracing::info!(
                "Attestation for {}-{}-{} already exists, skipping round",
                category,
                epoch,
                kind
            );
            return Ok(VerifyArtifactOperationOutcome::AlreadyAttested);
        }

        observe(RoundPhase::Computing, None);
        let units = locator::resolve(kind, latest_index, &category_config.units_path);
        let transfer = self.streamer.prepare(units, None).await?;

        let mut hasher = self.attestations.algorithm().hasher();
        if let TransferOutcome::Cancelled { .. } =
            self.streamer.pump(&transfer, &mut hasher, &cancel).await?
        {
            return Ok(VerifyArtifactOperationOutcome::Abandoned {
                digest: None,
                reason: "cancelled while hashing".to_string(),
            });
        }
        let hashed = hasher.bytes_hashed();
        let digest = hasher.finalize();
        tracing::info!(
            "Computed digest {} for {}-{}-{} over {} bytes",
            digest,
            category,
            epoch,
            kind,
            hashed
        );

        observe(RoundPhase::Broadcasting, Some(&digest));
        let peers = self.peer_table.reset(&category, kind).await;
        let report = HashReport {
            hash: digest.clone(),
            shared_secret: self.config.shared_secret.clone(),
            category: category.clone(),
            kind,
            origin: self.config.server_name.clone(),
        };
        self.broadcast(&peers, &report).await;

        observe(RoundPhase::AwaitingQuorum, Some(&digest));
        let deadline = Instant::now() + self.quorum.timeout;
        loop {
            if self.peer_table.all_agree(&category, kind, &digest).await {
                break;
            }

            if Instant::now() >= deadline {
                let pending: Vec<String> = self
                    .peer_table
                    .disagreeing(&category, kind, &digest)
                    .await
                    .into_iter()
                    .map(|record| {
                        if record.hash.is_empty() {
                            format!("{} (no report)", record.peer)
                        } else {
                            format!("{} ({})", record.peer, record.hash)
                        }
                    })
                    .collect();
                tracing::error!(
                    "Quorum not reached for {}-{}-{} with digest {}; diverging peers: {}",
                    category,
                    epoch,
                    kind,
                    digest,
                    pending.join(", ")
                );
                return Ok(VerifyArtifactOperationOutcome::Abandoned {
                    digest: Some(digest),
                    reason: format!("quorum timeout, waiting on {}", pending.join(", ")),
                });
            }

            let wait = self
                .quorum
                .poll_interval
                .min(deadline.saturating_duration_since(Instant::now()));
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Ok(VerifyArtifactOperationOutcome::Abandoned {
                        digest: Some(digest),
                        reason: "cancelled while awaiting quorum".to_string(),
                    });
                }
                _ = tokio::time::sleep(wait) => {}
            }

            // peers reset their table when their own round starts, so keep repeating ours
            let missing = self.peer_table.disagreeing(&category, kind, &digest).await;
            if !missing.is_empty() {
                self.broadcast(&peers, &report).await;
            }
        }

        // a peer whose own round reset its table after our last send still
        // lacks our report, and quorum here does not imply quorum there
        if !peers.is_empty() {
            self.broadcast(&peers, &report).await;
        }

        if !self
            .attestations
            .write_if_absent(&category, epoch, kind, &digest)
            .await?
        {
            return Ok(VerifyArtifactOperationOutcome::AlreadyAttested);
        }

        self.catalog.refresh().await;
        tracing::info!("Peers agreed on {}-{}-{}: {}", category, epoch, kind, digest);

        Ok(VerifyArtifactOperationOutcome::Attested { digest })
    }

    async fn broadcast(&self, peers: &[PeerRecord], report: &HashReport) {
        let sends = peers.iter().map(|peer| async move {
            match self.transport.send_report(peer, report).await {
                Ok(PeerAck::Accepted) => {
                    tracing::debug!("Peer {} accepted digest for {}", peer.peer, report.category);
                }
                Ok(PeerAck::Unknown) => {
                    tracing::warn!(
                        "Peer {} does not know ({}, {}, {})",
                        peer.peer,
                        report.category,
                        report.kind,
                        report.origin
                    );
                }
                Err(error) => {
                    tracing::warn!("Failed to send digest to peer {}: {}", peer.peer, error);
                }
            }
        });

        futures_util::future::join_all(sends).await;
    }
}
