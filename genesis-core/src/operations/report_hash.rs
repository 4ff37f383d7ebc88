use crate::peers::{HashReport, PeerTable};
use crate::{GenesisError, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct ReportHashOperation {
    shared_secret: String,
    peer_table: Arc<PeerTable>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportHashOperationOutcome {
    Recorded,
    UnknownPeer,
}

impl ReportHashOperation {
    pub fn new(shared_secret: String, peer_table: Arc<PeerTable>) -> Self {
        Self {
            shared_secret,
            peer_table,
        }
    }

    /// Store the digest a peer mirror computed for one of our artifacts.
    pub async fn run(&self, report: HashReport) -> Result<ReportHashOperationOutcome> {
        if report.shared_secret != self.shared_secret {
            tracing::debug!("Rejected hash report from {}: bad secret", report.origin);
            return Err(GenesisError::Unauthorized);
        }

        let recorded = self
            .peer_table
            .record_report(&report.category, report.kind, &report.origin, &report.hash)
            .await;

        if !recorded {
            tracing::warn!(
                "No peer record for ({}, {}, {})",
                report.category,
                report.kind,
                report.origin
            );
            return Ok(ReportHashOperationOutcome::UnknownPeer);
        }

        tracing::debug!(
            "Peer {} reported {} for {}-{}",
            report.origin,
            report.hash,
            report.category,
            report.kind
        );
        Ok(ReportHashOperationOutcome::Recorded)
    }
}
