use crate::config::Config;
use crate::locator::ArtifactKind;
use serde::Serialize;
use tokio::sync::Mutex;

/// Last digest a peer mirror reported for a `(category, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerRecord {
    pub category: String,
    pub kind: ArtifactKind,
    pub peer: String,
    pub url: String,
    /// Empty until the peer reports during the current round.
    pub hash: String,
}

impl PeerRecord {
    fn matches(&self, category: &str, kind: ArtifactKind) -> bool {
        self.category == category && self.kind == kind
    }
}

/// Process-wide table of peer reports.
///
/// All mutations are index-based updates made while holding the lock; nothing
/// is held across network calls.
#[derive(Debug, Default)]
pub struct PeerTable {
    records: Mutex<Vec<PeerRecord>>,
}

impl PeerTable {
    pub fn new(records: Vec<PeerRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// One record per (category, dynamic kind, peer) in `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut records = Vec::new();
        for category in &config.categories {
            for peer in &category.peers {
                for kind in category.kinds() {
                    records.push(PeerRecord {
                        category: category.name.clone(),
                        kind,
                        peer: peer.name.clone(),
                        url: peer.url.clone(),
                        hash: String::new(),
                    });
                }
            }
        }
        Self::new(records)
    }

    /// Clear every report for `(category, kind)` and return the peers to notify.
    pub async fn reset(&self, category: &str, kind: ArtifactKind) -> Vec<PeerRecord> {
        let mut records = self.records.lock().await;
        let mut peers = Vec::new();
        for record in records.iter_mut().filter(|record| record.matches(category, kind)) {
            record.hash.clear();
            peers.push(record.clone());
        }
        peers
    }

    /// Record `hash` as reported by `peer`. Returns `false` if no such record.
    pub async fn record_report(
        &self,
        category: &str,
        kind: ArtifactKind,
        peer: &str,
        hash: &str,
    ) -> bool {
        let mut records = self.records.lock().await;
        let position = records
            .iter()
            .position(|record| record.matches(category, kind) && record.peer == peer);

        match position {
            Some(index) => {
                records[index].hash = hash.to_string();
                true
            }
            None => false,
        }
    }

    /// True when every peer of `(category, kind)` reported exactly `digest`.
    pub async fn all_agree(&self, category: &str, kind: ArtifactKind, digest: &str) -> bool {
        let records = self.records.lock().await;
        records
            .iter()
            .filter(|record| record.matches(category, kind))
            .all(|record| record.hash == digest)
    }

    /// Peers of `(category, kind)` whose report differs from `digest`.
    pub async fn disagreeing(&self, category: &str, kind: ArtifactKind, digest: &str) -> Vec<PeerRecord> {
        let records = self.records.lock().await;
        records
            .iter()
            .filter(|record| record.matches(category, kind) && record.hash != digest)
            .cloned()
            .collect()
    }

    pub async fn snapshot(&self) -> Vec<PeerRecord> {
        self.records.lock().await.clone()
    }
}
