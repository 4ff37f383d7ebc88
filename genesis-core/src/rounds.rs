//! Background scheduling of consensus rounds.
//!
//! Every registration fans out into one round per artifact kind. Rounds run as
//! tokio tasks bounded by a semaphore, and each one publishes its progress
//! through a watch channel so callers can list or await them.

use crate::locator::ArtifactKind;
use crate::operations::{
    RoundPhase, VerifyArtifactOperation, VerifyArtifactOperationOutcome,
    VerifyArtifactOperationRequest,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

/// Finished rounds kept for inspection before the oldest are dropped.
const MAX_FINISHED_ROUNDS: usize = 256;

pub type RoundId = Ulid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoundKey {
    pub category: String,
    pub kind: ArtifactKind,
    pub epoch: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundStatus {
    pub id: String,
    pub category: String,
    pub kind: ArtifactKind,
    pub epoch: u64,
    pub latest_index: u64,
    pub phase: RoundPhase,
    pub digest: Option<String>,
    pub reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RoundStatus {
    fn key(&self) -> RoundKey {
        RoundKey {
            category: self.category.clone(),
            kind: self.kind,
            epoch: self.epoch,
        }
    }
}

type RoundMap = HashMap<RoundId, Arc<watch::Sender<RoundStatus>>>;

/// Rounds sharing a lane share one set of peer table entries.
type Lane = (String, ArtifactKind);

#[derive(Default)]
struct RoundTable {
    rounds: RoundMap,
    /// Newest round triggered on each lane.
    lanes: HashMap<Lane, RoundId>,
}

pub struct RoundScheduler {
    operation: VerifyArtifactOperation,
    permits: Arc<Semaphore>,
    table: Mutex<RoundTable>,
    shutdown: CancellationToken,
}

impl RoundScheduler {
    pub fn new(operation: VerifyArtifactOperation, max_concurrent_rounds: usize) -> Self {
        Self {
            operation,
            permits: Arc::new(Semaphore::new(max_concurrent_rounds.max(1))),
            table: Mutex::new(RoundTable::default()),
            shutdown: CancellationToken::new(),
        }
    }

    fn table(&self) -> MutexGuard<'_, RoundTable> {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a round for `(category, kind, epoch)`.
    ///
    /// If one is already in flight for the same key its id is returned and
    /// nothing new is spawned. Rounds for other epochs of the same
    /// `(category, kind)` run one after another, oldest first.
    pub fn trigger(&self, category: &str, kind: ArtifactKind, epoch: u64, latest_index: u64) -> RoundId {
        let key = RoundKey {
            category: category.to_string(),
            kind,
            epoch,
        };

        let mut table = self.table();
        if let Some((id, _)) = table.rounds.iter().find(|(_, status)| {
            let status = status.borrow();
            !status.phase.is_terminal() && status.key() == key
        }) {
            tracing::info!(
                "Round {} already running for {}-{}-{}",
                id,
                category,
                epoch,
                kind
            );
            return *id;
        }

        prune_finished(&mut table.rounds);

        let id = Ulid::new();
        let (status_tx, _) = watch::channel(RoundStatus {
            id: id.to_string(),
            category: category.to_string(),
            kind,
            epoch,
            latest_index,
            phase: RoundPhase::Queued,
            digest: None,
            reason: None,
            started_at: Utc::now(),
            finished_at: None,
        });
        let status_tx = Arc::new(status_tx);
        table.rounds.insert(id, status_tx.clone());

        let lane = (category.to_string(), kind);
        let predecessor = table
            .lanes
            .get(&lane)
            .and_then(|previous| Some((*previous, table.rounds.get(previous)?)))
            .filter(|(_, status)| !status.borrow().phase.is_terminal())
            .map(|(previous, status)| (previous, status.subscribe()));
        table.lanes.insert(lane, id);
        drop(table);

        let request = VerifyArtifactOperationRequest {
            category: category.to_string(),
            kind,
            epoch,
            latest_index,
            cancel: self.shutdown.child_token(),
        };
        let operation = self.operation.clone();
        let permits = self.permits.clone();

        tracing::info!("Queued round {} for {}-{}-{}", id, category, epoch, kind);
        tokio::spawn(async move {
            let cancel = request.cancel.clone();

            if let Some((previous, mut previous_rx)) = predecessor {
                tracing::info!("Round {} waits for round {} on the same lane", id, previous);
                let drained = async {
                    // a dropped sender means the previous round is gone too
                    let _ = previous_rx.wait_for(|status| status.phase.is_terminal()).await;
                };
                tokio::select! {
                    _ = drained => {}
                    _ = cancel.cancelled() => {
                        finish(&status_tx, RoundPhase::Abandoned, None, Some("cancelled before start".to_string()));
                        return;
                    }
                }
            }

            let _permit = tokio::select! {
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        finish(&status_tx, RoundPhase::Abandoned, None, Some("scheduler closed".to_string()));
                        return;
                    }
                },
                _ = cancel.cancelled() => {
                    finish(&status_tx, RoundPhase::Abandoned, None, Some("cancelled before start".to_string()));
                    return;
                }
            };

            let observer = |phase: RoundPhase, digest: Option<&str>| {
                status_tx.send_modify(|status| {
                    status.phase = phase;
                    if let Some(digest) = digest {
                        status.digest = Some(digest.to_string());
                    }
                });
            };

            match operation.run(request, observer).await {
                Ok(VerifyArtifactOperationOutcome::Attested { digest }) => {
                    finish(&status_tx, RoundPhase::Attested, Some(digest), None);
                }
                Ok(VerifyArtifactOperationOutcome::AlreadyAttested) => {
                    finish(&status_tx, RoundPhase::AlreadyAttested, None, None);
                }
                Ok(VerifyArtifactOperationOutcome::Abandoned { digest, reason }) => {
                    tracing::error!("Round {} abandoned: {}", id, reason);
                    finish(&status_tx, RoundPhase::Abandoned, digest, Some(reason));
                }
                Err(error) => {
                    tracing::error!("Round {} failed: {}", id, error);
                    finish(&status_tx, RoundPhase::Abandoned, None, Some(error.to_string()));
                }
            }
        });

        id
    }

    pub fn status(&self, id: RoundId) -> Option<RoundStatus> {
        self.table().rounds.get(&id).map(|status| status.borrow().clone())
    }

    /// All tracked rounds, newest first.
    pub fn list(&self) -> Vec<RoundStatus> {
        let mut statuses: Vec<RoundStatus> = self
            .table()
            .rounds
            .values()
            .map(|status| status.borrow().clone())
            .collect();
        statuses.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        statuses
    }

    pub fn live_count(&self) -> usize {
        self.table()
            .rounds
            .values()
            .filter(|status| !status.borrow().phase.is_terminal())
            .count()
    }

    /// Wait until round `id` reaches a terminal phase.
    pub async fn wait(&self, id: RoundId) -> Option<RoundStatus> {
        let mut receiver = self.table().rounds.get(&id)?.subscribe();
        let status = receiver
            .wait_for(|status| status.phase.is_terminal())
            .await
            .ok()?
            .clone();
        Some(status)
    }

    /// Cancel every queued and running round.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

fn finish(
    status_tx: &watch::Sender<RoundStatus>,
    phase: RoundPhase,
    digest: Option<String>,
    reason: Option<String>,
) {
    status_tx.send_modify(|status| {
        status.phase = phase;
        if digest.is_some() {
            status.digest = digest;
        }
        status.reason = reason;
        status.finished_at = Some(Utc::now());
    });
}

fn prune_finished(rounds: &mut RoundMap) {
    let mut finished: Vec<(RoundId, DateTime<Utc>)> = rounds
        .iter()
        .filter_map(|(id, status)| status.borrow().finished_at.map(|at| (*id, at)))
        .collect();

    if finished.len() < MAX_FINISHED_ROUNDS {
        return;
    }

    finished.sort_by_key(|(_, at)| *at);
    let excess = finished.len() + 1 - MAX_FINISHED_ROUNDS;
    for (id, _) in finished.into_iter().take(excess) {
        rounds.remove(&id);
    }
}
