use crate::catalog::Catalog;
use crate::config::Config;
use crate::rounds::{RoundId, RoundScheduler};
use crate::storage::{LatestUnit, UnitLedger};
use crate::{GenesisError, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct RegisterUnitOperation {
    config: Arc<Config>,
    ledger: Arc<UnitLedger>,
    catalog: Arc<Catalog>,
    scheduler: Arc<RoundScheduler>,
}

#[derive(Debug, Clone)]
pub struct RegisterUnitOperationRequest {
    pub category: String,
    pub index: u64,
    pub epoch: u64,
    pub shared_secret: String,
}

#[derive(Debug, Clone)]
pub struct RegisterUnitOperationResult {
    pub latest: LatestUnit,
    pub rounds: Vec<RoundId>,
}

impl RegisterUnitOperation {
    pub fn new(
        config: Arc<Config>,
        ledger: Arc<UnitLedger>,
        catalog: Arc<Catalog>,
        scheduler: Arc<RoundScheduler>,
    ) -> Self {
        Self {
            config,
            ledger,
            catalog,
            scheduler,
        }
    }

    /// Append a unit and start one consensus round per dynamic artifact kind.
    pub async fn run(&self, request: RegisterUnitOperationRequest) -> Result<RegisterUnitOperationResult> {
        let RegisterUnitOperationRequest {
            category,
            index,
            epoch,
            shared_secret,
        } = request;

        if shared_secret != self.config.shared_secret {
            tracing::debug!("Rejected unit registration for {}: bad secret", category);
            return Err(GenesisError::Unauthorized);
        }

        let category_config = self
            .config
            .category(&category)
            .ok_or_else(|| GenesisError::CategoryNotFound(category.clone()))?;

        let latest = match self.ledger.append(&category, index, epoch).await {
            Ok(latest) => latest,
            Err(error @ GenesisError::SequenceGap { .. }) => {
                tracing::warn!("Rejected unit registration: {}", error);
                return Err(error);
            }
            Err(error) => return Err(error),
        };

        tracing::info!(
            "Registered unit {} (epoch {}) for category {}",
            index,
            epoch,
            category
        );

        self.catalog.refresh().await;

        let rounds = category_config
            .kinds()
            .map(|kind| self.scheduler.trigger(&category, kind, epoch, index))
            .collect();

        Ok(RegisterUnitOperationResult { latest, rounds })
    }
}
