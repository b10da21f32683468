use std::sync::Arc;

use crate::error::StoreError;
use crate::pipeline::aggregate::{self, MaxSpeedPolicy};
use crate::store::{DayLogStore, FixCursor};
use crate::types::fix::{Fix, ValidatedFix};
use crate::types::stats::TripStatistics;

/// Entry point for storing and reading fixes.
///
/// All calls block on file IO; async callers should run them on a
/// blocking thread.
#[derive(Clone)]
pub struct IngestService {
    store: Arc<DayLogStore>,
}

impl IngestService {
    pub fn new(store: Arc<DayLogStore>) -> Self {
        Self { store }
    }

    pub fn ingest(&self, fix: ValidatedFix) -> Result<Fix, StoreError> {
        let user = fix.user.clone();
        let stored = self.store.append(fix).inspect_err(|err| {
            tracing::warn!("Rejected fix from {}: {}", user, err);
        })?;

        tracing::info!(
            "Stored fix {} from {} ({:.1} m since previous)",
            stored.index,
            stored.user,
            stored.distance.map(|d| d.horizontal).unwrap_or(0.0)
        );

        Ok(stored)
    }

    pub fn read_from(&self, index: u64) -> Result<FixCursor, StoreError> {
        self.store.read_from(index)
    }

    pub fn statistics(
        &self,
        index: u64,
        policy: &dyn MaxSpeedPolicy,
    ) -> Result<TripStatistics, StoreError> {
        let fixes = self.read_from(index)?.collect::<Result<Vec<_>, _>>()?;
        Ok(aggregate::aggregate(&fixes, policy))
    }
}
