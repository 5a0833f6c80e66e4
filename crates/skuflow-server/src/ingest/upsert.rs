//! Catalog upsert engine
//!
//! Applies one batch of validated candidates to the catalog inside a single
//! transaction: one read of the existing keys, one bulk insert for the new
//! SKUs and one bulk overwrite for the known ones.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::{debug, instrument};

use super::{
    models::ValidatedCandidate,
    store::{CatalogError, CatalogStore},
};

/// Counts returned for one committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub created: u64,
    pub updated: u64,
}

impl UpsertOutcome {
    /// Candidates accounted for by the batch
    pub fn total(&self) -> u64 {
        self.created + self.updated
    }
}

/// Creates and updates for one batch after in-batch deduplication.
///
/// Candidates are applied as if written one after another: the first
/// occurrence of an unknown SKU is a create, every later occurrence of the
/// same SKU counts as an update of it, and the stored values are those of
/// the last occurrence.
#[derive(Debug, Default)]
pub struct UpsertPlan {
    pub creates: Vec<ValidatedCandidate>,
    pub updates: Vec<ValidatedCandidate>,
    pub outcome: UpsertOutcome,
}

impl UpsertPlan {
    pub fn build(candidates: Vec<ValidatedCandidate>, existing: &HashSet<String>) -> Self {
        let mut plan = UpsertPlan::default();
        let mut create_slots: HashMap<String, usize> = HashMap::new();
        let mut update_slots: HashMap<String, usize> = HashMap::new();

        for candidate in candidates {
            if let Some(&slot) = create_slots.get(&candidate.sku) {
                plan.creates[slot] = candidate;
                plan.outcome.updated += 1;
            } else if existing.contains(&candidate.sku) {
                match update_slots.get(&candidate.sku) {
                    Some(&slot) => plan.updates[slot] = candidate,
                    None => {
                        update_slots.insert(candidate.sku.clone(), plan.updates.len());
                        plan.updates.push(candidate);
                    },
                }
                plan.outcome.updated += 1;
            } else {
                create_slots.insert(candidate.sku.clone(), plan.creates.len());
                plan.creates.push(candidate);
                plan.outcome.created += 1;
            }
        }

        plan
    }
}

/// Writes validated batches to a [`CatalogStore`]
#[derive(Clone)]
pub struct UpsertEngine {
    catalog: Arc<dyn CatalogStore>,
}

impl UpsertEngine {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Upsert a batch atomically. Any failure rolls back the whole batch.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn upsert_batch(
        &self,
        candidates: Vec<ValidatedCandidate>,
    ) -> Result<UpsertOutcome, CatalogError> {
        if candidates.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        let mut keys: Vec<String> = candidates.iter().map(|c| c.sku.clone()).collect();
        keys.sort_unstable();
        keys.dedup();

        let mut tx = self.catalog.begin().await?;
        let existing = tx.existing_skus(&keys).await?;
        let plan = UpsertPlan::build(candidates, &existing);

        if !plan.creates.is_empty() {
            tx.insert_entries(&plan.creates).await?;
        }
        if !plan.updates.is_empty() {
            tx.update_entries(&plan.updates).await?;
        }
        tx.commit().await?;

        debug!(
            created = plan.outcome.created,
            updated = plan.outcome.updated,
            "Batch committed"
        );
        Ok(plan.outcome)
    }
}
