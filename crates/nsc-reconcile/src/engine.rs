use std::mem;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use nsc_schemas::{FlagPolicy, NaturalKey, ValidListing};
use nsc_store::{CatalogStore, CatalogTx};

use crate::classify::{classify, Sighting};
use crate::error::BatchWriteError;

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    pub batch_size: usize,
    pub flag_policy: FlagPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flag_policy: FlagPolicy::default(),
        }
    }
}

/// Result of one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch_size: usize,
    pub inserted: u64,
    pub updated: u64,
    pub status_changes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub batch_size: usize,
    pub message: String,
}

/// Totals for one run of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub batches_committed: u64,
    pub batches_failed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub status_changes: u64,
    pub failures: Vec<BatchFailure>,
}

impl ReconcileSummary {
    fn record(&mut self, result: &Result<BatchOutcome, BatchWriteError>) {
        match result {
            Ok(o) => {
                self.batches_committed += 1;
                self.inserted += o.inserted;
                self.updated += o.updated;
                self.status_changes += o.status_changes;
            }
            Err(e) => {
                self.batches_failed += 1;
                self.failures.push(BatchFailure {
                    batch_size: e.batch_size,
                    message: format!("{:#}", e.source),
                });
            }
        }
    }
}

/// Accumulates validated listings and reconciles them in batches.
///
/// Each batch is one transaction: bulk lookup, bulk insert, bulk update,
/// commit. A failing batch is rolled back and recorded; the buffer is emptied
/// either way, so the next batch starts clean.
pub struct BatchReconciler<S> {
    store: S,
    cfg: ReconcileConfig,
    buffer: Vec<Sighting>,
    summary: ReconcileSummary,
}

impl<S: CatalogStore> BatchReconciler<S> {
    pub fn new(store: S, cfg: ReconcileConfig) -> Result<Self> {
        if cfg.batch_size == 0 {
            anyhow::bail!("batch_size must be > 0");
        }
        Ok(Self {
            store,
            buffer: Vec::with_capacity(cfg.batch_size),
            cfg,
            summary: ReconcileSummary::default(),
        })
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn summary(&self) -> &ReconcileSummary {
        &self.summary
    }

    /// Buffer a listing seen now. Returns the batch result when this push
    /// filled the buffer.
    pub async fn push(
        &mut self,
        listing: ValidListing,
    ) -> Option<Result<BatchOutcome, BatchWriteError>> {
        self.push_at(listing, Utc::now()).await
    }

    pub async fn push_at(
        &mut self,
        listing: ValidListing,
        seen_at: DateTime<Utc>,
    ) -> Option<Result<BatchOutcome, BatchWriteError>> {
        self.buffer.push(Sighting::new(listing, seen_at));
        if self.buffer.len() >= self.cfg.batch_size {
            return self.flush().await;
        }
        None
    }

    /// Reconcile whatever is buffered. `None` when the buffer was empty.
    pub async fn flush(&mut self) -> Option<Result<BatchOutcome, BatchWriteError>> {
        if self.buffer.is_empty() {
            return None;
        }
        let batch = mem::replace(&mut self.buffer, Vec::with_capacity(self.cfg.batch_size));
        let result = self.reconcile(&batch).await;
        self.summary.record(&result);
        Some(result)
    }

    /// Flush the final partial batch and return the run totals.
    pub async fn finish(mut self) -> ReconcileSummary {
        self.flush().await;
        info!(
            batches_committed = self.summary.batches_committed,
            batches_failed = self.summary.batches_failed,
            inserted = self.summary.inserted,
            updated = self.summary.updated,
            status_changes = self.summary.status_changes,
            "reconcile run finished"
        );
        self.summary
    }

    /// Reconcile one batch in a single transaction, independent of the buffer.
    pub async fn reconcile(&self, batch: &[Sighting]) -> Result<BatchOutcome, BatchWriteError> {
        let batch_size = batch.len();
        if batch_size == 0 {
            return Ok(BatchOutcome::default());
        }

        let result = self.write_batch(batch).await;
        match &result {
            Ok(o) => info!(
                batch_size,
                inserted = o.inserted,
                updated = o.updated,
                status_changes = o.status_changes,
                "batch committed"
            ),
            Err(e) => error!(batch_size, error = %format!("{:#}", e), "batch rolled back"),
        }
        result.map_err(|e| BatchWriteError::new(batch_size, e))
    }

    async fn write_batch(&self, batch: &[Sighting]) -> Result<BatchOutcome> {
        let mut tx = self.store.begin().await.context("begin batch")?;

        let applied = apply_batch(tx.as_mut(), batch, self.cfg.flag_policy).await;
        match applied {
            Ok(outcome) => {
                tx.commit().await.context("commit batch")?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(batch_size = batch.len(), error = %format!("{rb:#}"), "rollback failed");
                }
                Err(e)
            }
        }
    }
}

async fn apply_batch(
    tx: &mut dyn CatalogTx,
    batch: &[Sighting],
    policy: FlagPolicy,
) -> Result<BatchOutcome> {
    let keys: Vec<NaturalKey> = batch.iter().map(|s| s.key().clone()).collect();
    let existing = tx.fetch_existing(&keys).await.context("lookup existing")?;

    let plan = classify(batch, &existing, policy);

    let inserted = if plan.inserts.is_empty() {
        0
    } else {
        tx.insert_listings(&plan.inserts)
            .await
            .context("insert new listings")?
    };
    let updated = if plan.updates.is_empty() {
        0
    } else {
        tx.update_listings(&plan.updates)
            .await
            .context("update seen listings")?
    };

    Ok(BatchOutcome {
        batch_size: batch.len(),
        inserted,
        updated,
        status_changes: plan.status_changes,
    })
}
