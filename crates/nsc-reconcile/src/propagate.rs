//! Change propagation pass.
//!
//! Selects every catalog row with a pending flag and pushes its current status
//! to the dependent record with the same bare key. Per row the flags are
//! claimed (conditionally cleared) first and the dependent update follows, so
//! a row whose claim was lost is never applied twice. All of it is one
//! transaction: the pass commits once or not at all.

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use nsc_store::{CatalogStore, CatalogTx, FlagClear};

use crate::error::PropagationError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationReport {
    pub rows_selected: u64,
    /// Selected rows that carried `is_new`.
    pub new_listings: u64,
    /// Selected rows that carried `status_changed`.
    pub status_changes: u64,
    /// Dependent records written.
    pub propagated: u64,
    /// Dependent records forced inactive.
    pub deactivated: u64,
    /// Flagged rows with no dependent record. Flags are still cleared.
    pub dependents_missing: u64,
    /// Rows whose flags were cleared by someone else first.
    pub claims_lost: u64,
}

pub struct ChangePropagator<S> {
    store: S,
}

impl<S: CatalogStore> ChangePropagator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Run one pass. An empty selection is a no-op that commits nothing.
    pub async fn propagate(&self) -> Result<PropagationReport, PropagationError> {
        let mut tx = self
            .store
            .begin()
            .await
            .context("begin propagation")
            .map_err(|source| PropagationError {
                rows_selected: 0,
                source,
            })?;

        let mut report = PropagationReport::default();
        let applied = apply_flagged(tx.as_mut(), &mut report).await;
        match applied {
            Ok(()) if report.rows_selected == 0 => {
                if let Err(e) = tx.rollback().await {
                    warn!(error = %format!("{e:#}"), "rollback of empty propagation failed");
                }
                info!("no flagged rows; nothing to propagate");
                Ok(report)
            }
            Ok(()) => {
                tx.commit()
                    .await
                    .context("commit propagation")
                    .map_err(|source| self.failed(&report, source))?;
                info!(
                    rows_selected = report.rows_selected,
                    new_listings = report.new_listings,
                    status_changes = report.status_changes,
                    propagated = report.propagated,
                    deactivated = report.deactivated,
                    dependents_missing = report.dependents_missing,
                    claims_lost = report.claims_lost,
                    "propagation committed"
                );
                Ok(report)
            }
            Err(source) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %format!("{rb:#}"), "propagation rollback failed");
                }
                Err(self.failed(&report, source))
            }
        }
    }

    fn failed(&self, report: &PropagationReport, source: anyhow::Error) -> PropagationError {
        let err = PropagationError {
            rows_selected: report.rows_selected as usize,
            source,
        };
        error!(rows_selected = report.rows_selected, error = %err, "propagation rolled back");
        err
    }
}

async fn apply_flagged(tx: &mut dyn CatalogTx, report: &mut PropagationReport) -> Result<()> {
    let rows = tx.select_flagged().await.context("select flagged rows")?;
    report.rows_selected = rows.len() as u64;

    for row in rows {
        let clear = FlagClear::for_row(&row);
        if clear.is_empty() {
            continue;
        }

        let claimed = tx
            .claim_flags(row.id, clear)
            .await
            .with_context(|| format!("claim flags for {}", row.key))?;
        if !claimed {
            report.claims_lost += 1;
            debug!(key = %row.key, id = row.id, "flags already claimed; skipping");
            continue;
        }

        if row.is_new {
            report.new_listings += 1;
        }
        if row.status_changed {
            report.status_changes += 1;
        }

        let code = row.status.shop_status_code();
        let written = tx
            .apply_shop_status(&row.key.catalog_key, code)
            .await
            .with_context(|| format!("apply shop_status for {}", row.key))?;

        if written == 0 {
            report.dependents_missing += 1;
            warn!(key = %row.key, status = %row.status, "no dependent record for flagged listing");
            continue;
        }

        report.propagated += 1;
        if row.status.is_unavailable() {
            report.deactivated += 1;
        }
        debug!(
            key = %row.key,
            status = %row.status,
            shop_status = code,
            is_new = row.is_new,
            status_changed = row.status_changed,
            "propagated"
        );
    }

    Ok(())
}
