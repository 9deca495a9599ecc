//! Producer → duplicate filter → validator → engine.

use futures_util::{pin_mut, Stream, StreamExt};
use tracing::{info, warn};

use nsc_ingest::{validate, DuplicateFilter, RejectCounts};
use nsc_schemas::RawListing;
use nsc_store::CatalogStore;

use crate::engine::{BatchReconciler, ReconcileSummary};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub records_read: u64,
    pub accepted: u64,
    pub rejected: RejectCounts,
    pub summary: ReconcileSummary,
}

/// Drain `stream` through the engine. Rejected records are counted and
/// logged; failed batches are recorded in the summary. Neither stops the run.
/// End of stream flushes the final partial batch.
pub async fn ingest<S, St>(stream: St, mut reconciler: BatchReconciler<S>) -> IngestReport
where
    S: CatalogStore,
    St: Stream<Item = RawListing>,
{
    pin_mut!(stream);

    let mut dedupe = DuplicateFilter::new();
    let mut report = IngestReport::default();

    while let Some(raw) = stream.next().await {
        report.records_read += 1;

        let checked = dedupe.check(&raw).and_then(|()| validate(&raw));
        match checked {
            Ok(listing) => {
                report.accepted += 1;
                // Failures are logged by the engine and land in the summary.
                let _ = reconciler.push(listing).await;
            }
            Err(reason) => {
                report.rejected.record(&reason);
                warn!(
                    key = %raw.catalog_key,
                    source = %raw.source_name,
                    field = reason.field(),
                    reason = %reason,
                    "record rejected"
                );
            }
        }
    }

    info!(
        records_read = report.records_read,
        accepted = report.accepted,
        rejected = report.rejected.total(),
        dedupe_keys = dedupe.seen_count(),
        "input drained"
    );
    report.summary = reconciler.finish().await;
    report
}
