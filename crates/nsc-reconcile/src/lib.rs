//! nsc-reconcile
//!
//! The two passes of the collector:
//! - [`BatchReconciler`] classifies validated listings against stored state
//!   and writes them back in bulk, one transaction per batch;
//! - [`ChangePropagator`] pushes flagged rows to the dependent table and
//!   clears the flags, one transaction per pass.
//!
//! Both talk to storage only through `nsc_store::CatalogStore`.

mod classify;
mod engine;
mod error;
mod pipeline;
mod propagate;

pub use classify::{classify, Sighting, WritePlan};
pub use engine::{
    BatchFailure, BatchOutcome, BatchReconciler, ReconcileConfig, ReconcileSummary,
    DEFAULT_BATCH_SIZE,
};
pub use error::{BatchWriteError, PropagationError};
pub use nsc_schemas::FlagPolicy;
pub use pipeline::{ingest, IngestReport};
pub use propagate::{ChangePropagator, PropagationReport};
