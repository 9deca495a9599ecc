//! nsc-testkit
//!
//! Test doubles for the collector. [`MemoryStore`] implements the store
//! traits in memory with one-shot fault injection, so the engine and the
//! propagator can be driven through failure and retry without Postgres.

mod memory_store;

pub use memory_store::{seed_row, FaultPoint, MemoryStore, MemoryTx};

use nsc_schemas::RawListing;

/// Producer record for a Ucom listing.
pub fn ucom(catalog_key: &str, status: &str) -> RawListing {
    RawListing::from_catalog_key(catalog_key, "ucom", status)
}

/// Producer record for a Team listing.
pub fn team(catalog_key: &str) -> RawListing {
    RawListing::from_catalog_key(catalog_key, "team", "available")
}
