//! Store boundary for the reconciliation pipeline.
//!
//! This crate defines **only** the row types and the transactional store
//! traits. The Postgres implementation lives in `nsc-db`; an in-memory one
//! lives in `nsc-testkit`. No SQL, no reconciliation logic.
//!
//! Every operation runs inside a [`CatalogTx`]. Nothing a transaction did is
//! visible to other callers until [`CatalogTx::commit`] returns `Ok`; dropping
//! or rolling back a transaction discards all of it.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use nsc_schemas::{NaturalKey, ShopStatus};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Catalog table rows
// ---------------------------------------------------------------------------

/// Persisted state of a listing, as seen by the bulk lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingListing {
    pub id: i64,
    pub status: ShopStatus,
    pub is_new: bool,
    pub status_changed: bool,
}

/// A first sighting, written by the bulk insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingInsert {
    pub key: NaturalKey,
    pub mnc: String,
    pub msn: String,
    pub status: ShopStatus,
    pub is_new: bool,
    pub status_changed: bool,
    pub last_seen: DateTime<Utc>,
}

/// A repeat sighting, written by the bulk update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingUpdate {
    pub key: NaturalKey,
    pub status: ShopStatus,
    pub is_new: bool,
    pub status_changed: bool,
    pub last_seen: DateTime<Utc>,
}

/// A row waiting for propagation (`is_new OR status_changed`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedListing {
    pub id: i64,
    pub key: NaturalKey,
    pub status: ShopStatus,
    pub is_new: bool,
    pub status_changed: bool,
}

/// Which flags a propagation claims (and therefore clears) on one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagClear {
    pub is_new: bool,
    pub status_changed: bool,
}

impl FlagClear {
    pub fn for_row(row: &FlaggedListing) -> Self {
        Self {
            is_new: row.is_new,
            status_changed: row.status_changed,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.is_new && !self.status_changed
    }
}

/// Full catalog row, used by diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub id: i64,
    pub key: NaturalKey,
    pub mnc: String,
    pub msn: String,
    pub status: ShopStatus,
    pub is_new: bool,
    pub status_changed: bool,
    pub last_seen: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Dependent table rows
// ---------------------------------------------------------------------------

/// Row of the dependent `mobile_numbers` table, keyed by bare catalog key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentRecord {
    pub number: String,
    pub shop_status: Option<i16>,
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Opens transactions against the catalog and dependent tables.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>>;
}

/// One exclusive unit of work. The owner must call `commit` or `rollback`.
#[async_trait::async_trait]
pub trait CatalogTx: Send {
    /// Bulk lookup of persisted state for `keys` in a single round-trip.
    /// Keys with no row are absent from the result.
    async fn fetch_existing(
        &mut self,
        keys: &[NaturalKey],
    ) -> Result<HashMap<NaturalKey, ExistingListing>>;

    /// Bulk insert. Fails if any key already has a row. Returns rows written.
    async fn insert_listings(&mut self, rows: &[ListingInsert]) -> Result<u64>;

    /// Bulk update by natural key. A key repeated in `rows` ends up with its
    /// last occurrence. Returns distinct rows written.
    async fn update_listings(&mut self, rows: &[ListingUpdate]) -> Result<u64>;

    /// Rows with `is_new OR status_changed`, ordered by id. Implementations
    /// that support it lock the returned rows for the life of the transaction.
    async fn select_flagged(&mut self) -> Result<Vec<FlaggedListing>>;

    /// Clear the flags in `clear` on row `id`, but only if at least one of
    /// them is still set. Returns `false` when the row was already cleared by
    /// someone else; the caller must then skip the row.
    async fn claim_flags(&mut self, id: i64, clear: FlagClear) -> Result<bool>;

    /// Set `shop_status` on the dependent record for `number`, forcing
    /// `is_active = false` when `shop_status` is the unavailable sentinel.
    /// Returns rows written (0 when no dependent record exists).
    async fn apply_shop_status(&mut self, number: &str, shop_status: i16) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
