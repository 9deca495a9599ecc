//! In-memory transactional store.
//!
//! Every transaction works on a private copy of the committed state; `commit`
//! swaps the copy in, `rollback` (or drop) throws it away. That gives the same
//! all-or-nothing visibility the Postgres store has, without a database.
//!
//! Faults are one-shot: `fail_next(point)` makes the next call at `point`
//! return an error and then disarms itself, so a retry of the same work goes
//! through.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use nsc_schemas::{split_catalog_key, NaturalKey, ShopStatus, UNAVAILABLE_SHOP_STATUS};
use nsc_store::{
    CatalogRow, CatalogStore, CatalogTx, DependentRecord, ExistingListing, FlagClear,
    FlaggedListing, ListingInsert, ListingUpdate,
};

/// Store call that an injected fault fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Begin,
    FetchExisting,
    Insert,
    Update,
    SelectFlagged,
    ClaimFlags,
    ApplyShopStatus,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: i64,
    rows: BTreeMap<i64, CatalogRow>,
    ids: HashMap<NaturalKey, i64>,
    dependents: BTreeMap<String, DependentRecord>,
}

#[derive(Debug, Default)]
struct Shared {
    committed: Tables,
    fault: Option<FaultPoint>,
    lose_next_claim: bool,
    claim_calls: u64,
    commits: u64,
    rollbacks: u64,
}

impl Shared {
    fn take_fault(&mut self, point: FaultPoint) -> Result<()> {
        if self.fault == Some(point) {
            self.fault = None;
            bail!("injected fault at {point:?}");
        }
        Ok(())
    }
}

/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    /// Arm a one-shot fault.
    pub fn fail_next(&self, point: FaultPoint) {
        self.lock().fault = Some(point);
    }

    /// Make the next `claim_flags` find its flags already cleared, as if a
    /// concurrent pass had committed the claim first.
    pub fn lose_next_claim(&self) {
        self.lock().lose_next_claim = true;
    }

    /// Insert or replace a dependent record.
    pub fn seed_dependent(&self, number: &str, shop_status: Option<i16>, is_active: bool) {
        self.lock().committed.dependents.insert(
            number.to_string(),
            DependentRecord {
                number: number.to_string(),
                shop_status,
                is_active,
            },
        );
    }

    /// Write a catalog row directly, bypassing the engine.
    pub fn seed_listing(&self, row: ListingInsert) -> i64 {
        let mut g = self.lock();
        insert_row(&mut g.committed, row)
    }

    pub fn listing(&self, key: &NaturalKey) -> Option<CatalogRow> {
        let g = self.lock();
        let id = g.committed.ids.get(key)?;
        g.committed.rows.get(id).cloned()
    }

    /// All committed catalog rows, ordered by id.
    pub fn listings(&self) -> Vec<CatalogRow> {
        self.lock().committed.rows.values().cloned().collect()
    }

    pub fn dependent(&self, number: &str) -> Option<DependentRecord> {
        self.lock().committed.dependents.get(number).cloned()
    }

    pub fn flagged_count(&self) -> usize {
        self.lock()
            .committed
            .rows
            .values()
            .filter(|r| r.is_new || r.status_changed)
            .count()
    }

    /// `claim_flags` calls made so far, committed or not.
    pub fn claim_calls(&self) -> u64 {
        self.lock().claim_calls
    }

    pub fn commits(&self) -> u64 {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> u64 {
        self.lock().rollbacks
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>> {
        let work = {
            let mut g = self.lock();
            g.take_fault(FaultPoint::Begin)?;
            g.committed.clone()
        };
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.shared),
            work,
        }))
    }
}

pub struct MemoryTx {
    shared: Arc<Mutex<Shared>>,
    work: Tables,
}

impl MemoryTx {
    fn check(&self, point: FaultPoint) -> Result<()> {
        lock(&self.shared).take_fault(point)
    }
}

#[async_trait::async_trait]
impl CatalogTx for MemoryTx {
    async fn fetch_existing(
        &mut self,
        keys: &[NaturalKey],
    ) -> Result<HashMap<NaturalKey, ExistingListing>> {
        self.check(FaultPoint::FetchExisting)?;

        let mut out = HashMap::new();
        for key in keys {
            let Some(row) = self.work.ids.get(key).and_then(|id| self.work.rows.get(id)) else {
                continue;
            };
            out.insert(
                key.clone(),
                ExistingListing {
                    id: row.id,
                    status: row.status,
                    is_new: row.is_new,
                    status_changed: row.status_changed,
                },
            );
        }
        Ok(out)
    }

    async fn insert_listings(&mut self, rows: &[ListingInsert]) -> Result<u64> {
        self.check(FaultPoint::Insert)?;

        for r in rows {
            if self.work.ids.contains_key(&r.key) {
                bail!("unique violation on natural key {}", r.key);
            }
            insert_row(&mut self.work, r.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn update_listings(&mut self, rows: &[ListingUpdate]) -> Result<u64> {
        self.check(FaultPoint::Update)?;

        let mut written = BTreeSet::new();
        for u in rows {
            let Some(id) = self.work.ids.get(&u.key).copied() else {
                continue;
            };
            let Some(row) = self.work.rows.get_mut(&id) else {
                continue;
            };
            row.status = u.status;
            row.is_new = u.is_new;
            row.status_changed = u.status_changed;
            row.last_seen = u.last_seen;
            written.insert(id);
        }
        Ok(written.len() as u64)
    }

    async fn select_flagged(&mut self) -> Result<Vec<FlaggedListing>> {
        self.check(FaultPoint::SelectFlagged)?;

        Ok(self
            .work
            .rows
            .values()
            .filter(|r| r.is_new || r.status_changed)
            .map(|r| FlaggedListing {
                id: r.id,
                key: r.key.clone(),
                status: r.status,
                is_new: r.is_new,
                status_changed: r.status_changed,
            })
            .collect())
    }

    async fn claim_flags(&mut self, id: i64, clear: FlagClear) -> Result<bool> {
        let lost = {
            let mut g = lock(&self.shared);
            g.take_fault(FaultPoint::ClaimFlags)?;
            g.claim_calls += 1;
            std::mem::take(&mut g.lose_next_claim)
        };

        let Some(row) = self.work.rows.get_mut(&id) else {
            return Ok(false);
        };
        if lost {
            row.is_new = false;
            row.status_changed = false;
        }

        let held = (clear.is_new && row.is_new) || (clear.status_changed && row.status_changed);
        if !held {
            return Ok(false);
        }
        if clear.is_new {
            row.is_new = false;
        }
        if clear.status_changed {
            row.status_changed = false;
        }
        Ok(true)
    }

    async fn apply_shop_status(&mut self, number: &str, shop_status: i16) -> Result<u64> {
        self.check(FaultPoint::ApplyShopStatus)?;

        let Some(dep) = self.work.dependents.get_mut(number) else {
            return Ok(0);
        };
        dep.shop_status = Some(shop_status);
        if shop_status == UNAVAILABLE_SHOP_STATUS {
            dep.is_active = false;
        }
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let mut g = lock(&shared);
        g.take_fault(FaultPoint::Commit)?;
        let MemoryTx { work, .. } = *self;
        g.committed = work;
        g.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        lock(&self.shared).rollbacks += 1;
        Ok(())
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // Poisoned only when a test panicked mid-call.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn insert_row(t: &mut Tables, r: ListingInsert) -> i64 {
    t.next_id += 1;
    let id = t.next_id;
    t.ids.insert(r.key.clone(), id);
    t.rows.insert(
        id,
        CatalogRow {
            id,
            key: r.key,
            mnc: r.mnc,
            msn: r.msn,
            status: r.status,
            is_new: r.is_new,
            status_changed: r.status_changed,
            last_seen: r.last_seen,
        },
    );
    id
}

/// Build a first-sighting row for seeding.
pub fn seed_row(key: NaturalKey, status: ShopStatus, last_seen: DateTime<Utc>) -> ListingInsert {
    let (mnc, msn) = split_catalog_key(&key.catalog_key);
    ListingInsert {
        mnc: mnc.to_string(),
        msn: msn.to_string(),
        key,
        status,
        is_new: true,
        status_changed: false,
        last_seen,
    }
}
