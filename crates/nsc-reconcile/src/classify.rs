//! Pure classification of a batch against persisted state.
//!
//! No IO: the engine fetches the existing rows, this module decides what to
//! write, the engine writes it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use nsc_schemas::{FlagPolicy, NaturalKey, ValidListing};
use nsc_store::{ExistingListing, ListingInsert, ListingUpdate};

/// One validated listing plus the time it was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub listing: ValidListing,
    pub seen_at: DateTime<Utc>,
}

impl Sighting {
    pub fn new(listing: ValidListing, seen_at: DateTime<Utc>) -> Self {
        Self { listing, seen_at }
    }

    pub fn key(&self) -> &NaturalKey {
        &self.listing.key
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritePlan {
    pub inserts: Vec<ListingInsert>,
    pub updates: Vec<ListingUpdate>,
    /// Updates whose incoming status differs from the stored one.
    pub status_changes: u64,
}

/// Split a batch into inserts and updates.
///
/// Keys are not deduplicated: a key repeated within one batch with no stored
/// row produces two inserts and the write fails on the unique constraint.
pub fn classify(
    batch: &[Sighting],
    existing: &HashMap<NaturalKey, ExistingListing>,
    policy: FlagPolicy,
) -> WritePlan {
    let mut plan = WritePlan::default();

    for s in batch {
        let l = &s.listing;
        match existing.get(&l.key) {
            None => plan.inserts.push(ListingInsert {
                key: l.key.clone(),
                mnc: l.mnc.clone(),
                msn: l.msn.clone(),
                status: l.status,
                is_new: true,
                status_changed: false,
                last_seen: s.seen_at,
            }),
            Some(prev) => {
                let differs = prev.status != l.status;
                if differs {
                    plan.status_changes += 1;
                }
                let (is_new, status_changed) = match policy {
                    FlagPolicy::Overwrite => (false, differs),
                    FlagPolicy::PreservePending => (prev.is_new, prev.status_changed || differs),
                };
                plan.updates.push(ListingUpdate {
                    key: l.key.clone(),
                    status: l.status,
                    is_new,
                    status_changed,
                    last_seen: s.seen_at,
                });
            }
        }
    }

    plan
}
