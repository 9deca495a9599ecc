//! Producer-side duplicate filter.
//!
//! Some catalogs repeat the same number on several pages of one crawl. The
//! reconciliation engine never deduplicates, so repeats from those sources are
//! dropped here, once per run. Sources that never repeat pass through untouched.

use std::collections::HashSet;

use nsc_schemas::{NaturalKey, RawListing, Source};

use crate::RejectionReason;

#[derive(Debug, Default)]
pub struct DuplicateFilter {
    seen: HashSet<NaturalKey>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Err(Duplicate)` the second time a key is offered for a source
    /// that emits duplicates. Records with an unknown source are passed on so
    /// the validator can reject them with the proper reason.
    pub fn check(&mut self, raw: &RawListing) -> Result<(), RejectionReason> {
        let source = match Source::parse(&raw.source_name) {
            Ok(s) if s.emits_duplicates() => s,
            _ => return Ok(()),
        };

        let key = NaturalKey::new(raw.catalog_key.trim(), source);
        if self.seen.contains(&key) {
            return Err(RejectionReason::Duplicate {
                catalog_key: key.catalog_key,
                source,
            });
        }
        self.seen.insert(key);
        Ok(())
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
