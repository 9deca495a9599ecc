//! nsc-ingest
//!
//! Producer-side stages that run before reconciliation: loading crawler
//! output, dropping in-run duplicates, and per-record validation.
//!
//! Pure logic apart from file reading. No DB access.

pub mod dedupe;
pub mod reader;
pub mod validate;

pub use dedupe::DuplicateFilter;
pub use reader::{normalize_listing, parse_listings, read_listings, InputFormat};
pub use validate::{validate, RejectCounts, RejectionReason};
