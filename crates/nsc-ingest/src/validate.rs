//! Per-record shape checks applied before reconciliation.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. required fields present and non-empty
//! 2. catalog key is exactly [`CATALOG_KEY_LEN`] characters
//! 3. source is known and allows the status
//!
//! A rejection only drops the offending record; callers keep going.

use std::fmt;

use nsc_schemas::{NaturalKey, RawListing, ShopStatus, Source, ValidListing, CATALOG_KEY_LEN};
use serde::{Deserialize, Serialize};

/// Why a single record was dropped. Always names the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    MissingField { field: &'static str },
    InvalidKeyLength { catalog_key: String, len: usize },
    UnknownSource { source_name: String },
    StatusNotAllowed { source: Source, status: String },
    /// Raised by [`crate::DuplicateFilter`], not by [`validate`].
    Duplicate { catalog_key: String, source: Source },
}

impl RejectionReason {
    /// Name of the record field that caused the rejection.
    pub fn field(&self) -> &'static str {
        match self {
            RejectionReason::MissingField { field } => *field,
            RejectionReason::InvalidKeyLength { .. } | RejectionReason::Duplicate { .. } => {
                "catalog_key"
            }
            RejectionReason::UnknownSource { .. } => "source_name",
            RejectionReason::StatusNotAllowed { .. } => "status",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::MissingField { field } => write!(f, "missing required field: {field}"),
            RejectionReason::InvalidKeyLength { catalog_key, len } => write!(
                f,
                "invalid catalog key length {len} (expected {CATALOG_KEY_LEN}): {catalog_key}"
            ),
            RejectionReason::UnknownSource { source_name } => {
                write!(f, "unknown source '{source_name}'")
            }
            RejectionReason::StatusNotAllowed { source, status } => {
                write!(f, "invalid status '{status}' for source '{source}'")
            }
            RejectionReason::Duplicate {
                catalog_key,
                source,
            } => write!(f, "duplicate listing {catalog_key} from '{source}'"),
        }
    }
}

impl std::error::Error for RejectionReason {}

/// Validate one producer record.
pub fn validate(raw: &RawListing) -> Result<ValidListing, RejectionReason> {
    let catalog_key = required("catalog_key", &raw.catalog_key)?;
    let mnc = required("mnc", &raw.mnc)?;
    let msn = required("msn", &raw.msn)?;
    let status = required("status", &raw.status)?;
    let source_name = required("source_name", &raw.source_name)?;

    let len = catalog_key.chars().count();
    if len != CATALOG_KEY_LEN {
        return Err(RejectionReason::InvalidKeyLength {
            catalog_key: catalog_key.to_string(),
            len,
        });
    }

    let source = Source::parse(source_name).map_err(|_| RejectionReason::UnknownSource {
        source_name: source_name.to_string(),
    })?;

    let status = match ShopStatus::parse(status) {
        Ok(s) if source.allows(s) => s,
        _ => {
            return Err(RejectionReason::StatusNotAllowed {
                source,
                status: status.to_string(),
            })
        }
    };

    Ok(ValidListing {
        key: NaturalKey::new(catalog_key, source),
        mnc: mnc.to_string(),
        msn: msn.to_string(),
        status,
    })
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, RejectionReason> {
    let v = value.trim();
    if v.is_empty() {
        return Err(RejectionReason::MissingField { field });
    }
    Ok(v)
}

/// Rejection counters for one ingest run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectCounts {
    pub missing_field: u64,
    pub bad_key_length: u64,
    pub unknown_source: u64,
    pub status_not_allowed: u64,
    pub duplicate: u64,
}

impl RejectCounts {
    pub fn record(&mut self, reason: &RejectionReason) {
        match reason {
            RejectionReason::MissingField { .. } => self.missing_field += 1,
            RejectionReason::InvalidKeyLength { .. } => self.bad_key_length += 1,
            RejectionReason::UnknownSource { .. } => self.unknown_source += 1,
            RejectionReason::StatusNotAllowed { .. } => self.status_not_allowed += 1,
            RejectionReason::Duplicate { .. } => self.duplicate += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.missing_field
            + self.bad_key_length
            + self.unknown_source
            + self.status_not_allowed
            + self.duplicate
    }
}
