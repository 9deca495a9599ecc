//! nsc-schemas
//!
//! Shared listing types for the number-shop collector: the closed status and
//! source enums, the producer record shape, and the natural key used to match
//! incoming listings against persisted rows.
//!
//! Pure types. No IO.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed width of a catalog key (the bare mobile number, without country code).
pub const CATALOG_KEY_LEN: usize = 8;

/// Width of the category code (`mnc`) prefix of a catalog key.
pub const CATEGORY_CODE_LEN: usize = 2;

/// Downstream `shop_status` value meaning "unavailable".
pub const UNAVAILABLE_SHOP_STATUS: i16 = 0;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Listing status as published by a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShopStatus {
    Available,
    Ordered,
    #[serde(rename = "soldout")]
    SoldOut,
}

impl ShopStatus {
    pub const ALL: [ShopStatus; 3] = [ShopStatus::Available, ShopStatus::Ordered, ShopStatus::SoldOut];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShopStatus::Available => "available",
            ShopStatus::Ordered => "ordered",
            ShopStatus::SoldOut => "soldout",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(ShopStatus::Available),
            "ordered" => Ok(ShopStatus::Ordered),
            "soldout" => Ok(ShopStatus::SoldOut),
            other => Err(anyhow!(
                "invalid shop status '{}'. expected one of: available | ordered | soldout",
                other
            )),
        }
    }

    /// Derive a status from a catalog tile's CSS class attribute.
    ///
    /// Catalogs encode the status as one of the class names; the first match
    /// in `available`, `ordered`, `soldout` order wins.
    pub fn from_class_attr(class_attr: &str) -> Option<Self> {
        let lower = class_attr.to_ascii_lowercase();
        Self::ALL.into_iter().find(|s| lower.contains(s.as_str()))
    }

    /// Integer encoding written to the dependent `mobile_numbers.shop_status` column.
    pub fn shop_status_code(&self) -> i16 {
        match self {
            ShopStatus::Available => 1,
            ShopStatus::Ordered => 2,
            ShopStatus::SoldOut => UNAVAILABLE_SHOP_STATUS,
        }
    }

    /// True when propagating this status must deactivate the dependent record.
    pub fn is_unavailable(&self) -> bool {
        self.shop_status_code() == UNAVAILABLE_SHOP_STATUS
    }
}

impl fmt::Display for ShopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Catalog a listing was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Ucom,
    Team,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Ucom => "ucom",
            Source::Team => "team",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ucom" => Ok(Source::Ucom),
            "team" => Ok(Source::Team),
            other => Err(anyhow!(
                "invalid source '{}'. expected one of: ucom | team",
                other
            )),
        }
    }

    /// Statuses this catalog is able to publish.
    ///
    /// Team only lists numbers that are for sale, so every Team listing is
    /// `available`.
    pub fn allowed_statuses(&self) -> &'static [ShopStatus] {
        match self {
            Source::Ucom => &[ShopStatus::Available, ShopStatus::Ordered, ShopStatus::SoldOut],
            Source::Team => &[ShopStatus::Available],
        }
    }

    pub fn allows(&self, status: ShopStatus) -> bool {
        self.allowed_statuses().contains(&status)
    }

    /// Whether the same number can appear more than once in a single crawl of
    /// this catalog, so the producer must drop repeats before ingestion.
    pub fn emits_duplicates(&self) -> bool {
        matches!(self, Source::Ucom)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Flag policy
// ---------------------------------------------------------------------------

/// How a repeat sighting treats flags that were never propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagPolicy {
    /// `is_new = false`, `status_changed = (status differs)`, regardless of
    /// what is stored.
    #[default]
    Overwrite,
    /// Keep flags that are still set; only ever add a `status_changed`.
    PreservePending,
}

impl FlagPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagPolicy::Overwrite => "overwrite",
            FlagPolicy::PreservePending => "preserve_pending",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(FlagPolicy::Overwrite),
            "preserve_pending" => Ok(FlagPolicy::PreservePending),
            other => Err(anyhow!(
                "invalid flag policy '{}'. expected one of: overwrite | preserve_pending",
                other
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Matches an incoming listing to at most one persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub catalog_key: String,
    pub source: Source,
}

impl NaturalKey {
    pub fn new(catalog_key: impl Into<String>, source: Source) -> Self {
        Self {
            catalog_key: catalog_key.into(),
            source,
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.catalog_key, self.source)
    }
}

/// A listing as yielded by a crawler, before validation.
///
/// Every field is kept as text; empty strings stand for missing values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    #[serde(default, alias = "mobile_number")]
    pub catalog_key: String,
    #[serde(default)]
    pub mnc: String,
    #[serde(default)]
    pub msn: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, alias = "shop", alias = "spider_name")]
    pub source_name: String,
}

impl RawListing {
    /// Build a record from a bare catalog key, deriving `mnc` and `msn`.
    pub fn from_catalog_key(catalog_key: &str, source: &str, status: &str) -> Self {
        let (mnc, msn) = split_catalog_key(catalog_key);
        Self {
            catalog_key: catalog_key.to_string(),
            mnc: mnc.to_string(),
            msn: msn.to_string(),
            status: status.to_string(),
            source_name: source.to_string(),
        }
    }
}

/// A listing that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidListing {
    pub key: NaturalKey,
    pub mnc: String,
    pub msn: String,
    pub status: ShopStatus,
}

/// Split a catalog key into `(mnc, msn)`. Keys shorter than the prefix yield
/// the whole key as `mnc` and an empty `msn`.
pub fn split_catalog_key(catalog_key: &str) -> (&str, &str) {
    match catalog_key.char_indices().nth(CATEGORY_CODE_LEN) {
        Some((idx, _)) => catalog_key.split_at(idx),
        None => (catalog_key, ""),
    }
}

/// Normalize a number scraped from a catalog page: drop spaces and leading zeros.
pub fn clean_catalog_key(raw: &str) -> String {
    let no_spaces: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    no_spaces.trim_start_matches('0').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shop_status_parse_is_case_insensitive() {
        assert_eq!(ShopStatus::parse(" SoldOut ").unwrap(), ShopStatus::SoldOut);
        assert!(ShopStatus::parse("unknown").is_err());
    }

    #[test]
    fn only_soldout_maps_to_unavailable_sentinel() {
        assert!(ShopStatus::SoldOut.is_unavailable());
        assert!(!ShopStatus::Available.is_unavailable());
        assert!(!ShopStatus::Ordered.is_unavailable());
        assert_eq!(ShopStatus::SoldOut.shop_status_code(), UNAVAILABLE_SHOP_STATUS);
    }

    #[test]
    fn class_attr_picks_status_token() {
        assert_eq!(
            ShopStatus::from_class_attr("number_block Ordered"),
            Some(ShopStatus::Ordered)
        );
        assert_eq!(ShopStatus::from_class_attr("number_block"), None);
    }

    #[test]
    fn team_allows_only_available() {
        assert!(Source::Team.allows(ShopStatus::Available));
        assert!(!Source::Team.allows(ShopStatus::SoldOut));
        assert!(Source::Ucom.allows(ShopStatus::SoldOut));
    }

    #[test]
    fn flag_policy_parses_config_spelling() {
        assert_eq!(
            FlagPolicy::parse("preserve_pending").unwrap(),
            FlagPolicy::PreservePending
        );
        assert!(FlagPolicy::parse("keep").is_err());
        assert_eq!(FlagPolicy::default(), FlagPolicy::Overwrite);
    }

    #[test]
    fn catalog_key_splits_into_mnc_and_msn() {
        let raw = RawListing::from_catalog_key("91123456", "ucom", "available");
        assert_eq!(raw.mnc, "91");
        assert_eq!(raw.msn, "123456");
        assert_eq!(split_catalog_key("9"), ("9", ""));
    }

    #[test]
    fn clean_catalog_key_strips_spaces_and_leading_zeros() {
        assert_eq!(clean_catalog_key("0 91 12 34 56"), "91123456");
    }

    #[test]
    fn raw_listing_accepts_crawler_field_names() {
        let raw: RawListing = serde_json::from_str(
            r#"{"mobile_number":"91123456","mnc":"91","msn":"123456","status":"available","shop":"ucom"}"#,
        )
        .unwrap();
        assert_eq!(raw.catalog_key, "91123456");
        assert_eq!(raw.source_name, "ucom");
    }
}
