//! Load producer output from disk.
//!
//! The crawlers hand their records to the collector as CSV (header row
//! required) or JSON lines. Column / key names follow [`RawListing`], with
//! the crawler aliases `mobile_number`, `shop` and `spider_name` accepted.
//! Every record goes through [`normalize_listing`] on the way in.

use anyhow::{anyhow, Context, Result};
use nsc_schemas::{clean_catalog_key, split_catalog_key, RawListing, ShopStatus, Source};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Jsonl,
}

impl InputFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(InputFormat::Csv),
            "jsonl" | "ndjson" => Ok(InputFormat::Jsonl),
            other => Err(anyhow!(
                "invalid input format '{}'. expected one of: csv | jsonl",
                other
            )),
        }
    }

    /// Guess from the file extension; defaults to JSON lines.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => InputFormat::Csv,
            _ => InputFormat::Jsonl,
        }
    }
}

pub fn read_listings(path: &Path, format: InputFormat) -> Result<Vec<RawListing>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read listings failed: {}", path.display()))?;
    parse_listings(&raw, format)
}

pub fn parse_listings(raw: &str, format: InputFormat) -> Result<Vec<RawListing>> {
    match format {
        InputFormat::Csv => {
            let mut rdr = csv::Reader::from_reader(raw.as_bytes());
            let mut out = Vec::new();
            for (i, rec) in rdr.deserialize().enumerate() {
                let listing: RawListing =
                    rec.with_context(|| format!("deserialize csv record {} failed", i + 1))?;
                out.push(normalize_listing(listing));
            }
            Ok(out)
        }
        InputFormat::Jsonl => {
            let mut out = Vec::new();
            for (i, line) in raw.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let listing: RawListing = serde_json::from_str(line)
                    .with_context(|| format!("deserialize jsonl line {} failed", i + 1))?;
                out.push(normalize_listing(listing));
            }
            Ok(out)
        }
    }
}

/// Apply the per-catalog loader rules to a record as the crawler wrote it.
///
/// Team prints numbers with spaces and a trunk `0` and lists only numbers for
/// sale, so its key is cleaned, `mnc` / `msn` are re-derived from the cleaned
/// key, and an empty status becomes `available`. Ucom records may carry the
/// tile's class attribute instead of a bare status. Records of any source with
/// neither `mnc` nor `msn` get both from the key. Anything still malformed is
/// left for the validator to reject.
pub fn normalize_listing(mut raw: RawListing) -> RawListing {
    match Source::parse(&raw.source_name) {
        Ok(Source::Team) => {
            raw.catalog_key = clean_catalog_key(&raw.catalog_key);
            let (mnc, msn) = split_catalog_key(&raw.catalog_key);
            raw.mnc = mnc.to_string();
            raw.msn = msn.to_string();
            if raw.status.trim().is_empty() {
                raw.status = ShopStatus::Available.as_str().to_string();
            }
        }
        Ok(Source::Ucom) => {
            if ShopStatus::parse(&raw.status).is_err() {
                if let Some(status) = ShopStatus::from_class_attr(&raw.status) {
                    raw.status = status.as_str().to_string();
                }
            }
        }
        Err(_) => {}
    }

    if raw.mnc.trim().is_empty() && raw.msn.trim().is_empty() {
        let (mnc, msn) = split_catalog_key(raw.catalog_key.trim());
        raw.mnc = mnc.to_string();
        raw.msn = msn.to_string();
    }
    raw
}
