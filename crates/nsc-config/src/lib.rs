//! nsc-config
//!
//! Layered YAML configuration for the collector.
//!
//! - Files merge in order: earlier files are the base, later ones override.
//! - The merged document is hashed (SHA-256 over canonical JSON) so a run can
//!   record exactly which configuration it used.
//! - Secret-looking literals are refused; the config holds env var names only.
//! - Each command reads a known set of keys; anything else is reported as
//!   unused.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

mod collector;
mod secrets;

pub use collector::{CollectorConfig, CollectorSection, DatabaseSection, DEFAULT_DB_URL_ENV};
pub use nsc_schemas::FlagPolicy;
pub use secrets::{resolve_database_url, DatabaseUrl};

// ---------------------------------------------------------------------------
// Unused-key report
// ---------------------------------------------------------------------------

/// Command a configuration is loaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCommand {
    Collect,
    Propagate,
}

impl ConfigCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigCommand::Collect => "COLLECT",
            ConfigCommand::Propagate => "PROPAGATE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub command: String,
    /// Consumed JSON-pointer prefixes (sorted, unique).
    pub consumed_prefixes: Vec<String>,
    /// Leaf pointers not under any consumed prefix (sorted).
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// JSON-pointer prefixes each command actually reads.
pub fn consumed_pointers_for_command(command: ConfigCommand) -> &'static [&'static str] {
    match command {
        ConfigCommand::Collect => &[
            "/collector/batch_size",
            "/collector/flag_policy",
            "/database/url_env",
            "/database/max_connections",
        ],
        ConfigCommand::Propagate => &["/database/url_env", "/database/max_connections"],
    }
}

/// Report leaves of `config_json` the command never reads.
/// With `UnusedKeyPolicy::Fail` a non-clean report is an error.
pub fn report_unused_keys(
    command: ConfigCommand,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed_prefixes: Vec<String> = consumed_pointers_for_command(command)
        .iter()
        .map(|p| p.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|leaf| !consumed_prefixes.iter().any(|c| covers(c, leaf)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        command: command.as_str().to_string(),
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(8)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS command={} count={} keys={}",
            report.command,
            report.unused_leaf_pointers.len(),
            shown.join(",")
        );
    }

    Ok(report)
}

/// "/a/b" covers "/a/b" and "/a/b/c" but not "/a/bc".
fn covers(consumed: &str, leaf: &str) -> bool {
    match leaf.strip_prefix(consumed) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

pub(crate) fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                collect_leaf_pointers(vv, &format!("{prefix}/{i}"), out);
            }
        }
        _ => out.push(if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }),
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the collector settings, validated.
    pub fn collector(&self) -> Result<CollectorConfig> {
        CollectorConfig::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    if paths.is_empty() {
        bail!("no config paths given");
    }
    let mut docs: Vec<String> = Vec::with_capacity(paths.len());
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merge_into(&mut merged, v_json);
    }

    secrets::enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; any other value in `over` replaces `base`.
fn merge_into(base: &mut Value, over: Value) {
    match over {
        Value::Object(over_map) if base.is_object() => {
            if let Value::Object(base_map) = base {
                for (k, v) in over_map {
                    merge_into(base_map.entry(k).or_insert(Value::Null), v);
                }
            }
        }
        other => *base = other,
    }
}

/// serde_json's default map is ordered by key, so compact output is canonical.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(v).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_override_earlier_ones() {
        let loaded = load_layered_yaml_from_strings(&[
            "collector:\n  batch_size: 100\n  flag_policy: overwrite\n",
            "collector:\n  batch_size: 250\n",
        ])
        .unwrap();
        assert_eq!(loaded.config_json["collector"]["batch_size"], 250);
        assert_eq!(loaded.config_json["collector"]["flag_policy"], "overwrite");
    }

    #[test]
    fn consumed_pointer_respects_segment_boundary() {
        assert!(covers("/database", "/database/url_env"));
        assert!(covers("/database/url_env", "/database/url_env"));
        assert!(!covers("/database", "/databases/x"));
    }

    #[test]
    fn scalar_layer_replaces_a_section() {
        let loaded = load_layered_yaml_from_strings(&[
            "collector:\n  batch_size: 100\n",
            "collector: null\n",
        ])
        .unwrap();
        assert!(loaded.config_json["collector"].is_null());
    }

    #[test]
    fn pointer_tokens_are_escaped() {
        let v = serde_json::json!({"a/b": {"c~d": 1}});
        let mut out = Vec::new();
        collect_leaf_pointers(&v, "", &mut out);
        assert_eq!(out, vec!["/a~1b/c~0d".to_string()]);
    }
}
