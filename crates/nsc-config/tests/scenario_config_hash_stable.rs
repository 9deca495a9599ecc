//! Config hash stability.
//!
//! - Same inputs give the same hash.
//! - Key order inside the YAML does not change the hash.
//! - A different value gives a different hash.
//! - Overlays change the hash only through the values they change.

use nsc_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
collector:
  batch_size: 100
  flag_policy: overwrite
database:
  url_env: NSC_DATABASE_URL
  max_connections: 5
"#;

const BASE_YAML_REORDERED: &str = r#"
database:
  max_connections: 5
  url_env: NSC_DATABASE_URL
collector:
  flag_policy: overwrite
  batch_size: 100
"#;

const OVERLAY_YAML: &str = r#"
collector:
  batch_size: 500
"#;

#[test]
fn hash_is_deterministic_across_calls() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).expect("load");
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).expect("load");
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.config_hash.len(), 64, "sha256 hex");
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).expect("load");
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).expect("load");
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn overlay_changes_hash() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).expect("load");
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).expect("load");
    assert_ne!(base.config_hash, merged.config_hash);

    let cfg = merged.collector().expect("typed");
    assert_eq!(cfg.collector.batch_size, 500);
    assert_eq!(cfg.database.max_connections, 5);
}
