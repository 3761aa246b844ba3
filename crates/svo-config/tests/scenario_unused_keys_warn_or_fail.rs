//! Scenario: Keys the desk never reads are reported.
//!
//! # Invariant under test
//! Every leaf outside the desk's consumed pointers is listed, sorted. In
//! `Warn` mode the report is returned; in `Fail` mode the load is refused.
//! Leaves under a consumed prefix (e.g. individual match weights) are never
//! flagged.
//!
//! All tests are pure in-process.

use svo_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

const YAML: &str = r#"
pricing:
  default_vat_bps: 1600
  currency: "MXN"
reconcile:
  weights: { total: 40, catalog_ref: 35, unit_price: 15, vat: 10 }
legacy:
  matcher: "v1"
"#;

#[test]
fn warn_mode_lists_unused_leaves() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/legacy/matcher".to_string(), "/pricing/currency".to_string()]
    );
}

#[test]
fn fail_mode_refuses_unused_leaves() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap_err();
    assert!(err.to_string().starts_with("CONFIG_UNUSED_KEYS: 2 unused"));
}

#[test]
fn fully_consumed_config_is_clean() {
    let yaml = r#"
pricing:
  default_vat_bps: 1600
  rounding_increment_minor: 10
reconcile:
  threshold: 80
journal:
  path: "/tmp/j.jsonl"
  hash_chain: false
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}
