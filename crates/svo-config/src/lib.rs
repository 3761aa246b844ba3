//! svo-config
//!
//! Layered YAML configuration for the amendment desk.
//!
//! - Documents merge in order; later documents override earlier ones.
//! - The merged document is canonicalized to JSON and hashed (SHA-256, hex)
//!   so a running desk can report exactly which configuration it uses.
//! - Credentials never live in config: database URLs come from
//!   `SVO_DATABASE_URL`, and literal secrets in any leaf are rejected.
//! - [`DeskConfig`] is the typed view; every key it does not read shows up
//!   in the unused-key report.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

mod consumption;
mod desk;

pub use consumption::{report_unused_keys, UnusedKeyPolicy, UnusedKeyReport, DESK_CONSUMED_POINTERS};
pub use desk::{DeskConfig, JournalConfig, PricingConfig};

/// Env var holding the PostgreSQL URL.
pub const ENV_DATABASE_URL: &str = "SVO_DATABASE_URL";

const SECRET_PREFIXES: &[&str] = &["-----BEGIN", "sk_live", "sk_test", "AKIA"];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view with defaults for absent keys.
    pub fn desk(&self) -> Result<DeskConfig> {
        DeskConfig::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty document parses to null; it overrides nothing.
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json =
        serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    consumption::collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(|val| val.as_str()) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

/// PEM blocks, well-known key prefixes, and URLs carrying a password.
fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if SECRET_PREFIXES.iter().any(|p| t.starts_with(p)) {
        return true;
    }
    match t.split_once("://") {
        Some((_, rest)) => rest
            .split('/')
            .next()
            .and_then(|authority| authority.rsplit_once('@'))
            .map_or(false, |(userinfo, _)| userinfo.contains(':')),
        None => false,
    }
}
