//! svo-audit
//!
//! Append-only order event journal. JSON Lines, one dispatched event per
//! line, optionally hash-chained: each entry carries the previous entry's
//! hash and its own, so any edit to a written line is detectable.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use svo_schemas::DispatchEvent;

/// Namespace for deterministic entry ids.
const ENTRY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_2c8a_93b4_4e0f_a7c5_1b2d_3e4f_5a60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: Uuid,
    pub seq: u64,
    pub order_id: Uuid,
    pub event_name: String,
    pub ts_utc: DateTime<Utc>,
    pub data: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Append-only journal writer.
pub struct EventJournal {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Number of entries in the file; the next entry's `seq`.
    seq: u64,
}

impl EventJournal {
    /// Open `path`, creating parent directories. An existing journal is
    /// resumed: sequence and chain continue from its last entry.
    pub fn open(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        let mut journal = Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        };

        if journal.path.exists() {
            let content = fs::read_to_string(&journal.path)
                .with_context(|| format!("read journal {:?}", journal.path))?;
            let mut last: Option<JournalEntry> = None;
            for (i, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let entry: JournalEntry = serde_json::from_str(trimmed)
                    .with_context(|| format!("parse journal entry at line {}", i + 1))?;
                last = Some(entry);
            }
            if let Some(e) = last {
                journal.seq = e.seq + 1;
                journal.last_hash = e.hash_self;
            }
        }

        Ok(journal)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one dispatched event.
    pub fn append(&mut self, event: &DispatchEvent) -> Result<JournalEntry> {
        let entry_id = derive_entry_id(self.last_hash.as_deref(), event, self.seq)?;

        let mut entry = JournalEntry {
            entry_id,
            seq: self.seq,
            order_id: event.order_id,
            event_name: event.name.clone(),
            ts_utc: event.ts_utc,
            data: event.data.clone(),
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            entry.hash_prev = self.last_hash.clone();
            let self_hash = compute_entry_hash(&entry)?;
            entry.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }

        let line = canonical_json_line(&entry)?;
        append_line(&self.path, &line)?;
        self.seq += 1;

        Ok(entry)
    }
}

/// Entry id from chain position and content. Same journal state and event
/// give the same id.
fn derive_entry_id(last_hash: Option<&str>, event: &DispatchEvent, seq: u64) -> Result<Uuid> {
    let data = canonical_json_line(&event.data)?;
    let name = format!(
        "{}|{}|{}|{}|{}",
        seq,
        last_hash.unwrap_or("-"),
        event.order_id,
        event.name,
        data
    );
    Ok(Uuid::new_v5(&ENTRY_ID_NAMESPACE, name.as_bytes()))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open journal {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write journal line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Compact JSON with keys sorted recursively.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize journal entry failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash over the canonical entry with `hash_self` cleared.
pub fn compute_entry_hash(entry: &JournalEntry) -> Result<String> {
    let mut clone = entry.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

pub fn verify_journal(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read journal {:?}", path.as_ref()))?;
    verify_journal_str(&content)
}

/// Verify chain links, entry hashes and sequence numbering of JSONL content.
pub fn verify_journal_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut expected_seq = 0u64;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let entry: JournalEntry = serde_json::from_str(trimmed)
            .with_context(|| format!("parse journal entry at line {}", i + 1))?;
        line_count += 1;

        if entry.seq != expected_seq {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!("seq gap: expected {}, got {}", expected_seq, entry.seq),
            });
        }
        expected_seq += 1;

        if entry.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, entry.hash_prev
                ),
            });
        }

        if let Some(ref claimed) = entry.hash_self {
            let recomputed = compute_entry_hash(&entry)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!(
                        "hash_self mismatch: claimed {}, recomputed {}",
                        claimed, recomputed
                    ),
                });
            }
        }

        prev_hash = entry.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

/// Read every entry of a journal, in file order.
pub fn read_journal(path: impl AsRef<Path>) -> Result<Vec<JournalEntry>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read journal {:?}", path.as_ref()))?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, l)| {
            serde_json::from_str(l.trim())
                .with_context(|| format!("parse journal entry {}", i + 1))
        })
        .collect()
}
