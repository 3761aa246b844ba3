//! Scenario: Edits to a written journal line break the chain.
//!
//! # Invariant under test
//! A hash-chained journal verifies clean as written, keeps its chain across
//! reopen, and reports the first broken line after any payload edit.
//!
//! Uses temp files only.

use serde_json::json;
use uuid::Uuid;

use svo_audit::{read_journal, verify_journal, EventJournal, VerifyResult};
use svo_schemas::{event_names, DispatchEvent};

fn temp_journal_path(suffix: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "svo_journal_test_{}_{}_{}.jsonl",
        suffix,
        std::process::id(),
        Uuid::new_v4().as_simple()
    ))
}

fn write_events(path: &std::path::Path, order_id: Uuid, n: usize) {
    let mut journal = EventJournal::open(path, true).unwrap();
    for i in 0..n {
        journal
            .append(&DispatchEvent::new(
                event_names::AMENDMENT_PROPOSED,
                order_id,
                json!({"index": i, "note": format!("belt-{i}")}),
            ))
            .unwrap();
    }
}

#[test]
fn untampered_journal_verifies() {
    let path = temp_journal_path("clean");
    write_events(&path, Uuid::new_v4(), 4);
    assert_eq!(verify_journal(&path).unwrap(), VerifyResult::Valid { lines: 4 });
    let _ = std::fs::remove_file(&path);
}

#[test]
fn reopened_journal_continues_chain() {
    let path = temp_journal_path("reopen");
    let order_id = Uuid::new_v4();
    write_events(&path, order_id, 2);
    write_events(&path, order_id, 3);

    assert_eq!(verify_journal(&path).unwrap(), VerifyResult::Valid { lines: 5 });
    let entries = read_journal(&path).unwrap();
    let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn edited_payload_is_detected() {
    let path = temp_journal_path("tampered");
    write_events(&path, Uuid::new_v4(), 3);

    let content = std::fs::read_to_string(&path).unwrap();
    let tampered = content.replacen("belt-1", "hose-1", 1);
    assert_ne!(content, tampered);
    std::fs::write(&path, tampered).unwrap();

    match verify_journal(&path).unwrap() {
        VerifyResult::Broken { line, reason } => {
            assert_eq!(line, 2);
            assert!(reason.contains("hash_self mismatch"));
        }
        other => panic!("expected broken chain, got {other:?}"),
    }
    let _ = std::fs::remove_file(&path);
}
