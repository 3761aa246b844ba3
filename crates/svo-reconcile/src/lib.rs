//! svo-reconcile
//!
//! Reconciliation Engine: resolving a pending amendment.
//!
//! - Approval signs for the current computed total and freezes the rows the
//!   amendment added.
//! - Rejection removes exactly the rows the amendment added. Linked rows are
//!   found by `amendment_id`; legacy rows are found by content matching
//!   against the ledger snapshot under a named [`MatchPolicy`].
//! - Matching prefers leaving a row orphaned over deleting the wrong one:
//!   weak or ambiguous candidates are reported, never guessed.
//! - After the store commits, [`verify_rejection`] checks counts and totals
//!   and turns every discrepancy into a warning on the report.
//!
//! Deterministic, pure logic. No IO.

mod matcher;
mod policy;
mod resolution;
mod types;
mod verify;

pub use matcher::{is_eligible, locate_amendment_rows, match_entries, score};
pub use policy::{MatchPolicy, MatchWeights};
pub use resolution::{plan_approval, plan_rejection, status_after_resolution};
pub use types::*;
pub use verify::verify_rejection;
