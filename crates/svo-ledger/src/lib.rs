//! svo-ledger
//!
//! Amendment Ledger.
//!
//! - Proposals are validated before anything is written ([`ProposalError`]).
//! - A valid proposal becomes a [`ProposalPlan`]: the new item rows, the
//!   ledger row with its content snapshot, the new total and the status the
//!   order moves to. The plan is applied by a store as one unit of work.
//! - New rows carry the amendment id, so a later rejection can find them
//!   directly; the snapshot remains the durable description of what was
//!   added.
//!
//! Deterministic, pure logic. No IO.

mod items;
mod proposal;

pub use items::{build_item, build_items, ItemBuildError};
pub use proposal::{plan_proposal, ProposalError, ProposalPlan, ProposalRequest};
