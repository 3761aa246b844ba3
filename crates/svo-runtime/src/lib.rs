//! svo-runtime
//!
//! The amendment desk: the one place where pricing, the order state
//! machine, the amendment ledger and reconciliation meet storage, event
//! dispatch and the change feed.
//!
//! Each operation loads a fresh snapshot, plans with pure logic, commits the
//! plan through an [`OrderStore`] as one unit, then publishes an
//! [`svo_schemas::OrderChange`] and hands a [`svo_schemas::DispatchEvent`]
//! to the dispatcher. Dispatch failures are logged and never undo a commit.

mod desk;
mod dispatch;
mod error;
mod store;

pub use desk::{AmendmentDesk, LinePrice, OrderPricing, CHANGE_FEED_CAPACITY};
pub use dispatch::{EventDispatcher, JournalDispatcher, NullDispatcher};
pub use error::DeskError;
pub use store::{OrderStore, PgOrderStore, RejectionCommit};
