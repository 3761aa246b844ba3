use std::fmt;

use uuid::Uuid;

use svo_ledger::{ItemBuildError, ProposalError};
use svo_orders::{OrderStatus, TransitionError};
use svo_reconcile::ResolutionError;
use svo_schemas::FulfillmentStatus;

/// Everything an [`crate::AmendmentDesk`] operation can refuse with.
///
/// Domain refusals happen before any write. `Store` wraps infrastructure
/// failures from the [`crate::OrderStore`].
#[derive(Debug)]
pub enum DeskError {
    OrderNotFound { order_id: Uuid },
    ItemNotFound { order_id: Uuid, item_id: Uuid },
    EmptyClientRef,
    EmptyOrder,
    Items(ItemBuildError),
    Proposal(ProposalError),
    Resolution(ResolutionError),
    Transition(TransitionError),
    InvalidFulfillment {
        item_id: Uuid,
        from: FulfillmentStatus,
        to: FulfillmentStatus,
    },
    ItemLocked { item_id: Uuid },
    NotEditable { status: OrderStatus },
    ItemsIncomplete { remaining: usize },
    MissingSignerName,
    Store(anyhow::Error),
}

impl DeskError {
    /// Lift a store failure, surfacing a resolution conflict raised inside
    /// the commit as a typed [`ResolutionError`].
    pub(crate) fn from_store(err: anyhow::Error) -> Self {
        match err.downcast::<ResolutionError>() {
            Ok(res) => DeskError::Resolution(res),
            Err(err) => DeskError::Store(err),
        }
    }

    /// True when the operation lost a race against another resolution.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DeskError::Resolution(ResolutionError::AmendmentNotPending { .. })
        )
    }
}

impl fmt::Display for DeskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeskError::OrderNotFound { order_id } => write!(f, "order not found: {order_id}"),
            DeskError::ItemNotFound { order_id, item_id } => {
                write!(f, "item {item_id} not found on order {order_id}")
            }
            DeskError::EmptyClientRef => write!(f, "client reference must not be empty"),
            DeskError::EmptyOrder => write!(f, "an order needs at least one item"),
            DeskError::Items(e) => write!(f, "{e}"),
            DeskError::Proposal(e) => write!(f, "{e}"),
            DeskError::Resolution(e) => write!(f, "{e}"),
            DeskError::Transition(e) => write!(f, "{e}"),
            DeskError::InvalidFulfillment { item_id, from, to } => write!(
                f,
                "item {item_id} cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            ),
            DeskError::ItemLocked { item_id } => {
                write!(f, "item {item_id} has locked pricing and cannot be removed")
            }
            DeskError::NotEditable { status } => {
                write!(f, "order items cannot be changed while {status}")
            }
            DeskError::ItemsIncomplete { remaining } => {
                write!(f, "{remaining} item(s) not yet completed")
            }
            DeskError::MissingSignerName => write!(f, "signer name must not be empty"),
            DeskError::Store(e) => write!(f, "store failure: {e:#}"),
        }
    }
}

impl std::error::Error for DeskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeskError::Items(e) => Some(e),
            DeskError::Proposal(e) => Some(e),
            DeskError::Resolution(e) => Some(e),
            DeskError::Transition(e) => Some(e),
            DeskError::Store(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<ItemBuildError> for DeskError {
    fn from(e: ItemBuildError) -> Self {
        DeskError::Items(e)
    }
}

impl From<ProposalError> for DeskError {
    fn from(e: ProposalError) -> Self {
        DeskError::Proposal(e)
    }
}

impl From<ResolutionError> for DeskError {
    fn from(e: ResolutionError) -> Self {
        DeskError::Resolution(e)
    }
}

impl From<TransitionError> for DeskError {
    fn from(e: TransitionError) -> Self {
        DeskError::Transition(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svo_schemas::AmendmentResolution;

    #[test]
    fn store_error_surfaces_resolution_conflict() {
        let amendment_id = Uuid::new_v4();
        let raw = anyhow::Error::new(ResolutionError::AmendmentNotPending {
            amendment_id,
            resolution: AmendmentResolution::Approved,
        });
        let e = DeskError::from_store(raw.context("commit_rejection failed"));
        assert!(e.is_conflict(), "got {e}");
    }

    #[test]
    fn plain_store_error_stays_opaque() {
        let e = DeskError::from_store(anyhow::anyhow!("connection reset"));
        assert!(matches!(e, DeskError::Store(_)));
        assert!(!e.is_conflict());
    }
}
