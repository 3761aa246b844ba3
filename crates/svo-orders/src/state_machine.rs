//! Order status state machine.
//!
//! # State diagram
//!
//! ```text
//!   AwaitingInitialAuthorization
//!        │ InitialSignatureRecorded
//!        ▼
//!      Active ──AmendmentProposed──► AwaitingAmendmentAuthorization
//!        ▲  ◄──AmendmentResolved────────────┘   (approved or rejected)
//!        │
//!        │ AllItemsCompleted
//!        ▼
//!   AwaitingDeliverySignature ──DeliverySignatureRecorded──► Delivered (term.)
//!
//!   any non-terminal ──Cancel──► Cancelled (term.)
//! ```
//!
//! A second `AmendmentProposed` while already awaiting amendment
//! authorization is accepted and leaves the status unchanged. Nothing in the
//! order lifecycle prevents two unresolved amendments on one order; the
//! consent check ([`crate::ConsentCheck`]) still reports the order as blocked
//! while any amendment is unresolved.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    AwaitingInitialAuthorization,
    /// Work in progress.
    Active,
    AwaitingAmendmentAuthorization,
    AwaitingDeliverySignature,
    /// **Terminal.**
    Delivered,
    /// **Terminal.**
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::AwaitingInitialAuthorization => "AWAITING_INITIAL_AUTHORIZATION",
            OrderStatus::Active => "ACTIVE",
            OrderStatus::AwaitingAmendmentAuthorization => "AWAITING_AMENDMENT_AUTHORIZATION",
            OrderStatus::AwaitingDeliverySignature => "AWAITING_DELIVERY_SIGNATURE",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AWAITING_INITIAL_AUTHORIZATION" => Some(OrderStatus::AwaitingInitialAuthorization),
            "ACTIVE" => Some(OrderStatus::Active),
            "AWAITING_AMENDMENT_AUTHORIZATION" => Some(OrderStatus::AwaitingAmendmentAuthorization),
            "AWAITING_DELIVERY_SIGNATURE" => Some(OrderStatus::AwaitingDeliverySignature),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// How a pending amendment was resolved. Has no "still pending" variant:
/// an order cannot leave the awaiting state with its amendment unresolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolvedBy {
    Approval { signature_id: Uuid },
    Rejection,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    /// The client signed the initial authorization.
    InitialSignatureRecorded { signature_id: Uuid },
    /// An amendment was written to the ledger.
    AmendmentProposed { amendment_id: Uuid },
    /// A pending amendment was approved or reverted.
    AmendmentResolved {
        amendment_id: Uuid,
        resolved_by: ResolvedBy,
    },
    /// Every non-cancelled item reached completion.
    AllItemsCompleted,
    /// The client signed for delivery.
    DeliverySignatureRecorded { signature_id: Uuid },
    Cancel,
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::InitialSignatureRecorded { .. } => "InitialSignatureRecorded",
            OrderEvent::AmendmentProposed { .. } => "AmendmentProposed",
            OrderEvent::AmendmentResolved { .. } => "AmendmentResolved",
            OrderEvent::AllItemsCompleted => "AllItemsCompleted",
            OrderEvent::DeliverySignatureRecorded { .. } => "DeliverySignatureRecorded",
            OrderEvent::Cancel => "Cancel",
        }
    }
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Client,
    Staff,
    Supervisor,
}

/// Whoever triggered an operation. Recorded on amendments and signatures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Only supervisors may force transitions.
    pub fn is_privileged(&self) -> bool {
        self.role == ActorRole::Supervisor
    }
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The event is not legal in the current status.
    Illegal { from: OrderStatus, event: String },
    /// A non-privileged actor attempted to force a transition.
    NotPrivileged { actor_id: String },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::Illegal { from, event } => {
                write!(f, "illegal order transition: {from} + {event}")
            }
            TransitionError::NotPrivileged { actor_id } => {
                write!(f, "actor {actor_id} may not force order transitions")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// Transition functions
// ---------------------------------------------------------------------------

/// Status reached by applying `event` in `from`.
pub fn transition(from: OrderStatus, event: &OrderEvent) -> Result<OrderStatus, TransitionError> {
    use OrderEvent::*;
    use OrderStatus::*;

    let to = match (from, event) {
        (AwaitingInitialAuthorization, InitialSignatureRecorded { .. }) => Active,

        (Active, AmendmentProposed { .. }) => AwaitingAmendmentAuthorization,
        // Not blocked: see module docs.
        (AwaitingAmendmentAuthorization, AmendmentProposed { .. }) => {
            AwaitingAmendmentAuthorization
        }

        // Approved or rejected, the order always returns to work.
        (AwaitingAmendmentAuthorization, AmendmentResolved { .. }) => Active,

        (Active, AllItemsCompleted) => AwaitingDeliverySignature,

        (AwaitingDeliverySignature, DeliverySignatureRecorded { .. }) => Delivered,

        (s, Cancel) if !s.is_terminal() => Cancelled,

        (s, ev) => {
            return Err(TransitionError::Illegal {
                from: s,
                event: ev.name().to_string(),
            })
        }
    };
    Ok(to)
}

/// Record of a guard-bypassing transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
}

/// Move to `to` without evaluating any guard. Only privileged actors.
pub fn force_transition(
    from: OrderStatus,
    to: OrderStatus,
    actor: &Actor,
) -> Result<ForcedTransition, TransitionError> {
    if !actor.is_privileged() {
        return Err(TransitionError::NotPrivileged {
            actor_id: actor.id.clone(),
        });
    }
    Ok(ForcedTransition {
        from,
        to,
        actor: actor.clone(),
    })
}

// ---------------------------------------------------------------------------
// OrderMachine
// ---------------------------------------------------------------------------

/// A single order's status tracked through the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderMachine {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

impl OrderMachine {
    pub fn new(order_id: Uuid) -> Self {
        Self {
            order_id,
            status: OrderStatus::AwaitingInitialAuthorization,
        }
    }

    pub fn with_status(order_id: Uuid, status: OrderStatus) -> Self {
        Self { order_id, status }
    }

    /// Apply an event. On error the status is unchanged.
    pub fn apply(&mut self, event: &OrderEvent) -> Result<OrderStatus, TransitionError> {
        let to = transition(self.status, event)?;
        self.status = to;
        Ok(to)
    }

    pub fn force(
        &mut self,
        to: OrderStatus,
        actor: &Actor,
    ) -> Result<ForcedTransition, TransitionError> {
        let forced = force_transition(self.status, to, actor)?;
        self.status = to;
        Ok(forced)
    }
}
