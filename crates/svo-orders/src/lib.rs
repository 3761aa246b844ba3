//! svo-orders
//!
//! Order status state machine.
//!
//! - Standard transitions are driven by [`OrderEvent`]s; events that need
//!   client consent carry the id of the signature that proves it.
//! - A privileged [`Actor`] may force any transition ([`force_transition`]);
//!   forcing never creates an authorization record.
//! - Whether an order is blocked on client consent is computed from fresh
//!   facts by [`ConsentCheck`], never inferred from the status alone.
//!
//! Deterministic, pure logic. No IO.

mod consent;
mod state_machine;

pub use consent::ConsentCheck;
pub use state_machine::{
    force_transition, transition, Actor, ActorRole, ForcedTransition, OrderEvent, OrderMachine,
    OrderStatus, ResolvedBy, TransitionError,
};
