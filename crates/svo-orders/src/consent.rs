//! Consent guard.
//!
//! "Is this order blocked on client consent?" is answered from facts loaded
//! at the moment of the check: the number of unresolved amendments and
//! whether an initial authorization signature exists. The status field is
//! not consulted; after a forced transition it can say anything.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentCheck {
    pub unresolved_amendments: usize,
    pub has_initial_signature: bool,
}

impl ConsentCheck {
    pub fn new(unresolved_amendments: usize, has_initial_signature: bool) -> Self {
        Self {
            unresolved_amendments,
            has_initial_signature,
        }
    }

    pub fn is_awaiting_consent(&self) -> bool {
        self.unresolved_amendments > 0 || !self.has_initial_signature
    }
}
