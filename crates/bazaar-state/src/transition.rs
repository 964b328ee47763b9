//! # Transition Records

use bazaar_core::{Address, Timestamp};
use serde::{Deserialize, Serialize};

/// One entry in a record's append-only audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord<S> {
    /// State before the transition.
    pub from_state: S,
    /// State after the transition.
    pub to_state: S,
    /// When the transition happened.
    pub timestamp: Timestamp,
    /// Who triggered it.
    pub actor: Address,
}
