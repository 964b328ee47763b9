//! # bazaar-state — Exchange and Dispute State Machines
//!
//! The records the settlement engine mutates, and the rules for mutating
//! them.
//!
//! ## State Machines
//!
//! - **Exchange** (`exchange.rs`): `Committed → {Redeemed, Canceled, Revoked,
//!   Expired}`, `Redeemed → {Completed, Disputed}`. A disputed exchange stays
//!   `Disputed` and becomes final when its dispute finalizes.
//!
//! - **Dispute** (`dispute.rs`): `Resolving → {Retracted, Resolved,
//!   Escalated}`, `Escalated → {Resolved, Decided, Refused, Retracted}`.
//!
//! ## Design
//!
//! Both machines are validated enums rather than typestates: records are
//! looked up by id at runtime and their state is only known then. Each
//! transition is a dedicated method that checks the source state, appends a
//! [`TransitionRecord`] and only then mutates. Terminal records reject every
//! transition with [`StateError::TerminalState`].
//!
//! Authorization and deadline checks belong to the engine; this crate only
//! knows which state may follow which.

pub mod dispute;
pub mod error;
pub mod exchange;
pub mod transition;

pub use dispute::{Dispute, DisputeDates, DisputeState};
pub use error::StateError;
pub use exchange::{Exchange, ExchangeState, VoucherWindow};
pub use transition::TransitionRecord;
