//! # bazaar-settlement — Exchange Settlement Engine
//!
//! Custodies the stakes of a purchase from commitment to a deterministic
//! outcome, with a neutral dispute resolver as the fallback of last resort.
//!
//! ## Components
//!
//! - **Ledger** (`ledger.rs`): available balances per `(owner, asset)` and one
//!   escrow account per exchange. Escrow releases are all-or-nothing and must
//!   pay out exactly what was encumbered.
//!
//! - **Exchange engine** (`exchange.rs`): commit, redeem, cancel, revoke,
//!   expire, extend, transfer and complete.
//!
//! - **Dispute engine** (`dispute.rs`): raise, retract, extend, expire,
//!   resolve by counterparty signature, escalate to the resolver, decide,
//!   refuse and expire an escalation.
//!
//! - **Funds** (`funds.rs`): deposits and checks-effects-interactions
//!   withdrawals.
//!
//! - **Pause gate** (`pause.rs`), **relay** (`relay.rs`), **events**
//!   (`events.rs`) and **configuration** (`config.rs`).
//!
//! - **Facade** (`engine.rs`): [`SettlementEngine`] serializes mutating calls
//!   behind one lock, rejects re-entrant calls, checks pause regions and
//!   publishes staged events only when an operation succeeds.
//!
//! ## Collaborators
//!
//! Offers and resolvers come from an [`OfferRegistry`], value moves through a
//! [`TokenTransfer`], and time comes from a [`bazaar_core::Clock`]. In-memory
//! implementations of all three ship with the crate.

pub mod config;
pub mod dispute;
pub mod engine;
pub mod error;
pub mod events;
pub mod exchange;
pub mod funds;
pub mod guard;
pub mod ledger;
pub mod pause;
pub mod registry;
pub mod relay;
pub mod transfer;

mod session;

pub use config::{ConfigError, RefusalPolicy, SettlementConfig};
pub use engine::SettlementEngine;
pub use error::{ErrorKind, SettlementError};
pub use events::{EventEnvelope, EventSubscriber, SettlementEvent};
pub use exchange::ExchangeTerms;
pub use ledger::{EscrowAccount, EscrowStatus, EscrowTransaction, FundsLedger};
pub use pause::PauseGate;
pub use registry::{DisputeResolver, DisputeResolverFee, InMemoryRegistry, Offer, OfferRegistry};
pub use relay::{CallOutput, EngineCall, MetaTransaction};
pub use transfer::{InMemoryTokenBank, TokenTransfer, TransferError};
