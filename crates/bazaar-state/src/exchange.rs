//! # Exchange Lifecycle
//!
//! An exchange is one committed purchase of an offer. It starts in
//! `Committed` when the buyer pays, and ends in one of four terminal states,
//! or in `Disputed` with a `finalized_date` once its dispute is settled.
//!
//! ## Transition Graph
//!
//! ```text
//! Committed ──redeem()──▶ Redeemed ──complete()──▶ Completed
//!   │                        │
//!   ├─cancel()──▶ Canceled   └─mark_disputed()──▶ Disputed ──finalize_dispute()──▶ (final)
//!   ├─revoke()──▶ Revoked
//!   └─expire()──▶ Expired
//! ```
//!
//! `extend_voucher()` and `transfer()` edit a `Committed` exchange in place
//! without changing its state.

use bazaar_core::{Address, ExchangeId, OfferId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::transition::TransitionRecord;

/// Record name used in errors.
const RECORD: &str = "exchange";

/// The lifecycle state of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeState {
    /// Paid for; the voucher can be redeemed.
    Committed,
    /// Voucher redeemed; the dispute period is running.
    Redeemed,
    /// A dispute was raised. Final once the dispute finalizes.
    Disputed,
    /// Seller paid out. Terminal.
    Completed,
    /// Buyer walked away before redemption. Terminal.
    Canceled,
    /// Seller backed out before redemption. Terminal.
    Revoked,
    /// Voucher lapsed unredeemed. Terminal.
    Expired,
}

impl ExchangeState {
    /// Every state, in declaration order.
    pub fn all() -> &'static [ExchangeState] {
        &[
            Self::Committed,
            Self::Redeemed,
            Self::Disputed,
            Self::Completed,
            Self::Canceled,
            Self::Revoked,
            Self::Expired,
        ]
    }

    /// The canonical string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "COMMITTED",
            Self::Redeemed => "REDEEMED",
            Self::Disputed => "DISPUTED",
            Self::Completed => "COMPLETED",
            Self::Canceled => "CANCELED",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Whether no further transition is possible from this state.
    ///
    /// `Disputed` is not terminal: it waits on the dispute machine.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Canceled | Self::Revoked | Self::Expired
        )
    }

    /// Valid target states from this state.
    pub fn valid_transitions(&self) -> &'static [ExchangeState] {
        match self {
            Self::Committed => &[Self::Redeemed, Self::Canceled, Self::Revoked, Self::Expired],
            Self::Redeemed => &[Self::Completed, Self::Disputed],
            Self::Disputed
            | Self::Completed
            | Self::Canceled
            | Self::Revoked
            | Self::Expired => &[],
        }
    }
}

impl std::fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// When a voucher may be redeemed: `valid_from ..= valid_until`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherWindow {
    /// First instant of redeemability.
    pub valid_from: Timestamp,
    /// Last instant of redeemability.
    pub valid_until: Timestamp,
}

impl VoucherWindow {
    /// Whether `now` falls inside the window, bounds included.
    pub fn contains(&self, now: Timestamp) -> bool {
        self.valid_from <= now && now <= self.valid_until
    }

    /// Whether the window closed before `now`.
    pub fn has_lapsed(&self, now: Timestamp) -> bool {
        now > self.valid_until
    }
}

/// A committed purchase.
///
/// Created only through [`Exchange::commit`]; every state change goes
/// through a transition method and lands in
/// [`transition_log`](Exchange::transition_log).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// Engine-assigned identifier.
    pub id: ExchangeId,
    /// The offer that was purchased.
    pub offer_id: OfferId,
    /// Current voucher holder.
    pub buyer: Address,
    /// Offer owner.
    pub seller: Address,
    /// Current lifecycle state.
    pub state: ExchangeState,
    /// When the buyer committed.
    pub committed_date: Timestamp,
    /// When the voucher was redeemed.
    pub redeemed_date: Option<Timestamp>,
    /// When the exchange's funds were released.
    pub finalized_date: Option<Timestamp>,
    /// Redemption window.
    pub voucher: VoucherWindow,
    /// Complete transition history.
    pub transition_log: Vec<TransitionRecord<ExchangeState>>,
}

impl Exchange {
    /// Create a new exchange in `Committed`.
    pub fn commit(
        id: ExchangeId,
        offer_id: OfferId,
        buyer: Address,
        seller: Address,
        voucher: VoucherWindow,
        at: Timestamp,
    ) -> Self {
        Self {
            id,
            offer_id,
            buyer,
            seller,
            state: ExchangeState::Committed,
            committed_date: at,
            redeemed_date: None,
            finalized_date: None,
            voucher,
            transition_log: vec![TransitionRecord {
                from_state: ExchangeState::Committed,
                to_state: ExchangeState::Committed,
                timestamp: at,
                actor: buyer,
            }],
        }
    }

    /// Whether funds for this exchange have been released.
    pub fn is_finalized(&self) -> bool {
        self.finalized_date.is_some()
    }

    /// Check that the exchange is in `expected`, so that a move to `target`
    /// would be accepted.
    ///
    /// # Errors
    ///
    /// [`StateError::TerminalState`] from a terminal state, otherwise
    /// [`StateError::InvalidTransition`] when the state differs.
    pub fn require_state(
        &self,
        expected: ExchangeState,
        target: ExchangeState,
    ) -> Result<(), StateError> {
        if self.state.is_terminal() {
            return Err(StateError::TerminalState {
                record: RECORD,
                state: self.state.as_str().to_string(),
            });
        }
        if self.state != expected {
            return Err(StateError::InvalidTransition {
                record: RECORD,
                from: self.state.as_str().to_string(),
                to: target.as_str().to_string(),
                reason: format!("expected state {expected}"),
            });
        }
        Ok(())
    }

    /// Transition Committed → Redeemed.
    pub fn redeem(&mut self, actor: Address, at: Timestamp) -> Result<(), StateError> {
        self.transition(ExchangeState::Committed, ExchangeState::Redeemed, actor, at)?;
        self.redeemed_date = Some(at);
        Ok(())
    }

    /// Transition Redeemed → Completed and finalize.
    pub fn complete(&mut self, actor: Address, at: Timestamp) -> Result<(), StateError> {
        self.transition(ExchangeState::Redeemed, ExchangeState::Completed, actor, at)?;
        self.finalized_date = Some(at);
        Ok(())
    }

    /// Transition Committed → Canceled and finalize.
    pub fn cancel(&mut self, actor: Address, at: Timestamp) -> Result<(), StateError> {
        self.transition(ExchangeState::Committed, ExchangeState::Canceled, actor, at)?;
        self.finalized_date = Some(at);
        Ok(())
    }

    /// Transition Committed → Revoked and finalize.
    pub fn revoke(&mut self, actor: Address, at: Timestamp) -> Result<(), StateError> {
        self.transition(ExchangeState::Committed, ExchangeState::Revoked, actor, at)?;
        self.finalized_date = Some(at);
        Ok(())
    }

    /// Transition Committed → Expired and finalize.
    pub fn expire(&mut self, actor: Address, at: Timestamp) -> Result<(), StateError> {
        self.transition(ExchangeState::Committed, ExchangeState::Expired, actor, at)?;
        self.finalized_date = Some(at);
        Ok(())
    }

    /// Transition Redeemed → Disputed.
    pub fn mark_disputed(&mut self, actor: Address, at: Timestamp) -> Result<(), StateError> {
        self.transition(ExchangeState::Redeemed, ExchangeState::Disputed, actor, at)
    }

    /// Stamp the finalization of a disputed exchange.
    ///
    /// # Errors
    ///
    /// [`StateError::InvalidTransition`] unless the exchange is `Disputed`
    /// and not yet finalized.
    pub fn finalize_dispute(&mut self, at: Timestamp) -> Result<(), StateError> {
        if self.state != ExchangeState::Disputed || self.is_finalized() {
            return Err(StateError::InvalidTransition {
                record: RECORD,
                from: self.state.as_str().to_string(),
                to: ExchangeState::Disputed.as_str().to_string(),
                reason: "only an open disputed exchange can be finalized".to_string(),
            });
        }
        self.finalized_date = Some(at);
        Ok(())
    }

    /// Push the end of the redemption window to `new_valid_until`.
    ///
    /// # Errors
    ///
    /// State errors unless `Committed`; [`StateError::DeadlineNotExtended`]
    /// unless the new end is strictly later.
    pub fn extend_voucher(&mut self, new_valid_until: Timestamp) -> Result<(), StateError> {
        self.require_state(ExchangeState::Committed, ExchangeState::Committed)?;
        if new_valid_until <= self.voucher.valid_until {
            return Err(StateError::DeadlineNotExtended {
                current: self.voucher.valid_until,
                requested: new_valid_until,
            });
        }
        self.voucher.valid_until = new_valid_until;
        Ok(())
    }

    /// Hand the voucher to `new_holder`, who becomes the buyer.
    pub fn transfer(&mut self, new_holder: Address) -> Result<(), StateError> {
        self.require_state(ExchangeState::Committed, ExchangeState::Committed)?;
        self.buyer = new_holder;
        Ok(())
    }

    fn transition(
        &mut self,
        expected: ExchangeState,
        target: ExchangeState,
        actor: Address,
        at: Timestamp,
    ) -> Result<(), StateError> {
        self.require_state(expected, target)?;
        self.transition_log.push(TransitionRecord {
            from_state: expected,
            to_state: target,
            timestamp: at,
            actor,
        });
        self.state = target;
        Ok(())
    }
}
