//! # Dispute Lifecycle
//!
//! A dispute is raised by the buyer on a redeemed exchange and ends in one of
//! four terminal states. At most one dispute exists per exchange, keyed by
//! the exchange id.
//!
//! ## Transition Graph
//!
//! ```text
//! Resolving ──escalate()──▶ Escalated
//!   │                          │
//!   ├─retract()──▶ Retracted ◀─┤ retract()
//!   ├─expire()───▶ Retracted   │
//!   └─resolve()──▶ Resolved ◀──┤ resolve()
//!                              ├─decide()──────────▶ Decided
//!                              ├─refuse()──────────▶ Refused
//!                              └─expire_escalated()▶ Refused
//! ```
//!
//! ## Timeout
//!
//! `dates.timeout` only moves forward while `Resolving`
//! ([`Dispute::extend_timeout`]). Escalation replaces it with the resolver's
//! response deadline, which may be earlier or later than the old value.

use bazaar_core::{Address, BasisPoints, ExchangeId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::transition::TransitionRecord;

/// Record name used in errors.
const RECORD: &str = "dispute";

/// The lifecycle state of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeState {
    /// Parties are negotiating.
    Resolving,
    /// Buyer withdrew the dispute, or it lapsed unresolved. Terminal.
    Retracted,
    /// Parties agreed on a split. Terminal.
    Resolved,
    /// Handed to the dispute resolver.
    Escalated,
    /// Resolver ruled on a split. Terminal.
    Decided,
    /// Resolver declined, or failed to respond in time. Terminal.
    Refused,
}

impl DisputeState {
    /// Every state, in declaration order.
    pub fn all() -> &'static [DisputeState] {
        &[
            Self::Resolving,
            Self::Retracted,
            Self::Resolved,
            Self::Escalated,
            Self::Decided,
            Self::Refused,
        ]
    }

    /// The canonical string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolving => "RESOLVING",
            Self::Retracted => "RETRACTED",
            Self::Resolved => "RESOLVED",
            Self::Escalated => "ESCALATED",
            Self::Decided => "DECIDED",
            Self::Refused => "REFUSED",
        }
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Retracted | Self::Resolved | Self::Decided | Self::Refused
        )
    }

    /// Valid target states from this state.
    pub fn valid_transitions(&self) -> &'static [DisputeState] {
        match self {
            Self::Resolving => &[Self::Retracted, Self::Resolved, Self::Escalated],
            Self::Escalated => &[Self::Resolved, Self::Decided, Self::Refused, Self::Retracted],
            Self::Retracted | Self::Resolved | Self::Decided | Self::Refused => &[],
        }
    }
}

impl std::fmt::Display for DisputeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Milestones of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeDates {
    /// When the buyer raised the dispute.
    pub disputed: Timestamp,
    /// When the buyer escalated.
    pub escalated: Option<Timestamp>,
    /// When funds were released.
    pub finalized: Option<Timestamp>,
    /// Deadline for the current phase.
    pub timeout: Timestamp,
}

/// A dispute over one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    /// The disputed exchange.
    pub exchange_id: ExchangeId,
    /// Current lifecycle state.
    pub state: DisputeState,
    /// Buyer's share of the pot once resolved or decided.
    pub buyer_percent: BasisPoints,
    /// Milestones and current deadline.
    pub dates: DisputeDates,
    /// Escalation deposit held on the buyer's behalf.
    pub buyer_escalation_deposit: u128,
    /// Complete transition history.
    pub transition_log: Vec<TransitionRecord<DisputeState>>,
}

impl Dispute {
    /// Open a dispute in `Resolving`, due at `timeout`.
    pub fn raise(exchange_id: ExchangeId, buyer: Address, at: Timestamp, timeout: Timestamp) -> Self {
        Self {
            exchange_id,
            state: DisputeState::Resolving,
            buyer_percent: BasisPoints::ZERO,
            dates: DisputeDates {
                disputed: at,
                escalated: None,
                finalized: None,
                timeout,
            },
            buyer_escalation_deposit: 0,
            transition_log: vec![TransitionRecord {
                from_state: DisputeState::Resolving,
                to_state: DisputeState::Resolving,
                timestamp: at,
                actor: buyer,
            }],
        }
    }

    /// Whether the current deadline has passed.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.dates.timeout
    }

    /// Check that the dispute is in one of `allowed`, so that a move to
    /// `target` would be accepted.
    ///
    /// # Errors
    ///
    /// [`StateError::TerminalState`] from a terminal state, otherwise
    /// [`StateError::InvalidTransition`].
    pub fn require_state(
        &self,
        allowed: &[DisputeState],
        target: DisputeState,
    ) -> Result<(), StateError> {
        if self.state.is_terminal() {
            return Err(StateError::TerminalState {
                record: RECORD,
                state: self.state.as_str().to_string(),
            });
        }
        if !allowed.contains(&self.state) {
            let expected: Vec<&str> = allowed.iter().map(DisputeState::as_str).collect();
            return Err(StateError::InvalidTransition {
                record: RECORD,
                from: self.state.as_str().to_string(),
                to: target.as_str().to_string(),
                reason: format!("expected state {}", expected.join(" or ")),
            });
        }
        Ok(())
    }

    /// Resolving | Escalated → Retracted. Buyer gives up.
    pub fn retract(&mut self, actor: Address, at: Timestamp) -> Result<(), StateError> {
        self.finalize(
            &[DisputeState::Resolving, DisputeState::Escalated],
            DisputeState::Retracted,
            actor,
            at,
        )
    }

    /// Resolving → Retracted. The negotiation window lapsed.
    pub fn expire(&mut self, actor: Address, at: Timestamp) -> Result<(), StateError> {
        self.finalize(&[DisputeState::Resolving], DisputeState::Retracted, actor, at)
    }

    /// Move the deadline of a `Resolving` dispute to a strictly later time.
    pub fn extend_timeout(&mut self, new_timeout: Timestamp) -> Result<(), StateError> {
        self.require_state(&[DisputeState::Resolving], DisputeState::Resolving)?;
        if new_timeout <= self.dates.timeout {
            return Err(StateError::DeadlineNotExtended {
                current: self.dates.timeout,
                requested: new_timeout,
            });
        }
        self.dates.timeout = new_timeout;
        Ok(())
    }

    /// Resolving | Escalated → Resolved with the agreed buyer share.
    pub fn resolve(
        &mut self,
        actor: Address,
        at: Timestamp,
        buyer_percent: BasisPoints,
    ) -> Result<(), StateError> {
        self.finalize(
            &[DisputeState::Resolving, DisputeState::Escalated],
            DisputeState::Resolved,
            actor,
            at,
        )?;
        self.buyer_percent = buyer_percent;
        Ok(())
    }

    /// Resolving → Escalated. Records the deposit and replaces the deadline
    /// with the resolver's response deadline.
    pub fn escalate(
        &mut self,
        actor: Address,
        at: Timestamp,
        response_deadline: Timestamp,
        deposit: u128,
    ) -> Result<(), StateError> {
        self.require_state(&[DisputeState::Resolving], DisputeState::Escalated)?;
        self.record_transition(DisputeState::Escalated, actor, at);
        self.state = DisputeState::Escalated;
        self.dates.escalated = Some(at);
        self.dates.timeout = response_deadline;
        self.buyer_escalation_deposit = deposit;
        Ok(())
    }

    /// Escalated → Decided with the resolver's buyer share.
    pub fn decide(
        &mut self,
        actor: Address,
        at: Timestamp,
        buyer_percent: BasisPoints,
    ) -> Result<(), StateError> {
        self.finalize(&[DisputeState::Escalated], DisputeState::Decided, actor, at)?;
        self.buyer_percent = buyer_percent;
        Ok(())
    }

    /// Escalated → Refused. The resolver declined, or its deadline passed.
    pub fn refuse(&mut self, actor: Address, at: Timestamp) -> Result<(), StateError> {
        self.finalize(&[DisputeState::Escalated], DisputeState::Refused, actor, at)
    }

    fn finalize(
        &mut self,
        allowed: &[DisputeState],
        target: DisputeState,
        actor: Address,
        at: Timestamp,
    ) -> Result<(), StateError> {
        self.require_state(allowed, target)?;
        self.record_transition(target, actor, at);
        self.state = target;
        self.dates.finalized = Some(at);
        Ok(())
    }

    fn record_transition(&mut self, to: DisputeState, actor: Address, at: Timestamp) {
        self.transition_log.push(TransitionRecord {
            from_state: self.state,
            to_state: to,
            timestamp: at,
            actor,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_seconds(secs).unwrap()
    }

    fn buyer() -> Address {
        Address::from_bytes([0xB0; 20])
    }

    fn resolver() -> Address {
        Address::from_bytes([0xD0; 20])
    }

    fn raised() -> Dispute {
        Dispute::raise(ExchangeId::new(1), buyer(), ts(100), ts(1_000))
    }

    fn bps(v: u32) -> BasisPoints {
        BasisPoints::new(v).unwrap()
    }

    #[test]
    fn raise_creates_resolving_dispute() {
        let d = raised();
        assert_eq!(d.state, DisputeState::Resolving);
        assert_eq!(d.dates.disputed, ts(100));
        assert_eq!(d.dates.timeout, ts(1_000));
        assert!(d.dates.escalated.is_none());
        assert!(d.dates.finalized.is_none());
        assert_eq!(d.buyer_escalation_deposit, 0);
    }

    #[test]
    fn resolve_records_percent_and_finalizes() {
        let mut d = raised();
        d.resolve(buyer(), ts(200), bps(6_000)).unwrap();
        assert_eq!(d.state, DisputeState::Resolved);
        assert_eq!(d.buyer_percent, bps(6_000));
        assert_eq!(d.dates.finalized, Some(ts(200)));
        assert_eq!(d.transition_log.last().unwrap().from_state, DisputeState::Resolving);
    }

    #[test]
    fn escalate_replaces_timeout() {
        let mut d = raised();
        d.escalate(buyer(), ts(200), ts(500), 5).unwrap();
        assert_eq!(d.state, DisputeState::Escalated);
        assert_eq!(d.dates.escalated, Some(ts(200)));
        assert_eq!(d.dates.timeout, ts(500));
        assert_eq!(d.buyer_escalation_deposit, 5);
        assert!(d.dates.finalized.is_none());
    }

    #[test]
    fn escalated_paths() {
        let mut decided = raised();
        decided.escalate(buyer(), ts(200), ts(500), 5).unwrap();
        decided.decide(resolver(), ts(300), BasisPoints::ZERO).unwrap();
        assert_eq!(decided.state, DisputeState::Decided);

        let mut refused = raised();
        refused.escalate(buyer(), ts(200), ts(500), 5).unwrap();
        refused.refuse(resolver(), ts(300)).unwrap();
        assert_eq!(refused.state, DisputeState::Refused);

        let mut retracted = raised();
        retracted.escalate(buyer(), ts(200), ts(500), 5).unwrap();
        retracted.retract(buyer(), ts(300)).unwrap();
        assert_eq!(retracted.state, DisputeState::Retracted);
    }

    #[test]
    fn decide_requires_escalation() {
        let mut d = raised();
        let err = d.decide(resolver(), ts(200), bps(5_000)).unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
        assert!(d.refuse(resolver(), ts(200)).is_err());
    }

    #[test]
    fn expire_only_from_resolving() {
        let mut d = raised();
        d.escalate(buyer(), ts(200), ts(500), 0).unwrap();
        assert!(d.expire(buyer(), ts(600)).is_err());
    }

    #[test]
    fn extend_timeout_is_strictly_increasing() {
        let mut d = raised();
        assert!(matches!(
            d.extend_timeout(ts(1_000)),
            Err(StateError::DeadlineNotExtended { .. })
        ));
        assert!(d.extend_timeout(ts(999)).is_err());
        d.extend_timeout(ts(2_000)).unwrap();
        assert_eq!(d.dates.timeout, ts(2_000));
    }

    #[test]
    fn extend_timeout_rejected_once_escalated() {
        let mut d = raised();
        d.escalate(buyer(), ts(200), ts(500), 0).unwrap();
        assert!(d.extend_timeout(ts(5_000)).is_err());
    }

    #[test]
    fn terminal_dispute_rejects_every_transition() {
        let mut d = raised();
        d.retract(buyer(), ts(200)).unwrap();
        assert!(matches!(
            d.resolve(buyer(), ts(300), bps(1)),
            Err(StateError::TerminalState { .. })
        ));
        assert!(d.escalate(buyer(), ts(300), ts(900), 0).is_err());
        assert!(d.retract(buyer(), ts(300)).is_err());
        assert!(d.extend_timeout(ts(9_000)).is_err());
        assert_eq!(d.dates.finalized, Some(ts(200)));
    }

    #[test]
    fn is_expired_is_strict() {
        let d = raised();
        assert!(!d.is_expired(ts(1_000)));
        assert!(d.is_expired(ts(1_001)));
    }

    #[test]
    fn valid_transitions_match_terminality() {
        for state in DisputeState::all() {
            assert_eq!(state.is_terminal(), state.valid_transitions().is_empty());
        }
    }

    #[test]
    fn dispute_state_serialization() {
        let json = serde_json::to_string(&DisputeState::Escalated).unwrap();
        assert_eq!(json, "\"Escalated\"");
        let mut d = raised();
        d.escalate(buyer(), ts(200), ts(500), 5).unwrap();
        let back: Dispute = serde_json::from_str(&serde_json::to_string(&d).unwrap()).unwrap();
        assert_eq!(back, d);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn timeout_never_decreases_while_resolving(
                requests in proptest::collection::vec(0i64..10_000, 1..20)
            ) {
                let mut d = raised();
                for secs in requests {
                    let before = d.dates.timeout;
                    let _ = d.extend_timeout(ts(secs));
                    prop_assert!(d.dates.timeout >= before);
                }
            }
        }
    }
}
