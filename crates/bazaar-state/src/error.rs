//! # State Machine Errors

use bazaar_core::Timestamp;
use thiserror::Error;

/// Errors raised by exchange and dispute transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The record is not in a state that permits the transition.
    #[error("invalid {record} transition: {from} -> {to} ({reason})")]
    InvalidTransition {
        /// `exchange` or `dispute`.
        record: &'static str,
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
        /// Why the transition was refused.
        reason: String,
    },

    /// The record is in a terminal state and accepts no transitions.
    #[error("{record} is in terminal state {state}")]
    TerminalState {
        /// `exchange` or `dispute`.
        record: &'static str,
        /// The terminal state.
        state: String,
    },

    /// A deadline was "extended" to an instant that is not later.
    #[error("deadline must move forward: current {current}, requested {requested}")]
    DeadlineNotExtended {
        /// The deadline in force.
        current: Timestamp,
        /// The rejected replacement.
        requested: Timestamp,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_display() {
        let err = StateError::InvalidTransition {
            record: "exchange",
            from: "COMMITTED".into(),
            to: "COMPLETED".into(),
            reason: "expected state REDEEMED".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid exchange transition: COMMITTED -> COMPLETED (expected state REDEEMED)"
        );
    }

    #[test]
    fn terminal_state_display() {
        let err = StateError::TerminalState {
            record: "dispute",
            state: "RESOLVED".into(),
        };
        assert_eq!(err.to_string(), "dispute is in terminal state RESOLVED");
    }

    #[test]
    fn deadline_display_includes_both_instants() {
        let current = Timestamp::from_unix_seconds(100).unwrap();
        let requested = Timestamp::from_unix_seconds(50).unwrap();
        let msg = StateError::DeadlineNotExtended { current, requested }.to_string();
        assert!(msg.contains("1970-01-01T00:01:40Z"));
        assert!(msg.contains("1970-01-01T00:00:50Z"));
    }
}
