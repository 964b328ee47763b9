//! # Settlement Error Types
//!
//! Every rejection the engine can return. Each variant carries the
//! identifiers needed to diagnose it without reading logs, and maps to a
//! coarse [`ErrorKind`] for callers that branch on category.
//!
//! No operation retries on its own. [`SettlementError::is_retryable`] tells
//! the caller whether the same call may succeed later without changing its
//! arguments.

use bazaar_core::{Address, AssetId, ExchangeId, OfferId, PausableRegion, Timestamp, ValidationError};
use bazaar_crypto::SignatureError;
use bazaar_state::StateError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A referenced offer, exchange, dispute or escrow does not exist.
    NotFound,
    /// The record is in the wrong state for the operation.
    InvalidState,
    /// The caller may not perform the operation.
    Unauthorized,
    /// A deadline passed before the operation.
    Expired,
    /// A deadline has not passed yet.
    StillValid,
    /// A signature was malformed or made by the wrong party.
    InvalidSignature,
    /// An argument was rejected.
    InvalidInput,
    /// The operation's region is paused.
    RegionPaused,
    /// A balance does not cover the amount.
    InsufficientFunds,
    /// The exchange cannot be escalated.
    EscalationNotAllowed,
    /// The engine was called back while a mutating call was in flight.
    Reentrancy,
    /// An external token transfer failed.
    Transfer,
    /// An internal invariant would have been broken.
    Internal,
}

/// Errors returned by engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    // ── Not found ────────────────────────────────────────────────────
    /// The registry has no such offer.
    #[error("no such offer: {0}")]
    NoSuchOffer(OfferId),

    /// No exchange with this id.
    #[error("no such exchange: {0}")]
    NoSuchExchange(ExchangeId),

    /// No dispute was raised on this exchange.
    #[error("no dispute on {0}")]
    NoSuchDispute(ExchangeId),

    /// No escrow account for this exchange.
    #[error("no escrow account for {0}")]
    NoSuchEscrow(ExchangeId),

    // ── State ────────────────────────────────────────────────────────
    /// A state machine refused the transition.
    #[error(transparent)]
    State(#[from] StateError),

    /// The offer was voided by its seller.
    #[error("{0} has been voided")]
    OfferVoided(OfferId),

    /// The offer is outside its availability window.
    #[error("{offer_id} is not available at {at}")]
    OfferNotAvailable {
        /// The offer.
        offer_id: OfferId,
        /// When the commit was attempted.
        at: Timestamp,
    },

    /// No units of the offer remain.
    #[error("{0} is sold out")]
    OfferSoldOut(OfferId),

    /// The voucher cannot be redeemed at this time.
    #[error("voucher for {exchange_id} is redeemable from {valid_from} until {valid_until}")]
    VoucherNotRedeemable {
        /// The exchange.
        exchange_id: ExchangeId,
        /// Start of the window.
        valid_from: Timestamp,
        /// End of the window.
        valid_until: Timestamp,
    },

    // ── Authorization ────────────────────────────────────────────────
    /// Only the voucher holder (the buyer) may do this.
    #[error("{caller} does not hold the voucher for {exchange_id}")]
    NotVoucherHolder {
        /// The exchange.
        exchange_id: ExchangeId,
        /// The rejected caller.
        caller: Address,
    },

    /// The caller does not have the required role.
    #[error("{caller} is not allowed to {action}")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
        /// The attempted operation.
        action: &'static str,
    },

    // ── Deadlines ────────────────────────────────────────────────────
    /// The dispute period after redemption has elapsed.
    #[error("dispute period for {0} has elapsed")]
    DisputePeriodHasElapsed(ExchangeId),

    /// The dispute period after redemption is still running.
    #[error("dispute period for {0} has not elapsed")]
    DisputePeriodNotElapsed(ExchangeId),

    /// The dispute's current deadline has passed.
    #[error("dispute on {exchange_id} expired at {timeout}")]
    DisputeHasExpired {
        /// The exchange.
        exchange_id: ExchangeId,
        /// The deadline that passed.
        timeout: Timestamp,
    },

    /// The dispute's current deadline has not passed yet.
    #[error("dispute on {exchange_id} is valid until {timeout}")]
    DisputeStillValid {
        /// The exchange.
        exchange_id: ExchangeId,
        /// The deadline still in force.
        timeout: Timestamp,
    },

    /// The voucher can still be redeemed.
    #[error("voucher for {exchange_id} is valid until {valid_until}")]
    VoucherStillValid {
        /// The exchange.
        exchange_id: ExchangeId,
        /// End of the redemption window.
        valid_until: Timestamp,
    },

    // ── Signatures ───────────────────────────────────────────────────
    /// Signature parsing, recovery or attribution failed.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    // ── Input ────────────────────────────────────────────────────────
    /// A buyer share above 10000 basis points.
    #[error("buyer percent {0} exceeds 10000 basis points")]
    InvalidBuyerPercent(u32),

    /// A dispute timeout extension that does not move the deadline forward.
    #[error("new dispute timeout {requested} must be after {current}")]
    InvalidDisputeTimeout {
        /// Deadline in force.
        current: Timestamp,
        /// Rejected replacement.
        requested: Timestamp,
    },

    /// A voucher extension that does not move the end of the window forward.
    #[error("new voucher end {requested} must be after {current}")]
    VoucherExtensionNotValid {
        /// End in force.
        current: Timestamp,
        /// Rejected replacement.
        requested: Timestamp,
    },

    /// A voucher transfer to the zero address or to the current holder.
    #[error("cannot transfer voucher for {exchange_id} to {recipient}")]
    InvalidVoucherRecipient {
        /// The exchange.
        exchange_id: ExchangeId,
        /// The rejected recipient.
        recipient: Address,
    },

    /// Withdrawal asset and amount lists differ in length.
    #[error("withdrawal lists differ in length: {assets} assets, {amounts} amounts")]
    WithdrawalListMismatch {
        /// Number of assets.
        assets: usize,
        /// Number of amounts.
        amounts: usize,
    },

    /// More assets in one withdrawal than configured.
    #[error("withdrawal of {requested} assets exceeds the limit of {max}")]
    TooManyTokens {
        /// Assets in the request.
        requested: usize,
        /// Configured maximum.
        max: usize,
    },

    /// An amount that must be positive was zero.
    #[error("{operation} amount must be greater than zero")]
    ZeroAmount {
        /// The operation.
        operation: &'static str,
    },

    /// A zero address where a party is required.
    #[error("{role} must not be the zero address")]
    ZeroAddress {
        /// Which party.
        role: &'static str,
    },

    /// The relayed function is not on the allowlist.
    #[error("function {0} is not allowlisted for meta-transactions")]
    FunctionNotAllowlisted(String),

    /// The relay nonce was already consumed.
    #[error("nonce {nonce} already used by {signer}")]
    NonceUsedAlready {
        /// The signer.
        signer: Address,
        /// The replayed nonce.
        nonce: u64,
    },

    /// A domain primitive failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Invalid engine configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    // ── Operational ──────────────────────────────────────────────────
    /// The region of the operation is paused.
    #[error("region {0} is paused")]
    RegionPaused(PausableRegion),

    /// The available balance does not cover the amount.
    #[error("{owner} has {available} of {asset} available, {required} required")]
    InsufficientAvailableFunds {
        /// Balance owner.
        owner: Address,
        /// Asset.
        asset: AssetId,
        /// Amount needed.
        required: u128,
        /// Amount available.
        available: u128,
    },

    /// The exchange has no usable dispute resolver.
    #[error("escalation not allowed for {exchange_id}: {reason}")]
    EscalationNotAllowed {
        /// The exchange.
        exchange_id: ExchangeId,
        /// Why.
        reason: String,
    },

    /// The engine was re-entered from the thread already running a call.
    #[error("re-entrant call into the settlement engine")]
    Reentrancy,

    /// An external transfer failed.
    #[error("transfer of {amount} {asset} for {party} failed: {reason}")]
    TransferFailed {
        /// Wallet on the other side of the transfer.
        party: Address,
        /// Asset.
        asset: AssetId,
        /// Amount.
        amount: u128,
        /// Adapter's explanation.
        reason: String,
    },

    // ── Internal ─────────────────────────────────────────────────────
    /// A balance computation overflowed.
    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    /// A payout did not match the escrowed amount.
    #[error("payout of {payout} for {exchange_id} does not match escrowed {held}")]
    ConservationViolation {
        /// The exchange.
        exchange_id: ExchangeId,
        /// Escrowed amount.
        held: u128,
        /// Proposed payout.
        payout: u128,
    },

    /// The escrow account was already released.
    #[error("escrow for {0} was already released")]
    EscrowReleased(ExchangeId),

    /// An encumbrance named a different asset than the escrow holds.
    #[error("escrow for {exchange_id} holds {expected}, not {found}")]
    EscrowAssetMismatch {
        /// The exchange.
        exchange_id: ExchangeId,
        /// Asset of the escrow.
        expected: AssetId,
        /// Asset of the encumbrance.
        found: AssetId,
    },

    /// Encoding a payload failed.
    #[error("encoding failed: {0}")]
    Encoding(String),
}

impl SettlementError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSuchOffer(_)
            | Self::NoSuchExchange(_)
            | Self::NoSuchDispute(_)
            | Self::NoSuchEscrow(_) => ErrorKind::NotFound,
            Self::State(_)
            | Self::OfferVoided(_)
            | Self::OfferNotAvailable { .. }
            | Self::OfferSoldOut(_)
            | Self::VoucherNotRedeemable { .. } => ErrorKind::InvalidState,
            Self::NotVoucherHolder { .. } | Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::DisputePeriodHasElapsed(_) | Self::DisputeHasExpired { .. } => ErrorKind::Expired,
            Self::DisputePeriodNotElapsed(_)
            | Self::DisputeStillValid { .. }
            | Self::VoucherStillValid { .. } => ErrorKind::StillValid,
            Self::Signature(_) => ErrorKind::InvalidSignature,
            Self::InvalidBuyerPercent(_)
            | Self::InvalidDisputeTimeout { .. }
            | Self::VoucherExtensionNotValid { .. }
            | Self::InvalidVoucherRecipient { .. }
            | Self::WithdrawalListMismatch { .. }
            | Self::TooManyTokens { .. }
            | Self::ZeroAmount { .. }
            | Self::ZeroAddress { .. }
            | Self::FunctionNotAllowlisted(_)
            | Self::NonceUsedAlready { .. }
            | Self::Validation(_)
            | Self::Config(_) => ErrorKind::InvalidInput,
            Self::RegionPaused(_) => ErrorKind::RegionPaused,
            Self::InsufficientAvailableFunds { .. } => ErrorKind::InsufficientFunds,
            Self::EscalationNotAllowed { .. } => ErrorKind::EscalationNotAllowed,
            Self::Reentrancy => ErrorKind::Reentrancy,
            Self::TransferFailed { .. } => ErrorKind::Transfer,
            Self::ArithmeticOverflow(_)
            | Self::ConservationViolation { .. }
            | Self::EscrowReleased(_)
            | Self::EscrowAssetMismatch { .. }
            | Self::Encoding(_) => ErrorKind::Internal,
        }
    }

    /// Whether the same call may succeed later without changing arguments.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StillValid
                | ErrorKind::RegionPaused
                | ErrorKind::InsufficientFunds
                | ErrorKind::Transfer
        )
    }
}
