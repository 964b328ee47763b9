//! # Meta-Transaction Relay
//!
//! Lets a relayer submit an engine call on behalf of a signer. The signer
//! signs a typed `MetaTransaction(nonce, from, functionName, payloadHash)`
//! message, where `payloadHash` is the Keccak-256 of the call's JSON
//! encoding. The call then runs with the signer as caller.
//!
//! ## Checks
//!
//! 1. The `MetaTransaction` region is not paused.
//! 2. The call's function is on the configured allowlist.
//! 3. The `(signer, nonce)` pair has not been used.
//! 4. The signature recovers to the signer.
//! 5. The call's own region is not paused.
//!
//! The nonce is burned only if the relayed call succeeds, so a rejected
//! call can be resubmitted with the same nonce.

use bazaar_core::{Address, AssetId, ExchangeId, OfferId, PausableRegion, Timestamp};
use bazaar_crypto::{keccak256, Eip712Domain, LocalSigner, MetaTransactionMessage, RecoverableSignature};
use serde::{Deserialize, Serialize};

use crate::error::SettlementError;
use crate::events::SettlementEvent;
use crate::session::Session;

/// An engine operation in serializable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineCall {
    /// Buy one unit of an offer.
    Commit { offer_id: OfferId },
    /// Redeem a voucher.
    RedeemVoucher { exchange_id: ExchangeId },
    /// Cancel a voucher as buyer.
    CancelVoucher { exchange_id: ExchangeId },
    /// Revoke a voucher as seller.
    RevokeVoucher { exchange_id: ExchangeId },
    /// Expire a lapsed voucher.
    ExpireVoucher { exchange_id: ExchangeId },
    /// Push the end of a voucher window out.
    ExtendVoucher {
        exchange_id: ExchangeId,
        valid_until: Timestamp,
    },
    /// Hand a voucher to someone else.
    TransferVoucher {
        exchange_id: ExchangeId,
        new_holder: Address,
    },
    /// Pay the seller.
    CompleteExchange { exchange_id: ExchangeId },
    /// Open a dispute.
    RaiseDispute { exchange_id: ExchangeId },
    /// Withdraw a dispute.
    RetractDispute { exchange_id: ExchangeId },
    /// Move a dispute deadline later.
    ExtendDisputeTimeout {
        exchange_id: ExchangeId,
        timeout: Timestamp,
    },
    /// Close a lapsed negotiation.
    ExpireDispute { exchange_id: ExchangeId },
    /// Settle on a counterparty-signed split.
    ResolveDispute {
        exchange_id: ExchangeId,
        buyer_percent: u32,
        signature: RecoverableSignature,
    },
    /// Hand a dispute to the resolver.
    EscalateDispute { exchange_id: ExchangeId },
    /// Rule on an escalated dispute.
    DecideDispute {
        exchange_id: ExchangeId,
        buyer_percent: u32,
    },
    /// Decline an escalated dispute.
    RefuseEscalatedDispute { exchange_id: ExchangeId },
    /// Close a lapsed escalation.
    ExpireEscalatedDispute { exchange_id: ExchangeId },
    /// Credit an available balance.
    DepositFunds {
        owner: Address,
        asset: AssetId,
        amount: u128,
    },
    /// Send available balances out.
    WithdrawFunds {
        assets: Vec<AssetId>,
        amounts: Vec<u128>,
    },
}

impl EngineCall {
    /// Every function name, in declaration order.
    pub const FUNCTION_NAMES: &'static [&'static str] = &[
        "commit",
        "redeem_voucher",
        "cancel_voucher",
        "revoke_voucher",
        "expire_voucher",
        "extend_voucher",
        "transfer_voucher",
        "complete_exchange",
        "raise_dispute",
        "retract_dispute",
        "extend_dispute_timeout",
        "expire_dispute",
        "resolve_dispute",
        "escalate_dispute",
        "decide_dispute",
        "refuse_escalated_dispute",
        "expire_escalated_dispute",
        "deposit_funds",
        "withdraw_funds",
    ];

    /// The function name used for allowlisting and signing.
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::Commit { .. } => "commit",
            Self::RedeemVoucher { .. } => "redeem_voucher",
            Self::CancelVoucher { .. } => "cancel_voucher",
            Self::RevokeVoucher { .. } => "revoke_voucher",
            Self::ExpireVoucher { .. } => "expire_voucher",
            Self::ExtendVoucher { .. } => "extend_voucher",
            Self::TransferVoucher { .. } => "transfer_voucher",
            Self::CompleteExchange { .. } => "complete_exchange",
            Self::RaiseDispute { .. } => "raise_dispute",
            Self::RetractDispute { .. } => "retract_dispute",
            Self::ExtendDisputeTimeout { .. } => "extend_dispute_timeout",
            Self::ExpireDispute { .. } => "expire_dispute",
            Self::ResolveDispute { .. } => "resolve_dispute",
            Self::EscalateDispute { .. } => "escalate_dispute",
            Self::DecideDispute { .. } => "decide_dispute",
            Self::RefuseEscalatedDispute { .. } => "refuse_escalated_dispute",
            Self::ExpireEscalatedDispute { .. } => "expire_escalated_dispute",
            Self::DepositFunds { .. } => "deposit_funds",
            Self::WithdrawFunds { .. } => "withdraw_funds",
        }
    }

    /// The pause region guarding the call.
    pub fn region(&self) -> PausableRegion {
        match self {
            Self::Commit { .. }
            | Self::RedeemVoucher { .. }
            | Self::CancelVoucher { .. }
            | Self::RevokeVoucher { .. }
            | Self::ExpireVoucher { .. }
            | Self::ExtendVoucher { .. }
            | Self::TransferVoucher { .. }
            | Self::CompleteExchange { .. } => PausableRegion::Exchanges,
            Self::RaiseDispute { .. }
            | Self::RetractDispute { .. }
            | Self::ExtendDisputeTimeout { .. }
            | Self::ExpireDispute { .. }
            | Self::ResolveDispute { .. }
            | Self::EscalateDispute { .. }
            | Self::DecideDispute { .. }
            | Self::RefuseEscalatedDispute { .. }
            | Self::ExpireEscalatedDispute { .. } => PausableRegion::Disputes,
            Self::DepositFunds { .. } | Self::WithdrawFunds { .. } => PausableRegion::Funds,
        }
    }

    /// Keccak-256 of the call's JSON encoding.
    pub fn payload_hash(&self) -> Result<[u8; 32], SettlementError> {
        let encoded = serde_json::to_vec(self).map_err(|e| SettlementError::Encoding(e.to_string()))?;
        Ok(keccak256(&encoded))
    }
}

/// What a call produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CallOutput {
    /// Nothing beyond success.
    Unit,
    /// The id of a new exchange.
    Exchange(ExchangeId),
    /// Balances sent out by a withdrawal.
    Withdrawn(Vec<(AssetId, u128)>),
}

/// A signed call submitted by a relayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTransaction {
    /// Signer, and caller of the relayed operation.
    pub from: Address,
    /// Per-signer replay nonce.
    pub nonce: u64,
    /// The relayed operation.
    pub call: EngineCall,
    /// Signature over [`MetaTransaction::message`].
    pub signature: RecoverableSignature,
}

impl MetaTransaction {
    /// Build and sign a meta-transaction for `call` under `domain`.
    pub fn sign(
        signer: &LocalSigner,
        domain: &Eip712Domain,
        nonce: u64,
        call: EngineCall,
    ) -> Result<Self, SettlementError> {
        let message = signing_message(signer.address(), nonce, &call)?;
        let signature = signer.sign_typed(domain, &message)?;
        Ok(Self {
            from: signer.address(),
            nonce,
            call,
            signature,
        })
    }

    /// The typed message the signer signed.
    pub fn message(&self) -> Result<MetaTransactionMessage, SettlementError> {
        signing_message(self.from, self.nonce, &self.call)
    }
}

fn signing_message(
    from: Address,
    nonce: u64,
    call: &EngineCall,
) -> Result<MetaTransactionMessage, SettlementError> {
    Ok(MetaTransactionMessage {
        nonce,
        from,
        function_name: call.function_name().to_string(),
        payload_hash: call.payload_hash()?,
    })
}

impl Session<'_> {
    /// Run `call` with `caller` as the acting party.
    pub(crate) fn dispatch(
        &mut self,
        caller: Address,
        call: &EngineCall,
    ) -> Result<CallOutput, SettlementError> {
        match call {
            EngineCall::Commit { offer_id } => self.commit(caller, *offer_id).map(CallOutput::Exchange),
            EngineCall::RedeemVoucher { exchange_id } => {
                self.redeem_voucher(caller, *exchange_id).map(|()| CallOutput::Unit)
            }
            EngineCall::CancelVoucher { exchange_id } => {
                self.cancel_voucher(caller, *exchange_id).map(|()| CallOutput::Unit)
            }
            EngineCall::RevokeVoucher { exchange_id } => {
                self.revoke_voucher(caller, *exchange_id).map(|()| CallOutput::Unit)
            }
            EngineCall::ExpireVoucher { exchange_id } => {
                self.expire_voucher(caller, *exchange_id).map(|()| CallOutput::Unit)
            }
            EngineCall::ExtendVoucher {
                exchange_id,
                valid_until,
            } => self
                .extend_voucher(caller, *exchange_id, *valid_until)
                .map(|()| CallOutput::Unit),
            EngineCall::TransferVoucher {
                exchange_id,
                new_holder,
            } => self
                .transfer_voucher(caller, *exchange_id, *new_holder)
                .map(|()| CallOutput::Unit),
            EngineCall::CompleteExchange { exchange_id } => {
                self.complete_exchange(caller, *exchange_id).map(|()| CallOutput::Unit)
            }
            EngineCall::RaiseDispute { exchange_id } => {
                self.raise_dispute(caller, *exchange_id).map(|()| CallOutput::Unit)
            }
            EngineCall::RetractDispute { exchange_id } => {
                self.retract_dispute(caller, *exchange_id).map(|()| CallOutput::Unit)
            }
            EngineCall::ExtendDisputeTimeout {
                exchange_id,
                timeout,
            } => self
                .extend_dispute_timeout(caller, *exchange_id, *timeout)
                .map(|()| CallOutput::Unit),
            EngineCall::ExpireDispute { exchange_id } => {
                self.expire_dispute(caller, *exchange_id).map(|()| CallOutput::Unit)
            }
            EngineCall::ResolveDispute {
                exchange_id,
                buyer_percent,
                signature,
            } => self
                .resolve_dispute(caller, *exchange_id, *buyer_percent, signature)
                .map(|()| CallOutput::Unit),
            EngineCall::EscalateDispute { exchange_id } => {
                self.escalate_dispute(caller, *exchange_id).map(|()| CallOutput::Unit)
            }
            EngineCall::DecideDispute {
                exchange_id,
                buyer_percent,
            } => self
                .decide_dispute(caller, *exchange_id, *buyer_percent)
                .map(|()| CallOutput::Unit),
            EngineCall::RefuseEscalatedDispute { exchange_id } => self
                .refuse_escalated_dispute(caller, *exchange_id)
                .map(|()| CallOutput::Unit),
            EngineCall::ExpireEscalatedDispute { exchange_id } => self
                .expire_escalated_dispute(caller, *exchange_id)
                .map(|()| CallOutput::Unit),
            EngineCall::DepositFunds {
                owner,
                asset,
                amount,
            } => self
                .deposit_funds(caller, *owner, *asset, *amount)
                .map(|()| CallOutput::Unit),
            EngineCall::WithdrawFunds { assets, amounts } => self
                .withdraw_funds(caller, assets, amounts)
                .map(CallOutput::Withdrawn),
        }
    }

    /// Verify and run a relayed call.
    pub(crate) fn execute_meta_transaction(
        &mut self,
        relayer: Address,
        meta: &MetaTransaction,
    ) -> Result<CallOutput, SettlementError> {
        let function_name = meta.call.function_name();
        if !self
            .ctx
            .config
            .relay_allowlist
            .iter()
            .any(|allowed| allowed == function_name)
        {
            tracing::warn!(signer = %meta.from, function_name, "relayed function not allowlisted");
            return Err(SettlementError::FunctionNotAllowlisted(function_name.to_string()));
        }
        if self.state.used_nonces.contains(&(meta.from, meta.nonce)) {
            tracing::warn!(signer = %meta.from, nonce = meta.nonce, "relay nonce replayed");
            return Err(SettlementError::NonceUsedAlready {
                signer: meta.from,
                nonce: meta.nonce,
            });
        }
        let message = meta.message()?;
        self.ctx.verifier.verify(&message, &meta.signature, &meta.from)?;
        self.require_unpaused(meta.call.region())?;

        let output = self.dispatch(meta.from, &meta.call)?;
        self.state.used_nonces.insert((meta.from, meta.nonce));
        tracing::info!(
            signer = %meta.from,
            relayer = %relayer,
            nonce = meta.nonce,
            function_name,
            "meta-transaction executed"
        );
        self.emit(SettlementEvent::MetaTransactionExecuted {
            signer: meta.from,
            relayer,
            nonce: meta.nonce,
            function_name: function_name.to_string(),
        });
        Ok(output)
    }
}
