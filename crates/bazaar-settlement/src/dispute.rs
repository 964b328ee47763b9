//! # Dispute Engine
//!
//! Raise, retract, extend, expire, resolve, escalate, decide, refuse and
//! expire an escalation.
//!
//! A dispute splits the pot (price plus seller deposit) between buyer and
//! seller. The buyer's escalation deposit, if one was taken, is held in the
//! same escrow and always goes back to the buyer when the dispute
//! finalizes. Finalization stamps the dispute and the exchange together and
//! releases the escrow in the same step.

use bazaar_core::{Address, BasisPoints, ExchangeId, Timestamp};
use bazaar_crypto::{RecoverableSignature, ResolutionMessage};
use bazaar_state::{Dispute, DisputeState, Exchange, ExchangeState, StateError};

use crate::config::RefusalPolicy;
use crate::error::SettlementError;
use crate::events::SettlementEvent;
use crate::exchange::{require_holder, ExchangeTerms};
use crate::ledger::{Encumbrance, Payoff};
use crate::session::Session;

/// Buyer gets `buyer_percent` of the pot plus the escalation deposit; the
/// seller gets the rest of the pot.
pub fn split_payoffs(
    terms: &ExchangeTerms,
    buyer: Address,
    seller: Address,
    buyer_percent: BasisPoints,
    escalation_deposit: u128,
) -> Result<Vec<Payoff>, SettlementError> {
    let pot = terms.pot()?;
    let buyer_share = buyer_percent.apply(pot);
    let to_buyer = buyer_share
        .checked_add(escalation_deposit)
        .ok_or(SettlementError::ArithmeticOverflow("dispute payout"))?;
    Ok(vec![
        Payoff {
            recipient: buyer,
            amount: to_buyer,
        },
        Payoff {
            recipient: seller,
            amount: pot - buyer_share,
        },
    ])
}

/// Payout of a refused or lapsed escalation under `policy`.
pub fn refusal_payoffs(
    policy: RefusalPolicy,
    terms: &ExchangeTerms,
    buyer: Address,
    seller: Address,
    escalation_deposit: u128,
) -> Result<Vec<Payoff>, SettlementError> {
    match policy {
        RefusalPolicy::RefundAll => {
            let to_buyer = terms
                .price
                .checked_add(escalation_deposit)
                .ok_or(SettlementError::ArithmeticOverflow("refusal payout"))?;
            Ok(vec![
                Payoff {
                    recipient: buyer,
                    amount: to_buyer,
                },
                Payoff {
                    recipient: seller,
                    amount: terms.seller_deposit,
                },
            ])
        }
        RefusalPolicy::SellerKeepsAll => {
            split_payoffs(terms, buyer, seller, BasisPoints::ZERO, escalation_deposit)
        }
        RefusalPolicy::Split { buyer_percent } => {
            split_payoffs(terms, buyer, seller, buyer_percent, escalation_deposit)
        }
    }
}

fn parse_percent(raw: u32) -> Result<BasisPoints, SettlementError> {
    BasisPoints::new(raw).map_err(|_| SettlementError::InvalidBuyerPercent(raw))
}

fn require_live(dispute: &Dispute, now: Timestamp) -> Result<(), SettlementError> {
    if dispute.is_expired(now) {
        return Err(SettlementError::DisputeHasExpired {
            exchange_id: dispute.exchange_id,
            timeout: dispute.dates.timeout,
        });
    }
    Ok(())
}

fn require_lapsed(dispute: &Dispute, now: Timestamp) -> Result<(), SettlementError> {
    if !dispute.is_expired(now) {
        return Err(SettlementError::DisputeStillValid {
            exchange_id: dispute.exchange_id,
            timeout: dispute.dates.timeout,
        });
    }
    Ok(())
}

fn require_resolver(
    terms: &ExchangeTerms,
    caller: &Address,
    action: &'static str,
) -> Result<(), SettlementError> {
    if terms.dispute_resolver != Some(*caller) {
        tracing::warn!(caller = %caller, action, "caller is not the dispute resolver");
        return Err(SettlementError::Unauthorized {
            caller: *caller,
            action,
        });
    }
    Ok(())
}

impl Session<'_> {
    /// The buyer contests a redeemed exchange within the dispute period.
    pub(crate) fn raise_dispute(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        let mut exchange = self.exchange(exchange_id)?;
        let terms = self.terms(exchange_id)?;
        require_holder(&exchange, &caller)?;
        exchange.require_state(ExchangeState::Redeemed, ExchangeState::Disputed)?;
        let redeemed = exchange.redeemed_date.unwrap_or(exchange.committed_date);
        if self.now > redeemed.plus_seconds(terms.dispute_period) {
            return Err(SettlementError::DisputePeriodHasElapsed(exchange_id));
        }

        let timeout = self.now.plus_seconds(terms.resolution_period);
        exchange.mark_disputed(caller, self.now)?;
        let dispute = Dispute::raise(exchange_id, caller, self.now, timeout);
        let seller = exchange.seller;
        self.store_exchange(exchange);
        self.store_dispute(dispute);

        tracing::info!(exchange_id = %exchange_id, timeout = %timeout, "dispute raised");
        self.emit(SettlementEvent::DisputeRaised {
            exchange_id,
            buyer: caller,
            seller,
            timeout,
        });
        Ok(())
    }

    /// The buyer gives up; the seller takes the pot.
    pub(crate) fn retract_dispute(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        let exchange = self.exchange(exchange_id)?;
        let mut dispute = self.dispute(exchange_id)?;
        let terms = self.terms(exchange_id)?;
        require_holder(&exchange, &caller)?;
        dispute.require_state(
            &[DisputeState::Resolving, DisputeState::Escalated],
            DisputeState::Retracted,
        )?;
        if dispute.state == DisputeState::Escalated {
            require_live(&dispute, self.now)?;
        }
        dispute.retract(caller, self.now)?;
        let payoffs = split_payoffs(
            &terms,
            exchange.buyer,
            exchange.seller,
            BasisPoints::ZERO,
            dispute.buyer_escalation_deposit,
        )?;
        self.finalize_dispute(exchange, dispute, &payoffs)?;
        tracing::info!(exchange_id = %exchange_id, "dispute retracted");
        self.emit(SettlementEvent::DisputeRetracted {
            exchange_id,
            actor: caller,
        });
        Ok(())
    }

    /// The seller gives the negotiation more time.
    pub(crate) fn extend_dispute_timeout(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
        new_timeout: Timestamp,
    ) -> Result<(), SettlementError> {
        let exchange = self.exchange(exchange_id)?;
        let mut dispute = self.dispute(exchange_id)?;
        crate::exchange::require_seller(&exchange, &caller, "extend the dispute timeout")?;
        dispute.require_state(&[DisputeState::Resolving], DisputeState::Resolving)?;
        require_live(&dispute, self.now)?;
        dispute
            .extend_timeout(new_timeout)
            .map_err(|err| match err {
                StateError::DeadlineNotExtended { current, requested } => {
                    SettlementError::InvalidDisputeTimeout { current, requested }
                }
                other => other.into(),
            })?;
        self.store_dispute(dispute);
        tracing::info!(exchange_id = %exchange_id, timeout = %new_timeout, "dispute timeout extended");
        self.emit(SettlementEvent::DisputeTimeoutExtended {
            exchange_id,
            timeout: new_timeout,
            actor: caller,
        });
        Ok(())
    }

    /// Anyone may close a negotiation that ran past its deadline. The
    /// seller takes the pot.
    pub(crate) fn expire_dispute(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        let exchange = self.exchange(exchange_id)?;
        let mut dispute = self.dispute(exchange_id)?;
        let terms = self.terms(exchange_id)?;
        dispute.require_state(&[DisputeState::Resolving], DisputeState::Retracted)?;
        require_lapsed(&dispute, self.now)?;
        dispute.expire(caller, self.now)?;
        let payoffs = split_payoffs(
            &terms,
            exchange.buyer,
            exchange.seller,
            BasisPoints::ZERO,
            dispute.buyer_escalation_deposit,
        )?;
        self.finalize_dispute(exchange, dispute, &payoffs)?;
        tracing::info!(exchange_id = %exchange_id, caller = %caller, "dispute expired");
        self.emit(SettlementEvent::DisputeExpired {
            exchange_id,
            actor: caller,
        });
        Ok(())
    }

    /// Settle on a split the counterparty signed.
    pub(crate) fn resolve_dispute(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
        buyer_percent: u32,
        signature: &RecoverableSignature,
    ) -> Result<(), SettlementError> {
        let exchange = self.exchange(exchange_id)?;
        let mut dispute = self.dispute(exchange_id)?;
        let terms = self.terms(exchange_id)?;
        let counterparty = if caller == exchange.buyer {
            exchange.seller
        } else if caller == exchange.seller {
            exchange.buyer
        } else {
            tracing::warn!(exchange_id = %exchange_id, caller = %caller, "resolution by a non-party");
            return Err(SettlementError::Unauthorized {
                caller,
                action: "resolve the dispute",
            });
        };
        let percent = parse_percent(buyer_percent)?;
        dispute.require_state(
            &[DisputeState::Resolving, DisputeState::Escalated],
            DisputeState::Resolved,
        )?;
        require_live(&dispute, self.now)?;
        let message = ResolutionMessage {
            exchange_id,
            buyer_percent: percent,
        };
        self.ctx.verifier.verify(&message, signature, &counterparty)?;

        dispute.resolve(caller, self.now, percent)?;
        let payoffs = split_payoffs(
            &terms,
            exchange.buyer,
            exchange.seller,
            percent,
            dispute.buyer_escalation_deposit,
        )?;
        self.finalize_dispute(exchange, dispute, &payoffs)?;
        tracing::info!(exchange_id = %exchange_id, buyer_percent, "dispute resolved");
        self.emit(SettlementEvent::DisputeResolved {
            exchange_id,
            buyer_percent: percent,
            actor: caller,
        });
        Ok(())
    }

    /// Hand the dispute to the offer's resolver. The buyer pays the
    /// escalation deposit into escrow.
    pub(crate) fn escalate_dispute(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        let exchange = self.exchange(exchange_id)?;
        let mut dispute = self.dispute(exchange_id)?;
        let terms = self.terms(exchange_id)?;
        require_holder(&exchange, &caller)?;
        dispute.require_state(&[DisputeState::Resolving], DisputeState::Escalated)?;
        require_live(&dispute, self.now)?;

        let not_allowed = |reason: String| SettlementError::EscalationNotAllowed {
            exchange_id,
            reason,
        };
        let resolver_address = terms
            .dispute_resolver
            .ok_or_else(|| not_allowed("offer names no dispute resolver".to_string()))?;
        let resolver = self
            .ctx
            .registry
            .dispute_resolver(&resolver_address)
            .ok_or_else(|| not_allowed(format!("dispute resolver {resolver_address} is not registered")))?;
        if !resolver.active {
            return Err(not_allowed(format!(
                "dispute resolver {resolver_address} is not active"
            )));
        }
        let fee = resolver.fee_for(&terms.asset).ok_or_else(|| {
            not_allowed(format!(
                "dispute resolver {resolver_address} charges no fee in {}",
                terms.asset
            ))
        })?;
        let deposit = self.ctx.config.buyer_escalation_deposit_bps.apply(fee);
        let response_deadline = self.now.plus_seconds(resolver.escalation_response_period);
        dispute.escalate(caller, self.now, response_deadline, deposit)?;

        self.pull(&caller, &terms.asset, deposit)?;
        if deposit > 0 {
            if let Err(err) = self.state.ledger.encumber(
                exchange_id,
                terms.asset,
                &[Encumbrance::external(caller, deposit)],
                self.now,
            ) {
                self.refund(&caller, &terms.asset, deposit);
                return Err(err);
            }
        }
        self.store_dispute(dispute);

        tracing::info!(
            exchange_id = %exchange_id,
            resolver = %resolver_address,
            deposit,
            timeout = %response_deadline,
            "dispute escalated"
        );
        self.emit(SettlementEvent::DisputeEscalated {
            exchange_id,
            dispute_resolver: resolver_address,
            timeout: response_deadline,
            actor: caller,
        });
        if deposit > 0 {
            self.emit(SettlementEvent::FundsEncumbered {
                exchange_id,
                asset: terms.asset,
                amount: deposit,
                actor: caller,
            });
        }
        Ok(())
    }

    /// The resolver rules on a split.
    pub(crate) fn decide_dispute(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
        buyer_percent: u32,
    ) -> Result<(), SettlementError> {
        let exchange = self.exchange(exchange_id)?;
        let mut dispute = self.dispute(exchange_id)?;
        let terms = self.terms(exchange_id)?;
        require_resolver(&terms, &caller, "decide the dispute")?;
        let percent = parse_percent(buyer_percent)?;
        dispute.require_state(&[DisputeState::Escalated], DisputeState::Decided)?;
        require_live(&dispute, self.now)?;
        dispute.decide(caller, self.now, percent)?;
        let payoffs = split_payoffs(
            &terms,
            exchange.buyer,
            exchange.seller,
            percent,
            dispute.buyer_escalation_deposit,
        )?;
        self.finalize_dispute(exchange, dispute, &payoffs)?;
        tracing::info!(exchange_id = %exchange_id, buyer_percent, "dispute decided");
        self.emit(SettlementEvent::DisputeDecided {
            exchange_id,
            buyer_percent: percent,
            actor: caller,
        });
        Ok(())
    }

    /// The resolver declines to rule.
    pub(crate) fn refuse_escalated_dispute(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        let exchange = self.exchange(exchange_id)?;
        let mut dispute = self.dispute(exchange_id)?;
        let terms = self.terms(exchange_id)?;
        require_resolver(&terms, &caller, "refuse the dispute")?;
        dispute.require_state(&[DisputeState::Escalated], DisputeState::Refused)?;
        require_live(&dispute, self.now)?;
        dispute.refuse(caller, self.now)?;
        let payoffs = refusal_payoffs(
            self.ctx.config.refusal_policy,
            &terms,
            exchange.buyer,
            exchange.seller,
            dispute.buyer_escalation_deposit,
        )?;
        self.finalize_dispute(exchange, dispute, &payoffs)?;
        tracing::info!(exchange_id = %exchange_id, "escalated dispute refused");
        self.emit(SettlementEvent::EscalatedDisputeRefused {
            exchange_id,
            actor: caller,
        });
        Ok(())
    }

    /// Anyone may close an escalation the resolver let lapse.
    pub(crate) fn expire_escalated_dispute(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        let exchange = self.exchange(exchange_id)?;
        let mut dispute = self.dispute(exchange_id)?;
        let terms = self.terms(exchange_id)?;
        dispute.require_state(&[DisputeState::Escalated], DisputeState::Refused)?;
        require_lapsed(&dispute, self.now)?;
        dispute.refuse(caller, self.now)?;
        let payoffs = refusal_payoffs(
            self.ctx.config.refusal_policy,
            &terms,
            exchange.buyer,
            exchange.seller,
            dispute.buyer_escalation_deposit,
        )?;
        self.finalize_dispute(exchange, dispute, &payoffs)?;
        tracing::info!(exchange_id = %exchange_id, caller = %caller, "escalated dispute expired");
        self.emit(SettlementEvent::EscalatedDisputeExpired {
            exchange_id,
            actor: caller,
        });
        Ok(())
    }

    fn finalize_dispute(
        &mut self,
        mut exchange: Exchange,
        dispute: Dispute,
        payoffs: &[Payoff],
    ) -> Result<(), SettlementError> {
        exchange.finalize_dispute(self.now)?;
        self.release(exchange.id, payoffs)?;
        self.store_exchange(exchange);
        self.store_dispute(dispute);
        Ok(())
    }
}
