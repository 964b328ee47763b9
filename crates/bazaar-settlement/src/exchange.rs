//! # Exchange Engine
//!
//! Commit, redeem, cancel, revoke, expire, extend, transfer and complete.
//!
//! Every operation checks, in order: the exchange exists, the caller has
//! the required role, the record is in the required state, and only then
//! the deadline. Records are edited as clones and written back once the
//! ledger has accepted the payout, so a rejected call changes nothing.
//!
//! ## Payouts
//!
//! | Outcome   | Buyer                 | Seller                   |
//! |-----------|-----------------------|--------------------------|
//! | Completed | 0                     | price + deposit          |
//! | Canceled  | price − penalty       | deposit + penalty        |
//! | Revoked   | price + deposit       | 0                        |
//! | Expired   | price − penalty       | deposit + penalty        |

use bazaar_core::{Address, AssetId, ExchangeId, OfferId, PausableRegion};
use bazaar_state::{Exchange, ExchangeState, StateError, VoucherWindow};
use serde::{Deserialize, Serialize};

use crate::error::SettlementError;
use crate::events::SettlementEvent;
use crate::ledger::{Encumbrance, Payoff};
use crate::registry::{Offer, RegistryError};
use crate::session::Session;
use crate::transfer::TransferError;

/// The offer terms an exchange was committed under. Later edits to the
/// offer do not affect an existing exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTerms {
    /// Offer the terms were taken from.
    pub offer_id: OfferId,
    /// Price paid by the buyer.
    pub price: u128,
    /// Seller's stake.
    pub seller_deposit: u128,
    /// Part of the price forfeited on cancel or expiry.
    pub buyer_cancel_penalty: u128,
    /// Asset of every amount above.
    pub asset: AssetId,
    /// Seconds after redemption in which a dispute may be raised.
    pub dispute_period: u64,
    /// Seconds the parties get to resolve a dispute.
    pub resolution_period: u64,
    /// Resolver for escalations.
    pub dispute_resolver: Option<Address>,
}

impl ExchangeTerms {
    /// Snapshot the terms of `offer`.
    pub fn from_offer(offer: &Offer) -> Self {
        Self {
            offer_id: offer.id,
            price: offer.price,
            seller_deposit: offer.seller_deposit,
            buyer_cancel_penalty: offer.buyer_cancel_penalty,
            asset: offer.asset,
            dispute_period: offer.dispute_period,
            resolution_period: offer.resolution_period,
            dispute_resolver: offer.dispute_resolver,
        }
    }

    /// Price plus seller deposit.
    pub fn pot(&self) -> Result<u128, SettlementError> {
        self.price
            .checked_add(self.seller_deposit)
            .ok_or(SettlementError::ArithmeticOverflow("exchange pot"))
    }

    /// The whole pot to `seller`.
    pub fn completion_payoffs(&self, seller: Address) -> Result<Vec<Payoff>, SettlementError> {
        Ok(vec![Payoff {
            recipient: seller,
            amount: self.pot()?,
        }])
    }

    /// The whole pot to `buyer`.
    pub fn revocation_payoffs(&self, buyer: Address) -> Result<Vec<Payoff>, SettlementError> {
        Ok(vec![Payoff {
            recipient: buyer,
            amount: self.pot()?,
        }])
    }

    /// Price minus penalty to `buyer`; deposit plus penalty to `seller`.
    /// A penalty above the price forfeits the whole price.
    pub fn cancellation_payoffs(
        &self,
        buyer: Address,
        seller: Address,
    ) -> Result<Vec<Payoff>, SettlementError> {
        let penalty = self.buyer_cancel_penalty.min(self.price);
        let to_seller = self
            .seller_deposit
            .checked_add(penalty)
            .ok_or(SettlementError::ArithmeticOverflow("cancellation payout"))?;
        Ok(vec![
            Payoff {
                recipient: buyer,
                amount: self.price - penalty,
            },
            Payoff {
                recipient: seller,
                amount: to_seller,
            },
        ])
    }
}

impl Session<'_> {
    /// Buy one unit of `offer_id`.
    pub(crate) fn commit(
        &mut self,
        buyer: Address,
        offer_id: OfferId,
    ) -> Result<ExchangeId, SettlementError> {
        let offer = self
            .ctx
            .registry
            .offer(offer_id)
            .ok_or(SettlementError::NoSuchOffer(offer_id))?;
        if offer.voided {
            return Err(SettlementError::OfferVoided(offer_id));
        }
        if !offer.is_available_at(self.now) {
            return Err(SettlementError::OfferNotAvailable {
                offer_id,
                at: self.now,
            });
        }
        if offer.quantity_available == 0 {
            return Err(SettlementError::OfferSoldOut(offer_id));
        }
        if buyer.is_zero() {
            return Err(SettlementError::ZeroAddress { role: "buyer" });
        }
        let available = self.state.ledger.available(&offer.seller, &offer.asset);
        if available < offer.seller_deposit {
            return Err(SettlementError::InsufficientAvailableFunds {
                owner: offer.seller,
                asset: offer.asset,
                required: offer.seller_deposit,
                available,
            });
        }

        let terms = ExchangeTerms::from_offer(&offer);
        // The unit reserved below cannot be handed back to the registry.
        terms.pot()?;
        self.pull(&buyer, &terms.asset, terms.price)?;
        if let Err(err) = self.ctx.registry.reserve_unit(offer_id) {
            self.refund(&buyer, &terms.asset, terms.price);
            return Err(match err {
                RegistryError::UnknownOffer(id) => SettlementError::NoSuchOffer(id),
                RegistryError::SoldOut(id) => SettlementError::OfferSoldOut(id),
            });
        }

        let exchange_id = self.state.next_exchange_id;
        let encumbered = match self.state.ledger.encumber(
            exchange_id,
            terms.asset,
            &[
                Encumbrance::external(buyer, terms.price),
                Encumbrance::from_ledger(offer.seller, terms.seller_deposit),
            ],
            self.now,
        ) {
            Ok(total) => total,
            Err(err) => {
                self.refund(&buyer, &terms.asset, terms.price);
                return Err(err);
            }
        };

        let voucher = VoucherWindow {
            valid_from: offer.voucher_redeemable_from,
            valid_until: offer.voucher_valid_until(self.now),
        };
        let exchange = Exchange::commit(exchange_id, offer_id, buyer, offer.seller, voucher, self.now);
        self.state.next_exchange_id = exchange_id.next();
        self.state.terms.insert(exchange_id, terms.clone());
        self.store_exchange(exchange);

        tracing::info!(
            exchange_id = %exchange_id,
            offer_id = %offer_id,
            buyer = %buyer,
            price = terms.price,
            "exchange committed"
        );
        self.emit(SettlementEvent::ExchangeCommitted {
            exchange_id,
            offer_id,
            buyer,
            seller: offer.seller,
            price: terms.price,
            asset: terms.asset,
        });
        self.emit(SettlementEvent::FundsEncumbered {
            exchange_id,
            asset: terms.asset,
            amount: encumbered,
            actor: buyer,
        });
        Ok(exchange_id)
    }

    /// Redeem the voucher inside its window.
    pub(crate) fn redeem_voucher(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        let mut exchange = self.exchange(exchange_id)?;
        require_holder(&exchange, &caller)?;
        exchange.require_state(ExchangeState::Committed, ExchangeState::Redeemed)?;
        if !exchange.voucher.contains(self.now) {
            return Err(SettlementError::VoucherNotRedeemable {
                exchange_id,
                valid_from: exchange.voucher.valid_from,
                valid_until: exchange.voucher.valid_until,
            });
        }
        exchange.redeem(caller, self.now)?;
        self.store_exchange(exchange);
        tracing::info!(exchange_id = %exchange_id, "voucher redeemed");
        self.emit(SettlementEvent::VoucherRedeemed {
            exchange_id,
            actor: caller,
        });
        Ok(())
    }

    /// Pay the seller. The buyer may complete at any time; anyone else
    /// once the dispute period has run out.
    pub(crate) fn complete_exchange(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        let mut exchange = self.exchange(exchange_id)?;
        let terms = self.terms(exchange_id)?;
        exchange.require_state(ExchangeState::Redeemed, ExchangeState::Completed)?;
        if caller != exchange.buyer {
            let redeemed = exchange.redeemed_date.unwrap_or(exchange.committed_date);
            if self.now <= redeemed.plus_seconds(terms.dispute_period) {
                return Err(SettlementError::DisputePeriodNotElapsed(exchange_id));
            }
        }
        exchange.complete(caller, self.now)?;
        self.release(exchange_id, &terms.completion_payoffs(exchange.seller)?)?;
        self.store_exchange(exchange);
        tracing::info!(exchange_id = %exchange_id, caller = %caller, "exchange completed");
        self.emit(SettlementEvent::ExchangeCompleted {
            exchange_id,
            actor: caller,
        });
        Ok(())
    }

    /// The buyer walks away before redemption and forfeits the penalty.
    pub(crate) fn cancel_voucher(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        let mut exchange = self.exchange(exchange_id)?;
        let terms = self.terms(exchange_id)?;
        require_holder(&exchange, &caller)?;
        exchange.cancel(caller, self.now)?;
        self.release(
            exchange_id,
            &terms.cancellation_payoffs(exchange.buyer, exchange.seller)?,
        )?;
        self.store_exchange(exchange);
        tracing::info!(exchange_id = %exchange_id, "voucher canceled");
        self.emit(SettlementEvent::VoucherCanceled {
            exchange_id,
            actor: caller,
        });
        Ok(())
    }

    /// The seller backs out and the buyer takes the whole pot.
    pub(crate) fn revoke_voucher(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        let mut exchange = self.exchange(exchange_id)?;
        let terms = self.terms(exchange_id)?;
        require_seller(&exchange, &caller, "revoke the voucher")?;
        exchange.revoke(caller, self.now)?;
        self.release(exchange_id, &terms.revocation_payoffs(exchange.buyer)?)?;
        self.store_exchange(exchange);
        tracing::info!(exchange_id = %exchange_id, "voucher revoked");
        self.emit(SettlementEvent::VoucherRevoked {
            exchange_id,
            actor: caller,
        });
        Ok(())
    }

    /// Anyone may expire a voucher whose window has closed.
    pub(crate) fn expire_voucher(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        let mut exchange = self.exchange(exchange_id)?;
        let terms = self.terms(exchange_id)?;
        exchange.require_state(ExchangeState::Committed, ExchangeState::Expired)?;
        if !exchange.voucher.has_lapsed(self.now) {
            return Err(SettlementError::VoucherStillValid {
                exchange_id,
                valid_until: exchange.voucher.valid_until,
            });
        }
        exchange.expire(caller, self.now)?;
        self.release(
            exchange_id,
            &terms.cancellation_payoffs(exchange.buyer, exchange.seller)?,
        )?;
        self.store_exchange(exchange);
        tracing::info!(exchange_id = %exchange_id, caller = %caller, "voucher expired");
        self.emit(SettlementEvent::VoucherExpired {
            exchange_id,
            actor: caller,
        });
        Ok(())
    }

    /// The seller pushes the end of the redemption window out.
    pub(crate) fn extend_voucher(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
        new_valid_until: bazaar_core::Timestamp,
    ) -> Result<(), SettlementError> {
        let mut exchange = self.exchange(exchange_id)?;
        require_seller(&exchange, &caller, "extend the voucher")?;
        exchange
            .extend_voucher(new_valid_until)
            .map_err(|err| match err {
                StateError::DeadlineNotExtended { current, requested } => {
                    SettlementError::VoucherExtensionNotValid { current, requested }
                }
                other => other.into(),
            })?;
        self.store_exchange(exchange);
        tracing::info!(exchange_id = %exchange_id, valid_until = %new_valid_until, "voucher extended");
        self.emit(SettlementEvent::VoucherExtended {
            exchange_id,
            valid_until: new_valid_until,
            actor: caller,
        });
        Ok(())
    }

    /// Hand an unredeemed voucher to someone else.
    pub(crate) fn transfer_voucher(
        &mut self,
        caller: Address,
        exchange_id: ExchangeId,
        new_holder: Address,
    ) -> Result<(), SettlementError> {
        self.require_unpaused(PausableRegion::SequentialCommit)?;
        let mut exchange = self.exchange(exchange_id)?;
        require_holder(&exchange, &caller)?;
        exchange.require_state(ExchangeState::Committed, ExchangeState::Committed)?;
        if new_holder.is_zero() || new_holder == exchange.buyer {
            return Err(SettlementError::InvalidVoucherRecipient {
                exchange_id,
                recipient: new_holder,
            });
        }
        exchange.transfer(new_holder)?;
        self.store_exchange(exchange);
        tracing::info!(exchange_id = %exchange_id, from = %caller, to = %new_holder, "voucher transferred");
        self.emit(SettlementEvent::VoucherTransferred {
            exchange_id,
            from: caller,
            to: new_holder,
        });
        Ok(())
    }

    /// Move `amount` from `from`'s wallet into custody.
    pub(crate) fn pull(
        &self,
        from: &Address,
        asset: &AssetId,
        amount: u128,
    ) -> Result<(), SettlementError> {
        if amount == 0 {
            return Ok(());
        }
        self.ctx
            .tokens
            .pull(from, asset, amount)
            .map_err(|err| match err {
                TransferError::InsufficientBalance {
                    owner,
                    asset,
                    needed,
                    available,
                } => SettlementError::InsufficientAvailableFunds {
                    owner,
                    asset,
                    required: needed,
                    available,
                },
                other => SettlementError::TransferFailed {
                    party: *from,
                    asset: *asset,
                    amount,
                    reason: other.to_string(),
                },
            })
    }

    /// Return a pulled amount after a later step failed. When the push
    /// back is refused the amount stays in custody, credited to `to`'s
    /// available balance.
    pub(crate) fn refund(&mut self, to: &Address, asset: &AssetId, amount: u128) {
        if amount == 0 {
            return;
        }
        let Err(err) = self.ctx.tokens.push(to, asset, amount) else {
            return;
        };
        tracing::warn!(
            party = %to,
            asset = %asset,
            amount,
            error = %err,
            "refund push failed, crediting ledger balance"
        );
        if let Err(err) = self.state.ledger.credit(*to, *asset, amount) {
            tracing::error!(
                party = %to,
                asset = %asset,
                amount,
                error = %err,
                "refund of pulled funds failed"
            );
        }
    }
}

pub(crate) fn require_holder(exchange: &Exchange, caller: &Address) -> Result<(), SettlementError> {
    if exchange.buyer != *caller {
        tracing::warn!(exchange_id = %exchange.id, caller = %caller, "caller is not the voucher holder");
        return Err(SettlementError::NotVoucherHolder {
            exchange_id: exchange.id,
            caller: *caller,
        });
    }
    Ok(())
}

pub(crate) fn require_seller(
    exchange: &Exchange,
    caller: &Address,
    action: &'static str,
) -> Result<(), SettlementError> {
    if exchange.seller != *caller {
        tracing::warn!(exchange_id = %exchange.id, caller = %caller, action, "caller is not the seller");
        return Err(SettlementError::Unauthorized {
            caller: *caller,
            action,
        });
    }
    Ok(())
}
