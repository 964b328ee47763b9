//! One mutating call's view of the engine: exclusive access to the state,
//! the shared collaborators, a frozen "now" and an outbox.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bazaar_core::{Address, Clock, ExchangeId, PausableRegion, Timestamp};
use bazaar_crypto::SignatureVerifier;
use bazaar_state::{Dispute, Exchange};

use crate::config::SettlementConfig;
use crate::error::SettlementError;
use crate::events::{Outbox, SettlementEvent};
use crate::exchange::ExchangeTerms;
use crate::ledger::{FundsLedger, Payoff};
use crate::pause::PauseGate;
use crate::registry::OfferRegistry;
use crate::transfer::TokenTransfer;

/// Everything the engine lock protects.
#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) exchanges: BTreeMap<ExchangeId, Exchange>,
    pub(crate) terms: BTreeMap<ExchangeId, ExchangeTerms>,
    pub(crate) disputes: BTreeMap<ExchangeId, Dispute>,
    pub(crate) ledger: FundsLedger,
    pub(crate) pause: PauseGate,
    pub(crate) next_exchange_id: ExchangeId,
    pub(crate) used_nonces: HashSet<(Address, u64)>,
}

impl EngineState {
    pub(crate) fn new(pause: PauseGate) -> Self {
        Self {
            exchanges: BTreeMap::new(),
            terms: BTreeMap::new(),
            disputes: BTreeMap::new(),
            ledger: FundsLedger::new(),
            pause,
            next_exchange_id: ExchangeId::new(1),
            used_nonces: HashSet::new(),
        }
    }
}

/// Immutable wiring shared by every call.
pub(crate) struct EngineContext {
    pub(crate) config: SettlementConfig,
    pub(crate) verifier: SignatureVerifier,
    pub(crate) registry: Arc<dyn OfferRegistry>,
    pub(crate) tokens: Arc<dyn TokenTransfer>,
    pub(crate) clock: Arc<dyn Clock>,
}

pub(crate) struct Session<'a> {
    pub(crate) state: &'a mut EngineState,
    pub(crate) ctx: &'a EngineContext,
    pub(crate) now: Timestamp,
    pub(crate) outbox: Outbox,
}

impl<'a> Session<'a> {
    pub(crate) fn new(state: &'a mut EngineState, ctx: &'a EngineContext) -> Self {
        let now = ctx.clock.now();
        Self {
            state,
            ctx,
            now,
            outbox: Outbox::default(),
        }
    }

    pub(crate) fn require_unpaused(&self, region: PausableRegion) -> Result<(), SettlementError> {
        self.state.pause.require_unpaused(region)
    }

    pub(crate) fn emit(&mut self, event: SettlementEvent) {
        self.outbox.stage(event);
    }

    pub(crate) fn exchange(&self, id: ExchangeId) -> Result<Exchange, SettlementError> {
        self.state
            .exchanges
            .get(&id)
            .cloned()
            .ok_or(SettlementError::NoSuchExchange(id))
    }

    pub(crate) fn terms(&self, id: ExchangeId) -> Result<ExchangeTerms, SettlementError> {
        self.state
            .terms
            .get(&id)
            .cloned()
            .ok_or(SettlementError::NoSuchExchange(id))
    }

    pub(crate) fn dispute(&self, id: ExchangeId) -> Result<Dispute, SettlementError> {
        self.state
            .disputes
            .get(&id)
            .cloned()
            .ok_or(SettlementError::NoSuchDispute(id))
    }

    /// Pay out the escrow of `exchange_id` and stage one `FundsReleased`
    /// per non-zero payoff.
    pub(crate) fn release(
        &mut self,
        exchange_id: ExchangeId,
        payoffs: &[Payoff],
    ) -> Result<(), SettlementError> {
        self.state.ledger.release(exchange_id, payoffs, self.now)?;
        let asset = self
            .state
            .ledger
            .escrow(&exchange_id)
            .map(|escrow| escrow.asset)
            .ok_or(SettlementError::NoSuchEscrow(exchange_id))?;
        for payoff in payoffs.iter().filter(|p| p.amount > 0) {
            tracing::info!(
                exchange_id = %exchange_id,
                recipient = %payoff.recipient,
                amount = payoff.amount,
                "escrow released"
            );
            self.emit(SettlementEvent::FundsReleased {
                exchange_id,
                recipient: payoff.recipient,
                asset,
                amount: payoff.amount,
            });
        }
        Ok(())
    }

    /// Store updated records. Called only after every fallible step of an
    /// operation has succeeded.
    pub(crate) fn store_exchange(&mut self, exchange: Exchange) {
        self.state.exchanges.insert(exchange.id, exchange);
    }

    pub(crate) fn store_dispute(&mut self, dispute: Dispute) {
        self.state.disputes.insert(dispute.exchange_id, dispute);
    }
}
