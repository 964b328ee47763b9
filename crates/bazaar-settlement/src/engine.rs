//! # Settlement Engine Facade
//!
//! [`SettlementEngine`] is the only entry point. Each mutating call:
//!
//! 1. is rejected with [`SettlementError::Reentrancy`] if the calling thread
//!    is already inside the engine;
//! 2. takes the state lock, so mutating calls run one at a time;
//! 3. checks its pause region before touching anything;
//! 4. runs against a [`Session`] with a single "now" read from the clock;
//! 5. publishes its staged events after the lock is released, only if it
//!    succeeded.
//!
//! Queries take the same lock and return clones.

use std::sync::Arc;

use bazaar_core::{Address, AssetId, Clock, ExchangeId, OfferId, PausableRegion, Timestamp};
use bazaar_crypto::{Eip712Domain, RecoverableSignature, SignatureVerifier};
use bazaar_state::{Dispute, Exchange};
use parking_lot::Mutex;

use crate::config::SettlementConfig;
use crate::error::SettlementError;
use crate::events::{EventBus, EventEnvelope, EventSubscriber, SettlementEvent};
use crate::exchange::ExchangeTerms;
use crate::guard::ReentrancyGuard;
use crate::ledger::EscrowAccount;
use crate::pause::PauseGate;
use crate::registry::OfferRegistry;
use crate::relay::{CallOutput, EngineCall, MetaTransaction};
use crate::session::{EngineContext, EngineState, Session};
use crate::transfer::TokenTransfer;

/// The settlement engine.
pub struct SettlementEngine {
    state: Mutex<EngineState>,
    ctx: EngineContext,
    guard: ReentrancyGuard,
    bus: EventBus,
}

impl std::fmt::Debug for SettlementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementEngine")
            .field("config", &self.ctx.config)
            .finish_non_exhaustive()
    }
}

impl SettlementEngine {
    /// Wire an engine to its collaborators.
    ///
    /// # Errors
    ///
    /// [`SettlementError::Config`] if `config` does not validate.
    pub fn new(
        config: SettlementConfig,
        registry: Arc<dyn OfferRegistry>,
        tokens: Arc<dyn TokenTransfer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SettlementError> {
        config.validate()?;
        let verifier = SignatureVerifier::new(config.domain());
        let pause = PauseGate::with_paused(&config.paused_regions);
        tracing::info!(
            protocol = %config.protocol_name,
            version = %config.protocol_version,
            chain_id = config.chain_id,
            paused = ?config.paused_regions,
            "settlement engine initialized"
        );
        Ok(Self {
            state: Mutex::new(EngineState::new(pause)),
            ctx: EngineContext {
                config,
                verifier,
                registry,
                tokens,
                clock,
            },
            guard: ReentrancyGuard::new(),
            bus: EventBus::default(),
        })
    }

    /// The configuration the engine runs with.
    pub fn config(&self) -> &SettlementConfig {
        &self.ctx.config
    }

    /// The signing domain resolution and relay signatures must use.
    pub fn domain(&self) -> &Eip712Domain {
        self.ctx.verifier.domain()
    }

    /// Register a subscriber for every future event.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.bus.subscribe(subscriber);
    }

    /// The full event log.
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.bus.events()
    }

    fn run<T>(
        &self,
        region: Option<PausableRegion>,
        op: impl FnOnce(&mut Session<'_>) -> Result<T, SettlementError>,
    ) -> Result<T, SettlementError> {
        self.guard.check()?;
        let (result, events, now) = {
            let mut state = self.state.lock();
            let _occupied = self.guard.occupy();
            let mut session = Session::new(&mut state, &self.ctx);
            let result = match region {
                Some(region) => session
                    .require_unpaused(region)
                    .and_then(|()| op(&mut session)),
                None => op(&mut session),
            };
            let Session { outbox, now, .. } = session;
            let published = outbox.into_published(result.is_ok());
            (result, published, now)
        };
        if let Err(err) = &result {
            tracing::debug!(error = %err, kind = ?err.kind(), "settlement operation rejected");
        }
        self.bus.publish(events, now);
        result
    }

    fn read<T>(&self, query: impl FnOnce(&EngineState) -> T) -> Result<T, SettlementError> {
        self.guard.check()?;
        let state = self.state.lock();
        Ok(query(&state))
    }

    // ── Exchanges ───────────────────────────────────────────────────

    /// Buy one unit of `offer_id`. Returns the new exchange id.
    pub fn commit(&self, buyer: Address, offer_id: OfferId) -> Result<ExchangeId, SettlementError> {
        self.run(Some(PausableRegion::Exchanges), |s| s.commit(buyer, offer_id))
    }

    /// Redeem the voucher of `exchange_id`.
    pub fn redeem_voucher(&self, caller: Address, exchange_id: ExchangeId) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Exchanges), |s| {
            s.redeem_voucher(caller, exchange_id)
        })
    }

    /// Cancel the voucher as buyer.
    pub fn cancel_voucher(&self, caller: Address, exchange_id: ExchangeId) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Exchanges), |s| {
            s.cancel_voucher(caller, exchange_id)
        })
    }

    /// Revoke the voucher as seller.
    pub fn revoke_voucher(&self, caller: Address, exchange_id: ExchangeId) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Exchanges), |s| {
            s.revoke_voucher(caller, exchange_id)
        })
    }

    /// Expire a voucher whose window has closed.
    pub fn expire_voucher(&self, caller: Address, exchange_id: ExchangeId) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Exchanges), |s| {
            s.expire_voucher(caller, exchange_id)
        })
    }

    /// Move the end of the voucher window to `valid_until`.
    pub fn extend_voucher(
        &self,
        caller: Address,
        exchange_id: ExchangeId,
        valid_until: Timestamp,
    ) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Exchanges), |s| {
            s.extend_voucher(caller, exchange_id, valid_until)
        })
    }

    /// Hand the voucher to `new_holder`.
    pub fn transfer_voucher(
        &self,
        caller: Address,
        exchange_id: ExchangeId,
        new_holder: Address,
    ) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Exchanges), |s| {
            s.transfer_voucher(caller, exchange_id, new_holder)
        })
    }

    /// Release the pot to the seller.
    pub fn complete_exchange(&self, caller: Address, exchange_id: ExchangeId) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Exchanges), |s| {
            s.complete_exchange(caller, exchange_id)
        })
    }

    // ── Disputes ────────────────────────────────────────────────────

    /// Open a dispute on a redeemed exchange.
    pub fn raise_dispute(&self, caller: Address, exchange_id: ExchangeId) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Disputes), |s| {
            s.raise_dispute(caller, exchange_id)
        })
    }

    /// Withdraw a dispute as buyer.
    pub fn retract_dispute(&self, caller: Address, exchange_id: ExchangeId) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Disputes), |s| {
            s.retract_dispute(caller, exchange_id)
        })
    }

    /// Move the dispute deadline to `new_timeout`.
    pub fn extend_dispute_timeout(
        &self,
        caller: Address,
        exchange_id: ExchangeId,
        new_timeout: Timestamp,
    ) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Disputes), |s| {
            s.extend_dispute_timeout(caller, exchange_id, new_timeout)
        })
    }

    /// Close a negotiation past its deadline.
    pub fn expire_dispute(&self, caller: Address, exchange_id: ExchangeId) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Disputes), |s| {
            s.expire_dispute(caller, exchange_id)
        })
    }

    /// Settle on `buyer_percent` basis points, signed by the counterparty.
    pub fn resolve_dispute(
        &self,
        caller: Address,
        exchange_id: ExchangeId,
        buyer_percent: u32,
        signature: &RecoverableSignature,
    ) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Disputes), |s| {
            s.resolve_dispute(caller, exchange_id, buyer_percent, signature)
        })
    }

    /// Hand the dispute to the resolver.
    pub fn escalate_dispute(&self, caller: Address, exchange_id: ExchangeId) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Disputes), |s| {
            s.escalate_dispute(caller, exchange_id)
        })
    }

    /// Rule on an escalated dispute as resolver.
    pub fn decide_dispute(
        &self,
        caller: Address,
        exchange_id: ExchangeId,
        buyer_percent: u32,
    ) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Disputes), |s| {
            s.decide_dispute(caller, exchange_id, buyer_percent)
        })
    }

    /// Decline an escalated dispute as resolver.
    pub fn refuse_escalated_dispute(
        &self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Disputes), |s| {
            s.refuse_escalated_dispute(caller, exchange_id)
        })
    }

    /// Close an escalation the resolver let lapse.
    pub fn expire_escalated_dispute(
        &self,
        caller: Address,
        exchange_id: ExchangeId,
    ) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Disputes), |s| {
            s.expire_escalated_dispute(caller, exchange_id)
        })
    }

    // ── Funds ───────────────────────────────────────────────────────

    /// Pull `amount` from `caller` and credit it to `owner`.
    pub fn deposit_funds(
        &self,
        caller: Address,
        owner: Address,
        asset: AssetId,
        amount: u128,
    ) -> Result<(), SettlementError> {
        self.run(Some(PausableRegion::Funds), |s| {
            s.deposit_funds(caller, owner, asset, amount)
        })
    }

    /// Withdraw `amounts` of `assets`, or every balance when both are empty.
    pub fn withdraw_funds(
        &self,
        caller: Address,
        assets: &[AssetId],
        amounts: &[u128],
    ) -> Result<Vec<(AssetId, u128)>, SettlementError> {
        self.run(Some(PausableRegion::Funds), |s| {
            s.withdraw_funds(caller, assets, amounts)
        })
    }

    // ── Administration ──────────────────────────────────────────────

    /// Pause `regions`, or all of them when empty. Pauser only.
    pub fn pause(
        &self,
        caller: Address,
        regions: &[PausableRegion],
    ) -> Result<Vec<PausableRegion>, SettlementError> {
        self.run(None, |s| {
            PauseGate::require_pauser(&caller, &s.ctx.config.pauser)?;
            let paused = s.state.pause.pause(regions);
            tracing::info!(regions = ?paused, "regions paused");
            s.emit(SettlementEvent::RegionsPaused {
                regions: paused.clone(),
                actor: caller,
            });
            Ok(paused)
        })
    }

    /// Unpause `regions`, or all of them when empty. Pauser only.
    pub fn unpause(
        &self,
        caller: Address,
        regions: &[PausableRegion],
    ) -> Result<Vec<PausableRegion>, SettlementError> {
        self.run(None, |s| {
            PauseGate::require_pauser(&caller, &s.ctx.config.pauser)?;
            let unpaused = s.state.pause.unpause(regions);
            tracing::info!(regions = ?unpaused, "regions unpaused");
            s.emit(SettlementEvent::RegionsUnpaused {
                regions: unpaused.clone(),
                actor: caller,
            });
            Ok(unpaused)
        })
    }

    // ── Generic dispatch and relay ──────────────────────────────────

    /// Run a serialized call with `caller` as the acting party.
    pub fn execute(&self, caller: Address, call: &EngineCall) -> Result<CallOutput, SettlementError> {
        self.run(Some(call.region()), |s| s.dispatch(caller, call))
    }

    /// Verify and run a call relayed by `relayer` on behalf of its signer.
    pub fn execute_meta_transaction(
        &self,
        relayer: Address,
        meta: &MetaTransaction,
    ) -> Result<CallOutput, SettlementError> {
        self.run(Some(PausableRegion::MetaTransaction), |s| {
            s.execute_meta_transaction(relayer, meta)
        })
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// The exchange with `exchange_id`.
    pub fn get_exchange(&self, exchange_id: ExchangeId) -> Result<Exchange, SettlementError> {
        self.read(|state| state.exchanges.get(&exchange_id).cloned())?
            .ok_or(SettlementError::NoSuchExchange(exchange_id))
    }

    /// The terms `exchange_id` was committed under.
    pub fn get_exchange_terms(&self, exchange_id: ExchangeId) -> Result<ExchangeTerms, SettlementError> {
        self.read(|state| state.terms.get(&exchange_id).cloned())?
            .ok_or(SettlementError::NoSuchExchange(exchange_id))
    }

    /// The dispute on `exchange_id`.
    pub fn get_dispute(&self, exchange_id: ExchangeId) -> Result<Dispute, SettlementError> {
        self.read(|state| state.disputes.get(&exchange_id).cloned())?
            .ok_or(SettlementError::NoSuchDispute(exchange_id))
    }

    /// Available balance of `owner` in `asset`.
    pub fn get_available_funds(&self, owner: &Address, asset: &AssetId) -> Result<u128, SettlementError> {
        self.read(|state| state.ledger.available(owner, asset))
    }

    /// Every non-zero available balance of `owner`.
    pub fn get_all_available_funds(&self, owner: &Address) -> Result<Vec<(AssetId, u128)>, SettlementError> {
        self.read(|state| state.ledger.balances_of(owner))
    }

    /// The escrow account of `exchange_id`.
    pub fn get_escrow(&self, exchange_id: ExchangeId) -> Result<EscrowAccount, SettlementError> {
        self.read(|state| state.ledger.escrow(&exchange_id).cloned())?
            .ok_or(SettlementError::NoSuchEscrow(exchange_id))
    }

    /// Total value in `asset` held in funded escrows.
    pub fn get_total_escrowed(&self, asset: &AssetId) -> Result<u128, SettlementError> {
        self.read(|state| state.ledger.total_escrowed(asset))
    }

    /// Total value in `asset` across available balances.
    pub fn get_total_available(&self, asset: &AssetId) -> Result<u128, SettlementError> {
        self.read(|state| state.ledger.total_available(asset))
    }

    /// Whether the funds of `exchange_id` have been released.
    pub fn is_exchange_finalized(&self, exchange_id: ExchangeId) -> Result<bool, SettlementError> {
        self.get_exchange(exchange_id).map(|exchange| exchange.is_finalized())
    }

    /// The current deadline of the dispute on `exchange_id`.
    pub fn get_dispute_timeout(&self, exchange_id: ExchangeId) -> Result<Timestamp, SettlementError> {
        self.get_dispute(exchange_id).map(|dispute| dispute.dates.timeout)
    }

    /// Whether `region` is paused.
    pub fn is_paused(&self, region: PausableRegion) -> Result<bool, SettlementError> {
        self.read(|state| state.pause.is_paused(region))
    }

    /// Every paused region.
    pub fn paused_regions(&self) -> Result<Vec<PausableRegion>, SettlementError> {
        self.read(|state| state.pause.paused_regions())
    }

    /// Whether `signer` has used relay `nonce`.
    pub fn is_nonce_used(&self, signer: &Address, nonce: u64) -> Result<bool, SettlementError> {
        self.read(|state| state.used_nonces.contains(&(*signer, nonce)))
    }
}
