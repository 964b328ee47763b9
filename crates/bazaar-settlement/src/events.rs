//! # Settlement Events
//!
//! Every successful operation emits one or more [`SettlementEvent`]s. Events
//! go through an outbox: they are staged while the operation runs and only
//! reach the log and the subscribers once it has succeeded. A failed
//! operation publishes nothing, except for effects that already left the
//! engine (a withdrawal transfer that went through before a later one
//! failed).

use std::sync::Arc;

use bazaar_core::{Address, AssetId, BasisPoints, ExchangeId, OfferId, PausableRegion, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use uuid::Uuid;

/// Something that happened in the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SettlementEvent {
    /// A buyer committed to an offer.
    ExchangeCommitted {
        exchange_id: ExchangeId,
        offer_id: OfferId,
        buyer: Address,
        seller: Address,
        price: u128,
        asset: AssetId,
    },
    /// The buyer redeemed the voucher.
    VoucherRedeemed { exchange_id: ExchangeId, actor: Address },
    /// The buyer canceled the voucher.
    VoucherCanceled { exchange_id: ExchangeId, actor: Address },
    /// The seller revoked the voucher.
    VoucherRevoked { exchange_id: ExchangeId, actor: Address },
    /// The voucher lapsed unredeemed.
    VoucherExpired { exchange_id: ExchangeId, actor: Address },
    /// The seller extended the redemption window.
    VoucherExtended {
        exchange_id: ExchangeId,
        valid_until: Timestamp,
        actor: Address,
    },
    /// The voucher changed hands.
    VoucherTransferred {
        exchange_id: ExchangeId,
        from: Address,
        to: Address,
    },
    /// The exchange completed and the seller was paid.
    ExchangeCompleted { exchange_id: ExchangeId, actor: Address },
    /// The buyer raised a dispute.
    DisputeRaised {
        exchange_id: ExchangeId,
        buyer: Address,
        seller: Address,
        timeout: Timestamp,
    },
    /// The buyer retracted the dispute.
    DisputeRetracted { exchange_id: ExchangeId, actor: Address },
    /// The seller extended the dispute deadline.
    DisputeTimeoutExtended {
        exchange_id: ExchangeId,
        timeout: Timestamp,
        actor: Address,
    },
    /// The parties agreed on a split.
    DisputeResolved {
        exchange_id: ExchangeId,
        buyer_percent: BasisPoints,
        actor: Address,
    },
    /// The buyer escalated to the resolver.
    DisputeEscalated {
        exchange_id: ExchangeId,
        dispute_resolver: Address,
        timeout: Timestamp,
        actor: Address,
    },
    /// The resolver ruled on a split.
    DisputeDecided {
        exchange_id: ExchangeId,
        buyer_percent: BasisPoints,
        actor: Address,
    },
    /// The negotiation deadline passed unresolved.
    DisputeExpired { exchange_id: ExchangeId, actor: Address },
    /// The resolver's deadline passed without a ruling.
    EscalatedDisputeExpired { exchange_id: ExchangeId, actor: Address },
    /// The resolver declined to rule.
    EscalatedDisputeRefused { exchange_id: ExchangeId, actor: Address },
    /// Value was credited to an available balance from outside.
    FundsDeposited {
        owner: Address,
        asset: AssetId,
        amount: u128,
        actor: Address,
    },
    /// Value was placed into an exchange's escrow.
    FundsEncumbered {
        exchange_id: ExchangeId,
        asset: AssetId,
        amount: u128,
        actor: Address,
    },
    /// An escrow payout credited a party.
    FundsReleased {
        exchange_id: ExchangeId,
        recipient: Address,
        asset: AssetId,
        amount: u128,
    },
    /// Value left the engine.
    FundsWithdrawn {
        owner: Address,
        asset: AssetId,
        amount: u128,
    },
    /// Regions were paused.
    RegionsPaused {
        regions: Vec<PausableRegion>,
        actor: Address,
    },
    /// Regions were unpaused.
    RegionsUnpaused {
        regions: Vec<PausableRegion>,
        actor: Address,
    },
    /// A relayed call went through.
    MetaTransactionExecuted {
        signer: Address,
        relayer: Address,
        nonce: u64,
        function_name: String,
    },
}

impl SettlementEvent {
    /// The variant name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExchangeCommitted { .. } => "ExchangeCommitted",
            Self::VoucherRedeemed { .. } => "VoucherRedeemed",
            Self::VoucherCanceled { .. } => "VoucherCanceled",
            Self::VoucherRevoked { .. } => "VoucherRevoked",
            Self::VoucherExpired { .. } => "VoucherExpired",
            Self::VoucherExtended { .. } => "VoucherExtended",
            Self::VoucherTransferred { .. } => "VoucherTransferred",
            Self::ExchangeCompleted { .. } => "ExchangeCompleted",
            Self::DisputeRaised { .. } => "DisputeRaised",
            Self::DisputeRetracted { .. } => "DisputeRetracted",
            Self::DisputeTimeoutExtended { .. } => "DisputeTimeoutExtended",
            Self::DisputeResolved { .. } => "DisputeResolved",
            Self::DisputeEscalated { .. } => "DisputeEscalated",
            Self::DisputeDecided { .. } => "DisputeDecided",
            Self::DisputeExpired { .. } => "DisputeExpired",
            Self::EscalatedDisputeExpired { .. } => "EscalatedDisputeExpired",
            Self::EscalatedDisputeRefused { .. } => "EscalatedDisputeRefused",
            Self::FundsDeposited { .. } => "FundsDeposited",
            Self::FundsEncumbered { .. } => "FundsEncumbered",
            Self::FundsReleased { .. } => "FundsReleased",
            Self::FundsWithdrawn { .. } => "FundsWithdrawn",
            Self::RegionsPaused { .. } => "RegionsPaused",
            Self::RegionsUnpaused { .. } => "RegionsUnpaused",
            Self::MetaTransactionExecuted { .. } => "MetaTransactionExecuted",
        }
    }

    /// The exchange the event concerns, if any.
    pub fn exchange_id(&self) -> Option<ExchangeId> {
        match self {
            Self::ExchangeCommitted { exchange_id, .. }
            | Self::VoucherRedeemed { exchange_id, .. }
            | Self::VoucherCanceled { exchange_id, .. }
            | Self::VoucherRevoked { exchange_id, .. }
            | Self::VoucherExpired { exchange_id, .. }
            | Self::VoucherExtended { exchange_id, .. }
            | Self::VoucherTransferred { exchange_id, .. }
            | Self::ExchangeCompleted { exchange_id, .. }
            | Self::DisputeRaised { exchange_id, .. }
            | Self::DisputeRetracted { exchange_id, .. }
            | Self::DisputeTimeoutExtended { exchange_id, .. }
            | Self::DisputeResolved { exchange_id, .. }
            | Self::DisputeEscalated { exchange_id, .. }
            | Self::DisputeDecided { exchange_id, .. }
            | Self::DisputeExpired { exchange_id, .. }
            | Self::EscalatedDisputeExpired { exchange_id, .. }
            | Self::EscalatedDisputeRefused { exchange_id, .. }
            | Self::FundsEncumbered { exchange_id, .. }
            | Self::FundsReleased { exchange_id, .. } => Some(*exchange_id),
            Self::FundsDeposited { .. }
            | Self::FundsWithdrawn { .. }
            | Self::RegionsPaused { .. }
            | Self::RegionsUnpaused { .. }
            | Self::MetaTransactionExecuted { .. } => None,
        }
    }
}

/// A published event with its log position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventEnvelope {
    /// Position in the log, starting at 1.
    pub sequence: u64,
    /// Unique event id.
    pub id: Uuid,
    /// When the operation that produced it ran.
    pub recorded_at: Timestamp,
    /// The event.
    pub event: SettlementEvent,
}

/// Receives every published event, in log order.
pub trait EventSubscriber: Send + Sync {
    /// Called once per event after the producing operation succeeded.
    fn on_event(&self, envelope: &EventEnvelope);
}

/// Events staged by one operation.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    staged: Vec<SettlementEvent>,
    settled: Vec<SettlementEvent>,
}

impl Outbox {
    /// Stage an event that is published only if the operation succeeds.
    pub(crate) fn stage(&mut self, event: SettlementEvent) {
        self.staged.push(event);
    }

    /// Stage an event for an effect that cannot be undone.
    pub(crate) fn stage_settled(&mut self, event: SettlementEvent) {
        self.settled.push(event);
    }

    /// The events to publish, given whether the operation succeeded.
    pub(crate) fn into_published(self, succeeded: bool) -> Vec<SettlementEvent> {
        let mut events = self.settled;
        if succeeded {
            events.extend(self.staged);
        }
        events
    }
}

/// The event log and its subscribers.
#[derive(Default)]
pub(crate) struct EventBus {
    log: RwLock<Vec<EventEnvelope>>,
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
    publishing: Mutex<()>,
}

impl EventBus {
    pub(crate) fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Append `events` to the log and fan them out.
    pub(crate) fn publish(&self, events: Vec<SettlementEvent>, recorded_at: Timestamp) {
        if events.is_empty() {
            return;
        }
        // Keep log order and delivery order identical across threads.
        let _publishing = self.publishing.lock();
        let envelopes: Vec<EventEnvelope> = {
            let mut log = self.log.write();
            events
                .into_iter()
                .map(|event| {
                    let envelope = EventEnvelope {
                        sequence: log.len() as u64 + 1,
                        id: Uuid::new_v4(),
                        recorded_at,
                        event,
                    };
                    log.push(envelope.clone());
                    envelope
                })
                .collect()
        };
        let subscribers = self.subscribers.read().clone();
        for envelope in &envelopes {
            tracing::debug!(
                sequence = envelope.sequence,
                event = envelope.event.name(),
                "settlement event published"
            );
            for subscriber in &subscribers {
                subscriber.on_event(envelope);
            }
        }
    }

    pub(crate) fn events(&self) -> Vec<EventEnvelope> {
        self.log.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Mutex<Vec<u64>>);

    impl EventSubscriber for Recorder {
        fn on_event(&self, envelope: &EventEnvelope) {
            self.0.lock().push(envelope.sequence);
        }
    }

    fn ts() -> Timestamp {
        Timestamp::from_unix_seconds(10).unwrap()
    }

    fn redeemed(id: u64) -> SettlementEvent {
        SettlementEvent::VoucherRedeemed {
            exchange_id: ExchangeId::new(id),
            actor: Address::from_bytes([1; 20]),
        }
    }

    #[test]
    fn failed_operation_publishes_only_settled_events() {
        let mut outbox = Outbox::default();
        outbox.stage(redeemed(1));
        outbox.stage_settled(redeemed(2));
        let published = outbox.into_published(false);
        assert_eq!(published, vec![redeemed(2)]);
    }

    #[test]
    fn successful_operation_publishes_all() {
        let mut outbox = Outbox::default();
        outbox.stage(redeemed(1));
        outbox.stage_settled(redeemed(2));
        assert_eq!(outbox.into_published(true).len(), 2);
    }

    #[test]
    fn bus_assigns_sequences_and_notifies() {
        let bus = EventBus::default();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        bus.subscribe(recorder.clone());
        bus.publish(vec![redeemed(1), redeemed(2)], ts());
        bus.publish(vec![redeemed(3)], ts());
        let log = bus.events();
        assert_eq!(log.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(*recorder.0.lock(), vec![1, 2, 3]);
        assert_ne!(log[0].id, log[1].id);
    }

    #[test]
    fn event_json_is_tagged() {
        let json = serde_json::to_value(redeemed(7)).unwrap();
        assert_eq!(json["type"], "VoucherRedeemed");
        assert_eq!(json["exchange_id"], 7);
    }

    #[test]
    fn exchange_id_accessor() {
        assert_eq!(redeemed(4).exchange_id(), Some(ExchangeId::new(4)));
        let paused = SettlementEvent::RegionsPaused {
            regions: vec![PausableRegion::Funds],
            actor: Address::ZERO,
        };
        assert_eq!(paused.exchange_id(), None);
        assert_eq!(paused.name(), "RegionsPaused");
    }
}
