//! Shared market fixture for the integration suite.

#![allow(dead_code)]

use std::sync::Arc;

use bazaar_core::{Address, AssetId, BasisPoints, ExchangeId, ManualClock, OfferId, Timestamp};
use bazaar_crypto::{LocalSigner, RecoverableSignature, ResolutionMessage};
use bazaar_settlement::{
    DisputeResolver, DisputeResolverFee, InMemoryRegistry, InMemoryTokenBank, Offer,
    SettlementConfig, SettlementEngine,
};

pub const T0: i64 = 1_700_000_000;
pub const PRICE: u128 = 100;
pub const SELLER_DEPOSIT: u128 = 20;
pub const CANCEL_PENALTY: u128 = 10;
pub const RESOLVER_FEE: u128 = 50;
pub const DISPUTE_PERIOD: u64 = 100;
pub const RESOLUTION_PERIOD: u64 = 200;
pub const RESPONSE_PERIOD: u64 = 300;
pub const VOUCHER_DURATION: u64 = 500;
pub const SELLER_FLOAT: u128 = 1_000;
pub const WALLET: u128 = 10_000;

pub fn ts(offset: i64) -> Timestamp {
    Timestamp::from_unix_seconds(T0 + offset).unwrap()
}

pub fn pauser() -> Address {
    Address::from_bytes([0xAA; 20])
}

pub fn stranger() -> Address {
    Address::from_bytes([0xEE; 20])
}

pub fn base_config() -> SettlementConfig {
    SettlementConfig {
        pauser: pauser(),
        protocol_address: Address::from_bytes([0x42; 20]),
        chain_id: 31337,
        ..SettlementConfig::default()
    }
}

pub fn offer(seller: Address, resolver: Address) -> Offer {
    Offer {
        id: OfferId::new(1),
        seller,
        price: PRICE,
        seller_deposit: SELLER_DEPOSIT,
        buyer_cancel_penalty: CANCEL_PENALTY,
        asset: AssetId::NATIVE,
        quantity_available: 1_000,
        dispute_resolver: Some(resolver),
        valid_from: ts(-10),
        valid_until: ts(1_000_000),
        voucher_redeemable_from: ts(0),
        voucher_redeemable_until: None,
        voucher_valid_duration: VOUCHER_DURATION,
        dispute_period: DISPUTE_PERIOD,
        resolution_period: RESOLUTION_PERIOD,
        voided: false,
    }
}

/// An engine with one offer, one resolver and funded parties. The seller
/// has `SELLER_FLOAT` available in the ledger.
pub struct Market {
    pub engine: Arc<SettlementEngine>,
    pub registry: Arc<InMemoryRegistry>,
    pub bank: Arc<InMemoryTokenBank>,
    pub clock: Arc<ManualClock>,
    pub buyer: LocalSigner,
    pub seller: LocalSigner,
    pub resolver: LocalSigner,
}

impl Market {
    pub fn new() -> Self {
        Self::with_config(base_config())
    }

    pub fn with_config(config: SettlementConfig) -> Self {
        let buyer = LocalSigner::from_bytes(&[0x11; 32]).unwrap();
        let seller = LocalSigner::from_bytes(&[0x22; 32]).unwrap();
        let resolver = LocalSigner::from_bytes(&[0x33; 32]).unwrap();

        let registry = Arc::new(InMemoryRegistry::new());
        registry.add_offer(offer(seller.address(), resolver.address()));
        registry.add_resolver(DisputeResolver {
            address: resolver.address(),
            escalation_response_period: RESPONSE_PERIOD,
            fees: vec![DisputeResolverFee {
                asset: AssetId::NATIVE,
                amount: RESOLVER_FEE,
            }],
            active: true,
        });

        let bank = Arc::new(InMemoryTokenBank::new());
        bank.mint(buyer.address(), AssetId::NATIVE, WALLET);
        bank.mint(seller.address(), AssetId::NATIVE, WALLET);

        let clock = Arc::new(ManualClock::new(ts(0)));
        let engine = Arc::new(
            SettlementEngine::new(config, registry.clone(), bank.clone(), clock.clone()).unwrap(),
        );
        engine
            .deposit_funds(seller.address(), seller.address(), AssetId::NATIVE, SELLER_FLOAT)
            .unwrap();

        Self {
            engine,
            registry,
            bank,
            clock,
            buyer,
            seller,
            resolver,
        }
    }

    pub fn buyer(&self) -> Address {
        self.buyer.address()
    }

    pub fn seller(&self) -> Address {
        self.seller.address()
    }

    pub fn resolver(&self) -> Address {
        self.resolver.address()
    }

    pub fn at(&self, offset: i64) {
        self.clock.set(ts(offset));
    }

    pub fn available(&self, owner: Address) -> u128 {
        self.engine
            .get_available_funds(&owner, &AssetId::NATIVE)
            .unwrap()
    }

    pub fn wallet(&self, owner: Address) -> u128 {
        self.bank.balance_of(&owner, &AssetId::NATIVE)
    }

    pub fn commit(&self) -> ExchangeId {
        self.engine.commit(self.buyer(), OfferId::new(1)).unwrap()
    }

    pub fn redeemed(&self) -> ExchangeId {
        let id = self.commit();
        self.engine.redeem_voucher(self.buyer(), id).unwrap();
        id
    }

    pub fn disputed(&self) -> ExchangeId {
        let id = self.redeemed();
        self.engine.raise_dispute(self.buyer(), id).unwrap();
        id
    }

    pub fn escalated(&self) -> ExchangeId {
        let id = self.disputed();
        self.engine.escalate_dispute(self.buyer(), id).unwrap();
        id
    }

    pub fn sign_resolution(
        &self,
        signer: &LocalSigner,
        exchange_id: ExchangeId,
        buyer_percent: u32,
    ) -> RecoverableSignature {
        let message = ResolutionMessage {
            exchange_id,
            buyer_percent: BasisPoints::new(buyer_percent).unwrap(),
        };
        signer.sign_typed(self.engine.domain(), &message).unwrap()
    }

    /// Every released escrow paid out exactly what it took in, and a
    /// settled dispute carries the exchange's finalization date.
    pub fn assert_settled(&self, exchange_id: ExchangeId) {
        assert!(self.engine.is_exchange_finalized(exchange_id).unwrap());
        let escrow = self.engine.get_escrow(exchange_id).unwrap();
        assert_eq!(escrow.held, 0, "escrow of {exchange_id} still holds value");
        assert_eq!(escrow.encumbered_total, escrow.released_total);
        let finalized = self.engine.get_exchange(exchange_id).unwrap().finalized_date;
        assert!(finalized.is_some());
        if let Ok(dispute) = self.engine.get_dispute(exchange_id) {
            assert_eq!(dispute.dates.finalized, finalized, "dispute of {exchange_id}");
        }
    }

    /// Neither record carries a finalization date while the dispute is open.
    pub fn assert_dispute_open(&self, exchange_id: ExchangeId) {
        let dispute = self.engine.get_dispute(exchange_id).unwrap();
        assert!(dispute.dates.finalized.is_none(), "dispute of {exchange_id}");
        assert!(self.engine.get_exchange(exchange_id).unwrap().finalized_date.is_none());
        assert!(!self.engine.is_exchange_finalized(exchange_id).unwrap());
    }

    /// Ledger plus escrow equals what the bank holds in custody.
    pub fn assert_custody_matches(&self) {
        let ledger = self.engine.get_total_available(&AssetId::NATIVE).unwrap()
            + self.engine.get_total_escrowed(&AssetId::NATIVE).unwrap();
        assert_eq!(ledger, self.bank.custody_balance(&AssetId::NATIVE));
    }
}
