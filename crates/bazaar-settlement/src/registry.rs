//! # Offer and Resolver Registry
//!
//! The engine does not own offers. It reads their immutable terms at commit
//! time and asks the registry to take one unit off the shelf. Dispute
//! resolvers and their fee schedules are looked up on escalation.

use std::collections::HashMap;

use bazaar_core::{Address, AssetId, OfferId, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One sellable offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Offer id.
    pub id: OfferId,
    /// Offer owner.
    pub seller: Address,
    /// Price the buyer pays on commit.
    pub price: u128,
    /// Amount the seller puts at stake per exchange.
    pub seller_deposit: u128,
    /// Part of the price the buyer forfeits on cancel or expiry.
    pub buyer_cancel_penalty: u128,
    /// Asset of price, deposit and penalty.
    pub asset: AssetId,
    /// Units left.
    pub quantity_available: u64,
    /// Resolver for escalated disputes, if any.
    pub dispute_resolver: Option<Address>,
    /// Start of the commit window.
    pub valid_from: Timestamp,
    /// End of the commit window.
    pub valid_until: Timestamp,
    /// First instant a voucher can be redeemed.
    pub voucher_redeemable_from: Timestamp,
    /// Fixed last instant a voucher can be redeemed.
    pub voucher_redeemable_until: Option<Timestamp>,
    /// Voucher lifetime in seconds, used when no fixed end is set.
    pub voucher_valid_duration: u64,
    /// Seconds after redemption in which the buyer may dispute.
    pub dispute_period: u64,
    /// Seconds the parties get to resolve a raised dispute.
    pub resolution_period: u64,
    /// Whether the seller withdrew the offer.
    pub voided: bool,
}

impl Offer {
    /// Whether commits are accepted at `now`.
    pub fn is_available_at(&self, now: Timestamp) -> bool {
        self.valid_from <= now && now <= self.valid_until
    }

    /// End of the voucher window for a commit made at `committed`.
    pub fn voucher_valid_until(&self, committed: Timestamp) -> Timestamp {
        match self.voucher_redeemable_until {
            Some(fixed) => fixed,
            None => self
                .voucher_redeemable_from
                .max(committed)
                .plus_seconds(self.voucher_valid_duration),
        }
    }
}

/// Fee a resolver charges in one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolverFee {
    /// Asset.
    pub asset: AssetId,
    /// Fee amount.
    pub amount: u128,
}

/// A neutral third party that rules on escalated disputes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolver {
    /// Resolver identity.
    pub address: Address,
    /// Seconds the resolver has to respond once escalated.
    pub escalation_response_period: u64,
    /// Fee schedule.
    pub fees: Vec<DisputeResolverFee>,
    /// Whether the resolver takes new escalations.
    pub active: bool,
}

impl DisputeResolver {
    /// The fee in `asset`, if the resolver accepts it.
    pub fn fee_for(&self, asset: &AssetId) -> Option<u128> {
        self.fees
            .iter()
            .find(|fee| fee.asset == *asset)
            .map(|fee| fee.amount)
    }
}

/// Errors raised by a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Unknown offer.
    #[error("unknown offer {0}")]
    UnknownOffer(OfferId),
    /// No units left.
    #[error("{0} is sold out")]
    SoldOut(OfferId),
}

/// Read access to offers and resolvers, plus unit reservation.
pub trait OfferRegistry: Send + Sync {
    /// The offer with `id`.
    fn offer(&self, id: OfferId) -> Option<Offer>;

    /// The resolver registered at `address`.
    fn dispute_resolver(&self, address: &Address) -> Option<DisputeResolver>;

    /// Take one unit of the offer.
    fn reserve_unit(&self, id: OfferId) -> Result<(), RegistryError>;
}

/// A registry held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    offers: RwLock<HashMap<OfferId, Offer>>,
    resolvers: RwLock<HashMap<Address, DisputeResolver>>,
}

impl InMemoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an offer.
    pub fn add_offer(&self, offer: Offer) {
        self.offers.write().insert(offer.id, offer);
    }

    /// Insert or replace a resolver.
    pub fn add_resolver(&self, resolver: DisputeResolver) {
        self.resolvers.write().insert(resolver.address, resolver);
    }

    /// Mark an offer voided. Returns whether it existed.
    pub fn void_offer(&self, id: OfferId) -> bool {
        match self.offers.write().get_mut(&id) {
            Some(offer) => {
                offer.voided = true;
                true
            }
            None => false,
        }
    }

    /// Activate or deactivate a resolver. Returns whether it existed.
    pub fn set_resolver_active(&self, address: &Address, active: bool) -> bool {
        match self.resolvers.write().get_mut(address) {
            Some(resolver) => {
                resolver.active = active;
                true
            }
            None => false,
        }
    }
}

impl OfferRegistry for InMemoryRegistry {
    fn offer(&self, id: OfferId) -> Option<Offer> {
        self.offers.read().get(&id).cloned()
    }

    fn dispute_resolver(&self, address: &Address) -> Option<DisputeResolver> {
        self.resolvers.read().get(address).cloned()
    }

    fn reserve_unit(&self, id: OfferId) -> Result<(), RegistryError> {
        let mut offers = self.offers.write();
        let offer = offers.get_mut(&id).ok_or(RegistryError::UnknownOffer(id))?;
        offer.quantity_available = offer
            .quantity_available
            .checked_sub(1)
            .ok_or(RegistryError::SoldOut(id))?;
        Ok(())
    }
}
