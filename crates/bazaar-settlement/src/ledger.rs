//! # Funds Ledger
//!
//! Two books:
//!
//! - **Available balances** per `(owner, asset)`. Deposits and escrow
//!   releases credit them; withdrawals and seller deposits debit them.
//! - **Escrow accounts**, one per exchange, holding the price, the seller's
//!   deposit and any escalation deposit until the exchange finalizes.
//!
//! ## Conservation
//!
//! An escrow account is released exactly once, and the payoffs must add up
//! to exactly what it holds. Both [`FundsLedger::encumber`] and
//! [`FundsLedger::release`] validate every input before mutating anything,
//! so a rejected call leaves both books untouched.

use std::collections::BTreeMap;

use bazaar_core::{Address, AssetId, ExchangeId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::SettlementError;

// ── Escrow Status ──────────────────────────────────────────────────────

/// The status of an escrow account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// Holding funds.
    Funded,
    /// Paid out. Terminal.
    Released,
}

impl EscrowStatus {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Funded => "FUNDED",
            Self::Released => "RELEASED",
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Escrow Transaction ─────────────────────────────────────────────────

/// Types of escrow transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowTransactionType {
    /// Value placed into escrow.
    Encumber,
    /// Value paid out of escrow.
    Release,
}

/// A recorded escrow transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowTransaction {
    /// Transaction type.
    pub transaction_type: EscrowTransactionType,
    /// Party that funded or received the amount.
    pub party: Address,
    /// Amount moved.
    pub amount: u128,
    /// When.
    pub timestamp: Timestamp,
}

// ── Escrow Account ─────────────────────────────────────────────────────

/// The funds held for one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAccount {
    /// The exchange this escrow backs.
    pub exchange_id: ExchangeId,
    /// Asset held.
    pub asset: AssetId,
    /// Amount currently held.
    pub held: u128,
    /// Everything ever encumbered.
    pub encumbered_total: u128,
    /// Everything ever released.
    pub released_total: u128,
    /// Current status.
    pub status: EscrowStatus,
    /// Transaction history.
    pub transactions: Vec<EscrowTransaction>,
}

// ── Inputs ─────────────────────────────────────────────────────────────

/// Where encumbered value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundsSource {
    /// Debited from the party's available balance.
    Ledger,
    /// Already pulled into custody through the token adapter.
    External,
}

/// One contribution to an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encumbrance {
    /// Contributing party.
    pub party: Address,
    /// Amount.
    pub amount: u128,
    /// Origin of the value.
    pub source: FundsSource,
}

impl Encumbrance {
    /// Value debited from `party`'s available balance.
    pub fn from_ledger(party: Address, amount: u128) -> Self {
        Self {
            party,
            amount,
            source: FundsSource::Ledger,
        }
    }

    /// Value already pulled from `party`'s wallet.
    pub fn external(party: Address, amount: u128) -> Self {
        Self {
            party,
            amount,
            source: FundsSource::External,
        }
    }
}

/// One credit paid out of an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payoff {
    /// Recipient.
    pub recipient: Address,
    /// Amount.
    pub amount: u128,
}

// ── Ledger ─────────────────────────────────────────────────────────────

/// Available balances and escrow accounts.
#[derive(Debug, Clone, Default)]
pub struct FundsLedger {
    balances: BTreeMap<(Address, AssetId), u128>,
    escrows: BTreeMap<ExchangeId, EscrowAccount>,
}

impl FundsLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Available balance of `owner` in `asset`.
    pub fn available(&self, owner: &Address, asset: &AssetId) -> u128 {
        self.balances.get(&(*owner, *asset)).copied().unwrap_or(0)
    }

    /// Every non-zero balance of `owner`, ordered by asset.
    pub fn balances_of(&self, owner: &Address) -> Vec<(AssetId, u128)> {
        self.balances
            .iter()
            .filter(|((holder, _), amount)| holder == owner && **amount > 0)
            .map(|((_, asset), amount)| (*asset, *amount))
            .collect()
    }

    /// Sum of available balances in `asset`.
    pub fn total_available(&self, asset: &AssetId) -> u128 {
        self.balances
            .iter()
            .filter(|((_, a), _)| a == asset)
            .fold(0u128, |acc, (_, amount)| acc.saturating_add(*amount))
    }

    /// Sum of funded escrow in `asset`.
    pub fn total_escrowed(&self, asset: &AssetId) -> u128 {
        self.escrows
            .values()
            .filter(|escrow| escrow.asset == *asset)
            .fold(0u128, |acc, escrow| acc.saturating_add(escrow.held))
    }

    /// The escrow account of an exchange.
    pub fn escrow(&self, exchange_id: &ExchangeId) -> Option<&EscrowAccount> {
        self.escrows.get(exchange_id)
    }

    /// Add to an available balance.
    pub fn credit(
        &mut self,
        owner: Address,
        asset: AssetId,
        amount: u128,
    ) -> Result<(), SettlementError> {
        let balance = self.balances.entry((owner, asset)).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(SettlementError::ArithmeticOverflow("ledger credit"))?;
        Ok(())
    }

    /// Take from an available balance.
    pub fn debit(
        &mut self,
        owner: Address,
        asset: AssetId,
        amount: u128,
    ) -> Result<(), SettlementError> {
        let available = self.available(&owner, &asset);
        let remaining = available
            .checked_sub(amount)
            .ok_or(SettlementError::InsufficientAvailableFunds {
                owner,
                asset,
                required: amount,
                available,
            })?;
        self.balances.insert((owner, asset), remaining);
        Ok(())
    }

    /// Place value into the escrow of `exchange_id`, opening it if needed.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::InsufficientAvailableFunds`] if a ledger-sourced
    ///   party cannot cover its total contribution.
    /// - [`SettlementError::EscrowReleased`] if the escrow was paid out.
    /// - [`SettlementError::EscrowAssetMismatch`] if `asset` differs from the
    ///   escrow's asset.
    pub fn encumber(
        &mut self,
        exchange_id: ExchangeId,
        asset: AssetId,
        sources: &[Encumbrance],
        at: Timestamp,
    ) -> Result<u128, SettlementError> {
        if let Some(escrow) = self.escrows.get(&exchange_id) {
            if escrow.status == EscrowStatus::Released {
                return Err(SettlementError::EscrowReleased(exchange_id));
            }
            if escrow.asset != asset {
                return Err(SettlementError::EscrowAssetMismatch {
                    exchange_id,
                    expected: escrow.asset,
                    found: asset,
                });
            }
        }

        let mut debits: BTreeMap<Address, u128> = BTreeMap::new();
        let mut total = 0u128;
        for source in sources {
            total = total
                .checked_add(source.amount)
                .ok_or(SettlementError::ArithmeticOverflow("escrow encumbrance"))?;
            if source.source == FundsSource::Ledger {
                let due = debits.entry(source.party).or_insert(0);
                *due = due
                    .checked_add(source.amount)
                    .ok_or(SettlementError::ArithmeticOverflow("escrow encumbrance"))?;
            }
        }
        for (party, due) in &debits {
            let available = self.available(party, &asset);
            if available < *due {
                return Err(SettlementError::InsufficientAvailableFunds {
                    owner: *party,
                    asset,
                    required: *due,
                    available,
                });
            }
        }
        let current = self.escrows.get(&exchange_id).map_or(0, |e| e.held);
        let held = current
            .checked_add(total)
            .ok_or(SettlementError::ArithmeticOverflow("escrow balance"))?;

        for (party, due) in debits {
            self.debit(party, asset, due)?;
        }
        let escrow = self
            .escrows
            .entry(exchange_id)
            .or_insert_with(|| EscrowAccount {
                exchange_id,
                asset,
                held: 0,
                encumbered_total: 0,
                released_total: 0,
                status: EscrowStatus::Funded,
                transactions: Vec::new(),
            });
        escrow.held = held;
        escrow.encumbered_total = escrow.encumbered_total.saturating_add(total);
        for source in sources.iter().filter(|s| s.amount > 0) {
            escrow.transactions.push(EscrowTransaction {
                transaction_type: EscrowTransactionType::Encumber,
                party: source.party,
                amount: source.amount,
                timestamp: at,
            });
        }
        Ok(total)
    }

    /// Pay out the whole escrow of `exchange_id` to the ledger balances in
    /// `payoffs`.
    ///
    /// # Errors
    ///
    /// Nothing is mutated on error.
    ///
    /// - [`SettlementError::NoSuchEscrow`] / [`SettlementError::EscrowReleased`].
    /// - [`SettlementError::ZeroAddress`] for a non-zero payoff to the zero
    ///   address.
    /// - [`SettlementError::ConservationViolation`] when the payoffs do not
    ///   sum to the held amount.
    /// - [`SettlementError::ArithmeticOverflow`] if any credit would overflow.
    pub fn release(
        &mut self,
        exchange_id: ExchangeId,
        payoffs: &[Payoff],
        at: Timestamp,
    ) -> Result<(), SettlementError> {
        let escrow = self
            .escrows
            .get(&exchange_id)
            .ok_or(SettlementError::NoSuchEscrow(exchange_id))?;
        if escrow.status == EscrowStatus::Released {
            return Err(SettlementError::EscrowReleased(exchange_id));
        }
        let asset = escrow.asset;
        let held = escrow.held;

        let mut credits: BTreeMap<Address, u128> = BTreeMap::new();
        let mut payout = 0u128;
        for payoff in payoffs.iter().filter(|p| p.amount > 0) {
            if payoff.recipient.is_zero() {
                return Err(SettlementError::ZeroAddress {
                    role: "payout recipient",
                });
            }
            payout = payout
                .checked_add(payoff.amount)
                .ok_or(SettlementError::ArithmeticOverflow("escrow payout"))?;
            let credit = credits.entry(payoff.recipient).or_insert(0);
            *credit = credit
                .checked_add(payoff.amount)
                .ok_or(SettlementError::ArithmeticOverflow("escrow payout"))?;
        }
        if payout != held {
            return Err(SettlementError::ConservationViolation {
                exchange_id,
                held,
                payout,
            });
        }
        for (recipient, amount) in &credits {
            self.available(recipient, &asset)
                .checked_add(*amount)
                .ok_or(SettlementError::ArithmeticOverflow("ledger credit"))?;
        }

        for (recipient, amount) in credits {
            self.credit(recipient, asset, amount)?;
        }
        if let Some(escrow) = self.escrows.get_mut(&exchange_id) {
            escrow.held = 0;
            escrow.released_total = escrow.released_total.saturating_add(payout);
            escrow.status = EscrowStatus::Released;
            for payoff in payoffs.iter().filter(|p| p.amount > 0) {
                escrow.transactions.push(EscrowTransaction {
                    transaction_type: EscrowTransactionType::Release,
                    party: payoff.recipient,
                    amount: payoff.amount,
                    timestamp: at,
                });
            }
        }
        Ok(())
    }
}
