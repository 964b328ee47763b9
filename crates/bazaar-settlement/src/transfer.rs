//! # Token Transfer Adapter
//!
//! Value enters the engine's custody through [`TokenTransfer::pull`] and
//! leaves through [`TokenTransfer::push`]. The ledger records who is owed
//! what; the adapter is the only thing that moves real value.

use std::collections::{HashMap, HashSet};

use bazaar_core::{Address, AssetId};
use parking_lot::Mutex;

/// Errors an adapter can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The wallet does not hold enough of the asset.
    #[error("{owner} holds {available} {asset}, needs {needed}")]
    InsufficientBalance {
        /// Wallet owner.
        owner: Address,
        /// Asset.
        asset: AssetId,
        /// Requested amount.
        needed: u128,
        /// Held amount.
        available: u128,
    },
    /// The transfer was refused.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Moves value between external wallets and the engine's custody.
pub trait TokenTransfer: Send + Sync {
    /// Move `amount` of `asset` from `from`'s wallet into custody.
    fn pull(&self, from: &Address, asset: &AssetId, amount: u128) -> Result<(), TransferError>;

    /// Move `amount` of `asset` from custody to `to`'s wallet.
    fn push(&self, to: &Address, asset: &AssetId, amount: u128) -> Result<(), TransferError>;
}

#[derive(Debug, Default)]
struct Bank {
    wallets: HashMap<(Address, AssetId), u128>,
    custody: HashMap<AssetId, u128>,
    frozen: HashSet<Address>,
}

/// A token bank held in memory, with a freeze switch for failure testing.
#[derive(Debug, Default)]
pub struct InMemoryTokenBank {
    inner: Mutex<Bank>,
}

impl InMemoryTokenBank {
    /// An empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a wallet out of thin air.
    pub fn mint(&self, owner: Address, asset: AssetId, amount: u128) {
        let mut bank = self.inner.lock();
        let entry = bank.wallets.entry((owner, asset)).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Wallet balance.
    pub fn balance_of(&self, owner: &Address, asset: &AssetId) -> u128 {
        self.inner
            .lock()
            .wallets
            .get(&(*owner, *asset))
            .copied()
            .unwrap_or(0)
    }

    /// Value held in custody for the engine.
    pub fn custody_balance(&self, asset: &AssetId) -> u128 {
        self.inner.lock().custody.get(asset).copied().unwrap_or(0)
    }

    /// Refuse every transfer to or from `owner` until unfrozen.
    pub fn freeze(&self, owner: Address) {
        self.inner.lock().frozen.insert(owner);
    }

    /// Lift a freeze.
    pub fn unfreeze(&self, owner: &Address) {
        self.inner.lock().frozen.remove(owner);
    }
}

impl TokenTransfer for InMemoryTokenBank {
    fn pull(&self, from: &Address, asset: &AssetId, amount: u128) -> Result<(), TransferError> {
        let mut bank = self.inner.lock();
        if bank.frozen.contains(from) {
            return Err(TransferError::Rejected(format!("wallet {from} is frozen")));
        }
        let available = bank.wallets.get(&(*from, *asset)).copied().unwrap_or(0);
        let remaining = available
            .checked_sub(amount)
            .ok_or(TransferError::InsufficientBalance {
                owner: *from,
                asset: *asset,
                needed: amount,
                available,
            })?;
        let held = bank.custody.get(asset).copied().unwrap_or(0);
        let held = held
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected("custody overflow".to_string()))?;
        bank.wallets.insert((*from, *asset), remaining);
        bank.custody.insert(*asset, held);
        Ok(())
    }

    fn push(&self, to: &Address, asset: &AssetId, amount: u128) -> Result<(), TransferError> {
        let mut bank = self.inner.lock();
        if bank.frozen.contains(to) {
            return Err(TransferError::Rejected(format!("wallet {to} is frozen")));
        }
        let held = bank.custody.get(asset).copied().unwrap_or(0);
        let held = held
            .checked_sub(amount)
            .ok_or_else(|| TransferError::Rejected("custody underflow".to_string()))?;
        let wallet = bank.wallets.get(&(*to, *asset)).copied().unwrap_or(0);
        let wallet = wallet
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected("wallet overflow".to_string()))?;
        bank.custody.insert(*asset, held);
        bank.wallets.insert((*to, *asset), wallet);
        Ok(())
    }
}
