//! # Deposits and Withdrawals
//!
//! Deposits pull value through the token adapter and credit an available
//! balance. Withdrawals follow checks-effects-interactions: every balance
//! is validated and debited before the first external transfer, and a
//! failed transfer re-credits whatever was not sent yet.

use std::collections::BTreeMap;

use bazaar_core::{Address, AssetId};

use crate::error::SettlementError;
use crate::events::SettlementEvent;
use crate::session::Session;

impl Session<'_> {
    /// Pull `amount` of `asset` from `caller` and credit it to `owner`.
    pub(crate) fn deposit_funds(
        &mut self,
        caller: Address,
        owner: Address,
        asset: AssetId,
        amount: u128,
    ) -> Result<(), SettlementError> {
        if amount == 0 {
            return Err(SettlementError::ZeroAmount { operation: "deposit" });
        }
        if owner.is_zero() {
            return Err(SettlementError::ZeroAddress { role: "deposit owner" });
        }
        self.state
            .ledger
            .available(&owner, &asset)
            .checked_add(amount)
            .ok_or(SettlementError::ArithmeticOverflow("deposit"))?;

        self.pull(&caller, &asset, amount)?;
        if let Err(err) = self.state.ledger.credit(owner, asset, amount) {
            self.refund(&caller, &asset, amount);
            return Err(err);
        }
        tracing::info!(owner = %owner, asset = %asset, amount, "funds deposited");
        self.emit(SettlementEvent::FundsDeposited {
            owner,
            asset,
            amount,
            actor: caller,
        });
        Ok(())
    }

    /// Send `caller`'s available balances out. Empty lists withdraw every
    /// non-zero balance. Returns what was sent.
    pub(crate) fn withdraw_funds(
        &mut self,
        caller: Address,
        assets: &[AssetId],
        amounts: &[u128],
    ) -> Result<Vec<(AssetId, u128)>, SettlementError> {
        if assets.len() != amounts.len() {
            return Err(SettlementError::WithdrawalListMismatch {
                assets: assets.len(),
                amounts: amounts.len(),
            });
        }
        let requests: Vec<(AssetId, u128)> = if assets.is_empty() {
            self.state.ledger.balances_of(&caller)
        } else {
            assets.iter().copied().zip(amounts.iter().copied()).collect()
        };
        let max = self.ctx.config.max_tokens_per_withdrawal;
        if requests.len() > max {
            return Err(SettlementError::TooManyTokens {
                requested: requests.len(),
                max,
            });
        }
        if requests.iter().any(|(_, amount)| *amount == 0) {
            return Err(SettlementError::ZeroAmount { operation: "withdrawal" });
        }

        let mut totals: BTreeMap<AssetId, u128> = BTreeMap::new();
        for (asset, amount) in &requests {
            let total = totals.entry(*asset).or_insert(0);
            *total = total
                .checked_add(*amount)
                .ok_or(SettlementError::ArithmeticOverflow("withdrawal"))?;
        }
        for (asset, total) in &totals {
            let available = self.state.ledger.available(&caller, asset);
            if available < *total {
                return Err(SettlementError::InsufficientAvailableFunds {
                    owner: caller,
                    asset: *asset,
                    required: *total,
                    available,
                });
            }
        }

        for (asset, total) in &totals {
            self.state.ledger.debit(caller, *asset, *total)?;
        }
        for (index, (asset, amount)) in requests.iter().enumerate() {
            if let Err(err) = self.ctx.tokens.push(&caller, asset, *amount) {
                tracing::error!(
                    owner = %caller,
                    asset = %asset,
                    amount,
                    error = %err,
                    "withdrawal transfer failed"
                );
                for (unsent_asset, unsent) in &requests[index..] {
                    self.state.ledger.credit(caller, *unsent_asset, *unsent)?;
                }
                return Err(SettlementError::TransferFailed {
                    party: caller,
                    asset: *asset,
                    amount: *amount,
                    reason: err.to_string(),
                });
            }
            tracing::info!(owner = %caller, asset = %asset, amount, "funds withdrawn");
            self.outbox.stage_settled(SettlementEvent::FundsWithdrawn {
                owner: caller,
                asset: *asset,
                amount: *amount,
            });
        }
        Ok(requests)
    }
}
