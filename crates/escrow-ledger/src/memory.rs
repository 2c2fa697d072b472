//! In-memory reference ledger
//!
//! - Account-keyed by PartyId, balances per AssetId
//! - Double-entry: every debit has a matching credit
//! - Append-only entries
//! - Allowance-gated pulls into custody
//!
//! # Invariants
//!
//! 1. No negative balances
//! 2. Every entry has a reason
//! 3. A transfer writes both legs or neither

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow_types::{Amount, AssetId, PartyId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{AssetLedger, LedgerError, Result, TransferReceipt};

/// Default name of the escrow custody account
pub const DEFAULT_CUSTODY_ACCOUNT: &str = "escrow";

/// Unique identifier for a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn new() -> Self {
        Self(format!("entry_{}", Uuid::new_v4()))
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

/// Type of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Credit (increase) to an account
    Credit,
    /// Debit (decrease) from an account
    Debit,
}

/// Reason for a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryReason {
    /// Supply created outside the escrow flow
    Mint,
    /// Buyer funds pulled into custody
    EscrowLock,
    /// Custody funds paid out to a recipient
    EscrowRelease,
}

/// A single ledger entry (one side of a double-entry)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub account: PartyId,
    pub asset: AssetId,
    pub entry_type: EntryType,
    pub amount: Amount,
    pub balance_after: Amount,
    pub reason: EntryReason,
    pub created_at: DateTime<Utc>,
}

/// Account state in the ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountState {
    pub balances: HashMap<AssetId, Amount>,
    pub entry_count: u64,
}

impl AccountState {
    pub fn balance(&self, asset: &AssetId) -> Amount {
        self.balances.get(asset).copied().unwrap_or(Amount::zero())
    }
}

#[derive(Default)]
struct LedgerBook {
    accounts: HashMap<PartyId, AccountState>,
    /// (owner, asset) -> amount the custody account may pull
    allowances: HashMap<(PartyId, AssetId), Amount>,
    entries: Vec<LedgerEntry>,
}

impl LedgerBook {
    fn balance(&self, account: &PartyId, asset: &AssetId) -> Amount {
        self.accounts
            .get(account)
            .map(|a| a.balance(asset))
            .unwrap_or(Amount::zero())
    }

    fn post(
        &mut self,
        account: &PartyId,
        asset: &AssetId,
        entry_type: EntryType,
        amount: Amount,
        balance_after: Amount,
        reason: EntryReason,
    ) -> EntryId {
        let state = self.accounts.entry(account.clone()).or_default();
        state.balances.insert(asset.clone(), balance_after);
        state.entry_count += 1;

        let entry_id = EntryId::new();
        self.entries.push(LedgerEntry {
            entry_id: entry_id.clone(),
            account: account.clone(),
            asset: asset.clone(),
            entry_type,
            amount,
            balance_after,
            reason,
            created_at: Utc::now(),
        });
        entry_id
    }

    /// Move `amount` between accounts. Every check runs before the first
    /// write, so a rejected move leaves the book untouched.
    fn move_funds(
        &mut self,
        from: &PartyId,
        to: &PartyId,
        asset: &AssetId,
        amount: Amount,
        reason: EntryReason,
    ) -> Result<TransferReceipt> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount {
                message: "Amount must be greater than zero".to_string(),
            });
        }

        if from == to {
            return Err(LedgerError::SelfTransfer {
                account: from.to_string(),
            });
        }

        let from_balance = self.balance(from, asset);
        let from_after =
            from_balance
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::InsufficientBalance {
                    account: from.to_string(),
                    available: from_balance,
                    required: amount,
                })?;

        let to_balance = self.balance(to, asset);
        let to_after = to_balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::InvalidAmount {
                message: "Balance overflow".to_string(),
            })?;

        let debit_entry = self.post(from, asset, EntryType::Debit, amount, from_after, reason.clone());
        let credit_entry = self.post(to, asset, EntryType::Credit, amount, to_after, reason);

        Ok(TransferReceipt {
            from: from.clone(),
            to: to.clone(),
            asset: asset.clone(),
            amount,
            debit_entry,
            credit_entry,
        })
    }
}

/// Thread-safe in-memory ledger with a single escrow custody account
#[derive(Clone)]
pub struct InMemoryLedger {
    custody: PartyId,
    book: Arc<RwLock<LedgerBook>>,
}

impl InMemoryLedger {
    /// Create an empty ledger using the default custody account
    pub fn new() -> Self {
        Self::with_custody_account(PartyId::from(DEFAULT_CUSTODY_ACCOUNT))
    }

    /// Create an empty ledger with a named custody account
    pub fn with_custody_account(custody: PartyId) -> Self {
        Self {
            custody,
            book: Arc::new(RwLock::new(LedgerBook::default())),
        }
    }

    /// The account that holds escrowed funds
    pub fn custody_account(&self) -> &PartyId {
        &self.custody
    }

    /// Credit new supply to an account
    pub async fn mint(&self, to: &PartyId, asset: &AssetId, amount: Amount) -> Result<Amount> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount {
                message: "Amount must be greater than zero".to_string(),
            });
        }

        let mut book = self.book.write().await;
        let new_balance = book
            .balance(to, asset)
            .checked_add(amount)
            .ok_or_else(|| LedgerError::InvalidAmount {
                message: "Balance overflow".to_string(),
            })?;
        book.post(to, asset, EntryType::Credit, amount, new_balance, EntryReason::Mint);
        Ok(new_balance)
    }

    /// Set how much of `asset` the custody account may pull from `owner`.
    /// Replaces any previous approval.
    pub async fn approve(&self, owner: &PartyId, asset: &AssetId, amount: Amount) {
        let mut book = self.book.write().await;
        book.allowances
            .insert((owner.clone(), asset.clone()), amount);
    }

    pub async fn allowance(&self, owner: &PartyId, asset: &AssetId) -> Amount {
        let book = self.book.read().await;
        book.allowances
            .get(&(owner.clone(), asset.clone()))
            .copied()
            .unwrap_or(Amount::zero())
    }

    /// Get the balance of an account for a specific asset
    pub async fn balance(&self, account: &PartyId, asset: &AssetId) -> Amount {
        self.book.read().await.balance(account, asset)
    }

    /// Total of `asset` currently held in escrow custody
    pub async fn custody_balance(&self, asset: &AssetId) -> Amount {
        self.balance(&self.custody, asset).await
    }

    /// Get account state
    pub async fn account_state(&self, account: &PartyId) -> Option<AccountState> {
        self.book.read().await.accounts.get(account).cloned()
    }

    /// All entries, oldest first
    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.book.read().await.entries.clone()
    }

    /// Get all entries for an account
    pub async fn account_entries(&self, account: &PartyId) -> Vec<LedgerEntry> {
        let book = self.book.read().await;
        book.entries
            .iter()
            .filter(|e| &e.account == account)
            .cloned()
            .collect()
    }

    /// Get the total number of entries
    pub async fn entry_count(&self) -> usize {
        self.book.read().await.entries.len()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetLedger for InMemoryLedger {
    async fn transfer_from(
        &self,
        payer: &PartyId,
        amount: Amount,
        asset: &AssetId,
    ) -> Result<TransferReceipt> {
        let mut book = self.book.write().await;

        let key = (payer.clone(), asset.clone());
        let approved = book.allowances.get(&key).copied().unwrap_or(Amount::zero());
        let remaining =
            approved
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::InsufficientAllowance {
                    owner: payer.to_string(),
                    approved,
                    required: amount,
                })?;

        let receipt = book.move_funds(payer, &self.custody, asset, amount, EntryReason::EscrowLock)?;
        book.allowances.insert(key, remaining);

        debug!(payer = %payer, asset = %asset, amount = %amount, "Locked funds in custody");
        Ok(receipt)
    }

    async fn transfer_to(
        &self,
        recipient: &PartyId,
        amount: Amount,
        asset: &AssetId,
    ) -> Result<TransferReceipt> {
        let mut book = self.book.write().await;
        let custody = self.custody.clone();
        let receipt = book.move_funds(&custody, recipient, asset, amount, EntryReason::EscrowRelease)?;

        debug!(recipient = %recipient, asset = %asset, amount = %amount, "Released funds from custody");
        Ok(receipt)
    }
}
