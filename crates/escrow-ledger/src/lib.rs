//! Escrow Ledger - Asset ledger adapter for escrow custody
//!
//! The engine never touches balances directly. It asks an [`AssetLedger`] to
//! move an agreement's amount into escrow custody (`transfer_from`) and back
//! out to a recipient (`transfer_to`).
//!
//! # Adapter Contract
//!
//! 1. A call returns only once the movement is confirmed or rejected
//! 2. A rejected movement moves nothing (no partial transfers)
//! 3. The adapter never retries on the engine's behalf
//!
//! [`InMemoryLedger`] is the reference implementation: a double-entry,
//! append-only ledger with ERC-20 style allowances.

pub mod memory;

pub use memory::{AccountState, EntryId, EntryReason, EntryType, InMemoryLedger, LedgerEntry};

use async_trait::async_trait;
use escrow_types::{Amount, AssetId, EscrowError, PartyId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient balance for {account}: have {available}, need {required}")]
    InsufficientBalance {
        account: String,
        available: Amount,
        required: Amount,
    },

    #[error("Insufficient allowance from {owner}: approved {approved}, need {required}")]
    InsufficientAllowance {
        owner: String,
        approved: Amount,
        required: Amount,
    },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Account {account} cannot transfer to itself")]
    SelfTransfer { account: String },

    #[error("Transfer timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Ledger unavailable: {message}")]
    Unavailable { message: String },
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<LedgerError> for EscrowError {
    fn from(e: LedgerError) -> Self {
        EscrowError::TransferFailed {
            reason: e.to_string(),
        }
    }
}

/// Confirmation of a completed movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub from: PartyId,
    pub to: PartyId,
    pub asset: AssetId,
    pub amount: Amount,
    pub debit_entry: EntryId,
    pub credit_entry: EntryId,
}

/// Moves fungible value in and out of escrow custody
#[async_trait]
pub trait AssetLedger: Send + Sync {
    /// Pull `amount` of `asset` from `payer` into escrow custody
    async fn transfer_from(
        &self,
        payer: &PartyId,
        amount: Amount,
        asset: &AssetId,
    ) -> Result<TransferReceipt>;

    /// Pay `amount` of `asset` out of escrow custody to `recipient`
    async fn transfer_to(
        &self,
        recipient: &PartyId,
        amount: Amount,
        asset: &AssetId,
    ) -> Result<TransferReceipt>;
}
