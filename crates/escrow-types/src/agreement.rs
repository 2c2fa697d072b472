//! Agreement types
//!
//! An agreement is the only mutable entity in the engine. Its parties, amount
//! and asset are fixed at creation; `state` advances only along the
//! [`Operation`] table, and the bookkeeping fields change together with it.

use crate::{AgreementId, Amount, AssetId, EscrowError, PartyId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of an agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgreementState {
    /// Terms recorded, nothing escrowed yet
    Created,
    /// Funds are held in escrow custody
    Paid,
    /// Seller has attested delivery; awaiting buyer release
    Delivered,
    /// A party contested the exchange; awaiting arbitration
    Disputed,
    /// Funds disbursed; terminal
    Resolved,
}

impl AgreementState {
    /// Ordinal used by the on-chain contract this engine replaces
    pub fn code(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Paid => 1,
            Self::Delivered => 2,
            Self::Disputed => 3,
            Self::Resolved => 4,
        }
    }

    /// Whether some operation moves an agreement from `self` to `next`
    pub fn can_transition_to(&self, next: AgreementState) -> bool {
        Operation::ALL
            .iter()
            .any(|op| op.from_state() == *self && op.to_state() == next)
    }

    /// A state with no outgoing operation
    pub fn is_terminal(&self) -> bool {
        !Operation::ALL.iter().any(|op| op.from_state() == *self)
    }

    /// Whether the agreement's amount currently sits in escrow custody
    pub fn holds_funds(&self) -> bool {
        matches!(self, Self::Paid | Self::Delivered | Self::Disputed)
    }
}

impl fmt::Display for AgreementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Paid => "Paid",
            Self::Delivered => "Delivered",
            Self::Disputed => "Disputed",
            Self::Resolved => "Resolved",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Roles and Operations
// ============================================================================

/// Role a caller must hold on an agreement to perform an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Buyer,
    Seller,
    Arbitrator,
    /// Either party to the exchange
    BuyerOrSeller,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Arbitrator => "arbitrator",
            Self::BuyerOrSeller => "buyer or seller",
        };
        f.write_str(name)
    }
}

/// A role-gated state-changing operation
///
/// This table is the whole transition graph: each operation has exactly one
/// source state, one target state and one required role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Pay,
    DeliverItem,
    ReleasePayment,
    RaiseDispute,
    ResolveDispute,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Pay,
        Operation::DeliverItem,
        Operation::ReleasePayment,
        Operation::RaiseDispute,
        Operation::ResolveDispute,
    ];

    pub fn required_role(&self) -> Role {
        match self {
            Self::Pay => Role::Buyer,
            Self::DeliverItem => Role::Seller,
            Self::ReleasePayment => Role::Buyer,
            Self::RaiseDispute => Role::BuyerOrSeller,
            Self::ResolveDispute => Role::Arbitrator,
        }
    }

    pub fn from_state(&self) -> AgreementState {
        match self {
            Self::Pay => AgreementState::Created,
            Self::DeliverItem => AgreementState::Paid,
            Self::ReleasePayment => AgreementState::Delivered,
            Self::RaiseDispute => AgreementState::Paid,
            Self::ResolveDispute => AgreementState::Disputed,
        }
    }

    pub fn to_state(&self) -> AgreementState {
        match self {
            Self::Pay => AgreementState::Paid,
            Self::DeliverItem => AgreementState::Delivered,
            Self::ReleasePayment => AgreementState::Resolved,
            Self::RaiseDispute => AgreementState::Disputed,
            Self::ResolveDispute => AgreementState::Resolved,
        }
    }

    /// Whether the operation invokes the asset ledger
    pub fn moves_funds(&self) -> bool {
        matches!(self, Self::Pay | Self::ReleasePayment | Self::ResolveDispute)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pay => "pay",
            Self::DeliverItem => "deliver_item",
            Self::ReleasePayment => "release_payment",
            Self::RaiseDispute => "raise_dispute",
            Self::ResolveDispute => "resolve_dispute",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Agreement
// ============================================================================

/// Terms supplied when creating an agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgreement {
    pub buyer: PartyId,
    pub seller: PartyId,
    pub arbitrator: PartyId,
    pub amount: Amount,
    pub asset: AssetId,
}

impl NewAgreement {
    /// Reject zero amounts and overlapping principals
    pub fn validate(&self) -> Result<()> {
        if self.amount.is_zero() {
            return Err(EscrowError::InvalidArgument {
                message: "Amount must be greater than zero".to_string(),
            });
        }
        if self.buyer == self.seller
            || self.buyer == self.arbitrator
            || self.seller == self.arbitrator
        {
            return Err(EscrowError::InvalidArgument {
                message: "Buyer, seller and arbitrator must be distinct".to_string(),
            });
        }
        Ok(())
    }
}

/// One escrow transaction between a buyer and seller, arbitrated by a third party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    pub id: AgreementId,
    pub buyer: PartyId,
    pub seller: PartyId,
    pub arbitrator: PartyId,
    pub amount: Amount,
    pub asset: AssetId,
    pub state: AgreementState,
    /// Disbursement target, set on the transition into `Resolved`
    pub resolved_to: Option<PartyId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agreement {
    /// Build a `Created` agreement from validated terms
    pub fn new(id: AgreementId, terms: NewAgreement) -> Self {
        let now = Utc::now();
        Self {
            id,
            buyer: terms.buyer,
            seller: terms.seller,
            arbitrator: terms.arbitrator,
            amount: terms.amount,
            asset: terms.asset,
            state: AgreementState::Created,
            resolved_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The immutable terms this agreement was created with
    pub fn terms(&self) -> NewAgreement {
        NewAgreement {
            buyer: self.buyer.clone(),
            seller: self.seller.clone(),
            arbitrator: self.arbitrator.clone(),
            amount: self.amount,
            asset: self.asset.clone(),
        }
    }

    /// The party the escrowed amount was released to, once resolved
    pub fn winner(&self) -> Option<&PartyId> {
        self.resolved_to.as_ref()
    }

    /// The single party holding `role`. `BuyerOrSeller` names no one party.
    pub fn party(&self, role: Role) -> Option<&PartyId> {
        match role {
            Role::Buyer => Some(&self.buyer),
            Role::Seller => Some(&self.seller),
            Role::Arbitrator => Some(&self.arbitrator),
            Role::BuyerOrSeller => None,
        }
    }

    /// Whether `party` holds any role on this agreement
    pub fn involves(&self, party: &PartyId) -> bool {
        &self.buyer == party || &self.seller == party || &self.arbitrator == party
    }

    /// Apply `op` to this record.
    ///
    /// Fails with `InvalidState` and leaves the record untouched unless the
    /// current state is the operation's source state. `resolved_to` is only
    /// recorded when the operation lands in a terminal state.
    pub fn advance(&mut self, op: Operation, resolved_to: Option<PartyId>) -> Result<()> {
        if self.state != op.from_state() {
            return Err(EscrowError::InvalidState {
                agreement_id: self.id,
                operation: op,
                current: self.state,
            });
        }

        let next = op.to_state();
        if next.is_terminal() {
            self.resolved_to = resolved_to;
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
