//! Error types for the escrow engine
//!
//! Every failure is reported synchronously and leaves the agreement in its
//! prior state. None of these kinds is fatal to the engine.

use crate::{AgreementId, AgreementState, Operation, PartyId, Role};
use thiserror::Error;

/// Result type for escrow operations
pub type Result<T> = std::result::Result<T, EscrowError>;

/// Escrow error kinds
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    /// Unknown agreement identifier
    #[error("Agreement {agreement_id} not found")]
    NotFound { agreement_id: AgreementId },

    /// Caller does not hold the role the operation requires
    #[error("Caller {caller} is not authorized: requires {required}")]
    Unauthorized { caller: PartyId, required: Role },

    /// Operation is not legal from the agreement's current state
    #[error("Cannot {operation} agreement {agreement_id} in state {current}")]
    InvalidState {
        agreement_id: AgreementId,
        operation: Operation,
        current: AgreementState,
    },

    /// The asset ledger rejected or did not confirm the movement
    #[error("Asset transfer failed: {reason}")]
    TransferFailed { reason: String },

    /// Malformed request (zero amount, non-distinct principals, bad snapshot)
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl EscrowError {
    /// Whether the same call may succeed later once the cause is fixed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransferFailed { .. })
    }
}

impl From<serde_json::Error> for EscrowError {
    fn from(e: serde_json::Error) -> Self {
        EscrowError::InvalidArgument {
            message: e.to_string(),
        }
    }
}
