//! Notification events
//!
//! One event is emitted per successful transition, after the transition has
//! been committed. Events are observations; nothing reads them back.

use crate::{AgreementId, AgreementState, PartyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to an agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Paid,
    Delivered,
    Disputed,
    Resolved,
}

impl From<AgreementState> for EventKind {
    fn from(state: AgreementState) -> Self {
        match state {
            AgreementState::Created => Self::Created,
            AgreementState::Paid => Self::Paid,
            AgreementState::Delivered => Self::Delivered,
            AgreementState::Disputed => Self::Disputed,
            AgreementState::Resolved => Self::Resolved,
        }
    }
}

/// Structured record of a committed transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementEvent {
    pub agreement_id: AgreementId,
    pub kind: EventKind,
    /// Disbursement target; present only on `Resolved`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_target: Option<PartyId>,
    pub timestamp: DateTime<Utc>,
}

impl AgreementEvent {
    pub fn new(agreement_id: AgreementId, kind: EventKind) -> Self {
        Self {
            agreement_id,
            kind,
            resolution_target: None,
            timestamp: Utc::now(),
        }
    }

    pub fn resolved(agreement_id: AgreementId, target: PartyId) -> Self {
        Self {
            resolution_target: Some(target),
            ..Self::new(agreement_id, EventKind::Resolved)
        }
    }
}
