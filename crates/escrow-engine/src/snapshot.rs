//! Engine snapshots
//!
//! The persisted layout is just the agreement map plus the identifier
//! counter. Snapshots serialize to JSON.

use std::collections::HashSet;

use escrow_types::{Agreement, Amount, AssetId, EscrowError, Result};
use serde::{Deserialize, Serialize};

/// Persisted engine state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowSnapshot {
    /// Next identifier the allocator will hand out
    pub next_id: u64,
    /// Every agreement, ordered by id
    pub agreements: Vec<Agreement>,
}

impl EscrowSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Reject snapshots that would let an identifier be reissued or that
    /// hold records violating the agreement invariants
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for agreement in &self.agreements {
            if agreement.id.value() >= self.next_id {
                return Err(EscrowError::InvalidArgument {
                    message: format!(
                        "Agreement {} is not below the snapshot counter {}",
                        agreement.id, self.next_id
                    ),
                });
            }
            if !seen.insert(agreement.id) {
                return Err(EscrowError::InvalidArgument {
                    message: format!("Agreement {} appears twice", agreement.id),
                });
            }
            agreement.terms().validate()?;
            check_resolution(agreement)?;
        }
        Ok(())
    }

    /// Total that records say sits in custody for `asset`. Matches the
    /// ledger's custody balance when every escrowed amount came through
    /// this engine.
    pub fn escrowed(&self, asset: &AssetId) -> Amount {
        self.agreements
            .iter()
            .filter(|a| &a.asset == asset && a.state.holds_funds())
            .fold(Amount::zero(), |total, a| {
                total.checked_add(a.amount).unwrap_or(total)
            })
    }
}

/// `resolved_to` is set exactly when the record is terminal, and names the
/// buyer or the seller.
fn check_resolution(agreement: &Agreement) -> Result<()> {
    let consistent = match (&agreement.resolved_to, agreement.state.is_terminal()) {
        (Some(winner), true) => winner == &agreement.buyer || winner == &agreement.seller,
        (None, false) => true,
        _ => false,
    };
    if consistent {
        return Ok(());
    }
    Err(EscrowError::InvalidArgument {
        message: format!(
            "Agreement {} in state {} has inconsistent resolution target",
            agreement.id, agreement.state
        ),
    })
}
