//! Escrow Types - Canonical domain types for the escrow agreement engine
//!
//! This crate contains the foundational types shared by the ledger adapter and
//! the engine, with zero dependencies on other escrow crates:
//!
//! - Identity types (PartyId, AssetId, AgreementId)
//! - Amount type in smallest asset units
//! - Agreement record, state graph and role-gated operation table
//! - Notification events
//! - The error kinds reported to callers
//!
//! # Invariants
//!
//! 1. Buyer, seller and arbitrator are pairwise distinct; amount is positive
//! 2. State only advances along the operation table; `Resolved` is terminal
//! 3. One inbound transfer at `Paid`, one outbound transfer at `Resolved`
//! 4. Agreement identifiers are never reused
//!
//! # State Graph
//!
//! ```text
//! Created → Paid → Delivered → Resolved
//!             ↘ Disputed ↗
//! ```

pub mod identity;
pub mod amount;
pub mod agreement;
pub mod event;
pub mod error;

pub use identity::*;
pub use amount::*;
pub use agreement::*;
pub use event::*;
pub use error::*;

/// Version of the escrow types schema
pub const TYPES_VERSION: &str = "0.1.0";
