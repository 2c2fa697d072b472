//! Escrow Engine - Role-gated agreement state machine
//!
//! Holds a buyer's value in escrow custody until delivery is confirmed or a
//! dispute is arbitrated, then releases it exactly once to the right party.
//!
//! # Call Flow
//!
//! ```text
//! caller → RoleGate → state precondition → AssetLedger → AgreementStore → EventNotifier
//! ```
//!
//! # Architectural Invariants
//!
//! 1. At most one state-changing operation in flight per agreement id
//! 2. A transfer is confirmed before its state change is committed
//! 3. A failed or timed-out transfer changes nothing
//! 4. Notifications follow commits and can never undo them
//! 5. No internal retries

pub mod allocator;
pub mod config;
pub mod engine;
pub mod gate;
pub mod notifier;
pub mod snapshot;
pub mod store;

pub use allocator::IdAllocator;
pub use config::EngineConfig;
pub use engine::EscrowEngine;
pub use gate::authorize;
pub use notifier::{
    BroadcastNotifier, EventNotifier, FanoutNotifier, NoopNotifier, RecordingNotifier,
    TracingNotifier,
};
pub use snapshot::EscrowSnapshot;
pub use store::AgreementStore;

pub use escrow_ledger::{
    AssetLedger, EntryReason, EntryType, InMemoryLedger, LedgerEntry, LedgerError, TransferReceipt,
};
pub use escrow_types::*;
