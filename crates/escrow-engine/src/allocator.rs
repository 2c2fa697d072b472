//! Agreement identifier allocation

use std::sync::atomic::{AtomicU64, Ordering};

use escrow_types::AgreementId;

/// Process-wide monotonic counter; `fetch_add` is the single writer.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter resuming after previously issued identifiers
    pub fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }

    /// Hand out the next unused identifier. Never blocks, never repeats.
    pub fn allocate(&self) -> AgreementId {
        AgreementId(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// The identifier the next `allocate` call will return
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}
