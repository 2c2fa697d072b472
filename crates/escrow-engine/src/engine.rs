//! Escrow state machine engine
//!
//! Every state-changing operation follows the same path:
//!
//! 1. Take the agreement's operation lock (NotFound if absent)
//! 2. Role gate (Unauthorized)
//! 3. Source-state precondition (InvalidState)
//! 4. Ledger transfer, if the operation moves funds (TransferFailed)
//! 5. Commit the new state and bookkeeping as one record
//! 6. Notify, best effort
//!
//! Steps 2-4 change nothing, so any failure leaves the agreement exactly as it
//! was and the same call can be made again later.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use escrow_ledger::{AssetLedger, InMemoryLedger, TransferReceipt};
use escrow_types::{
    Agreement, AgreementEvent, AgreementId, Amount, AssetId, EscrowError, EventKind, NewAgreement,
    Operation, PartyId, Result, Role,
};
use tracing::{info, warn};

use crate::allocator::IdAllocator;
use crate::config::EngineConfig;
use crate::gate::authorize;
use crate::notifier::{BroadcastNotifier, EventNotifier};
use crate::snapshot::EscrowSnapshot;
use crate::store::AgreementStore;

/// Reject terms naming the custody account as a principal. Funds paid out
/// to custody would never leave it.
fn ensure_not_custody(terms: &NewAgreement, custody: &str) -> Result<()> {
    let custody = PartyId::from(custody);
    if terms.buyer == custody || terms.seller == custody || terms.arbitrator == custody {
        return Err(EscrowError::InvalidArgument {
            message: format!("Escrow account {} cannot be a party to an agreement", custody),
        });
    }
    Ok(())
}

/// The escrow agreement engine
pub struct EscrowEngine {
    config: EngineConfig,
    allocator: IdAllocator,
    store: AgreementStore,
    ledger: Arc<dyn AssetLedger>,
    notifier: Arc<dyn EventNotifier>,
}

impl EscrowEngine {
    /// Create an engine with default configuration
    pub fn new(ledger: Arc<dyn AssetLedger>, notifier: Arc<dyn EventNotifier>) -> Self {
        Self::with_config(EngineConfig::default(), ledger, notifier)
    }

    pub fn with_config(
        config: EngineConfig,
        ledger: Arc<dyn AssetLedger>,
        notifier: Arc<dyn EventNotifier>,
    ) -> Self {
        Self {
            config,
            allocator: IdAllocator::new(),
            store: AgreementStore::new(),
            ledger,
            notifier,
        }
    }

    /// Engine wired to an in-memory ledger and a broadcast notifier built
    /// from `config`. Returns handles to both for funding and observation.
    pub fn in_memory(config: EngineConfig) -> (Self, InMemoryLedger, BroadcastNotifier) {
        let ledger =
            InMemoryLedger::with_custody_account(PartyId::from_string(config.escrow_account.clone()));
        let notifier = BroadcastNotifier::new(config.event_channel_capacity);
        let engine = Self::with_config(config, Arc::new(ledger.clone()), Arc::new(notifier.clone()));
        (engine, ledger, notifier)
    }

    /// Rebuild an engine from a snapshot. The identifier counter resumes
    /// where the snapshot left off.
    pub fn restore(
        snapshot: EscrowSnapshot,
        config: EngineConfig,
        ledger: Arc<dyn AssetLedger>,
        notifier: Arc<dyn EventNotifier>,
    ) -> Result<Self> {
        snapshot.validate()?;

        let store = AgreementStore::new();
        for agreement in snapshot.agreements {
            ensure_not_custody(&agreement.terms(), &config.escrow_account)?;
            store.insert(agreement)?;
        }

        info!(
            agreements = store.len(),
            next_id = snapshot.next_id,
            "Restored escrow engine from snapshot"
        );

        Ok(Self {
            config,
            allocator: IdAllocator::starting_at(snapshot.next_id),
            store,
            ledger,
            notifier,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Record a new agreement with `caller` as buyer. No funds move.
    pub fn create_agreement(
        &self,
        caller: &PartyId,
        seller: PartyId,
        arbitrator: PartyId,
        amount: Amount,
        asset: AssetId,
    ) -> Result<AgreementId> {
        let terms = NewAgreement {
            buyer: caller.clone(),
            seller,
            arbitrator,
            amount,
            asset,
        };
        let checked = terms
            .validate()
            .and_then(|()| ensure_not_custody(&terms, &self.config.escrow_account));
        if let Err(e) = checked {
            warn!(caller = %caller, error = %e, "Rejected agreement creation");
            return Err(e);
        }

        let id = self.allocator.allocate();
        let agreement = Agreement::new(id, terms);

        info!(
            agreement_id = %id,
            buyer = %agreement.buyer,
            seller = %agreement.seller,
            arbitrator = %agreement.arbitrator,
            amount = %agreement.amount,
            asset = %agreement.asset,
            "Agreement created"
        );

        self.store.insert(agreement)?;
        self.emit(AgreementEvent::new(id, EventKind::Created));
        Ok(id)
    }

    /// Buyer moves the amount into escrow custody
    pub async fn pay(&self, caller: &PartyId, id: AgreementId) -> Result<Agreement> {
        self.execute(caller, id, Operation::Pay, None).await
    }

    /// Seller attests delivery. No funds move.
    pub async fn deliver_item(&self, caller: &PartyId, id: AgreementId) -> Result<Agreement> {
        self.execute(caller, id, Operation::DeliverItem, None).await
    }

    /// Buyer releases the escrowed amount to the seller
    pub async fn release_payment(&self, caller: &PartyId, id: AgreementId) -> Result<Agreement> {
        self.execute(caller, id, Operation::ReleasePayment, Some(Role::Seller))
            .await
    }

    /// Either party contests a paid, undelivered agreement. No funds move.
    pub async fn raise_dispute(&self, caller: &PartyId, id: AgreementId) -> Result<Agreement> {
        self.execute(caller, id, Operation::RaiseDispute, None).await
    }

    /// Arbitrator disburses to the buyer (`buyer_wins`) or the seller
    pub async fn resolve_dispute(
        &self,
        caller: &PartyId,
        id: AgreementId,
        buyer_wins: bool,
    ) -> Result<Agreement> {
        let winner = if buyer_wins { Role::Buyer } else { Role::Seller };
        self.execute(caller, id, Operation::ResolveDispute, Some(winner))
            .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Committed copy of an agreement
    pub fn get_agreement(&self, id: AgreementId) -> Result<Agreement> {
        self.store.get(id)
    }

    pub fn agreement_count(&self) -> usize {
        self.store.len()
    }

    /// Agreements where `party` holds any role, ordered by id
    pub fn agreements_for(&self, party: &PartyId) -> Vec<Agreement> {
        self.store.by_party(party)
    }

    /// Point-in-time copy of the persisted layout
    pub fn snapshot(&self) -> EscrowSnapshot {
        // Ids are allocated before insertion, so reading the counter after
        // the records always covers every id collected.
        let agreements = self.store.all();
        EscrowSnapshot {
            next_id: self.allocator.peek(),
            agreements,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Run `op` against one agreement. `payee` names the role that receives
    /// the escrowed amount when `op` disburses.
    async fn execute(
        &self,
        caller: &PartyId,
        id: AgreementId,
        op: Operation,
        payee: Option<Role>,
    ) -> Result<Agreement> {
        // Held until the commit below; a second call on this id waits here.
        let _guard = self.store.lock(id).await?;
        let agreement = self.store.get(id)?;

        let required = op.required_role();
        if !authorize(&agreement, caller, required) {
            warn!(agreement_id = %id, caller = %caller, operation = %op, "Unauthorized caller");
            return Err(EscrowError::Unauthorized {
                caller: caller.clone(),
                required,
            });
        }

        if agreement.state != op.from_state() {
            warn!(
                agreement_id = %id,
                operation = %op,
                state = %agreement.state,
                "Operation not allowed in current state"
            );
            return Err(EscrowError::InvalidState {
                agreement_id: id,
                operation: op,
                current: agreement.state,
            });
        }

        // Non-terminal fund moves pull into custody; terminal ones pay out of it
        let target = match (op.moves_funds(), op.to_state().is_terminal()) {
            (false, _) => None,
            (true, false) => {
                self.settle(
                    &agreement,
                    op,
                    self.ledger
                        .transfer_from(&agreement.buyer, agreement.amount, &agreement.asset),
                )
                .await?;
                None
            }
            (true, true) => {
                let recipient = payee
                    .and_then(|role| agreement.party(role))
                    .cloned()
                    .ok_or_else(|| EscrowError::InvalidArgument {
                        message: format!("No payee for {} on agreement {}", op, id),
                    })?;
                self.settle(
                    &agreement,
                    op,
                    self.ledger
                        .transfer_to(&recipient, agreement.amount, &agreement.asset),
                )
                .await?;
                Some(recipient)
            }
        };

        let committed = self.store.update(id, |a| {
            a.advance(op, target.clone())?;
            Ok(a.clone())
        })?;

        info!(
            agreement_id = %id,
            operation = %op,
            state = %committed.state,
            "Agreement advanced"
        );

        let event = match (&committed.resolved_to, committed.state.is_terminal()) {
            (Some(winner), true) => AgreementEvent::resolved(id, winner.clone()),
            _ => AgreementEvent::new(id, EventKind::from(committed.state)),
        };
        self.emit(event);

        Ok(committed)
    }

    /// Hand an event to the notifier. A misbehaving sink loses the event,
    /// never the committed transition.
    fn emit(&self, event: AgreementEvent) {
        let notifier = &self.notifier;
        if std::panic::catch_unwind(AssertUnwindSafe(|| notifier.notify(&event))).is_err() {
            warn!(
                agreement_id = %event.agreement_id,
                kind = ?event.kind,
                "Event notifier panicked; event dropped"
            );
        }
    }

    /// Await a ledger transfer, bounded by the configured timeout
    async fn settle<F>(&self, agreement: &Agreement, op: Operation, transfer: F) -> Result<TransferReceipt>
    where
        F: Future<Output = escrow_ledger::Result<TransferReceipt>>,
    {
        let outcome = match self.config.transfer_timeout() {
            Some(limit) => match tokio::time::timeout(limit, transfer).await {
                Ok(result) => result,
                Err(_) => Err(escrow_ledger::LedgerError::Timeout {
                    millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }),
            },
            None => transfer.await,
        };

        match outcome {
            Ok(receipt) => {
                info!(
                    agreement_id = %agreement.id,
                    operation = %op,
                    from = %receipt.from,
                    to = %receipt.to,
                    amount = %receipt.amount,
                    asset = %receipt.asset,
                    "Transfer confirmed"
                );
                Ok(receipt)
            }
            Err(e) => {
                warn!(
                    agreement_id = %agreement.id,
                    operation = %op,
                    error = %e,
                    "Transfer failed; agreement unchanged"
                );
                Err(EscrowError::from(e))
            }
        }
    }
}
