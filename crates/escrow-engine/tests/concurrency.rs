use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Barrier;

use escrow_engine::{
    AgreementId, AgreementState, Amount, AssetId, AssetLedger, EntryReason, EscrowEngine,
    EscrowError, InMemoryLedger, LedgerError, NoopNotifier, PartyId, TransferReceipt,
};

/// Delegates to an in-memory ledger after a delay, counting calls
struct SlowLedger {
    inner: InMemoryLedger,
    delay: Duration,
    calls: AtomicUsize,
}

#[async_trait]
impl AssetLedger for SlowLedger {
    async fn transfer_from(
        &self,
        payer: &PartyId,
        amount: Amount,
        asset: &AssetId,
    ) -> Result<TransferReceipt, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.transfer_from(payer, amount, asset).await
    }

    async fn transfer_to(
        &self,
        recipient: &PartyId,
        amount: Amount,
        asset: &AssetId,
    ) -> Result<TransferReceipt, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.transfer_to(recipient, amount, asset).await
    }
}

/// Holds every pull until `n` of them are in flight at once
struct RendezvousLedger {
    inner: InMemoryLedger,
    barrier: Barrier,
}

#[async_trait]
impl AssetLedger for RendezvousLedger {
    async fn transfer_from(
        &self,
        payer: &PartyId,
        amount: Amount,
        asset: &AssetId,
    ) -> Result<TransferReceipt, LedgerError> {
        self.barrier.wait().await;
        self.inner.transfer_from(payer, amount, asset).await
    }

    async fn transfer_to(
        &self,
        recipient: &PartyId,
        amount: Amount,
        asset: &AssetId,
    ) -> Result<TransferReceipt, LedgerError> {
        self.inner.transfer_to(recipient, amount, asset).await
    }
}

fn token() -> AssetId {
    AssetId::from("T")
}

fn buyer() -> PartyId {
    PartyId::from("B")
}

fn seller() -> PartyId {
    PartyId::from("S")
}

fn arbitrator() -> PartyId {
    PartyId::from("A")
}

/// Buyer holds and approves far more than any single agreement needs, so
/// a duplicated pull would succeed at the ledger if the engine allowed it.
async fn funded_ledger() -> InMemoryLedger {
    let ledger = InMemoryLedger::new();
    ledger.mint(&buyer(), &token(), Amount::new(1_000)).await.unwrap();
    ledger.approve(&buyer(), &token(), Amount::new(1_000)).await;
    ledger
}

async fn transfers(ledger: &InMemoryLedger, reason: EntryReason) -> usize {
    ledger
        .entries()
        .await
        .iter()
        .filter(|e| e.reason == reason)
        .count()
        / 2
}

fn slow_engine(inner: InMemoryLedger) -> (Arc<EscrowEngine>, Arc<SlowLedger>) {
    let ledger = Arc::new(SlowLedger {
        inner,
        delay: Duration::from_millis(20),
        calls: AtomicUsize::new(0),
    });
    let engine = Arc::new(EscrowEngine::new(ledger.clone(), Arc::new(NoopNotifier)));
    (engine, ledger)
}

fn create(engine: &EscrowEngine) -> AgreementId {
    engine
        .create_agreement(&buyer(), seller(), arbitrator(), Amount::new(10), token())
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pays_move_funds_once() {
    let inner = funded_ledger().await;
    let (engine, ledger) = slow_engine(inner.clone());
    let id = create(&engine);

    let tasks = (0..8).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.pay(&buyer(), id).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(EscrowError::InvalidState { .. }))));

    assert_eq!(ledger.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transfers(&inner, EntryReason::EscrowLock).await, 1);
    assert_eq!(inner.custody_balance(&token()).await, Amount::new(10));
    assert_eq!(engine.get_agreement(id).unwrap().state, AgreementState::Paid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pay_and_dispute_race_is_serialized() {
    let inner = funded_ledger().await;
    let (engine, _) = slow_engine(inner.clone());
    let id = create(&engine);

    let pay = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.pay(&buyer(), id).await })
    };
    let dispute = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.raise_dispute(&seller(), id).await })
    };

    let pay = pay.await.unwrap();
    let dispute = dispute.await.unwrap();

    // Dispute only lands if it ran after the committed pay
    assert!(pay.is_ok());
    let state = engine.get_agreement(id).unwrap().state;
    match dispute {
        Ok(_) => assert_eq!(state, AgreementState::Disputed),
        Err(e) => {
            assert!(matches!(e, EscrowError::InvalidState { current: AgreementState::Created, .. }));
            assert_eq!(state, AgreementState::Paid);
        }
    }
    assert_eq!(transfers(&inner, EntryReason::EscrowLock).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_releases_disburse_once() {
    let inner = funded_ledger().await;
    let (engine, _) = slow_engine(inner.clone());
    let id = create(&engine);
    engine.pay(&buyer(), id).await.unwrap();
    engine.deliver_item(&seller(), id).await.unwrap();

    let tasks = (0..8).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.release_payment(&buyer(), id).await })
    });
    let successes = join_all(tasks)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(transfers(&inner, EntryReason::EscrowRelease).await, 1);
    assert_eq!(inner.balance(&seller(), &token()).await, Amount::new(10));
    assert_eq!(inner.custody_balance(&token()).await, Amount::zero());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_resolutions_pay_out_once() {
    let inner = funded_ledger().await;
    let (engine, _) = slow_engine(inner.clone());
    let id = create(&engine);
    engine.pay(&buyer(), id).await.unwrap();
    engine.raise_dispute(&buyer(), id).await.unwrap();

    let for_buyer = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.resolve_dispute(&arbitrator(), id, true).await })
    };
    let for_seller = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.resolve_dispute(&arbitrator(), id, false).await })
    };

    let outcomes = [for_buyer.await.unwrap(), for_seller.await.unwrap()];

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(transfers(&inner, EntryReason::EscrowRelease).await, 1);
    let winner = engine.get_agreement(id).unwrap().resolved_to.unwrap();
    let expected = if winner == buyer() { 1_000 } else { 10 };
    assert_eq!(inner.balance(&winner, &token()).await, Amount::new(expected));
    assert_eq!(inner.custody_balance(&token()).await, Amount::zero());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_agreements_do_not_contend() {
    const N: usize = 6;

    let inner = funded_ledger().await;
    let ledger = Arc::new(RendezvousLedger {
        inner: inner.clone(),
        barrier: Barrier::new(N),
    });
    let engine = Arc::new(EscrowEngine::new(ledger, Arc::new(NoopNotifier)));
    let ids: Vec<_> = (0..N).map(|_| create(&engine)).collect();

    // Every pull waits for all N to be in flight; per-id locking lets them meet.
    let tasks = ids.iter().copied().map(|id| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.pay(&buyer(), id).await })
    });
    let results = tokio::time::timeout(Duration::from_secs(5), join_all(tasks))
        .await
        .expect("pays on distinct agreements were serialized");

    assert!(results.into_iter().all(|r| matches!(r, Ok(Ok(_)))));
    assert_eq!(transfers(&inner, EntryReason::EscrowLock).await, N);
    assert_eq!(inner.custody_balance(&token()).await, Amount::new(10 * N as u128));
}
