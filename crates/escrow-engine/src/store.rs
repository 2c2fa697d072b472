//! Agreement store
//!
//! Sole owner of agreement records. Records are replaced whole, so a reader
//! sees either the state before a transition or the state after it.
//!
//! Each record has an operation lock. The engine holds it from load through
//! ledger call to commit, which serializes state-changing operations per id
//! while leaving different ids fully independent.

use std::sync::Arc;

use dashmap::DashMap;
use escrow_types::{Agreement, AgreementId, EscrowError, PartyId, Result};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct AgreementStore {
    records: DashMap<AgreementId, Agreement>,
    locks: DashMap<AgreementId, Arc<Mutex<()>>>,
}

impl AgreementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed copy of an agreement
    pub fn get(&self, id: AgreementId) -> Result<Agreement> {
        self.records
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(EscrowError::NotFound { agreement_id: id })
    }

    /// Add a new record. Identifiers are never overwritten.
    pub fn insert(&self, agreement: Agreement) -> Result<()> {
        let id = agreement.id;
        match self.records.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EscrowError::InvalidArgument {
                message: format!("Agreement {} already exists", id),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                self.locks.insert(id, Arc::new(Mutex::new(())));
                slot.insert(agreement);
                Ok(())
            }
        }
    }

    /// Apply `mutator` to a draft copy and commit it only if it succeeds.
    ///
    /// The mutator must not block; it runs under the map's shard lock.
    pub fn update<T, F>(&self, id: AgreementId, mutator: F) -> Result<T>
    where
        F: FnOnce(&mut Agreement) -> Result<T>,
    {
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or(EscrowError::NotFound { agreement_id: id })?;

        let mut draft = record.value().clone();
        let out = mutator(&mut draft)?;
        *record.value_mut() = draft;
        Ok(out)
    }

    /// Acquire the operation lock for `id`
    pub async fn lock(&self, id: AgreementId) -> Result<OwnedMutexGuard<()>> {
        // Clone the Arc out so no shard lock is held across the await.
        let lock = self
            .locks
            .get(&id)
            .map(|l| l.value().clone())
            .ok_or(EscrowError::NotFound { agreement_id: id })?;
        Ok(lock.lock_owned().await)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every record, ordered by id
    pub fn all(&self) -> Vec<Agreement> {
        let mut agreements: Vec<Agreement> =
            self.records.iter().map(|r| r.value().clone()).collect();
        agreements.sort_by_key(|a| a.id);
        agreements
    }

    /// Records where `party` holds any role, ordered by id
    pub fn by_party(&self, party: &PartyId) -> Vec<Agreement> {
        let mut agreements: Vec<Agreement> = self
            .records
            .iter()
            .filter(|r| r.value().involves(party))
            .map(|r| r.value().clone())
            .collect();
        agreements.sort_by_key(|a| a.id);
        agreements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_types::{AgreementState, Amount, AssetId, NewAgreement, Operation};

    fn agreement(id: u64) -> Agreement {
        Agreement::new(
            AgreementId(id),
            NewAgreement {
                buyer: PartyId::from("buyer"),
                seller: PartyId::from("seller"),
                arbitrator: PartyId::from("arbitrator"),
                amount: Amount::new(100),
                asset: AssetId::from("TKN"),
            },
        )
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = AgreementStore::new();
        assert_eq!(
            store.get(AgreementId(9)),
            Err(EscrowError::NotFound {
                agreement_id: AgreementId(9)
            })
        );
    }

    #[test]
    fn test_insert_refuses_duplicate_id() {
        let store = AgreementStore::new();
        store.insert(agreement(0)).unwrap();
        assert!(matches!(
            store.insert(agreement(0)),
            Err(EscrowError::InvalidArgument { .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_failed_mutator_commits_nothing() {
        let store = AgreementStore::new();
        store.insert(agreement(0)).unwrap();
        let before = store.get(AgreementId(0)).unwrap();

        let result = store.update(AgreementId(0), |a| {
            a.state = AgreementState::Paid;
            Err::<(), _>(EscrowError::TransferFailed {
                reason: "nope".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(store.get(AgreementId(0)).unwrap(), before);
    }

    #[test]
    fn test_update_commits_whole_record() {
        let store = AgreementStore::new();
        store.insert(agreement(0)).unwrap();

        store
            .update(AgreementId(0), |a| a.advance(Operation::Pay, None))
            .unwrap();

        assert_eq!(store.get(AgreementId(0)).unwrap().state, AgreementState::Paid);
    }

    #[test]
    fn test_by_party_is_ordered() {
        let store = AgreementStore::new();
        store.insert(agreement(2)).unwrap();
        store.insert(agreement(0)).unwrap();
        store.insert(agreement(1)).unwrap();

        let ids: Vec<_> = store
            .by_party(&PartyId::from("seller"))
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![AgreementId(0), AgreementId(1), AgreementId(2)]);
        assert!(store.by_party(&PartyId::from("nobody")).is_empty());
    }

    #[tokio::test]
    async fn test_lock_serializes_same_id() {
        let store = AgreementStore::new();
        store.insert(agreement(0)).unwrap();
        store.insert(agreement(1)).unwrap();

        let held = store.lock(AgreementId(0)).await.unwrap();

        // A different id is not blocked
        let other = store.lock(AgreementId(1)).await.unwrap();
        drop(other);

        let second = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            store.lock(AgreementId(0)),
        )
        .await;
        assert!(second.is_err(), "same-id lock should still be held");

        drop(held);
        assert!(store.lock(AgreementId(0)).await.is_ok());
    }
}
