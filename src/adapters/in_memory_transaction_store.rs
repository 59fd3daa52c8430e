//! In-memory implementation of TransactionStore.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{LocalTransaction, TransactionKind};
use crate::ports::{RefundReservation, StoreError, StoreResult, TransactionStore, TransitionOutcome};

/// Vec-backed store. Every operation runs under one lock, which makes
/// `record_transition` atomic.
#[derive(Default)]
pub struct InMemoryTransactionStore {
    rows: Mutex<Vec<LocalTransaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in insertion order.
    pub fn snapshot(&self) -> Vec<LocalTransaction> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LocalTransaction>> {
        // A panic while holding the lock cannot leave a half-written row.
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn has_terminal_child(rows: &[LocalTransaction], parent: &LocalTransaction) -> bool {
    rows.iter().any(|row| {
        row.parent_id == Some(parent.id)
            && row.kind == parent.kind
            && row.status.map_or(false, |s| s.is_terminal())
    })
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, tx: &LocalTransaction) -> StoreResult<LocalTransaction> {
        self.lock().push(tx.clone());
        Ok(tx.clone())
    }

    async fn get(&self, id: Uuid) -> StoreResult<LocalTransaction> {
        self.lock()
            .iter()
            .find(|row| row.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update_reference(&self, id: Uuid, reference: &str) -> StoreResult<()> {
        let mut rows = self.lock();
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.reference = Some(reference.to_string());
        Ok(())
    }

    async fn find_processing_by_reference(
        &self,
        kind: TransactionKind,
        reference: &str,
    ) -> StoreResult<Option<LocalTransaction>> {
        let rows = self.lock();
        Ok(rows
            .iter()
            .find(|row| {
                row.kind == kind
                    && row.reference.as_deref() == Some(reference)
                    && row.is_processing()
                    && !has_terminal_child(&rows, row)
            })
            .cloned())
    }

    async fn children(&self, parent_id: Uuid) -> StoreResult<Vec<LocalTransaction>> {
        Ok(self
            .lock()
            .iter()
            .filter(|row| row.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn record_transition(
        &self,
        parent: &LocalTransaction,
        child: &LocalTransaction,
    ) -> StoreResult<TransitionOutcome> {
        let mut rows = self.lock();
        let terminal = child.status.map_or(false, |s| s.is_terminal());
        if terminal && has_terminal_child(&rows, parent) {
            return Ok(TransitionOutcome::AlreadyReconciled);
        }
        rows.push(child.clone());
        Ok(TransitionOutcome::Applied)
    }

    async fn reserve_refund(
        &self,
        purchase: &LocalTransaction,
        refund: &LocalTransaction,
    ) -> StoreResult<RefundReservation> {
        let mut rows = self.lock();
        let refundable = purchase.refundable_amount(&rows);
        if refund.amount > refundable {
            return Ok(RefundReservation::Exceeds { refundable });
        }
        rows.push(refund.clone());
        Ok(RefundReservation::Reserved(refund.clone()))
    }
}
