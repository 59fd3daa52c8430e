//! Seams to the collaborators the reconciliation core depends on.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{LocalTransaction, TransactionKind};
use crate::postfinance::models::{RefundCreate, RemoteRefund, RemoteTransaction, TransactionCreate};
use crate::postfinance::ProcessorError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt transaction row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an attempt to append a child record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The parent already has a terminal child; nothing was written.
    AlreadyReconciled,
}

/// Result of an attempt to reserve part of a purchase for a refund.
#[derive(Debug, Clone, PartialEq)]
pub enum RefundReservation {
    /// The refund record was stored in status Processing.
    Reserved(LocalTransaction),
    /// The refund is larger than what is left; nothing was written.
    Exceeds { refundable: BigDecimal },
}

/// Persistence for local transactions. Records are append-only apart from the
/// reference assigned once after initiation.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, tx: &LocalTransaction) -> StoreResult<LocalTransaction>;

    async fn get(&self, id: Uuid) -> StoreResult<LocalTransaction>;

    async fn update_reference(&self, id: Uuid, reference: &str) -> StoreResult<()>;

    /// The record of `kind` with this reference still in Processing and
    /// without a terminal child.
    async fn find_processing_by_reference(
        &self,
        kind: TransactionKind,
        reference: &str,
    ) -> StoreResult<Option<LocalTransaction>>;

    /// Direct children, oldest first.
    async fn children(&self, parent_id: Uuid) -> StoreResult<Vec<LocalTransaction>>;

    /// Appends `child` under `parent`. When the child is terminal the write is
    /// refused if the parent already has a terminal child, so concurrent
    /// reconcilers cannot both resolve the same record.
    async fn record_transition(
        &self,
        parent: &LocalTransaction,
        child: &LocalTransaction,
    ) -> StoreResult<TransitionOutcome>;

    /// Stores `refund` under `purchase` if its amount fits in what is left to
    /// refund. The check and the insert happen atomically per purchase.
    async fn reserve_refund(
        &self,
        purchase: &LocalTransaction,
        refund: &LocalTransaction,
    ) -> StoreResult<RefundReservation>;
}

/// The remote payment API.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_transaction(
        &self,
        request: &TransactionCreate,
    ) -> Result<RemoteTransaction, ProcessorError>;

    async fn payment_page_url(&self, transaction_id: &str) -> Result<String, ProcessorError>;

    async fn read_transaction(&self, transaction_id: &str)
        -> Result<RemoteTransaction, ProcessorError>;

    async fn create_refund(&self, request: &RefundCreate) -> Result<RemoteRefund, ProcessorError>;

    async fn read_refund(&self, refund_id: &str) -> Result<RemoteRefund, ProcessorError>;
}
