//! Resolves processing transactions from the processor's webhook notifications.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{LocalTransaction, ResponseState, TransactionKind, TransactionStatus};
use crate::postfinance::models::{id_as_string, RefundState, TransactionState};
use crate::postfinance::ProcessorError;
use crate::ports::{PaymentProcessor, StoreError, TransactionStore, TransitionOutcome};

/// Notification body as posted by the processor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(deserialize_with = "id_as_string")]
    pub entity_id: String,
    pub listener_entity_technical_name: String,
    #[serde(default, deserialize_with = "optional_id")]
    pub listener_entity_id: Option<String>,
}

fn optional_id<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    id_as_string(deserializer).map(Some)
}

/// Remote entity kinds the reconciler knows how to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEntity {
    Transaction,
    Refund,
}

impl WebhookEntity {
    pub fn from_technical_name(name: &str) -> Option<Self> {
        match name {
            "Transaction" => Some(WebhookEntity::Transaction),
            "Refund" => Some(WebhookEntity::Refund),
            _ => None,
        }
    }

    /// Local records of this entity carry this kind.
    pub fn kind(&self) -> TransactionKind {
        match self {
            WebhookEntity::Transaction => TransactionKind::Purchase,
            WebhookEntity::Refund => TransactionKind::Refund,
        }
    }

    /// Re-reads the entity and maps its state onto a local status. States that
    /// are not final on the processor side map to `None`.
    pub async fn fetch_and_classify(
        &self,
        processor: &dyn PaymentProcessor,
        entity_id: &str,
    ) -> Result<(ResponseState, Option<TransactionStatus>), ProcessorError> {
        match self {
            WebhookEntity::Transaction => {
                let remote = processor.read_transaction(entity_id).await?;
                Ok((
                    ResponseState::Transaction(remote.state),
                    classify_transaction(remote.state),
                ))
            }
            WebhookEntity::Refund => {
                let remote = processor.read_refund(entity_id).await?;
                Ok((ResponseState::Refund(remote.state), classify_refund(remote.state)))
            }
        }
    }
}

pub fn classify_transaction(state: TransactionState) -> Option<TransactionStatus> {
    match state {
        TransactionState::Fulfill => Some(TransactionStatus::Success),
        TransactionState::Decline | TransactionState::Failed | TransactionState::Voided => {
            Some(TransactionStatus::Failed)
        }
        _ => None,
    }
}

pub fn classify_refund(state: RefundState) -> Option<TransactionStatus> {
    match state {
        RefundState::Successful => Some(TransactionStatus::Success),
        RefundState::Failed => Some(TransactionStatus::Failed),
        _ => None,
    }
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Unknown reference, or a late or duplicate delivery for a record that
    /// is already resolved.
    #[error("No processing transaction for reference {0}")]
    NoProcessingTransaction(String),

    /// Another reconciler resolved the record between lookup and write.
    #[error("Transaction for reference {0} was already reconciled")]
    AlreadyReconciled(String),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Lookup misses and lost races are expected under redelivery.
    pub fn is_redelivery(&self) -> bool {
        matches!(
            self,
            ReconcileError::NoProcessingTransaction(_) | ReconcileError::AlreadyReconciled(_)
        )
    }
}

#[derive(Clone)]
pub struct WebhookReconciler {
    processor: Arc<dyn PaymentProcessor>,
    store: Arc<dyn TransactionStore>,
}

impl WebhookReconciler {
    pub fn new(processor: Arc<dyn PaymentProcessor>, store: Arc<dyn TransactionStore>) -> Self {
        Self { processor, store }
    }

    /// Records the entity's current state as a child of the matching processing
    /// transaction and returns that child.
    pub async fn reconcile(
        &self,
        entity: WebhookEntity,
        entity_id: &str,
    ) -> Result<LocalTransaction, ReconcileError> {
        let parent = self
            .store
            .find_processing_by_reference(entity.kind(), entity_id)
            .await?
            .ok_or_else(|| ReconcileError::NoProcessingTransaction(entity_id.to_string()))?;

        let mut child = parent.create_child();
        child.reference = Some(entity_id.to_string());

        let (state, status) = entity
            .fetch_and_classify(self.processor.as_ref(), entity_id)
            .await?;
        child.status = status;
        child.message = Some(state_label(&state));
        child.response = serde_json::to_value(state).ok();

        match self.store.record_transition(&parent, &child).await? {
            TransitionOutcome::Applied => {
                tracing::info!(
                    transaction_id = %parent.id,
                    child_id = %child.id,
                    reference = %entity_id,
                    state = %child.message.as_deref().unwrap_or_default(),
                    status = ?child.status,
                    "Webhook reconciled"
                );
                Ok(child)
            }
            TransitionOutcome::AlreadyReconciled => {
                Err(ReconcileError::AlreadyReconciled(entity_id.to_string()))
            }
        }
    }
}

fn state_label(state: &ResponseState) -> String {
    match state {
        ResponseState::Transaction(s) => s.to_string(),
        ResponseState::Refund(s) => s.to_string(),
    }
}
