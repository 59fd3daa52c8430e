use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{GatewayResponse, LocalTransaction, ResponseState, TransactionKind, TransactionStatus};
use crate::postfinance::models::{RefundCreate, RefundType};
use crate::postfinance::ProcessorError;
use crate::ports::{PaymentProcessor, RefundReservation, StoreError, TransactionStore};
use crate::services::webhook::classify_refund;

#[derive(Error, Debug)]
pub enum RefundError {
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Refunds settled purchases, never beyond what is left to refund.
#[derive(Clone)]
pub struct RefundService {
    processor: Arc<dyn PaymentProcessor>,
    store: Arc<dyn TransactionStore>,
}

impl RefundService {
    pub fn new(processor: Arc<dyn PaymentProcessor>, store: Arc<dyn TransactionStore>) -> Self {
        Self { processor, store }
    }

    /// Amount of `purchase` not yet refunded or awaiting a refund.
    pub async fn refundable_amount(&self, purchase: &LocalTransaction) -> Result<BigDecimal, StoreError> {
        let mut rows = Vec::new();
        for child in self.store.children(purchase.id).await? {
            if child.kind == TransactionKind::Refund {
                rows.extend(self.store.children(child.id).await?);
            }
            rows.push(child);
        }
        Ok(purchase.refundable_amount(&rows))
    }

    /// Rejections come back as unsuccessful responses; the processor is only
    /// called once the amount has been reserved against the purchase.
    pub async fn refund(&self, purchase_id: Uuid, amount: BigDecimal) -> Result<GatewayResponse, RefundError> {
        let purchase = self.store.get(purchase_id).await?;

        let transaction = match self.refundable_reference(&purchase).await? {
            Ok(id) => id,
            Err(message) => return Ok(GatewayResponse::failed(message)),
        };

        if amount <= BigDecimal::zero() {
            let refundable = self.refundable_amount(&purchase).await?;
            return Ok(rejected(&purchase, &amount, &refundable));
        }

        let refund = match self
            .store
            .reserve_refund(&purchase, &purchase.create_refund(amount.clone()))
            .await?
        {
            RefundReservation::Reserved(refund) => refund,
            RefundReservation::Exceeds { refundable } => {
                return Ok(rejected(&purchase, &amount, &refundable));
            }
        };

        let request = RefundCreate {
            amount: refund.amount.clone(),
            transaction,
            external_id: refund.hash.clone(),
            merchant_reference: purchase.order_id.clone(),
            refund_type: RefundType::MerchantInitiatedOnline,
        };
        let remote = match self.processor.create_refund(&request).await {
            Ok(remote) => remote,
            Err(e) => {
                // A failed child releases the reserved amount.
                let mut child = refund.create_child();
                child.status = Some(TransactionStatus::Failed);
                child.message = Some(e.to_string());
                self.store.record_transition(&refund, &child).await?;
                return Err(e.into());
            }
        };

        if let Err(e) = self.store.update_reference(refund.id, &remote.id).await {
            tracing::error!(
                refund_id = %refund.id,
                reference = %remote.id,
                error = %e,
                "Refund accepted remotely but its reference was not stored"
            );
            return Err(e.into());
        }
        let mut refund = refund;
        refund.reference = Some(remote.id.clone());

        // Refund rows are inserted processing; an immediate outcome is appended.
        let immediate = classify_refund(remote.state);
        if let Some(status) = immediate {
            let mut child = refund.create_child();
            child.status = Some(status);
            child.message = Some(remote.state.to_string());
            self.store.record_transition(&refund, &child).await?;
        }

        tracing::info!(
            transaction_id = %purchase.id,
            refund_id = %refund.id,
            reference = %remote.id,
            state = %remote.state,
            "Refund submitted"
        );

        let mut response = GatewayResponse::processing(remote.id, ResponseState::Refund(remote.state));
        response.processing = immediate.is_none();
        Ok(response)
    }

    async fn refundable_reference(&self, purchase: &LocalTransaction) -> Result<Result<i64, String>, StoreError> {
        if purchase.kind != TransactionKind::Purchase || purchase.parent_id.is_some() {
            return Ok(Err(format!("Transaction {} is not a purchase", purchase.id)));
        }
        let Some(reference) = purchase.reference.as_deref() else {
            return Ok(Err(format!("Transaction {} was never submitted", purchase.id)));
        };
        let children = self.store.children(purchase.id).await?;
        if purchase.effective_status(&children) != Some(TransactionStatus::Success) {
            return Ok(Err(format!("Transaction {} has not been paid", purchase.id)));
        }
        Ok(reference
            .parse::<i64>()
            .map_err(|_| format!("Reference {} is not a processor transaction id", reference)))
    }
}

fn rejected(purchase: &LocalTransaction, amount: &BigDecimal, refundable: &BigDecimal) -> GatewayResponse {
    tracing::info!(
        transaction_id = %purchase.id,
        requested = %amount,
        refundable = %refundable,
        "Refund rejected"
    );
    GatewayResponse::failed(format!(
        "Refund amount {} is invalid, the refundable amount is {} {}",
        amount, refundable, purchase.currency
    ))
}
