use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{GatewayResponse, LocalTransaction, TransactionStatus};
use crate::error::AppError;
use crate::services::{CompletionReconciler, PurchaseInitiator, PurchaseOrder, RefundService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CompleteQuery {
    pub transaction_id: Uuid,
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub amount: BigDecimal,
}

pub fn response_body(transaction_id: Uuid, response: &GatewayResponse) -> Value {
    json!({
        "transaction_id": transaction_id,
        "reference": response.reference,
        "state": response.state,
        "redirect_url": response.redirect_url,
        "successful": response.is_successful(),
        "processing": response.is_processing(),
        "message": response.message,
    })
}

pub async fn create_payment(
    State(state): State<AppState>,
    Json(order): Json<PurchaseOrder>,
) -> Result<impl IntoResponse, AppError> {
    let tx = LocalTransaction::new_purchase(
        order.order_id.clone(),
        order.amount.clone(),
        order.currency.clone(),
    );
    let tx = state.store.insert(&tx).await?;

    let initiator = PurchaseInitiator::new(state.processor.clone(), state.return_urls.clone());
    let response = match initiator.initiate(&tx, &order).await {
        Ok(response) => response,
        Err(e) => {
            record_failure(&state, &tx, e.to_string()).await?;
            return Err(e.into());
        }
    };

    if !response.is_redirect() {
        record_failure(&state, &tx, response.message().to_string()).await?;
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(response_body(tx.id, &response))));
    }

    if let Err(e) = state
        .store
        .update_reference(tx.id, response.transaction_reference())
        .await
    {
        record_failure(&state, &tx, e.to_string()).await?;
        return Err(e.into());
    }

    let mut body = response_body(tx.id, &response);
    body["hash"] = json!(tx.hash);
    Ok((StatusCode::CREATED, Json(body)))
}

/// Appends a failed child so the attempt does not linger as processing.
async fn record_failure(state: &AppState, tx: &LocalTransaction, message: String) -> Result<(), AppError> {
    let mut child = tx.create_child();
    child.status = Some(TransactionStatus::Failed);
    child.message = Some(message);
    state.store.record_transition(tx, &child).await?;
    Ok(())
}

pub async fn complete_payment(
    State(state): State<AppState>,
    Query(query): Query<CompleteQuery>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.store.get(query.transaction_id).await?;
    if tx.hash != query.hash {
        return Err(AppError::NotFound(format!(
            "Transaction {} not found",
            query.transaction_id
        )));
    }

    let reconciler = CompletionReconciler::new(state.processor.clone(), state.poll);
    let response = reconciler.complete(&tx).await?;

    Ok(Json(response_body(tx.id, &response)))
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> Result<impl IntoResponse, AppError> {
    let service = RefundService::new(state.processor.clone(), state.store.clone());
    let response = service.refund(id, request.amount).await?;

    let status = if response.reference.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(response_body(id, &response))))
}
