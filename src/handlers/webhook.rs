use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse};

use crate::services::{WebhookEntity, WebhookEvent, WebhookReconciler};
use crate::AppState;

const ACK: (StatusCode, &str) = (StatusCode::OK, "ok");

/// Always acknowledges: the processor redelivers anything that is not a 200,
/// and a delivery that failed here would fail the same way again.
pub async fn postfinance_webhook(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, body_size = body.len(), "Ignoring malformed webhook payload");
            return ACK;
        }
    };

    let Some(entity) = WebhookEntity::from_technical_name(&event.listener_entity_technical_name) else {
        tracing::info!(
            entity = %event.listener_entity_technical_name,
            entity_id = %event.entity_id,
            "Ignoring webhook for unhandled entity"
        );
        return ACK;
    };

    let reconciler = WebhookReconciler::new(state.processor.clone(), state.store.clone());
    match reconciler.reconcile(entity, &event.entity_id).await {
        Ok(_) => {}
        Err(e) if e.is_redelivery() => {
            tracing::warn!(
                entity = ?entity,
                reference = %event.entity_id,
                listener = ?event.listener_entity_id,
                error = %e,
                "Webhook matched no processing transaction"
            );
        }
        Err(e) => {
            tracing::error!(
                entity = ?entity,
                reference = %event.entity_id,
                error = %e,
                "Webhook reconciliation failed"
            );
        }
    }

    ACK
}
