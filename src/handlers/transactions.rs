use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

/// The record with its audit trail of children.
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.store.get(id).await?;
    let children = state.store.children(id).await?;
    let effective_status = tx.effective_status(&children);

    Ok(Json(json!({
        "transaction": tx,
        "effective_status": effective_status,
        "children": children,
    })))
}
