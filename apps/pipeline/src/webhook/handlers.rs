use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::webhook::{accept, authorize, WebhookPayload, WebhookReceipt};

pub const SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Default, Deserialize)]
pub struct SecretQuery {
    pub secret: Option<String>,
}

/// POST /inbound/applications/:job_id
pub async fn handle_inbound_application(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<SecretQuery>,
    headers: HeaderMap,
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<WebhookReceipt>), AppError> {
    let secret = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(query.secret);

    // Auth runs before the body is judged.
    let job = authorize(state.store.as_ref(), job_id, secret.as_deref()).await?;
    let Json(payload) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let receipt = accept(state.store.as_ref(), &job, payload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
