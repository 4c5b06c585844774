pub mod health;
pub mod jobs;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::webhook::handlers::handle_inbound_application;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Webhook intake
        .route(
            "/inbound/applications/:job_id",
            post(handle_inbound_application),
        )
        // Operator API
        .route("/api/v1/jobs/:job_id/close", post(jobs::handle_close_job))
        .route(
            "/api/v1/jobs/:job_id/report",
            post(jobs::handle_generate_report),
        )
        .with_state(state)
}
