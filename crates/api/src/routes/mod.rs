//! HTTP routes

pub mod billing;


use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/create-preference", post(billing::create_preference))
        .route("/webhook", post(billing::webhook))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
