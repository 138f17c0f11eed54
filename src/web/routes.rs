use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// API Routes - JSON API for the chat client
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Connection management
            .route(
                "/connect",
                post(handlers::api::connect).delete(handlers::api::disconnect),
            )
            // Conversation
            .route("/chat", post(handlers::api::chat))
            .route("/history", get(handlers::api::history))
            .route("/translate", post(handlers::api::translate))
            // Schema
            .route("/schema", get(handlers::api::get_schema))
            // System status
            .route("/status", get(handlers::api::system_status)),
    )
}
