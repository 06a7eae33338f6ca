//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{ActiveSession, ErrorResponse, MessageRecord, StoredSender},
    state::AppState,
    ws::ws_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_messages,
        handlers::session_messages,
        handlers::list_sessions,
    ),
    components(
        schemas(MessageRecord, StoredSender, ActiveSession, ErrorResponse)
    ),
    tags(
        (name = "Voxchat API", description = "Message history and live sessions of the chat gateway")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/api/messages", get(handlers::list_messages))
        .route("/api/messages/{session_id}", get(handlers::session_messages))
        .route("/api/sessions", get(handlers::list_sessions))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
