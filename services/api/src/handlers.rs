//! Axum Handlers for the REST API
//!
//! Read-only views over stored messages and live gateway sessions. Doc comments
//! double as `utoipa` OpenAPI descriptions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::{
    models::{ActiveSession, ErrorResponse, MessageRecord},
    state::AppState,
};

pub enum ApiError {
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "Failed to fetch messages".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// List every stored message, oldest first.
#[utoipa::path(
    get,
    path = "/api/messages",
    responses(
        (status = 200, description = "All stored messages", body = [MessageRecord]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    let messages = state.store.all_messages().await?;
    Ok(Json(messages.into_iter().map(MessageRecord::from).collect()))
}

/// List the stored messages of one session, oldest first.
#[utoipa::path(
    get,
    path = "/api/messages/{session_id}",
    responses(
        (status = 200, description = "Messages of the session", body = [MessageRecord]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("session_id" = Uuid, Path, description = "Session identifier")
    )
)]
pub async fn session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    let messages = state.store.messages_for_session(session_id).await?;
    Ok(Json(messages.into_iter().map(MessageRecord::from).collect()))
}

/// List the sessions currently connected to the gateway.
#[utoipa::path(
    get,
    path = "/api/sessions",
    responses(
        (status = 200, description = "Live sessions", body = [ActiveSession])
    )
)]
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<ActiveSession>> {
    Json(state.registry.sessions().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryMessageStore, MessageStore};
    use axum::body::to_bytes;
    use std::time::Duration;
    use voxchat_core::{NewMessage, ScriptedCompletionClient, Sender};

    fn state_with(store: Arc<dyn MessageStore>) -> Arc<AppState> {
        Arc::new(AppState::new(
            store,
            Arc::new(ScriptedCompletionClient::new()),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn test_session_messages_filters_by_session() {
        let store = Arc::new(InMemoryMessageStore::new());
        let ours = Uuid::new_v4();
        for (session_id, content) in [(ours, "mine"), (Uuid::new_v4(), "theirs")] {
            store
                .create_message(NewMessage {
                    session_id,
                    sender: Sender::User,
                    content: content.to_string(),
                })
                .await
                .unwrap();
        }
        let state = state_with(store);

        let Json(all) = list_messages(State(state.clone())).await.ok().unwrap();
        assert_eq!(all.len(), 2);

        let Json(filtered) = session_messages(State(state), Path(ours)).await.ok().unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].content, "mine");
    }

    #[tokio::test]
    async fn test_api_error_hides_details() {
        let response = ApiError::from(anyhow::anyhow!("connection refused")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Failed to fetch messages");
    }
}
