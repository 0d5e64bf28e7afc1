//! Session bootstrap and health HTTP routes (§6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::state::AppState;
use crate::ws;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/session", axum::routing::post(create_session))
        .route("/session/:id", get(get_session))
        .route("/health", get(health))
        .route("/ws", get(ws::upgrade))
        .with_state(state)
}

#[derive(Serialize)]
struct CreateSessionResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
}

async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = Uuid::new_v4().to_string();
    let session = state.store.create_session(session_id, Utc::now());
    info!(session_id = %session.id, "session created");
    (
        StatusCode::OK,
        Json(CreateSessionResponse {
            session_id: session.id,
        }),
    )
}

#[derive(Serialize)]
struct SessionView {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "hasController")]
    has_controller: bool,
    #[serde(rename = "hasOperator")]
    has_operator: bool,
    #[serde(rename = "createdAt")]
    created_at: chrono::DateTime<Utc>,
    #[serde(rename = "expiresAt")]
    expires_at: chrono::DateTime<Utc>,
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_session(&id, Utc::now()) {
        Ok(session) => (
            StatusCode::OK,
            Json(SessionView {
                session_id: session.id,
                has_controller: session.controller.is_some(),
                has_operator: session.operator.is_some(),
                created_at: session.created_at,
                expires_at: session.expires_at,
            }),
        )
            .into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp_millis(),
    })
}
