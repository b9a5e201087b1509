//! Session management endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::game::{CreateSessionRequest, GameSessionView, SessionCreated},
    error::AppError,
    services::game_service,
    state::SharedState,
};

/// Routes under `/games`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", post(create_game))
        .route("/games/{pin}", get(get_game))
}

/// Create a live session for a quiz.
#[utoipa::path(
    post,
    path = "/games",
    tag = "games",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionCreated),
        (status = 400, description = "Quiz is not playable", body = crate::error::ErrorBody),
        (status = 404, description = "Quiz not found", body = crate::error::ErrorBody),
        (status = 503, description = "Quiz service unavailable", body = crate::error::ErrorBody),
    )
)]
pub async fn create_game(
    State(state): State<SharedState>,
    Valid(Json(request)): Valid<Json<CreateSessionRequest>>,
) -> Result<Json<SessionCreated>, AppError> {
    let created = game_service::create_session(&state, request).await?;
    Ok(Json(created))
}

/// Snapshot of a session by its join pin.
#[utoipa::path(
    get,
    path = "/games/{pin}",
    tag = "games",
    params(("pin" = String, Path, description = "Session join pin")),
    responses(
        (status = 200, description = "Session snapshot", body = GameSessionView),
        (status = 404, description = "No session with this pin", body = crate::error::ErrorBody),
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Result<Json<GameSessionView>, AppError> {
    let view = game_service::session_view(&state, &pin).await?;
    Ok(Json(view))
}
