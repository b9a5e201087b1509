//! OpenAPI document assembly.

use utoipa::OpenApi;

use crate::{dto, error, routes, state};

/// OpenAPI description of the HTTP surface.
#[derive(OpenApi)]
#[openapi(
    paths(
        routes::game::create_game,
        routes::game::get_game,
        routes::health::healthcheck,
    ),
    components(schemas(
        dto::game::CreateSessionRequest,
        dto::game::SessionCreated,
        dto::game::GameSessionView,
        dto::game::ParticipantSummary,
        dto::game::LeaderboardRow,
        dto::game::QuestionPayload,
        dto::game::AnswerChoice,
        dto::health::HealthResponse,
        error::ErrorBody,
        state::state_machine::SessionState,
    )),
    tags(
        (name = "games", description = "Live quiz session management"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;
