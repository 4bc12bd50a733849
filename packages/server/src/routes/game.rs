use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::models::{action::ActionKind, player::Player, settings::GameSettings};
use crate::services::action_service::ActionRejection;
use crate::services::game_service::{self, GameServiceError};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub players: Vec<PlayerEntry>,
    #[serde(default)]
    pub settings: GameSettings,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionRequest {
    pub actor_id: String,
    pub target_id: String,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/create", post(create_game_handler))
        .route("/:gameid", delete(delete_game_handler))
        .nest(
            "/:gameid",
            Router::new()
                .route("/start", post(start_game_handler))
                .route("/state", get(get_game_state_handler))
                .route("/actions/:kind", post(submit_action_handler))
                .route("/phase/next", post(advance_phase_handler))
                .route("/votes", get(vote_distribution_handler))
                .route("/check-winner", get(check_winner_handler)),
        )
        .with_state(state)
}

fn error_status(error: &GameServiceError) -> StatusCode {
    match error {
        GameServiceError::GameNotFound(_) => StatusCode::NOT_FOUND,
        GameServiceError::InvalidState(_) | GameServiceError::InvalidSettings(_) => {
            StatusCode::BAD_REQUEST
        }
        GameServiceError::RoleAssignment(_) | GameServiceError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn rejection_status(rejection: &ActionRejection) -> StatusCode {
    match rejection {
        ActionRejection::WrongRole { .. } => StatusCode::FORBIDDEN,
        ActionRejection::ActorNotFound(_) | ActionRejection::TargetNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ActionRejection::InvalidPhase { .. }
        | ActionRejection::ActorDead
        | ActionRejection::TargetDead(_)
        | ActionRejection::TargetAlive(_)
        | ActionRejection::TargetNotExecutedYesterday(_)
        | ActionRejection::FriendlyFire => StatusCode::BAD_REQUEST,
    }
}

fn error_response(error: GameServiceError) -> Response {
    let status = error_status(&error);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!("Request failed: {error}");
    }
    (status, Json(error.to_string())).into_response()
}

async fn create_game_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateGameRequest>,
) -> Response {
    let players = request
        .players
        .into_iter()
        .map(|entry| Player::new(entry.id, entry.name))
        .collect();
    match game_service::create_game(&state, players, request.settings).await {
        Ok(game) => (StatusCode::OK, Json(game)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn start_game_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Response {
    match game_service::start_game(&state, &game_id).await {
        Ok(game) => (StatusCode::OK, Json(game.public_view())).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_game_state_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Response {
    match game_service::get_game_state(&state, &game_id).await {
        Ok(game) => (StatusCode::OK, Json(game.public_view())).into_response(),
        Err(e) => error_response(e),
    }
}

async fn submit_action_handler(
    State(state): State<AppState>,
    Path((game_id, kind)): Path<(String, ActionKind)>,
    Json(request): Json<ActionRequest>,
) -> Response {
    let result = game_service::submit_action(
        &state,
        &game_id,
        &request.actor_id,
        &request.target_id,
        kind,
    )
    .await;
    match result {
        Ok(outcome) => {
            let status = outcome
                .rejection
                .as_ref()
                .map_or(StatusCode::OK, rejection_status);
            (status, Json(outcome)).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn advance_phase_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Response {
    match game_service::advance_phase(&state, &game_id).await {
        Ok(game) => (StatusCode::OK, Json(game.public_view())).into_response(),
        Err(e) => error_response(e),
    }
}

async fn vote_distribution_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Response {
    match game_service::vote_distribution(&state, &game_id).await {
        Ok(tally) => (StatusCode::OK, Json(tally)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn check_winner_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Response {
    match game_service::check_winner(&state, &game_id).await {
        Ok(check) => (StatusCode::OK, Json(check)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_game_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Response {
    match game_service::delete_game(&state, &game_id).await {
        Ok(()) => (StatusCode::OK, Json("Game deleted".to_string())).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;
    use crate::utils::test_setup::{game_with_roles, test_state};
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[test]
    fn rejections_map_to_status_codes() {
        assert_eq!(
            rejection_status(&ActionRejection::WrongRole {
                kind: ActionKind::Attack,
                role: Role::Werewolf
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            rejection_status(&ActionRejection::TargetNotFound("9".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            rejection_status(&ActionRejection::FriendlyFire),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&GameServiceError::GameNotFound("g".to_string())),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_check_winner() {
        let harness = test_state(1);
        let game = game_with_roles(&[Role::Werewolf, Role::Villager, Role::Villager]);
        harness.state.repository.save(&game).unwrap();
        let app = routes(harness.state.clone());

        let request = Request::builder()
            .method("GET")
            .uri(format!("/{}/check-winner", game.id))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
