use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::public::{HostRankingResponse, ParticipantsResponse, ProgressResponse},
    error::AppError,
    services::public_service,
    state::{
        SharedState,
        model::{RankingChangeData, RankingSnapshot},
    },
};

/// Public read-only endpoints that expose the relayed leaderboard.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/public/participants", get(get_participants))
        .route("/public/ranking", get(get_ranking))
        .route("/public/ranking/{activity_id}", get(get_activity_ranking))
        .route("/public/host-ranking", get(get_host_ranking))
        .route("/public/progress", get(get_progress))
}

/// Return the ranked participants currently known.
pub async fn get_participants(State(state): State<SharedState>) -> Json<ParticipantsResponse> {
    Json(public_service::get_participants(&state))
}

/// Return the latest ranking movement.
pub async fn get_ranking(State(state): State<SharedState>) -> Json<RankingChangeData> {
    Json(public_service::get_ranking(&state))
}

/// Return the ranking recorded for one activity.
pub async fn get_activity_ranking(
    State(state): State<SharedState>,
    Path(activity_id): Path<String>,
) -> Result<Json<RankingSnapshot>, AppError> {
    let payload = public_service::get_activity_ranking(&state, &activity_id)?;
    Ok(Json(payload))
}

/// Return the host before/after view.
pub async fn get_host_ranking(State(state): State<SharedState>) -> Json<HostRankingResponse> {
    Json(public_service::get_host_ranking(&state))
}

/// Return how many participants answered the current activity.
pub async fn get_progress(State(state): State<SharedState>) -> Json<ProgressResponse> {
    Json(public_service::get_progress(&state))
}
