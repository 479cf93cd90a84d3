use axum::{
    Extension, Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::{
        matches::{
            CreateMatchRequest, JoinByCodeRequest, MatchSummary, RankingResponse,
            UpdateScoreRequest,
        },
        relay::{AssignSegmentsRequest, HandoffRequest, RelayStatusResponse},
    },
    error::AppError,
    routes::{
        auth::require_user,
        extract::{ApiJson, ApiPath},
    },
    services::{auth_service::CurrentUser, match_service, relay_service},
    state::SharedState,
};

/// Match lifecycle and relay endpoints. Every route requires a bearer token.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/matches", post(create_match))
        .route("/matches/join", post(join_by_code))
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/join", post(join_match))
        .route("/matches/{id}/start", post(start_match))
        .route("/matches/{id}/begin", post(begin_match))
        .route("/matches/{id}/recover", post(recover_match))
        .route("/matches/{id}/finish", post(finish_match))
        .route("/matches/{id}/score", put(update_score))
        .route("/matches/{id}/ranking", get(get_ranking))
        .route("/matches/{id}/relay", get(relay_status))
        .route("/matches/{id}/relay/assign", post(assign_segments))
        .route("/matches/{id}/relay/handoff", post(relay_handoff))
        .route_layer(middleware::from_fn_with_state(state, require_user))
}

/// Open a new match lobby.
#[utoipa::path(
    post,
    path = "/matches",
    tag = "matches",
    request_body = CreateMatchRequest,
    responses(
        (status = 201, description = "Match created", body = MatchSummary),
        (status = 404, description = "Unknown game")
    ),
    security(("bearer" = []))
)]
pub async fn create_match(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(payload): ApiJson<CreateMatchRequest>,
) -> Result<(StatusCode, Json<MatchSummary>), AppError> {
    let summary = match_service::create_match(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Match with its roster.
#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Match and roster", body = MatchSummary)),
    security(("bearer" = []))
)]
pub async fn get_match(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(match_service::get_match(&state, id).await?))
}

/// Join a lobby using its access code.
#[utoipa::path(
    post,
    path = "/matches/join",
    tag = "matches",
    request_body = JoinByCodeRequest,
    responses((status = 200, description = "Joined", body = MatchSummary)),
    security(("bearer" = []))
)]
pub async fn join_by_code(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(payload): ApiJson<JoinByCodeRequest>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(
        match_service::join_by_code(&state, &user, payload).await?,
    ))
}

/// Join a lobby by id.
#[utoipa::path(
    post,
    path = "/matches/{id}/join",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Joined", body = MatchSummary)),
    security(("bearer" = []))
)]
pub async fn join_match(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(match_service::join_match(&state, &user, id).await?))
}

/// Start the countdown. Creator only.
#[utoipa::path(
    post,
    path = "/matches/{id}/start",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Countdown started", body = MatchSummary)),
    security(("bearer" = []))
)]
pub async fn start_match(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(match_service::start_match(&state, &user, id).await?))
}

/// Signal that the countdown elapsed. Creator only.
#[utoipa::path(
    post,
    path = "/matches/{id}/begin",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Match playing", body = MatchSummary)),
    security(("bearer" = []))
)]
pub async fn begin_match(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(match_service::begin_match(&state, &user, id).await?))
}

/// Force a stalled countdown into play.
#[utoipa::path(
    post,
    path = "/matches/{id}/recover",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match playing", body = MatchSummary),
        (status = 400, description = "Countdown has not timed out yet")
    ),
    security(("bearer" = []))
)]
pub async fn recover_match(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(match_service::recover_match(&state, &user, id).await?))
}

/// Freeze scores and record the final ranking. Creator or participant.
#[utoipa::path(
    post,
    path = "/matches/{id}/finish",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Final ranking", body = RankingResponse)),
    security(("bearer" = []))
)]
pub async fn finish_match(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<RankingResponse>, AppError> {
    Ok(Json(match_service::finish_match(&state, &user, id).await?))
}

/// Overwrite the caller's score.
#[utoipa::path(
    put,
    path = "/matches/{id}/score",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = UpdateScoreRequest,
    responses((status = 200, description = "Updated ranking", body = RankingResponse)),
    security(("bearer" = []))
)]
pub async fn update_score(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateScoreRequest>,
) -> Result<Json<RankingResponse>, AppError> {
    Ok(Json(
        match_service::update_score(&state, &user, id, payload.score).await?,
    ))
}

/// Live ranking, or the final one once the match finished.
#[utoipa::path(
    get,
    path = "/matches/{id}/ranking",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Current ranking", body = RankingResponse)),
    security(("bearer" = []))
)]
pub async fn get_ranking(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<RankingResponse>, AppError> {
    Ok(Json(match_service::get_ranking(&state, id).await?))
}

/// Segment assignments and relay progress.
#[utoipa::path(
    get,
    path = "/matches/{id}/relay",
    tag = "relay",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Relay progress", body = RelayStatusResponse)),
    security(("bearer" = []))
)]
pub async fn relay_status(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<RelayStatusResponse>, AppError> {
    Ok(Json(relay_service::get_status(&state, id).await?))
}

/// Distribute segments round-robin. Creator only.
#[utoipa::path(
    post,
    path = "/matches/{id}/relay/assign",
    tag = "relay",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = AssignSegmentsRequest,
    responses((status = 200, description = "Segments assigned", body = RelayStatusResponse)),
    security(("bearer" = []))
)]
pub async fn assign_segments(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<Uuid>,
    payload: Result<Option<Json<AssignSegmentsRequest>>, JsonRejection>,
) -> Result<Json<RelayStatusResponse>, AppError> {
    let request = payload?.map(|Json(request)| request).unwrap_or_default();
    Ok(Json(
        relay_service::assign_segments(&state, &user, id, request).await?,
    ))
}

/// Pass the baton to another participant.
#[utoipa::path(
    post,
    path = "/matches/{id}/relay/handoff",
    tag = "relay",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = HandoffRequest,
    responses(
        (status = 200, description = "Hand-off recorded", body = RelayStatusResponse),
        (status = 404, description = "Target is not a participant")
    ),
    security(("bearer" = []))
)]
pub async fn relay_handoff(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<HandoffRequest>,
) -> Result<Json<RelayStatusResponse>, AppError> {
    Ok(Json(
        relay_service::handoff(&state, &user, id, payload).await?,
    ))
}
