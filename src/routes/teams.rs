use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::{
        scores::{ScoreHistoryResponse, TeamScoreUpdateResponse, UpdateTeamScoreRequest},
        votes::{CastBallotRequest, CastBallotResponse, CreateVoteRequest, VoteSummary},
    },
    error::AppError,
    routes::{
        auth::require_user,
        extract::{ApiJson, ApiPath},
    },
    services::{auth_service::CurrentUser, score_service, vote_service},
    state::SharedState,
};

/// Team votes and score ledger endpoints. Every route requires a bearer token.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/teams/{id}/votes", get(list_votes).post(create_vote))
        .route("/votes/{id}/ballots", post(cast_ballot))
        .route("/teams/{id}/score", post(update_team_score))
        .route("/teams/{id}/score/history", get(score_history))
        .route_layer(middleware::from_fn_with_state(state, require_user))
}

/// Open a vote for the team. Members only.
#[utoipa::path(
    post,
    path = "/teams/{id}/votes",
    tag = "votes",
    params(("id" = String, Path, description = "Team identifier")),
    request_body = CreateVoteRequest,
    responses(
        (status = 201, description = "Vote created", body = VoteSummary),
        (status = 403, description = "Caller is not a team member")
    ),
    security(("bearer" = []))
)]
pub async fn create_vote(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(team_id): ApiPath<String>,
    ApiJson(payload): ApiJson<CreateVoteRequest>,
) -> Result<(StatusCode, Json<VoteSummary>), AppError> {
    let vote = vote_service::create_vote(&state, &user, &team_id, payload).await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

/// Votes of the team with their tallies, newest first. Members only.
#[utoipa::path(
    get,
    path = "/teams/{id}/votes",
    tag = "votes",
    params(("id" = String, Path, description = "Team identifier")),
    responses((status = 200, description = "Votes with tallies", body = [VoteSummary])),
    security(("bearer" = []))
)]
pub async fn list_votes(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(team_id): ApiPath<String>,
) -> Result<Json<Vec<VoteSummary>>, AppError> {
    Ok(Json(vote_service::list_votes(&state, &user, &team_id).await?))
}

/// Cast the caller's single ballot.
#[utoipa::path(
    post,
    path = "/votes/{id}/ballots",
    tag = "votes",
    params(("id" = Uuid, Path, description = "Vote identifier")),
    request_body = CastBallotRequest,
    responses((status = 200, description = "Ballot recorded", body = CastBallotResponse)),
    security(("bearer" = []))
)]
pub async fn cast_ballot(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(vote_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<CastBallotRequest>,
) -> Result<Json<CastBallotResponse>, AppError> {
    Ok(Json(
        vote_service::cast_ballot(&state, &user, vote_id, payload).await?,
    ))
}

/// Apply a delta to the team score.
#[utoipa::path(
    post,
    path = "/teams/{id}/score",
    tag = "scores",
    params(("id" = String, Path, description = "Team identifier")),
    request_body = UpdateTeamScoreRequest,
    responses((status = 200, description = "Score updated", body = TeamScoreUpdateResponse)),
    security(("bearer" = []))
)]
pub async fn update_team_score(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(team_id): ApiPath<String>,
    ApiJson(payload): ApiJson<UpdateTeamScoreRequest>,
) -> Result<Json<TeamScoreUpdateResponse>, AppError> {
    Ok(Json(
        score_service::update_team_score(&state, &user, &team_id, payload).await?,
    ))
}

/// Ledger of the team and whether it replays to the stored score. Members only.
#[utoipa::path(
    get,
    path = "/teams/{id}/score/history",
    tag = "scores",
    params(("id" = String, Path, description = "Team identifier")),
    responses((status = 200, description = "Ledger, newest first", body = ScoreHistoryResponse)),
    security(("bearer" = []))
)]
pub async fn score_history(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    ApiPath(team_id): ApiPath<String>,
) -> Result<Json<ScoreHistoryResponse>, AppError> {
    Ok(Json(
        score_service::score_history(&state, &user, &team_id).await?,
    ))
}
