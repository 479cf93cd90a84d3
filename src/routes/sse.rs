use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError, routes::extract::ApiPath, services::sse_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/matches/{id}",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Match to spectate")),
    responses(
        (status = 200, description = "Spectator SSE stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown match")
    )
)]
/// Stream the events of one match, starting with a snapshot of its roster.
pub async fn match_stream(
    State(state): State<SharedState>,
    ApiPath(match_id): ApiPath<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = sse_service::subscribe_match(&state, match_id).await?;
    info!(match_id = %match_id, "new spectator SSE connection");
    Ok(sse_service::to_sse_stream(subscription))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/matches/{id}", get(match_stream))
}
