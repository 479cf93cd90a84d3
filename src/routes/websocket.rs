use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade, ws::rejection::WebSocketUpgradeRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    error::AppError,
    services::{auth_service, websocket_service},
    state::{SharedState, registry::BoundIdentity},
};

/// Query string accepted by the upgrade endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Bearer credential for clients that cannot set headers.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "realtime",
    params(("token" = Option<String>, Query, description = "Bearer credential, alternative to the Authorization header")),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "Credential presented but invalid")
    )
)]
/// Upgrade to a realtime session. Anonymous clients are accepted; a presented
/// credential must be valid.
pub async fn ws_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let token = auth_service::bearer_token(&headers).or(query.token);
    let identity = match token {
        Some(token) => match auth_service::authenticate(&state, &token).await {
            Ok(user) => Some(BoundIdentity {
                user_id: user.id,
                user_name: user.name,
            }),
            Err(err) => {
                warn!(error = %err, "rejecting websocket handshake");
                return Err(err.into());
            }
        },
        None => None,
    };

    // Credentials are checked before the upgrade headers so a bad token is always a 401.
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let shared_state = state.clone();
    Ok(ws
        .on_upgrade(move |socket| websocket_service::handle_socket(shared_state, socket, identity))
        .into_response())
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
