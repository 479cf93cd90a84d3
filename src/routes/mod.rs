use axum::Router;

use crate::state::SharedState;

/// Bearer authentication middleware.
pub mod auth;
/// Swagger UI and OpenAPI document routes.
pub mod docs;
/// Extractors answering malformed input with the JSON error body.
pub mod extract;
/// Health check route.
pub mod health;
/// Match and relay routes.
pub mod matches;
/// Spectator SSE route.
pub mod sse;
/// Team vote and score routes.
pub mod teams;
/// WebSocket upgrade route.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(websocket::router())
        .merge(matches::router(state.clone()))
        .merge(teams::router(state.clone()));

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
