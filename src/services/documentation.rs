use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Arena Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::match_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::matches::create_match,
        crate::routes::matches::get_match,
        crate::routes::matches::join_by_code,
        crate::routes::matches::join_match,
        crate::routes::matches::start_match,
        crate::routes::matches::begin_match,
        crate::routes::matches::recover_match,
        crate::routes::matches::finish_match,
        crate::routes::matches::update_score,
        crate::routes::matches::get_ranking,
        crate::routes::matches::relay_status,
        crate::routes::matches::assign_segments,
        crate::routes::matches::relay_handoff,
        crate::routes::teams::create_vote,
        crate::routes::teams::list_votes,
        crate::routes::teams::cast_ballot,
        crate::routes::teams::update_team_score,
        crate::routes::teams::score_history,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::InboundMessage,
            crate::dto::ws::OutboundEvent,
            crate::dao::models::MatchStatus,
            crate::dao::models::RelayStatus,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "matches", description = "Match lobby, lifecycle and ranking"),
        (name = "relay", description = "Relay segment assignment and hand-off"),
        (name = "votes", description = "Team consensus votes"),
        (name = "scores", description = "Team score ledger"),
        (name = "sse", description = "Spectator server-sent events"),
        (name = "realtime", description = "WebSocket rooms for sessions, teams and matches"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme referenced by authenticated routes.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
