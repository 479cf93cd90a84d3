/// Bearer credential resolution.
pub mod auth_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Match lobby, lifecycle and ranking.
pub mod match_service;
/// Relay segment assignment and hand-off.
pub mod relay_service;
/// Serialization and fan-out of realtime events.
pub mod room_events;
/// Team score ledger.
pub mod score_service;
/// Spectator server-sent events streams.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Team consensus votes.
pub mod vote_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
