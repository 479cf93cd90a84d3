use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check payloads.
pub mod health;
/// Match lobby, lifecycle and ranking payloads.
pub mod matches;
/// Relay assignment and hand-off payloads.
pub mod relay;
/// Team score ledger payloads.
pub mod scores;
/// Spectator stream events.
pub mod sse;
/// Custom field validators.
pub mod validation;
/// Team vote payloads.
pub mod votes;
/// WebSocket inbound messages and outbound events.
pub mod ws;

/// Render a timestamp as RFC 3339 for API payloads.
pub fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

fn format_optional_time(time: Option<SystemTime>) -> Option<String> {
    time.map(format_system_time)
}
