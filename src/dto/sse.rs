use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug)]
/// Match room event mirrored onto the spectator SSE streams.
pub struct ServerEvent {
    /// Match whose room emitted the event.
    pub match_id: Uuid,
    /// SSE event name; the client default when `None`.
    pub event: Option<String>,
    /// JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(match_id: Uuid, event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            match_id,
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}
