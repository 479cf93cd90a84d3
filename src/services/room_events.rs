//! Fan-out helpers: serialize an [`OutboundEvent`] once and hand it to every member of a room.

use axum::extract::ws::{Message, Utf8Bytes};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{sse::ServerEvent, ws::OutboundEvent},
    state::{
        SharedState,
        registry::{Connection, ConnectionId, RoomKey, RoomKind, RoomSeat},
    },
};

/// Broadcast `event` to `room`, skipping `excluding` when given.
///
/// Match room events are mirrored onto the spectator SSE hub.
pub fn send_to_room(
    state: &SharedState,
    room: &RoomKey,
    event: &OutboundEvent,
    excluding: Option<ConnectionId>,
) {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(room = %room, kind = event.kind(), error = %err, "failed to serialize room event");
            return;
        }
    };

    if room.kind == RoomKind::Match {
        if let Ok(match_id) = Uuid::parse_str(&room.id) {
            state.spectators().broadcast(ServerEvent {
                match_id,
                event: Some(event.kind().to_string()),
                data: payload.clone(),
            });
        }
    }

    let delivered = state
        .registry()
        .broadcast(room, Utf8Bytes::from(payload), excluding);
    debug!(room = %room, kind = event.kind(), delivered, "room event dispatched");
}

/// Broadcast to the room of a persisted match.
pub fn send_to_match(state: &SharedState, match_id: Uuid, event: &OutboundEvent) {
    send_to_room(state, &RoomKey::match_room(match_id.to_string()), event, None);
}

/// Broadcast to a team room.
pub fn send_to_team(state: &SharedState, team_id: &str, event: &OutboundEvent) {
    send_to_room(state, &RoomKey::team(team_id), event, None);
}

/// Tell the rest of a room that a seat was vacated.
pub fn announce_departure(state: &SharedState, seat: &RoomSeat) {
    let event = OutboundEvent::UserLeft {
        room_type: seat.room.kind.to_string(),
        room_id: seat.room.id.clone(),
        user_id: seat.user_id.clone(),
        user_name: seat.user_name.clone(),
    };
    send_to_room(state, &seat.room, &event, None);
}

/// Serialize a payload and push it onto a single connection.
pub fn send_to_connection(connection: &Connection, event: &OutboundEvent) {
    match serde_json::to_string(event) {
        Ok(payload) => {
            if !connection.send(Message::Text(payload.into())) {
                debug!(id = %connection.id(), kind = event.kind(), "writer gone; event dropped");
            }
        }
        Err(err) => warn!(kind = event.kind(), error = %err, "failed to serialize event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::registry::Registry;

    #[test]
    fn direct_events_reach_the_connection_and_tolerate_a_closed_writer() {
        let registry = Registry::new();
        let (connection, mut rx) = registry.connect(None);

        send_to_connection(&connection, &OutboundEvent::error("slow down"));
        let Ok(Message::Text(text)) = rx.try_recv() else {
            panic!("expected a text frame");
        };
        let body: serde_json::Value = serde_json::from_str(&text).expect("json frame");
        assert_eq!(body["type"], "error");
        assert_eq!(body["message"], "slow down");

        drop(rx);
        send_to_connection(&connection, &OutboundEvent::error("nobody listening"));
        assert!(!connection.send(Message::Text("late".into())));
    }
}
