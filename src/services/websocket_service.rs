use std::{sync::Arc, time::SystemTime};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        format_system_time,
        ws::{InboundMessage, OutboundEvent},
    },
    state::{
        SharedState,
        registry::{BoundIdentity, Connection, RoomKey, RoomKind, RoomSeat},
    },
    services::room_events,
};

/// Reasons an inbound frame is refused. Each one is reported to the sender as an
/// `error` event; the connection stays open.
#[derive(Debug, Error)]
enum RealtimeError {
    /// Claimed user differs from the identity bound at handshake.
    #[error("user id `{claimed}` does not match the authenticated user")]
    IdentityMismatch { claimed: String },
    /// Anonymous connection claims a user owned by an authenticated connection.
    #[error("user id `{claimed}` is bound to another authenticated connection")]
    IdentityInUse { claimed: String },
    /// Room-scoped message sent before joining a room of that kind.
    #[error("join a {0} room first")]
    NotInRoom(RoomKind),
    /// Match-scoped message names a different match than the joined one.
    #[error("not in match room `{0}`")]
    WrongMatch(String),
}

/// Handle the full lifecycle of one realtime connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket, identity: Option<BoundIdentity>) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, mut outbound_rx) = state.registry().connect(identity);
    let connection_id = connection.id();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let user_id = connection.identity().map(|identity| identity.user_id.clone());
    info!(id = %connection_id, user = ?user_id, "realtime client connected");
    room_events::send_to_connection(
        &connection,
        &OutboundEvent::Connected {
            connection_id,
            user_id,
        },
    );

    loop {
        let message = tokio::select! {
            _ = connection.terminated() => {
                info!(id = %connection_id, "terminating unresponsive connection");
                connection.send(Message::Close(None));
                break;
            }
            message = receiver.next() => message,
        };

        let Some(message) = message else {
            break;
        };
        connection.mark_alive();

        match message {
            Ok(Message::Text(text)) => {
                debug!(id = %connection_id, payload = %text.as_str(), "received realtime frame");
                match InboundMessage::from_json_str(text.as_str()) {
                    Ok(inbound) => {
                        let kind = inbound.kind();
                        if let Err(err) = dispatch(&state, &connection, inbound) {
                            warn!(id = %connection_id, kind, error = %err, "rejected realtime message");
                            room_events::send_to_connection(
                                &connection,
                                &OutboundEvent::error(err.to_string()),
                            );
                        }
                    }
                    Err(err) => {
                        warn!(id = %connection_id, error = %err, "failed to parse or validate realtime message");
                        room_events::send_to_connection(
                            &connection,
                            &OutboundEvent::error(err.to_string()),
                        );
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                connection.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(id = %connection_id, "realtime client closed");
                connection.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(id = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    release(&state, connection_id);
    info!(id = %connection_id, "realtime client disconnected");
    finalize(writer_task, connection).await;
}

/// Route a validated message to its handler.
fn dispatch(
    state: &SharedState,
    connection: &Connection,
    message: InboundMessage,
) -> Result<(), RealtimeError> {
    check_identity(state, connection, message.claimed_user_id())?;

    match message {
        InboundMessage::Join {
            session_id,
            user_id,
            user_name,
        } => {
            let room = RoomKey::session(session_id.clone());
            take_seat(state, connection, room.clone(), &user_id, &user_name);
            room_events::send_to_room(
                state,
                &room,
                &OutboundEvent::UserJoined {
                    session_id,
                    user_id,
                    user_name,
                },
                Some(connection.id()),
            );
            Ok(())
        }
        InboundMessage::TeamJoin {
            team_id,
            user_id,
            user_name,
        } => {
            let room = RoomKey::team(team_id.clone());
            take_seat(state, connection, room.clone(), &user_id, &user_name);
            room_events::send_to_room(
                state,
                &room,
                &OutboundEvent::TeamMemberJoined {
                    team_id,
                    user_id,
                    user_name,
                },
                Some(connection.id()),
            );
            Ok(())
        }
        InboundMessage::MatchJoin {
            match_id,
            user_id,
            user_name,
        } => {
            let match_id = normalize_match_id(&match_id);
            let room = RoomKey::match_room(match_id.clone());
            take_seat(state, connection, room.clone(), &user_id, &user_name);
            room_events::send_to_room(
                state,
                &room,
                &OutboundEvent::MatchParticipantJoined {
                    match_id,
                    user_id,
                    user_name,
                    participant_count: None,
                },
                Some(connection.id()),
            );
            Ok(())
        }
        InboundMessage::Chat { user_id, message } => {
            let seat = require_seat(state, connection, RoomKind::Session, &user_id)?;
            room_events::send_to_room(
                state,
                &seat.room,
                &OutboundEvent::Chat {
                    session_id: seat.room.id.clone(),
                    user_id,
                    user_name: seat.user_name,
                    message,
                    sent_at: format_system_time(SystemTime::now()),
                },
                None,
            );
            Ok(())
        }
        InboundMessage::TeamChat { user_id, message } => {
            let seat = require_seat(state, connection, RoomKind::Team, &user_id)?;
            room_events::send_to_room(
                state,
                &seat.room,
                &OutboundEvent::TeamChat {
                    team_id: seat.room.id.clone(),
                    user_id,
                    user_name: seat.user_name,
                    message,
                    sent_at: format_system_time(SystemTime::now()),
                },
                None,
            );
            Ok(())
        }
        InboundMessage::TeamLocation {
            user_id,
            latitude,
            longitude,
        } => {
            let seat = require_seat(state, connection, RoomKind::Team, &user_id)?;
            room_events::send_to_room(
                state,
                &seat.room,
                &OutboundEvent::TeamLocation {
                    team_id: seat.room.id.clone(),
                    user_id,
                    latitude,
                    longitude,
                },
                Some(connection.id()),
            );
            Ok(())
        }
        InboundMessage::TeamReady { user_id, is_ready } => {
            let seat = require_seat(state, connection, RoomKind::Team, &user_id)?;
            room_events::send_to_room(
                state,
                &seat.room,
                &OutboundEvent::TeamReadyUpdate {
                    team_id: seat.room.id.clone(),
                    user_id,
                    is_ready,
                },
                None,
            );
            Ok(())
        }
        InboundMessage::MatchScoreUpdate {
            match_id,
            user_id,
            score,
        } => {
            let seat = require_match_seat(state, connection, &match_id, &user_id)?;
            room_events::send_to_room(
                state,
                &seat.room,
                &OutboundEvent::MatchScoreUpdate {
                    match_id: seat.room.id.clone(),
                    user_id,
                    score,
                },
                Some(connection.id()),
            );
            Ok(())
        }
        InboundMessage::RelayHandoff {
            match_id,
            from_user_id,
            to_user_id,
        } => {
            let seat = require_match_seat(state, connection, &match_id, &from_user_id)?;
            room_events::send_to_room(
                state,
                &seat.room,
                &OutboundEvent::RelayHandoff {
                    match_id: seat.room.id.clone(),
                    from_user_id,
                    to_user_id,
                },
                Some(connection.id()),
            );
            Ok(())
        }
    }
}

/// Reject messages acting on behalf of someone else.
fn check_identity(
    state: &SharedState,
    connection: &Connection,
    claimed: &str,
) -> Result<(), RealtimeError> {
    match connection.identity() {
        Some(identity) if identity.user_id != claimed => Err(RealtimeError::IdentityMismatch {
            claimed: claimed.to_string(),
        }),
        Some(_) => Ok(()),
        None if state.registry().is_user_bound(claimed, connection.id()) => {
            Err(RealtimeError::IdentityInUse {
                claimed: claimed.to_string(),
            })
        }
        None => Ok(()),
    }
}

fn take_seat(
    state: &SharedState,
    connection: &Connection,
    room: RoomKey,
    user_id: &str,
    user_name: &str,
) {
    let seat = RoomSeat {
        room,
        user_id: user_id.to_string(),
        user_name: user_name.to_string(),
    };
    debug!(id = %connection.id(), room = %seat.room, "joining room");
    if let Some(previous) = state.registry().join(connection.id(), seat) {
        room_events::announce_departure(state, &previous);
    }
}

/// The seat of `kind` held by this connection, which must have been taken as `user_id`.
fn require_seat(
    state: &SharedState,
    connection: &Connection,
    kind: RoomKind,
    user_id: &str,
) -> Result<RoomSeat, RealtimeError> {
    let seat = state
        .registry()
        .seat(connection.id(), kind)
        .ok_or(RealtimeError::NotInRoom(kind))?;
    if seat.user_id != user_id {
        return Err(RealtimeError::IdentityMismatch {
            claimed: user_id.to_string(),
        });
    }
    Ok(seat)
}

fn require_match_seat(
    state: &SharedState,
    connection: &Connection,
    match_id: &str,
    user_id: &str,
) -> Result<RoomSeat, RealtimeError> {
    let seat = require_seat(state, connection, RoomKind::Match, user_id)?;
    let match_id = normalize_match_id(match_id);
    if seat.room.id == match_id {
        Ok(seat)
    } else {
        Err(RealtimeError::WrongMatch(match_id))
    }
}

/// Match rooms are keyed by the canonical uuid text so HTTP broadcasts reach them.
fn normalize_match_id(raw: &str) -> String {
    match Uuid::parse_str(raw.trim()) {
        Ok(id) => id.to_string(),
        Err(_) => raw.trim().to_string(),
    }
}

/// Evict a connection from the registry and tell its rooms. Safe to call twice.
fn release(state: &SharedState, connection_id: Uuid) {
    for seat in state.registry().disconnect(connection_id) {
        room_events::announce_departure(state, &seat);
    }
}

/// Ping live connections and evict the ones that missed the previous round.
pub fn sweep_liveness(state: &SharedState) -> usize {
    let stale = state.registry().sweep_liveness();
    for connection_id in &stale {
        info!(id = %connection_id, "connection missed heartbeat");
        release(state, *connection_id);
    }
    stale.len()
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, connection: Arc<Connection>) {
    drop(connection);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn identity(user: &str) -> Option<BoundIdentity> {
        Some(BoundIdentity {
            user_id: user.into(),
            user_name: user.to_uppercase(),
        })
    }

    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                events.push(serde_json::from_str(text.as_str()).expect("json event"));
            }
        }
        events
    }

    fn inbound(json: &str) -> InboundMessage {
        InboundMessage::from_json_str(json).expect("valid message")
    }

    #[test]
    fn presence_skips_sender_and_chat_reaches_everyone() {
        let state = AppState::new(AppConfig::default());
        let (alice, mut alice_rx) = state.registry().connect(identity("alice"));
        let (bob, mut bob_rx) = state.registry().connect(identity("bob"));

        dispatch(
            &state,
            &alice,
            inbound(r#"{"type":"team_join","teamId":"t1","userId":"alice","userName":"Alice"}"#),
        )
        .expect("alice joins");
        dispatch(
            &state,
            &bob,
            inbound(r#"{"type":"team_join","teamId":"t1","userId":"bob","userName":"Bob"}"#),
        )
        .expect("bob joins");

        let alice_events = drain(&mut alice_rx);
        assert_eq!(alice_events.len(), 1);
        assert_eq!(alice_events[0]["type"], "team_member_joined");
        assert_eq!(alice_events[0]["userId"], "bob");
        assert!(drain(&mut bob_rx).is_empty());

        dispatch(
            &state,
            &bob,
            inbound(r#"{"type":"team_chat","userId":"bob","message":"hi"}"#),
        )
        .expect("chat");
        assert_eq!(drain(&mut alice_rx)[0]["message"], "hi");
        let echoed = drain(&mut bob_rx);
        assert_eq!(echoed[0]["type"], "team_chat");
        assert_eq!(echoed[0]["userName"], "Bob");
    }

    #[test]
    fn spoofed_user_id_is_rejected() {
        let state = AppState::new(AppConfig::default());
        let (alice, _alice_rx) = state.registry().connect(identity("alice"));
        let (anonymous, _anon_rx) = state.registry().connect(None);

        let spoof = inbound(r#"{"type":"team_ready","userId":"bob","isReady":true}"#);
        assert!(matches!(
            dispatch(&state, &alice, spoof),
            Err(RealtimeError::IdentityMismatch { .. })
        ));

        let hijack =
            inbound(r#"{"type":"join","sessionId":"s1","userId":"alice","userName":"Alice"}"#);
        assert!(matches!(
            dispatch(&state, &anonymous, hijack),
            Err(RealtimeError::IdentityInUse { .. })
        ));
        assert!(state.registry().seat(anonymous.id(), RoomKind::Session).is_none());
    }

    #[test]
    fn room_messages_must_come_from_the_seated_user() {
        let state = AppState::new(AppConfig::default());
        let (xavier, _xavier_rx) = state.registry().connect(None);
        let (yuki, mut yuki_rx) = state.registry().connect(None);
        for (connection, json) in [
            (
                &xavier,
                r#"{"type":"join","sessionId":"s","userId":"x","userName":"Xavier"}"#,
            ),
            (
                &yuki,
                r#"{"type":"join","sessionId":"s","userId":"y","userName":"Yuki"}"#,
            ),
            (
                &xavier,
                r#"{"type":"team_join","teamId":"t","userId":"x","userName":"Xavier"}"#,
            ),
        ] {
            dispatch(&state, connection, inbound(json)).expect("join");
        }
        drain(&mut yuki_rx);

        for json in [
            r#"{"type":"chat","userId":"y","message":"it was me"}"#,
            r#"{"type":"team_chat","userId":"y","message":"it was me"}"#,
            r#"{"type":"team_ready","userId":"y","isReady":true}"#,
            r#"{"type":"team_location","userId":"y","latitude":1.0,"longitude":2.0}"#,
        ] {
            assert!(matches!(
                dispatch(&state, &xavier, inbound(json)),
                Err(RealtimeError::IdentityMismatch { .. })
            ));
        }
        assert!(drain(&mut yuki_rx).is_empty());

        dispatch(
            &state,
            &xavier,
            inbound(r#"{"type":"chat","userId":"x","message":"hello"}"#),
        )
        .expect("own chat");
        let seen = drain(&mut yuki_rx);
        assert_eq!(seen[0]["userId"], "x");
        assert_eq!(seen[0]["userName"], "Xavier");
    }

    #[test]
    fn room_scoped_messages_require_membership() {
        let state = AppState::new(AppConfig::default());
        let (carol, _rx) = state.registry().connect(None);
        let result = dispatch(
            &state,
            &carol,
            inbound(r#"{"type":"chat","userId":"carol","message":"hello"}"#),
        );
        assert!(matches!(
            result,
            Err(RealtimeError::NotInRoom(RoomKind::Session))
        ));
    }

    #[test]
    fn switching_team_announces_departure() {
        let state = AppState::new(AppConfig::default());
        let (alice, _alice_rx) = state.registry().connect(identity("alice"));
        let (bob, mut bob_rx) = state.registry().connect(identity("bob"));

        for (connection, json) in [
            (
                &bob,
                r#"{"type":"team_join","teamId":"t1","userId":"bob","userName":"Bob"}"#,
            ),
            (
                &alice,
                r#"{"type":"team_join","teamId":"t1","userId":"alice","userName":"Alice"}"#,
            ),
            (
                &alice,
                r#"{"type":"team_join","teamId":"t2","userId":"alice","userName":"Alice"}"#,
            ),
        ] {
            dispatch(&state, connection, inbound(json)).expect("join");
        }

        let kinds: Vec<_> = drain(&mut bob_rx)
            .into_iter()
            .map(|event| event["type"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(kinds, ["team_member_joined", "user_left"]);
    }

    #[test]
    fn match_rooms_use_canonical_uuid() {
        let state = AppState::new(AppConfig::default());
        let (alice, _rx) = state.registry().connect(identity("alice"));
        let match_id = Uuid::new_v4();
        let upper = match_id.to_string().to_uppercase();

        dispatch(
            &state,
            &alice,
            inbound(&format!(
                r#"{{"type":"match_join","matchId":"{upper}","userId":"alice","userName":"Alice"}}"#
            )),
        )
        .expect("match join");

        let members = state
            .registry()
            .members(&RoomKey::match_room(match_id.to_string()));
        assert_eq!(members, vec![alice.id()]);
    }

    #[test]
    fn missed_heartbeat_evicts_and_announces() {
        let state = AppState::new(AppConfig::default());
        let (alice, _alice_rx) = state.registry().connect(identity("alice"));
        let (bob, mut bob_rx) = state.registry().connect(identity("bob"));
        for (connection, json) in [
            (
                &bob,
                r#"{"type":"join","sessionId":"s","userId":"bob","userName":"Bob"}"#,
            ),
            (
                &alice,
                r#"{"type":"join","sessionId":"s","userId":"alice","userName":"Alice"}"#,
            ),
        ] {
            dispatch(&state, connection, inbound(json)).expect("join");
        }
        drain(&mut bob_rx);

        assert_eq!(sweep_liveness(&state), 0);
        bob.mark_alive();
        assert_eq!(sweep_liveness(&state), 1);

        assert!(state.registry().connection(alice.id()).is_none());
        let events = drain(&mut bob_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "user_left");
        assert_eq!(events[0]["userId"], "alice");
    }
}
