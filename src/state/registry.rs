//! In-memory index of live realtime connections and the rooms they joined.
//!
//! The registry only tracks membership and delivers already-serialized frames.
//! Deciding which events to emit on join, leave or disconnect is left to the
//! service layer.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::DashMap;
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

/// Identifier assigned to a connection at handshake time.
pub type ConnectionId = Uuid;

/// Kind of room a connection can belong to. A connection holds at most one room per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKind {
    /// Free-form session chat.
    Session,
    /// Team channel.
    Team,
    /// Match channel.
    Match,
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoomKind::Session => "session",
            RoomKind::Team => "team",
            RoomKind::Match => "match",
        };
        f.write_str(label)
    }
}

/// Fully qualified room name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey {
    /// Room kind.
    pub kind: RoomKind,
    /// Session, team or match id.
    pub id: String,
}

impl RoomKey {
    /// Room of `kind` named `id`.
    pub fn new(kind: RoomKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Session room.
    pub fn session(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Session, id)
    }

    /// Team room.
    pub fn team(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Team, id)
    }

    /// Match room.
    pub fn match_room(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Match, id)
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Identity resolved from the handshake credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundIdentity {
    /// Authenticated user id.
    pub user_id: String,
    /// Authenticated display name.
    pub user_name: String,
}

/// Room a connection occupies, along with the user it announced itself as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSeat {
    /// Occupied room.
    pub room: RoomKey,
    /// User id given when joining.
    pub user_id: String,
    /// Display name given when joining.
    pub user_name: String,
}

/// Handle to a live connection.
pub struct Connection {
    id: ConnectionId,
    identity: Option<BoundIdentity>,
    tx: mpsc::UnboundedSender<Message>,
    alive: AtomicBool,
    terminate: Notify,
}

impl Connection {
    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Identity bound at handshake, if the client presented a valid credential.
    pub fn identity(&self) -> Option<&BoundIdentity> {
        self.identity.as_ref()
    }

    /// Queue a frame on the connection's writer. Never blocks.
    pub fn send(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Record that the peer answered since the last liveness sweep.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    /// Resolve once the connection has been asked to terminate.
    pub async fn terminated(&self) {
        self.terminate.notified().await;
    }

    fn request_termination(&self) {
        self.terminate.notify_one();
    }
}

/// Connection registry and room membership index.
#[derive(Default)]
pub struct Registry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    seats: DashMap<ConnectionId, HashMap<RoomKind, RoomSeat>>,
    rooms: DashMap<RoomKey, HashSet<ConnectionId>>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and hand back the receiving end of its outbound queue.
    pub fn connect(
        &self,
        identity: Option<BoundIdentity>,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        let connection = Arc::new(Connection {
            id: Uuid::new_v4(),
            identity,
            tx,
            alive: AtomicBool::new(true),
            terminate: Notify::new(),
        });
        self.connections.insert(connection.id, connection.clone());
        (connection, rx)
    }

    /// Remove a connection from every room. Returns the seats it held; empty if
    /// the connection was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> Vec<RoomSeat> {
        self.connections.remove(&id);
        let Some((_, seats)) = self.seats.remove(&id) else {
            return Vec::new();
        };

        let seats: Vec<RoomSeat> = seats.into_values().collect();
        for seat in &seats {
            self.remove_from_room(&seat.room, id);
        }
        seats
    }

    /// Place a connection in a room. When it already sat in another room of the
    /// same kind, that seat is vacated and returned.
    pub fn join(&self, id: ConnectionId, seat: RoomSeat) -> Option<RoomSeat> {
        if !self.connections.contains_key(&id) {
            return None;
        }

        let room = seat.room.clone();
        let previous = self
            .seats
            .entry(id)
            .or_default()
            .insert(room.kind, seat)
            .filter(|previous| previous.room != room);

        if let Some(previous) = &previous {
            self.remove_from_room(&previous.room, id);
        }
        self.rooms.entry(room).or_default().insert(id);
        previous
    }

    /// Vacate the seat of the given kind, if any.
    pub fn leave(&self, id: ConnectionId, kind: RoomKind) -> Option<RoomSeat> {
        let seat = self.seats.get_mut(&id)?.remove(&kind)?;
        self.remove_from_room(&seat.room, id);
        Some(seat)
    }

    /// Seat currently held by the connection for a room kind.
    pub fn seat(&self, id: ConnectionId, kind: RoomKind) -> Option<RoomSeat> {
        self.seats.get(&id)?.get(&kind).cloned()
    }

    /// Connection ids currently in the room.
    pub fn members(&self, room: &RoomKey) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Live connection with `id`, if any.
    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether any live connection other than `except` is bound to `user_id`.
    pub fn is_user_bound(&self, user_id: &str, except: ConnectionId) -> bool {
        self.connections.iter().any(|entry| {
            *entry.key() != except
                && entry
                    .value()
                    .identity()
                    .is_some_and(|identity| identity.user_id == user_id)
        })
    }

    /// Push a serialized frame to every member of `room`, optionally skipping one
    /// connection. Returns the number of queues the frame was handed to.
    pub fn broadcast(
        &self,
        room: &RoomKey,
        payload: Utf8Bytes,
        excluding: Option<ConnectionId>,
    ) -> usize {
        let mut delivered = 0;
        for id in self.members(room) {
            if Some(id) == excluding {
                continue;
            }
            let Some(connection) = self.connection(id) else {
                continue;
            };
            if connection.send(Message::Text(payload.clone())) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Ping every connection that answered the previous sweep and return those
    /// that did not. Stale connections are asked to terminate.
    pub fn sweep_liveness(&self) -> Vec<ConnectionId> {
        let mut stale = Vec::new();
        for entry in self.connections.iter() {
            let connection = entry.value();
            if connection.alive.swap(false, Ordering::Relaxed) {
                connection.send(Message::Ping(Default::default()));
            } else {
                connection.request_termination();
                stale.push(connection.id);
            }
        }
        stale
    }

    fn remove_from_room(&self, room: &RoomKey, id: ConnectionId) {
        let now_empty = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.remove(&id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seat(room: RoomKey, user: &str) -> RoomSeat {
        RoomSeat {
            room,
            user_id: user.into(),
            user_name: user.to_uppercase(),
        }
    }

    fn text_of(message: Message) -> String {
        match message {
            Message::Text(text) => text.to_string(),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn broadcast_reaches_room_members_only() {
        let registry = Registry::new();
        let (a, mut rx_a) = registry.connect(None);
        let (b, mut rx_b) = registry.connect(None);
        let (c, mut rx_c) = registry.connect(None);

        registry.join(a.id(), seat(RoomKey::team("t1"), "a"));
        registry.join(b.id(), seat(RoomKey::team("t1"), "b"));
        registry.join(c.id(), seat(RoomKey::team("t2"), "c"));

        let delivered = registry.broadcast(&RoomKey::team("t1"), "hello".into(), Some(a.id()));

        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(text_of(rx_b.try_recv().unwrap()), "hello");
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn joining_second_room_of_same_kind_leaves_first() {
        let registry = Registry::new();
        let (a, _rx) = registry.connect(None);

        assert_eq!(registry.join(a.id(), seat(RoomKey::team("t1"), "a")), None);
        let previous = registry.join(a.id(), seat(RoomKey::team("t2"), "a"));

        assert_eq!(previous.map(|seat| seat.room), Some(RoomKey::team("t1")));
        assert!(registry.members(&RoomKey::team("t1")).is_empty());
        assert_eq!(registry.members(&RoomKey::team("t2")), vec![a.id()]);
    }

    #[test]
    fn rooms_of_different_kinds_are_independent() {
        let registry = Registry::new();
        let (a, _rx) = registry.connect(None);

        registry.join(a.id(), seat(RoomKey::team("x"), "a"));
        registry.join(a.id(), seat(RoomKey::match_room("x"), "a"));

        assert_eq!(registry.members(&RoomKey::team("x")), vec![a.id()]);
        assert_eq!(registry.members(&RoomKey::match_room("x")), vec![a.id()]);
    }

    #[test]
    fn disconnect_is_idempotent_and_evicts_everywhere() {
        let registry = Registry::new();
        let (a, _rx) = registry.connect(None);
        registry.join(a.id(), seat(RoomKey::session("s"), "a"));
        registry.join(a.id(), seat(RoomKey::team("t"), "a"));

        let seats = registry.disconnect(a.id());
        assert_eq!(seats.len(), 2);
        assert!(registry.members(&RoomKey::session("s")).is_empty());
        assert!(registry.members(&RoomKey::team("t")).is_empty());
        assert!(registry.connection(a.id()).is_none());

        assert!(registry.disconnect(a.id()).is_empty());
    }

    #[test]
    fn sweep_terminates_connections_that_did_not_answer() {
        let registry = Registry::new();
        let (a, mut rx_a) = registry.connect(None);
        let (b, _rx_b) = registry.connect(None);

        assert!(registry.sweep_liveness().is_empty());
        assert!(matches!(rx_a.try_recv(), Ok(Message::Ping(_))));

        a.mark_alive();
        let stale = registry.sweep_liveness();
        assert_eq!(stale, vec![b.id()]);
    }

    #[test]
    fn bound_user_lookup_skips_the_asking_connection() {
        let registry = Registry::new();
        let identity = BoundIdentity {
            user_id: "u1".into(),
            user_name: "Ann".into(),
        };
        let (a, _rx_a) = registry.connect(Some(identity));
        let (b, _rx_b) = registry.connect(None);

        assert!(registry.is_user_bound("u1", b.id()));
        assert!(!registry.is_user_bound("u1", a.id()));
        assert!(!registry.is_user_bound("u2", b.id()));
    }
}
