use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::sse::ServerEvent,
    error::ServiceError,
    services::match_service,
    state::SharedState,
};

const SNAPSHOT_EVENT: &str = "match_snapshot";

/// Spectator subscription: the live receiver plus a snapshot of the match to send first.
pub struct MatchSubscription {
    /// Match being watched.
    pub match_id: Uuid,
    /// Live events of the match.
    pub receiver: broadcast::Receiver<ServerEvent>,
    /// Current state of the match, sent before any live event.
    pub snapshot: ServerEvent,
}

/// Subscribe to the events of one match. Fails with not found for unknown matches.
pub async fn subscribe_match(
    state: &SharedState,
    match_id: Uuid,
) -> Result<MatchSubscription, ServiceError> {
    // Subscribe before reading so nothing emitted after the snapshot is missed.
    let receiver = state.spectators().subscribe();
    let summary = match_service::get_match(state, match_id).await?;
    let snapshot = ServerEvent::json(match_id, Some(SNAPSHOT_EVENT.to_string()), &summary)
        .map_err(|err| ServiceError::InvalidState(format!("failed to encode snapshot: {err}")))?;

    Ok(MatchSubscription {
        match_id,
        receiver,
        snapshot,
    })
}

/// Convert a subscription into an SSE response that only forwards events of its match.
pub fn to_sse_stream(
    subscription: MatchSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let MatchSubscription {
        match_id,
        mut receiver,
        snapshot,
    } = subscription;

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if tx.send(Ok(to_event(snapshot))).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) if payload.match_id == match_id => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => continue,
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(match_id = %match_id, skipped, "spectator stream lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!(match_id = %match_id, "spectator SSE stream disconnected");
    });

    debug!(match_id = %match_id, "spectator SSE stream attached");
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}
