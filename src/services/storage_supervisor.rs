use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{arena_store::ArenaStore, storage::StorageError},
    state::SharedState,
};

const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Consecutive failed rounds before the store is dropped and rebuilt from scratch.
const MAX_FAILED_ROUNDS: u32 = 3;

/// Doubling retry delay with an upper bound.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Start at `initial`, never wait longer than `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following call waits twice as long.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Forget past failures.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(10))
    }
}

/// Outcome of one supervision round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Store answered and the service was already serving.
    Healthy,
    /// Store answered again, directly or after a reconnect; degraded mode was lifted.
    Recovered,
    /// Store is unreachable; the service is degraded.
    Lost,
}

/// Check the store once, trying a reconnect when the check fails, and mirror the
/// result into the degraded flag.
pub async fn poll_once(state: &SharedState, store: &Arc<dyn ArenaStore>) -> Health {
    let error = match store.health_check().await {
        Ok(()) if state.is_degraded() => {
            info!("storage healthy again; leaving degraded mode");
            state.update_degraded(false);
            return Health::Recovered;
        }
        Ok(()) => return Health::Healthy,
        Err(err) => err,
    };

    match store.try_reconnect().await {
        Ok(()) => {
            info!(error = %error, "storage reconnected after failed health check");
            state.update_degraded(false);
            Health::Recovered
        }
        Err(reconnect_err) => {
            if !state.is_degraded() {
                warn!(error = %reconnect_err, "storage unreachable; entering degraded mode");
            }
            state.update_degraded(true);
            Health::Lost
        }
    }
}

/// Install the arena store once `connect` succeeds, then supervise it. A store
/// that stays unreachable for several rounds is discarded and `connect` runs again.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn ArenaStore>, StorageError>> + Send,
{
    let mut backoff = Backoff::default();

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(backoff.next_delay()).await;
                continue;
            }
        };

        state.set_store(store.clone()).await;
        info!("storage connection established; serving requests");
        backoff.reset();

        let mut failed_rounds = 0;
        while failed_rounds < MAX_FAILED_ROUNDS {
            match poll_once(&state, &store).await {
                Health::Healthy | Health::Recovered => {
                    failed_rounds = 0;
                    backoff.reset();
                    sleep(HEALTH_POLL_INTERVAL).await;
                }
                Health::Lost => {
                    failed_rounds += 1;
                    sleep(backoff.next_delay()).await;
                }
            }
        }

        warn!(
            rounds = failed_rounds,
            "storage still unreachable; rebuilding the connection"
        );
        state.clear_store().await;
    }
}
