/// Match status transitions.
pub mod lifecycle;
/// Live connections, rooms and broadcast.
pub mod registry;
mod sse;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{config::AppConfig, dao::arena_store::ArenaStore, error::ServiceError};

pub use self::registry::Registry;
pub use self::sse::SseHub;

/// Handle to the application state shared across handlers and tasks.
pub type SharedState = Arc<AppState>;

const SPECTATOR_CAPACITY: usize = 64;

/// Central application state: realtime registry, spectator hub and storage handle.
pub struct AppState {
    store: RwLock<Option<Arc<dyn ArenaStore>>>,
    registry: Registry,
    spectators: SseHub,
    config: Arc<AppConfig>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            registry: Registry::new(),
            spectators: SseHub::new(SPECTATOR_CAPACITY),
            config: Arc::new(config),
            degraded: degraded_tx,
        })
    }

    /// Build a state with `store` already installed.
    pub async fn with_store(config: AppConfig, store: Arc<dyn ArenaStore>) -> SharedState {
        let state = Self::new(config);
        state.set_store(store).await;
        state
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn ArenaStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the store or fail when running degraded.
    pub async fn require_store(&self) -> Result<Arc<dyn ArenaStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn ArenaStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Live realtime connections and their rooms.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Broadcast hub used for the spectator SSE streams.
    pub fn spectators(&self) -> &SseHub {
        &self.spectators
    }

    /// Startup configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }
}
