//! Arena Back binary entrypoint wiring REST, WebSocket, SSE, and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::{net::TcpListener, time::interval};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_back::{
    config::AppConfig,
    dao::arena_store::{ArenaStore, memory::InMemoryStore},
    routes,
    services::websocket_service,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    match env::var("MONGO_URI") {
        Ok(uri) => spawn_mongo_supervisor(app_state.clone(), uri, env::var("MONGO_DB").ok())?,
        Err(_) => {
            info!("MONGO_URI not set; using the in-memory store");
            let store = seeded_memory_store(&app_state.config()).await;
            app_state.set_store(store).await;
        }
    }

    tokio::spawn(run_heartbeat(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

#[cfg(feature = "mongo-store")]
fn spawn_mongo_supervisor(
    state: SharedState,
    uri: String,
    db_name: Option<String>,
) -> anyhow::Result<()> {
    use arena_back::{
        dao::{
            arena_store::mongodb::{MongoArenaStore, MongoConfig},
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    tokio::spawn(storage_supervisor::run(state, move || {
        let uri = uri.clone();
        let db_name = db_name.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db_name.as_deref())
                .await
                .map_err(StorageError::from)?;
            let store = MongoArenaStore::connect(config)
                .await
                .map_err(StorageError::from)?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn ArenaStore>)
        }
    }));
    Ok(())
}

#[cfg(not(feature = "mongo-store"))]
fn spawn_mongo_supervisor(
    _state: SharedState,
    _uri: String,
    _db_name: Option<String>,
) -> anyhow::Result<()> {
    anyhow::bail!("MONGO_URI is set but the binary was built without the `mongo-store` feature")
}

/// Build the in-memory backend and load the configured seed records into it.
async fn seeded_memory_store(config: &AppConfig) -> Arc<dyn ArenaStore> {
    let store = InMemoryStore::new();
    for user in &config.seed.users {
        store.insert_user(user.clone()).await;
    }
    for game in &config.seed.games {
        store.insert_game(game.clone()).await;
    }
    for team in config.seed.team_entities() {
        store.insert_team(team).await;
    }
    info!(
        users = config.seed.users.len(),
        games = config.seed.games.len(),
        teams = config.seed.teams.len(),
        "seeded in-memory store"
    );
    Arc::new(store)
}

/// Ping realtime connections on a fixed period and evict the unresponsive ones.
async fn run_heartbeat(state: SharedState) {
    let mut ticker = interval(state.config().heartbeat_interval);
    // The first tick fires immediately; skip it so fresh connections get a full period.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let evicted = websocket_service::sweep_liveness(&state);
        debug!(
            evicted,
            connections = state.registry().connection_count(),
            "heartbeat sweep"
        );
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
