use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness and the number of realtime connections, logging storage issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        None => warn!("storage unavailable (degraded mode)"),
    }

    let connections = state.registry().connection_count();
    if state.is_degraded() {
        HealthResponse::degraded(connections)
    } else {
        HealthResponse::ok(connections)
    }
}
