use crate::{dto::health::HealthResponse, services::storage_supervisor, state::SharedState};

/// Check the backend now and report it together with the live sync state.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    storage_supervisor::check_once(state).await;

    if state.is_degraded() {
        HealthResponse::degraded(state.sync_status())
    } else {
        HealthResponse::ok(state.sync_status())
    }
}
