use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{dao::storage::with_timeout, services::sse_events, state::SharedState};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Health-check the backend forever, keeping the degraded flag current.
///
/// Failing checks are retried with exponential backoff; a healthy backend is
/// polled every [`HEALTH_POLL_INTERVAL`].
pub async fn run(state: SharedState) {
    let mut delay = INITIAL_DELAY;

    loop {
        if check_once(&state).await {
            delay = INITIAL_DELAY;
            sleep(HEALTH_POLL_INTERVAL).await;
        } else {
            sleep(delay).await;
            delay = (delay * 2).min(MAX_DELAY);
        }
    }
}

/// Run one health check, update the degraded flag and return whether the backend is healthy.
pub async fn check_once(state: &SharedState) -> bool {
    match with_timeout(state.config().request_timeout(), state.backend().health_check()).await {
        Ok(()) => {
            if state.update_degraded(false) {
                info!("backend healthy again; leaving degraded mode");
                sse_events::broadcast_system_status(state, false);
            }
            true
        }
        Err(err) => {
            if state.update_degraded(true) {
                warn!(error = %err, "backend health check failed; entering degraded mode");
                sse_events::broadcast_system_status(state, true);
            } else {
                debug!(error = %err, "backend still unhealthy");
            }
            false
        }
    }
}
