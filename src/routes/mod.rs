use axum::Router;

use crate::state::SharedState;

/// Swagger UI and the OpenAPI JSON.
pub mod docs;
/// Liveness check.
pub mod health;
/// Roster queries, ride CRUD and seat operations.
pub mod rides;
/// Sign-in, refresh, sign-out and onboarding.
pub mod session;
/// Live event stream for browsers.
pub mod sse;

/// Compose all route trees and the documentation UI, then bind the shared state.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(session::router())
        .merge(rides::router())
        .merge(sse::router())
        .merge(docs::router());

    api_router.with_state(state)
}
