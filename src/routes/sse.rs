use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/rides",
    tag = "sse",
    responses((status = 200, description = "Roster, sync and system events", content_type = "text/event-stream", body = String))
)]
/// Stream roster changes, live sync state and degraded mode to the browser.
pub async fn rides_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe(&state);
    info!(
        subscribers = state.sse().subscriber_count(),
        "New rides SSE connection"
    );
    sse_service::to_sse_stream(receiver, sse_service::handshake(&state))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/rides", get(rides_stream))
}
