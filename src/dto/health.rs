use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::changes::ChannelStatus;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Live sync channel state; `closed` or `channel_error` means the roster may be stale.
    pub sync: ChannelStatus,
}

impl HealthResponse {
    /// Backend reachable.
    pub fn ok(sync: ChannelStatus) -> Self {
        Self {
            status: "ok".to_string(),
            sync,
        }
    }

    /// Backend failing its health checks.
    pub fn degraded(sync: ChannelStatus) -> Self {
        Self {
            status: "degraded".to_string(),
            sync,
        }
    }
}
