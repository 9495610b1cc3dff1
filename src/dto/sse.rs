use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{dao::changes::ChannelStatus, dto::ride::RideSummary};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// First event sent to a client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is currently failing its health checks.
    pub degraded: bool,
    /// Live sync channel state at connection time.
    pub sync: ChannelStatus,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the live sync channel changes state.
pub struct SyncStatusEvent {
    pub status: ChannelStatus,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after a full reload replaced the snapshot.
pub struct RosterReloadedEvent {
    pub rides: usize,
    pub joined: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a ride was created or edited by this session.
pub struct RideChangedEvent {
    pub ride: RideSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a ride was deleted by this session.
pub struct RideDeletedEvent {
    pub ride_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after a committed join or leave.
pub struct SeatChangedEvent {
    pub ride_id: Uuid,
    pub seats_available: u32,
    pub total_seats: u32,
}
