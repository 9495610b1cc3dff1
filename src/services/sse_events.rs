use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::changes::ChannelStatus,
    dto::{
        ride::RideSummary,
        sse::{
            RideChangedEvent, RideDeletedEvent, RosterReloadedEvent, SeatChangedEvent,
            ServerEvent, SyncStatusEvent, SystemStatus,
        },
    },
    state::{Ride, SharedState},
};

const EVENT_ROSTER_RELOADED: &str = "roster.reloaded";
const EVENT_RIDE_CREATED: &str = "ride.created";
const EVENT_RIDE_UPDATED: &str = "ride.updated";
const EVENT_RIDE_DELETED: &str = "ride.deleted";
const EVENT_RIDE_JOINED: &str = "ride.joined";
const EVENT_RIDE_LEFT: &str = "ride.left";
const EVENT_SYNC_STATUS: &str = "sync.status";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Broadcast that the snapshot was replaced by a full reload.
pub fn broadcast_roster_reloaded(state: &SharedState, rides: usize, joined: usize) {
    send_event(state, EVENT_ROSTER_RELOADED, &RosterReloadedEvent { rides, joined });
}

/// Broadcast a ride created by the signed-in user.
pub fn broadcast_ride_created(state: &SharedState, ride: &Ride) {
    let payload = RideChangedEvent {
        ride: RideSummary::new(ride.clone(), false, true),
    };
    send_event(state, EVENT_RIDE_CREATED, &payload);
}

/// Broadcast an edited ride.
pub fn broadcast_ride_updated(state: &SharedState, ride: &Ride, joined: bool) {
    let payload = RideChangedEvent {
        ride: RideSummary::new(ride.clone(), joined, true),
    };
    send_event(state, EVENT_RIDE_UPDATED, &payload);
}

/// Broadcast removal of a ride from the snapshot.
pub fn broadcast_ride_deleted(state: &SharedState, ride_id: Uuid) {
    send_event(state, EVENT_RIDE_DELETED, &RideDeletedEvent { ride_id });
}

/// Broadcast a committed join with the seat count the store reported.
pub fn broadcast_ride_joined(state: &SharedState, ride: &Ride) {
    send_event(state, EVENT_RIDE_JOINED, &seat_changed(ride));
}

/// Broadcast a committed leave with the seat count the store reported.
pub fn broadcast_ride_left(state: &SharedState, ride: &Ride) {
    send_event(state, EVENT_RIDE_LEFT, &seat_changed(ride));
}

/// Broadcast a change of the live sync channel.
pub fn broadcast_sync_status(state: &SharedState, status: ChannelStatus) {
    send_event(state, EVENT_SYNC_STATUS, &SyncStatusEvent { status });
}

/// Broadcast storage health as seen by the supervisor.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn seat_changed(ride: &Ride) -> SeatChangedEvent {
    SeatChangedEvent {
        ride_id: ride.id,
        seats_available: ride.seats_available,
        total_seats: ride.total_seats,
    }
}

fn send_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => {
            state.sse().broadcast(event);
        }
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}
