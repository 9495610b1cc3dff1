//! Ride Store operations: loads into the roster snapshot, queries over it and the
//! mutations that keep it in step with the backing store.

use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        models::{NewRideEntity, RidePatchEntity},
        storage::with_timeout,
    },
    dto::{
        ride::{CreateRideRequest, RideSummary, UpdateRideRequest},
        validation::{validate_seat_count, validate_time_window},
    },
    error::{ConflictKind, ServiceError},
    services::{sse_events, whatsapp},
    state::{AuthEvent, LoadStatus, Ride, RosterSnapshot, SearchFilters, SharedState, User},
};

fn require_user(state: &SharedState) -> Result<User, ServiceError> {
    state
        .session()
        .current_user()
        .ok_or(ServiceError::Unauthenticated)
}

/// Fetch every ride, newest first, into the snapshot.
///
/// A failure keeps the previous rides and records the error in the load status.
/// When loads overlap, the most recently issued one wins.
pub async fn load_rides(state: &SharedState) -> Result<(), ServiceError> {
    let ticket = state.next_load_ticket();
    let _loading = state.begin_load();

    let result = with_timeout(state.config().request_timeout(), state.backend().list_rides()).await;

    let mut roster = state.roster().write().await;
    match result {
        Ok(rows) => {
            let count = rows.len();
            if roster.apply_rides(ticket, rows.into_iter().map(Ride::from).collect()) {
                debug!(ticket, count, "ride list loaded");
            } else {
                debug!(ticket, "newer ride load already applied; discarding");
            }
            Ok(())
        }
        Err(err) => {
            warn!(ticket, error = %err, "loading rides failed; keeping previous snapshot");
            roster.record_failure(ticket, err.to_string());
            Err(err.into())
        }
    }
}

/// Rebuild the membership set from the signed-in user's participant rows.
///
/// Signed out, the set is simply emptied.
pub async fn load_joined_rides(state: &SharedState) -> Result<(), ServiceError> {
    let ticket = state.next_load_ticket();
    let Some(user_id) = state.session().current_user_id() else {
        state.roster().write().await.reset_membership(ticket);
        return Ok(());
    };
    let _loading = state.begin_load();

    let result = with_timeout(
        state.config().request_timeout(),
        state.backend().joined_ride_ids(user_id),
    )
    .await;

    let mut roster = state.roster().write().await;
    if state.session().current_user_id() != Some(user_id) {
        debug!(%user_id, "session changed during membership load; discarding");
        return Ok(());
    }
    match result {
        Ok(ids) => {
            if !roster.apply_joined(ticket, ids) {
                debug!(ticket, "newer membership load already applied; discarding");
            }
            Ok(())
        }
        Err(err) => {
            warn!(ticket, error = %err, "loading joined rides failed; keeping previous set");
            roster.record_failure(ticket, err.to_string());
            Err(err.into())
        }
    }
}

/// Run both loads and announce the new snapshot.
pub async fn reload(state: &SharedState) -> Result<(), ServiceError> {
    let (rides, joined) = tokio::join!(load_rides(state), load_joined_rides(state));

    let (ride_count, joined_count) = {
        let roster = state.roster().read().await;
        (roster.len(), roster.joined_ids().len())
    };
    if rides.is_ok() || joined.is_ok() {
        sse_events::broadcast_roster_reloaded(state, ride_count, joined_count);
    }
    rides.and(joined)
}

/// Rides with free seats matching `filters`, in snapshot order.
pub async fn search_rides(state: &SharedState, filters: &SearchFilters) -> Vec<Ride> {
    state.roster().read().await.search(filters)
}

/// Ride from the snapshot, without a round-trip.
pub async fn get_ride_by_id(state: &SharedState, id: Uuid) -> Option<Ride> {
    state.roster().read().await.get(id).cloned()
}

/// Rides created by the signed-in user; empty when signed out.
pub async fn get_my_rides(state: &SharedState) -> Vec<Ride> {
    match state.session().current_user_id() {
        Some(user_id) => state.roster().read().await.created_by(user_id),
        None => Vec::new(),
    }
}

/// Rides in the membership set.
pub async fn get_joined_rides(state: &SharedState) -> Vec<Ride> {
    state.roster().read().await.joined()
}

/// Whether `id` is in the membership set.
pub async fn has_joined_ride(state: &SharedState, id: Uuid) -> bool {
    state.roster().read().await.has_joined(id)
}

/// Whether the signed-in user created `id`; false when signed out.
pub async fn is_my_ride(state: &SharedState, id: Uuid) -> bool {
    match state.session().current_user_id() {
        Some(user_id) => state.roster().read().await.is_created_by(id, user_id),
        None => false,
    }
}

/// Copy of every ride and joined id.
pub async fn snapshot(state: &SharedState) -> RosterSnapshot {
    state.roster().read().await.snapshot()
}

/// Ride count, joined count and load progress.
pub async fn roster_status(state: &SharedState) -> (usize, usize, LoadStatus) {
    let roster = state.roster().read().await;
    let status = LoadStatus {
        pending: state.loads_pending(),
        ..roster.status().clone()
    };
    (roster.len(), roster.joined_ids().len(), status)
}

/// Attach the signed-in user's relation to each ride.
pub async fn summarize(state: &SharedState, rides: Vec<Ride>) -> Vec<RideSummary> {
    let user_id = state.session().current_user_id();
    let roster = state.roster().read().await;
    rides
        .into_iter()
        .map(|ride| {
            let joined = roster.has_joined(ride.id);
            let mine = Some(ride.creator_id) == user_id;
            RideSummary::new(ride, joined, mine)
        })
        .collect()
}

/// [`summarize`] for a single ride.
pub async fn summarize_one(state: &SharedState, ride: Ride) -> RideSummary {
    let mine = state.session().current_user_id() == Some(ride.creator_id);
    let joined = state.roster().read().await.has_joined(ride.id);
    RideSummary::new(ride, joined, mine)
}

/// Offer a ride as the signed-in user. All seats start free.
pub async fn create_ride(
    state: &SharedState,
    request: CreateRideRequest,
) -> Result<Ride, ServiceError> {
    let user = require_user(state)?;
    request.validate()?;

    let entity = NewRideEntity {
        source: request.source.trim().to_string(),
        destination: request.destination.trim().to_string(),
        date: request.date,
        start_time: request.start_time,
        end_time: request.end_time,
        total_seats: request.total_seats,
        seats_available: request.total_seats,
        creator_id: user.id,
        creator_name: user.name,
        creator_email: user.email,
        creator_whatsapp: user.whatsapp,
    };

    let created = with_timeout(
        state.config().request_timeout(),
        state.backend().insert_ride(entity),
    )
    .await?;
    let ride = Ride::from(created);
    info!(ride_id = %ride.id, seats = ride.total_seats, "ride created");

    state.roster().write().await.insert_front(ride.clone());
    sse_events::broadcast_ride_created(state, &ride);
    Ok(ride)
}

/// Edit a ride owned by the signed-in user.
///
/// Changing `total_seats` resets the free seats to the new capacity and is only
/// allowed while nobody has joined.
pub async fn update_ride(
    state: &SharedState,
    id: Uuid,
    request: UpdateRideRequest,
) -> Result<Ride, ServiceError> {
    let user = require_user(state)?;
    request.validate()?;
    let timeout = state.config().request_timeout();

    let current = with_timeout(timeout, state.backend().find_ride(id))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("ride {id}")))?;
    if current.creator_id != user.id {
        return Err(ServiceError::Forbidden(
            "only the ride's creator can edit it".into(),
        ));
    }

    let mut patch = RidePatchEntity {
        source: request.source.map(|value| value.trim().to_string()),
        destination: request.destination.map(|value| value.trim().to_string()),
        date: request.date,
        start_time: request.start_time,
        end_time: request.end_time,
        total_seats: request
            .total_seats
            .filter(|seats| *seats != current.total_seats),
        seats_available: None,
    };

    if let Some(total_seats) = patch.total_seats {
        let participants = with_timeout(timeout, state.backend().list_participants(id)).await?;
        if !participants.is_empty() {
            debug!(ride_id = %id, riders = participants.len(), "capacity edit refused");
            return Err(ConflictKind::CapacityLocked.into());
        }
        patch.seats_available = Some(total_seats);
    }

    let merged = patch.apply_to(&current);
    validate_time_window(merged.start_time, merged.end_time)?;
    validate_seat_count(merged.total_seats)?;

    if patch.is_empty() {
        return Ok(Ride::from(current));
    }

    let updated = with_timeout(timeout, state.backend().update_ride(id, patch))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("ride {id}")))?;
    let ride = Ride::from(updated);
    info!(ride_id = %id, "ride updated");

    let joined = {
        let mut roster = state.roster().write().await;
        roster.replace(ride.clone());
        roster.has_joined(id)
    };
    sse_events::broadcast_ride_updated(state, &ride, joined);
    Ok(ride)
}

/// Delete a ride owned by the signed-in user along with its participant rows.
pub async fn delete_ride(state: &SharedState, id: Uuid) -> Result<(), ServiceError> {
    let user = require_user(state)?;
    let timeout = state.config().request_timeout();

    let current = with_timeout(timeout, state.backend().find_ride(id))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("ride {id}")))?;
    if current.creator_id != user.id {
        return Err(ServiceError::Forbidden(
            "only the ride's creator can delete it".into(),
        ));
    }

    if !with_timeout(timeout, state.backend().delete_ride(id)).await? {
        return Err(ServiceError::NotFound(format!("ride {id}")));
    }
    info!(ride_id = %id, "ride deleted");

    state.roster().write().await.remove(id);
    sse_events::broadcast_ride_deleted(state, id);
    Ok(())
}

/// Join a ride as the signed-in user.
///
/// Preconditions are checked against the snapshot, which may be stale; the seat
/// protocol has the final word.
pub async fn join_ride(state: &SharedState, id: Uuid) -> Result<Ride, ServiceError> {
    let user = require_user(state)?;
    let (ride, already_joined) = {
        let roster = state.roster().read().await;
        (roster.get(id).cloned(), roster.has_joined(id))
    };
    let ride = match ride {
        Some(ride) => ride,
        None => fetch_ride(state, id).await?,
    };

    if ride.creator_id == user.id {
        return Err(ConflictKind::OwnRide.into());
    }
    if already_joined {
        return Err(ConflictKind::AlreadyJoined.into());
    }
    if ride.is_full() {
        return Err(ConflictKind::RideFull.into());
    }

    let _guard = state
        .claim_ride(id)
        .ok_or(ServiceError::Conflict(ConflictKind::InFlight))?;

    let committed = state.seats().join(id, user.id).await.map_err(|err| {
        debug!(ride_id = %id, error = %err, "join did not commit");
        ServiceError::from(err)
    })?;
    let ride = Ride::from(committed);
    info!(ride_id = %id, seats_available = ride.seats_available, "joined ride");

    state.roster().write().await.record_join(ride.clone());
    sse_events::broadcast_ride_joined(state, &ride);
    Ok(ride)
}

/// Leave a ride the signed-in user has joined.
pub async fn leave_ride(state: &SharedState, id: Uuid) -> Result<Ride, ServiceError> {
    let user = require_user(state)?;
    if !state.roster().read().await.has_joined(id) {
        return Err(ConflictKind::NotJoined.into());
    }

    let _guard = state
        .claim_ride(id)
        .ok_or(ServiceError::Conflict(ConflictKind::InFlight))?;

    let committed = state.seats().leave(id, user.id).await.map_err(|err| {
        debug!(ride_id = %id, error = %err, "leave did not commit");
        ServiceError::from(err)
    })?;
    let ride = Ride::from(committed);
    info!(ride_id = %id, seats_available = ride.seats_available, "left ride");

    state.roster().write().await.record_leave(ride.clone());
    sse_events::broadcast_ride_left(state, &ride);
    Ok(ride)
}

/// WhatsApp chat link with the creator of a ride, plus the greeting it carries.
pub async fn whatsapp_link(state: &SharedState, id: Uuid) -> Result<(String, String), ServiceError> {
    let ride = get_ride_by_id(state, id)
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("ride {id}")))?;
    let url = whatsapp::chat_link(&ride).ok_or_else(|| {
        ServiceError::NotFound("the ride's creator has not shared a WhatsApp number".into())
    })?;
    Ok((url, whatsapp::greeting(&ride)))
}

/// React to a session transition.
///
/// A new identity (or none) drops the old membership set before anything else so
/// loads issued for the previous user can no longer land.
pub async fn handle_auth_event(state: &SharedState, event: AuthEvent) {
    match event {
        AuthEvent::SignedIn(user_id) => {
            let ticket = state.next_load_ticket();
            state.roster().write().await.reset_membership(ticket);
            if let Err(err) = reload(state).await {
                warn!(%user_id, error = %err, "reload after sign-in failed");
            }
        }
        AuthEvent::SignedOut => {
            let ticket = state.next_load_ticket();
            state.roster().write().await.reset_membership(ticket);
            debug!("membership cleared after sign-out");
        }
        AuthEvent::TokenRefreshed(user_id) => {
            if let Err(err) = load_joined_rides(state).await {
                warn!(%user_id, error = %err, "membership reload after token refresh failed");
            }
        }
    }
}

async fn fetch_ride(state: &SharedState, id: Uuid) -> Result<Ride, ServiceError> {
    with_timeout(state.config().request_timeout(), state.backend().find_ride(id))
        .await?
        .map(Ride::from)
        .ok_or_else(|| ServiceError::NotFound(format!("ride {id}")))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use time::macros::{date, datetime, time};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            identity::AuthIdentity,
            ride_store::{
                RideBackend,
                memory::{Fault, MemoryIdentityProvider, MemoryRideStore},
            },
        },
        state::{AppState, Collaborators},
    };

    struct Harness {
        store: MemoryRideStore,
        identity: MemoryIdentityProvider,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: MemoryRideStore::new(),
                identity: MemoryIdentityProvider::new(),
            }
        }

        async fn session(&self, name: &str) -> SharedState {
            let state = AppState::new(
                AppConfig::default(),
                Collaborators::memory(&self.store, &self.identity),
            );
            let token = format!("token-{name}");
            self.identity.issue(
                token.clone(),
                AuthIdentity {
                    id: Uuid::new_v4(),
                    email: format!("{name}@vitstudent.ac.in"),
                    full_name: Some(name.to_string()),
                },
            );
            crate::services::session_service::sign_in(&state, token)
                .await
                .unwrap();
            state
        }
    }

    fn mumbai_pune(seats: u32) -> CreateRideRequest {
        CreateRideRequest {
            source: "Mumbai".into(),
            destination: "Pune".into(),
            date: date!(2025 - 01 - 10),
            start_time: time!(09:00),
            end_time: time!(10:00),
            total_seats: seats,
        }
    }

    #[tokio::test]
    async fn created_ride_is_immediately_visible_with_all_seats_free() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;

        let ride = create_ride(&alice, mumbai_pune(3)).await.unwrap();
        let fetched = get_ride_by_id(&alice, ride.id).await.unwrap();

        assert_eq!(fetched.total_seats, 3);
        assert_eq!(fetched.seats_available, 3);
        assert!(harness.store.participants_of(ride.id).await.is_empty());
        assert!(is_my_ride(&alice, ride.id).await);
        assert_eq!(get_my_rides(&alice).await.len(), 1);
    }

    #[tokio::test]
    async fn create_requires_a_session_and_valid_input() {
        let harness = Harness::new();
        let anonymous = AppState::new(
            AppConfig::default(),
            Collaborators::memory(&harness.store, &harness.identity),
        );
        assert!(matches!(
            create_ride(&anonymous, mumbai_pune(2)).await,
            Err(ServiceError::Unauthenticated)
        ));

        let alice = harness.session("alice").await;
        let mut backwards = mumbai_pune(2);
        backwards.end_time = time!(08:00);
        assert!(matches!(
            create_ride(&alice, backwards).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            create_ride(&alice, mumbai_pune(0)).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(harness.store.list_rides().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_snapshot() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        create_ride(&alice, mumbai_pune(2)).await.unwrap();
        reload(&alice).await.unwrap();
        let before = snapshot(&alice).await;

        harness.store.fail_next(Fault::ListRides);
        assert!(load_rides(&alice).await.is_err());

        assert_eq!(snapshot(&alice).await, before);
        let (_, _, status) = roster_status(&alice).await;
        assert!(status.error.is_some());
        assert!(!status.is_loading());

        load_rides(&alice).await.unwrap();
        let (_, _, status) = roster_status(&alice).await;
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn reload_twice_yields_identical_snapshots() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        let bob = harness.session("bob").await;
        let ride = create_ride(&alice, mumbai_pune(2)).await.unwrap();
        reload(&bob).await.unwrap();
        join_ride(&bob, ride.id).await.unwrap();

        reload(&bob).await.unwrap();
        let first = serde_json::to_vec(&snapshot(&bob).await).unwrap();
        reload(&bob).await.unwrap();
        let second = serde_json::to_vec(&snapshot(&bob).await).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_surfaces_a_timeout() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        harness.store.set_latency(Duration::from_secs(30));

        let err = load_rides(&alice).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_load_is_not_left_pending() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        harness.store.set_latency(Duration::from_secs(5));

        let mut load = Box::pin(reload(&alice));
        assert!(
            tokio::time::timeout(Duration::from_millis(100), &mut load)
                .await
                .is_err()
        );
        assert_eq!(alice.loads_pending(), 2);
        assert!(roster_status(&alice).await.2.is_loading());

        // the caller went away, e.g. an HTTP client disconnecting mid-request
        drop(load);
        assert_eq!(alice.loads_pending(), 0);
        assert!(!roster_status(&alice).await.2.is_loading());
    }

    #[tokio::test]
    async fn search_hides_full_rides() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        let bob = harness.session("bob").await;
        let ride = create_ride(&alice, mumbai_pune(1)).await.unwrap();
        reload(&bob).await.unwrap();

        let filters = SearchFilters {
            source: Some("mum".into()),
            ..Default::default()
        };
        assert_eq!(search_rides(&bob, &filters).await.len(), 1);

        join_ride(&bob, ride.id).await.unwrap();
        assert!(search_rides(&bob, &filters).await.is_empty());
        assert_eq!(get_joined_rides(&bob).await.len(), 1);
    }

    #[tokio::test]
    async fn only_the_creator_may_edit_or_delete() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        let bob = harness.session("bob").await;
        let ride = create_ride(&alice, mumbai_pune(2)).await.unwrap();

        let patch = UpdateRideRequest {
            destination: Some("Lonavala".into()),
            ..Default::default()
        };
        assert!(matches!(
            update_ride(&bob, ride.id, patch.clone()).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            delete_ride(&bob, ride.id).await,
            Err(ServiceError::Forbidden(_))
        ));

        let updated = update_ride(&alice, ride.id, patch).await.unwrap();
        assert_eq!(updated.destination, "Lonavala");
        assert_eq!(
            get_ride_by_id(&alice, ride.id).await.unwrap().destination,
            "Lonavala"
        );
    }

    #[tokio::test]
    async fn capacity_follows_total_seats_until_someone_joins() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        let bob = harness.session("bob").await;
        let ride = create_ride(&alice, mumbai_pune(2)).await.unwrap();

        let grow = UpdateRideRequest {
            total_seats: Some(4),
            ..Default::default()
        };
        let updated = update_ride(&alice, ride.id, grow).await.unwrap();
        assert_eq!((updated.total_seats, updated.seats_available), (4, 4));

        reload(&bob).await.unwrap();
        join_ride(&bob, ride.id).await.unwrap();

        let shrink = UpdateRideRequest {
            total_seats: Some(3),
            ..Default::default()
        };
        assert!(matches!(
            update_ride(&alice, ride.id, shrink).await,
            Err(ServiceError::Conflict(ConflictKind::CapacityLocked))
        ));
        let stored = harness.store.find_ride(ride.id).await.unwrap().unwrap();
        assert_eq!((stored.total_seats, stored.seats_available), (4, 3));
    }

    #[tokio::test]
    async fn edit_cannot_invert_the_time_window() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        let ride = create_ride(&alice, mumbai_pune(2)).await.unwrap();

        let patch = UpdateRideRequest {
            start_time: Some(time!(10:30)),
            ..Default::default()
        };
        assert!(matches!(
            update_ride(&alice, ride.id, patch).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn own_ride_cannot_be_joined() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        let ride = create_ride(&alice, mumbai_pune(2)).await.unwrap();

        assert!(matches!(
            join_ride(&alice, ride.id).await,
            Err(ServiceError::Conflict(ConflictKind::OwnRide))
        ));
        assert_eq!(get_ride_by_id(&alice, ride.id).await.unwrap().seats_available, 2);
    }

    #[tokio::test]
    async fn leave_without_join_is_a_conflict() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        let bob = harness.session("bob").await;
        let ride = create_ride(&alice, mumbai_pune(2)).await.unwrap();
        reload(&bob).await.unwrap();

        assert!(matches!(
            leave_ride(&bob, ride.id).await,
            Err(ServiceError::Conflict(ConflictKind::NotJoined))
        ));
        let stored = harness.store.find_ride(ride.id).await.unwrap().unwrap();
        assert_eq!(stored.seats_available, 2);
    }

    #[tokio::test]
    async fn stale_snapshot_join_fails_at_commit() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        let bob = harness.session("bob").await;
        let carol = harness.session("carol").await;
        let ride = create_ride(&alice, mumbai_pune(1)).await.unwrap();
        reload(&bob).await.unwrap();
        reload(&carol).await.unwrap();

        join_ride(&bob, ride.id).await.unwrap();
        // carol still sees one free seat
        assert!(matches!(
            join_ride(&carol, ride.id).await,
            Err(ServiceError::Conflict(ConflictKind::RideFull))
        ));
        assert!(!has_joined_ride(&carol, ride.id).await);
        assert_eq!(harness.store.participants_of(ride.id).await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_join_on_the_same_ride_is_rejected() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        let bob = harness.session("bob").await;
        let ride = create_ride(&alice, mumbai_pune(2)).await.unwrap();
        reload(&bob).await.unwrap();
        harness.store.set_latency(Duration::from_millis(50));

        let (first, second) = tokio::join!(join_ride(&bob, ride.id), join_ride(&bob, ride.id));
        let outcomes = [first.is_ok(), second.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        let err = first.err().or(second.err()).unwrap();
        assert!(matches!(err, ServiceError::Conflict(ConflictKind::InFlight)));
    }

    #[tokio::test]
    async fn whatsapp_link_needs_a_creator_number() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        let ride = create_ride(&alice, mumbai_pune(2)).await.unwrap();
        assert!(matches!(
            whatsapp_link(&alice, ride.id).await,
            Err(ServiceError::NotFound(_))
        ));

        crate::services::session_service::set_whatsapp(&alice, "+91 98765 43210")
            .await
            .unwrap();
        let ride = create_ride(&alice, mumbai_pune(2)).await.unwrap();
        let (url, message) = whatsapp_link(&alice, ride.id).await.unwrap();
        assert!(url.starts_with("https://wa.me/919876543210?text="));
        assert!(message.contains("Mumbai"));
    }

    #[tokio::test]
    async fn membership_load_for_a_previous_user_is_discarded() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        let bob = harness.session("bob").await;
        let ride = create_ride(&alice, mumbai_pune(2)).await.unwrap();
        reload(&bob).await.unwrap();
        join_ride(&bob, ride.id).await.unwrap();

        crate::services::session_service::sign_out(&bob).await;
        assert!(!has_joined_ride(&bob, ride.id).await);
        assert!(load_joined_rides(&bob).await.is_ok());
        assert!(get_joined_rides(&bob).await.is_empty());
    }

    #[tokio::test]
    async fn backend_rows_stay_authoritative() {
        let harness = Harness::new();
        let alice = harness.session("alice").await;
        let ride = create_ride(&alice, mumbai_pune(2)).await.unwrap();
        let backend: Arc<dyn RideBackend> = Arc::new(harness.store.clone());

        let stored = backend.find_ride(ride.id).await.unwrap().unwrap();
        assert_eq!(Ride::from(stored), get_ride_by_id(&alice, ride.id).await.unwrap());
        assert!(ride.created_at > datetime!(2020-01-01 00:00 UTC));
    }
}
