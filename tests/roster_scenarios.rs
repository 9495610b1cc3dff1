//! End-to-end roster behaviour across several sessions sharing one backend.

use std::time::Duration;

use carpool_back::{
    config::SeatStrategy,
    dao::ride_store::{RideBackend, memory::Fault},
    error::{ConflictKind, ServiceError},
    services::{ride_store, session_service},
};

mod common;

use common::{World, mumbai_pune};

async fn seat_walkthrough(strategy: SeatStrategy) {
    let world = World::with_strategy(strategy);
    let alice = world.signed_in("alice").await;
    let bob = world.signed_in("bob").await;
    let carol = world.signed_in("carol").await;
    let dave = world.signed_in("dave").await;

    let ride = ride_store::create_ride(&alice, mumbai_pune(2)).await.unwrap();
    for session in [&bob, &carol, &dave] {
        ride_store::reload(session).await.unwrap();
    }

    let after_bob = ride_store::join_ride(&bob, ride.id).await.unwrap();
    assert_eq!(after_bob.seats_available, 1);
    assert!(ride_store::has_joined_ride(&bob, ride.id).await);

    let after_carol = ride_store::join_ride(&carol, ride.id).await.unwrap();
    assert_eq!(after_carol.seats_available, 0);

    // dave's snapshot still shows two free seats
    let err = ride_store::join_ride(&dave, ride.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(ConflictKind::RideFull)));
    assert_eq!(world.store.participants_of(ride.id).await.len(), 2);
    let stored = world.store.find_ride(ride.id).await.unwrap().unwrap();
    assert_eq!(stored.seats_available, 0);

    let after_leave = ride_store::leave_ride(&bob, ride.id).await.unwrap();
    assert_eq!(after_leave.seats_available, 1);
    assert!(!ride_store::has_joined_ride(&bob, ride.id).await);
    assert!(ride_store::get_joined_rides(&bob).await.is_empty());
}

#[tokio::test]
async fn mumbai_pune_walkthrough_with_transactional_seats() {
    seat_walkthrough(SeatStrategy::Transactional).await;
}

#[tokio::test]
async fn mumbai_pune_walkthrough_with_compensating_seats() {
    seat_walkthrough(SeatStrategy::Compensating).await;
}

#[tokio::test]
async fn second_join_is_a_conflict_without_side_effects() {
    let world = World::new();
    let alice = world.signed_in("alice").await;
    let bob = world.signed_in("bob").await;
    let ride = ride_store::create_ride(&alice, mumbai_pune(3)).await.unwrap();
    ride_store::reload(&bob).await.unwrap();

    ride_store::join_ride(&bob, ride.id).await.unwrap();
    let err = ride_store::join_ride(&bob, ride.id).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Conflict(ConflictKind::AlreadyJoined)
    ));
    assert_eq!(world.store.participants_of(ride.id).await.len(), 1);
    let stored = world.store.find_ride(ride.id).await.unwrap().unwrap();
    assert_eq!(stored.seats_available, 2);
}

#[tokio::test]
async fn membership_from_another_device_is_detected_at_commit() {
    let world = World::new();
    let alice = world.signed_in("alice").await;
    let ride = ride_store::create_ride(&alice, mumbai_pune(3)).await.unwrap();

    // same user, two sessions: the second one has a stale membership set
    let token = world.issue_token("bob");
    let laptop = world.session();
    let phone = world.session();
    session_service::sign_in(&laptop, token.clone()).await.unwrap();
    session_service::sign_in(&phone, token).await.unwrap();

    ride_store::join_ride(&laptop, ride.id).await.unwrap();
    let err = ride_store::join_ride(&phone, ride.id).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Conflict(ConflictKind::AlreadyJoined)
    ));
    let stored = world.store.find_ride(ride.id).await.unwrap().unwrap();
    assert_eq!(stored.seats_available, 2);
}

#[tokio::test]
async fn seat_count_stays_within_bounds_for_any_sequence() {
    for strategy in [SeatStrategy::Transactional, SeatStrategy::Compensating] {
        let world = World::with_strategy(strategy);
        let alice = world.signed_in("alice").await;
        let riders = [
            world.signed_in("r0").await,
            world.signed_in("r1").await,
            world.signed_in("r2").await,
            world.signed_in("r3").await,
        ];
        let ride = ride_store::create_ride(&alice, mumbai_pune(2)).await.unwrap();

        // xorshift keeps the sequence reproducible
        let mut seed: u32 = 0x9e37_79b9;
        for _ in 0..200 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let rider = &riders[(seed % 4) as usize];
            ride_store::reload(rider).await.unwrap();
            if seed & 0x10 == 0 {
                let _ = ride_store::join_ride(rider, ride.id).await;
            } else {
                let _ = ride_store::leave_ride(rider, ride.id).await;
            }

            let stored = world.store.find_ride(ride.id).await.unwrap().unwrap();
            let riders_on_board = world.store.participants_of(ride.id).await.len() as u32;
            assert!(stored.seats_available <= stored.total_seats);
            assert_eq!(stored.total_seats - stored.seats_available, riders_on_board);
        }
    }
}

#[tokio::test]
async fn failed_seat_update_is_compensated() {
    let world = World::with_strategy(SeatStrategy::Compensating);
    let alice = world.signed_in("alice").await;
    let bob = world.signed_in("bob").await;
    let ride = ride_store::create_ride(&alice, mumbai_pune(2)).await.unwrap();
    ride_store::reload(&bob).await.unwrap();

    world.store.fail_next(Fault::AdjustSeats);
    let err = ride_store::join_ride(&bob, ride.id).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(world.store.participants_of(ride.id).await.is_empty());
    assert!(!ride_store::has_joined_ride(&bob, ride.id).await);

    // retrying the same operation succeeds
    let joined = ride_store::join_ride(&bob, ride.id).await.unwrap();
    assert_eq!(joined.seats_available, 1);

    world.store.fail_next(Fault::AdjustSeats);
    assert!(ride_store::leave_ride(&bob, ride.id).await.is_err());
    assert_eq!(world.store.participants_of(ride.id).await.len(), 1);
    assert!(ride_store::has_joined_ride(&bob, ride.id).await);
}

#[tokio::test]
async fn deleted_ride_disappears_for_every_session_after_reconciliation() {
    let world = World::new();
    let alice = world.signed_in("alice").await;
    let bob = world.signed_in("bob").await;
    let carol = world.signed_in("carol").await;
    let ride = ride_store::create_ride(&alice, mumbai_pune(3)).await.unwrap();
    for rider in [&bob, &carol] {
        ride_store::reload(rider).await.unwrap();
        ride_store::join_ride(rider, ride.id).await.unwrap();
    }

    ride_store::delete_ride(&alice, ride.id).await.unwrap();
    assert!(ride_store::get_ride_by_id(&alice, ride.id).await.is_none());
    assert!(world.store.participants_of(ride.id).await.is_empty());

    for rider in [&bob, &carol] {
        ride_store::reload(rider).await.unwrap();
        assert!(ride_store::get_ride_by_id(rider, ride.id).await.is_none());
        assert!(!ride_store::has_joined_ride(rider, ride.id).await);
    }
}

#[tokio::test]
async fn user_switch_resets_membership() {
    let world = World::new();
    let alice = world.signed_in("alice").await;
    let ride = ride_store::create_ride(&alice, mumbai_pune(3)).await.unwrap();

    let shared = world.signed_in("bob").await;
    ride_store::join_ride(&shared, ride.id).await.unwrap();
    assert_eq!(ride_store::get_joined_rides(&shared).await.len(), 1);

    let carol = world.issue_token("carol");
    session_service::sign_in(&shared, carol).await.unwrap();
    assert!(ride_store::get_joined_rides(&shared).await.is_empty());
    assert!(ride_store::get_ride_by_id(&shared, ride.id).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn timed_out_join_leaves_no_trace() {
    let mut world = World::new();
    world.config = world
        .config
        .clone()
        .with_request_timeout(Duration::from_millis(100));
    let alice = world.signed_in("alice").await;
    let bob = world.signed_in("bob").await;
    let ride = ride_store::create_ride(&alice, mumbai_pune(2)).await.unwrap();
    ride_store::reload(&bob).await.unwrap();

    world.store.set_latency(Duration::from_secs(1));
    let err = ride_store::join_ride(&bob, ride.id).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!ride_store::has_joined_ride(&bob, ride.id).await);

    world.store.set_latency(Duration::ZERO);
    assert!(world.store.participants_of(ride.id).await.is_empty());
    let joined = ride_store::join_ride(&bob, ride.id).await.unwrap();
    assert_eq!(joined.seats_available, 1);
}

#[tokio::test]
async fn joining_a_ride_deleted_since_the_last_reload_is_not_found() {
    for strategy in [SeatStrategy::Transactional, SeatStrategy::Compensating] {
        let world = World::with_strategy(strategy);
        let alice = world.signed_in("alice").await;
        let bob = world.signed_in("bob").await;
        let ride = ride_store::create_ride(&alice, mumbai_pune(2)).await.unwrap();
        ride_store::reload(&bob).await.unwrap();
        ride_store::delete_ride(&alice, ride.id).await.unwrap();

        let err = ride_store::join_ride(&bob, ride.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)), "{strategy:?}: {err:?}");
        assert!(!err.is_retryable());
        assert!(!ride_store::has_joined_ride(&bob, ride.id).await);
    }
}
