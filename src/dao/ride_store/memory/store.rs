use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tracing::debug;
use uuid::Uuid;

use crate::dao::{
    changes::{ChangeEvent, ChangeFeed, ChangeKind, ChannelStatus, Subscription, Table},
    models::{
        AtomicSeatOutcome, NewRideEntity, NewUserProfileEntity, ParticipantEntity, RideEntity,
        RidePatchEntity, SeatAdjustment, SeatUpdate, UserProfileEntity,
    },
    ride_store::RideBackend,
    storage::{StorageError, StorageResult},
};

const CHANGE_CHANNEL_CAPACITY: usize = 64;
const SUBSCRIPTION_BUFFER: usize = 32;

/// Operations that can be told to fail once, to exercise error paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    ListRides,
    JoinedRides,
    InsertRide,
    UpdateRide,
    DeleteRide,
    ListParticipants,
    InsertParticipant,
    DeleteParticipant,
    AdjustSeats,
    AtomicJoin,
    AtomicLeave,
    Profile,
    HealthCheck,
    /// The next subscription reports `ChannelError` instead of `Subscribed`.
    SubscribeError,
    /// The next subscription reports `TimedOut` instead of `Subscribed`.
    SubscribeTimeout,
}

#[derive(Debug, Error)]
#[error("injected fault on {0:?}")]
struct InjectedFault(Fault);

#[derive(Default)]
struct Tables {
    /// Insertion order; listing sorts by `created_at`.
    rides: Vec<RideEntity>,
    participants: Vec<ParticipantEntity>,
    profiles: HashMap<Uuid, UserProfileEntity>,
}

impl Tables {
    fn ride_mut(&mut self, id: Uuid) -> Option<&mut RideEntity> {
        self.rides.iter_mut().find(|ride| ride.id == id)
    }

    fn has_participant(&self, ride_id: Uuid, user_id: Uuid) -> bool {
        self.participants
            .iter()
            .any(|p| p.ride_id == ride_id && p.user_id == user_id)
    }

    fn remove_participant(&mut self, ride_id: Uuid, user_id: Uuid) -> bool {
        let before = self.participants.len();
        self.participants
            .retain(|p| !(p.ride_id == ride_id && p.user_id == user_id));
        self.participants.len() != before
    }

    fn apply_seats(&mut self, ride_id: Uuid, adjustment: SeatAdjustment) -> SeatUpdate {
        let Some(ride) = self.ride_mut(ride_id) else {
            return SeatUpdate::Missing;
        };
        match adjustment {
            SeatAdjustment::Take if ride.seats_available > 0 => {
                ride.seats_available -= 1;
                SeatUpdate::Applied(ride.clone())
            }
            SeatAdjustment::Release if ride.seats_available < ride.total_seats => {
                ride.seats_available += 1;
                SeatUpdate::Applied(ride.clone())
            }
            _ => SeatUpdate::Exhausted,
        }
    }
}

struct Inner {
    tables: Mutex<Tables>,
    changes: broadcast::Sender<ChangeEvent>,
    feed_broken: watch::Sender<bool>,
    faults: DashMap<Fault, u32>,
    latency_ms: AtomicU64,
    token: std::sync::Mutex<Option<String>>,
}

/// In-process relational store with a change feed.
#[derive(Clone)]
pub struct MemoryRideStore {
    inner: Arc<Inner>,
}

impl Default for MemoryRideStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRideStore {
    /// Empty store with no faults injected.
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (feed_broken, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                changes,
                feed_broken,
                faults: DashMap::new(),
                latency_ms: AtomicU64::new(0),
                token: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Make the next call of `fault`'s operation fail with an unavailable error.
    pub fn fail_next(&self, fault: Fault) {
        *self.inner.faults.entry(fault).or_insert(0) += 1;
    }

    /// Delay every round-trip by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Drop every open subscription into `ChannelError`.
    pub fn break_feeds(&self) {
        let _ = self.inner.feed_broken.send(true);
    }

    /// Access token most recently installed by the session.
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .token
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or(None)
    }

    /// Participant rows for a ride, bypassing fault injection.
    pub async fn participants_of(&self, ride_id: Uuid) -> Vec<ParticipantEntity> {
        let tables = self.inner.tables.lock().await;
        tables
            .participants
            .iter()
            .filter(|p| p.ride_id == ride_id)
            .cloned()
            .collect()
    }

    fn take_fault(&self, fault: Fault) -> bool {
        let mut hit = false;
        self.inner.faults.remove_if_mut(&fault, |_, remaining| {
            hit = true;
            *remaining -= 1;
            *remaining == 0
        });
        hit
    }

    async fn round_trip(&self, fault: Fault) -> StorageResult<()> {
        let latency = self.inner.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.take_fault(fault) {
            debug!(?fault, "memory store injecting failure");
            return Err(StorageError::unavailable(
                format!("memory store {fault:?} failed"),
                InjectedFault(fault),
            ));
        }
        Ok(())
    }

    fn notify(&self, table: Table, kind: ChangeKind) {
        let _ = self.inner.changes.send(ChangeEvent { table, kind });
    }
}

impl RideBackend for MemoryRideStore {
    fn list_rides(&self) -> BoxFuture<'static, StorageResult<Vec<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::ListRides).await?;
            let tables = store.inner.tables.lock().await;
            let mut rides: Vec<RideEntity> = tables.rides.iter().rev().cloned().collect();
            rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(rides)
        })
    }

    fn find_ride(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::ListRides).await?;
            let tables = store.inner.tables.lock().await;
            Ok(tables.rides.iter().find(|ride| ride.id == id).cloned())
        })
    }

    fn insert_ride(&self, ride: NewRideEntity) -> BoxFuture<'static, StorageResult<RideEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::InsertRide).await?;
            let entity = RideEntity {
                id: Uuid::new_v4(),
                source: ride.source,
                destination: ride.destination,
                date: ride.date,
                start_time: ride.start_time,
                end_time: ride.end_time,
                total_seats: ride.total_seats,
                seats_available: ride.seats_available,
                creator_id: ride.creator_id,
                creator_name: ride.creator_name,
                creator_email: ride.creator_email,
                creator_whatsapp: ride.creator_whatsapp,
                created_at: OffsetDateTime::now_utc(),
            };
            store.inner.tables.lock().await.rides.push(entity.clone());
            store.notify(Table::Rides, ChangeKind::Insert);
            Ok(entity)
        })
    }

    fn update_ride(
        &self,
        id: Uuid,
        patch: RidePatchEntity,
    ) -> BoxFuture<'static, StorageResult<Option<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::UpdateRide).await?;
            let updated = {
                let mut tables = store.inner.tables.lock().await;
                tables.ride_mut(id).map(|ride| {
                    *ride = patch.apply_to(ride);
                    ride.clone()
                })
            };
            if updated.is_some() {
                store.notify(Table::Rides, ChangeKind::Update);
            }
            Ok(updated)
        })
    }

    fn delete_ride(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::DeleteRide).await?;
            let (deleted, cascaded) = {
                let mut tables = store.inner.tables.lock().await;
                let before = tables.rides.len();
                tables.rides.retain(|ride| ride.id != id);
                let deleted = tables.rides.len() != before;
                let participants_before = tables.participants.len();
                tables.participants.retain(|p| p.ride_id != id);
                (deleted, tables.participants.len() != participants_before)
            };
            if cascaded {
                store.notify(Table::RideParticipants, ChangeKind::Delete);
            }
            if deleted {
                store.notify(Table::Rides, ChangeKind::Delete);
            }
            Ok(deleted)
        })
    }

    fn joined_ride_ids(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::JoinedRides).await?;
            let tables = store.inner.tables.lock().await;
            Ok(tables
                .participants
                .iter()
                .filter(|p| p.user_id == user_id)
                .map(|p| p.ride_id)
                .collect())
        })
    }

    fn list_participants(
        &self,
        ride_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::ListParticipants).await?;
            Ok(store.participants_of(ride_id).await)
        })
    }

    fn insert_participant(
        &self,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::InsertParticipant).await?;
            {
                let mut tables = store.inner.tables.lock().await;
                if tables.has_participant(ride_id, user_id) {
                    return Err(StorageError::UniqueViolation {
                        message: format!("participant ({ride_id}, {user_id}) already exists"),
                    });
                }
                if !tables.rides.iter().any(|ride| ride.id == ride_id) {
                    return Err(StorageError::MissingParent {
                        message: format!("ride `{ride_id}` does not exist"),
                    });
                }
                tables.participants.push(ParticipantEntity {
                    ride_id,
                    user_id,
                    joined_at: OffsetDateTime::now_utc(),
                });
            }
            store.notify(Table::RideParticipants, ChangeKind::Insert);
            Ok(())
        })
    }

    fn delete_participant(
        &self,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::DeleteParticipant).await?;
            let removed = store
                .inner
                .tables
                .lock()
                .await
                .remove_participant(ride_id, user_id);
            if removed {
                store.notify(Table::RideParticipants, ChangeKind::Delete);
            }
            Ok(removed)
        })
    }

    fn adjust_seats(
        &self,
        ride_id: Uuid,
        adjustment: SeatAdjustment,
    ) -> BoxFuture<'static, StorageResult<SeatUpdate>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::AdjustSeats).await?;
            let update = store
                .inner
                .tables
                .lock()
                .await
                .apply_seats(ride_id, adjustment);
            if matches!(update, SeatUpdate::Applied(_)) {
                store.notify(Table::Rides, ChangeKind::Update);
            }
            Ok(update)
        })
    }

    fn join_ride_atomic(
        &self,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<AtomicSeatOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::AtomicJoin).await?;
            let outcome = {
                let mut tables = store.inner.tables.lock().await;
                match tables.rides.iter().find(|ride| ride.id == ride_id) {
                    None => AtomicSeatOutcome::Missing,
                    Some(_) if tables.has_participant(ride_id, user_id) => {
                        AtomicSeatOutcome::AlreadyJoined
                    }
                    Some(ride) if ride.seats_available == 0 => AtomicSeatOutcome::RideFull,
                    Some(_) => match tables.apply_seats(ride_id, SeatAdjustment::Take) {
                        SeatUpdate::Applied(ride) => {
                            tables.participants.push(ParticipantEntity {
                                ride_id,
                                user_id,
                                joined_at: OffsetDateTime::now_utc(),
                            });
                            AtomicSeatOutcome::Committed(ride)
                        }
                        SeatUpdate::Exhausted => AtomicSeatOutcome::RideFull,
                        SeatUpdate::Missing => AtomicSeatOutcome::Missing,
                    },
                }
            };
            if matches!(outcome, AtomicSeatOutcome::Committed(_)) {
                store.notify(Table::RideParticipants, ChangeKind::Insert);
                store.notify(Table::Rides, ChangeKind::Update);
            }
            Ok(outcome)
        })
    }

    fn leave_ride_atomic(
        &self,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<AtomicSeatOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::AtomicLeave).await?;
            let outcome = {
                let mut tables = store.inner.tables.lock().await;
                if !tables.rides.iter().any(|ride| ride.id == ride_id) {
                    AtomicSeatOutcome::Missing
                } else if !tables.remove_participant(ride_id, user_id) {
                    AtomicSeatOutcome::NotJoined
                } else {
                    match tables.apply_seats(ride_id, SeatAdjustment::Release) {
                        SeatUpdate::Applied(ride) => AtomicSeatOutcome::Committed(ride),
                        // Already at capacity: the row is gone, the count stays clamped.
                        SeatUpdate::Exhausted => match tables.ride_mut(ride_id) {
                            Some(ride) => AtomicSeatOutcome::Committed(ride.clone()),
                            None => AtomicSeatOutcome::Missing,
                        },
                        SeatUpdate::Missing => AtomicSeatOutcome::Missing,
                    }
                }
            };
            if matches!(outcome, AtomicSeatOutcome::Committed(_)) {
                store.notify(Table::RideParticipants, ChangeKind::Delete);
                store.notify(Table::Rides, ChangeKind::Update);
            }
            Ok(outcome)
        })
    }

    fn find_profile(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<UserProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::Profile).await?;
            Ok(store.inner.tables.lock().await.profiles.get(&id).cloned())
        })
    }

    fn insert_profile(
        &self,
        profile: NewUserProfileEntity,
    ) -> BoxFuture<'static, StorageResult<UserProfileEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::Profile).await?;
            let mut tables = store.inner.tables.lock().await;
            if tables.profiles.contains_key(&profile.id) {
                return Err(StorageError::UniqueViolation {
                    message: format!("profile `{}` already exists", profile.id),
                });
            }
            let now = OffsetDateTime::now_utc();
            let entity = UserProfileEntity {
                id: profile.id,
                email: profile.email,
                name: profile.name,
                whatsapp: None,
                created_at: now,
                updated_at: now,
            };
            tables.profiles.insert(entity.id, entity.clone());
            Ok(entity)
        })
    }

    fn update_whatsapp(
        &self,
        id: Uuid,
        whatsapp: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip(Fault::Profile).await?;
            let mut tables = store.inner.tables.lock().await;
            Ok(tables.profiles.get_mut(&id).map(|profile| {
                profile.whatsapp = Some(whatsapp);
                profile.updated_at = OffsetDateTime::now_utc();
                profile.clone()
            }))
        })
    }

    fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.inner.token.lock() {
            *guard = token;
        }
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.round_trip(Fault::HealthCheck).await })
    }
}

impl ChangeFeed for MemoryRideStore {
    fn subscribe(&self, tables: Vec<Table>) -> Subscription {
        let (event_tx, event_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Connecting);
        let mut changes = self.inner.changes.subscribe();
        let mut broken = self.inner.feed_broken.subscribe();
        let failure = if self.take_fault(Fault::SubscribeError) {
            Some(ChannelStatus::ChannelError)
        } else if self.take_fault(Fault::SubscribeTimeout) {
            Some(ChannelStatus::TimedOut)
        } else {
            None
        };

        let task = tokio::spawn(async move {
            if let Some(status) = failure {
                let _ = status_tx.send(status);
                return;
            }
            // A feed broken before this subscription only affects older subscribers.
            broken.borrow_and_update();
            let _ = status_tx.send(ChannelStatus::Subscribed);

            loop {
                tokio::select! {
                    changed = broken.changed() => {
                        if changed.is_err() || *broken.borrow() {
                            let _ = status_tx.send(ChannelStatus::ChannelError);
                            return;
                        }
                    }
                    received = changes.recv() => match received {
                        Ok(event) => {
                            if tables.contains(&event.table) && event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "memory change feed lagged");
                            // Any event is enough to trigger a reload.
                            let lagged = ChangeEvent {
                                table: tables.first().copied().unwrap_or(Table::Rides),
                                kind: ChangeKind::Update,
                            };
                            if event_tx.send(lagged).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            let _ = status_tx.send(ChannelStatus::Closed);
        });

        Subscription::new(event_rx, status_rx, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, time};

    fn new_ride(seats: u32) -> NewRideEntity {
        NewRideEntity {
            source: "Mumbai".into(),
            destination: "Pune".into(),
            date: date!(2025 - 01 - 10),
            start_time: time!(09:00),
            end_time: time!(10:00),
            total_seats: seats,
            seats_available: seats,
            creator_id: Uuid::new_v4(),
            creator_name: "Creator".into(),
            creator_email: "creator@vitstudent.ac.in".into(),
            creator_whatsapp: Some("919876543210".into()),
        }
    }

    #[tokio::test]
    async fn duplicate_participant_is_a_unique_violation() {
        let store = MemoryRideStore::new();
        let ride = store.insert_ride(new_ride(2)).await.unwrap();
        let user = Uuid::new_v4();

        store.insert_participant(ride.id, user).await.unwrap();
        let err = store.insert_participant(ride.id, user).await.unwrap_err();
        assert!(matches!(err, StorageError::UniqueViolation { .. }));
        assert_eq!(store.participants_of(ride.id).await.len(), 1);
    }

    #[tokio::test]
    async fn seat_guards_hold_at_both_bounds() {
        let store = MemoryRideStore::new();
        let ride = store.insert_ride(new_ride(1)).await.unwrap();

        assert_eq!(
            store.adjust_seats(ride.id, SeatAdjustment::Release).await.unwrap(),
            SeatUpdate::Exhausted
        );
        let SeatUpdate::Applied(after) = store.adjust_seats(ride.id, SeatAdjustment::Take).await.unwrap() else {
            panic!("take should apply");
        };
        assert_eq!(after.seats_available, 0);
        assert_eq!(
            store.adjust_seats(ride.id, SeatAdjustment::Take).await.unwrap(),
            SeatUpdate::Exhausted
        );
        assert_eq!(
            store.adjust_seats(Uuid::new_v4(), SeatAdjustment::Take).await.unwrap(),
            SeatUpdate::Missing
        );
    }

    #[tokio::test]
    async fn delete_ride_cascades_participants() {
        let store = MemoryRideStore::new();
        let ride = store.insert_ride(new_ride(3)).await.unwrap();
        store.insert_participant(ride.id, Uuid::new_v4()).await.unwrap();
        store.insert_participant(ride.id, Uuid::new_v4()).await.unwrap();

        assert!(store.delete_ride(ride.id).await.unwrap());
        assert!(store.participants_of(ride.id).await.is_empty());
        assert!(store.find_ride(ride.id).await.unwrap().is_none());
        assert!(!store.delete_ride(ride.id).await.unwrap());
    }

    #[tokio::test]
    async fn atomic_join_refuses_full_ride_without_writing() {
        let store = MemoryRideStore::new();
        let ride = store.insert_ride(new_ride(1)).await.unwrap();

        let first = store.join_ride_atomic(ride.id, Uuid::new_v4()).await.unwrap();
        assert!(matches!(first, AtomicSeatOutcome::Committed(ref r) if r.seats_available == 0));

        let late = Uuid::new_v4();
        let second = store.join_ride_atomic(ride.id, late).await.unwrap();
        assert_eq!(second, AtomicSeatOutcome::RideFull);
        assert!(!store.participants_of(ride.id).await.iter().any(|p| p.user_id == late));
    }

    #[tokio::test]
    async fn injected_fault_fails_exactly_once() {
        let store = MemoryRideStore::new();
        store.fail_next(Fault::ListRides);
        assert!(store.list_rides().await.is_err());
        assert!(store.list_rides().await.is_ok());
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let store = MemoryRideStore::new();
        let older = store.insert_ride(new_ride(1)).await.unwrap();
        let newer = store.insert_ride(new_ride(1)).await.unwrap();
        let ids: Vec<Uuid> = store.list_rides().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn subscription_filters_tables_and_reports_break() {
        let store = MemoryRideStore::new();
        let mut subscription = store.subscribe(vec![Table::Rides]);
        let (_, status) = subscription.channels();
        status
            .wait_for(|s| *s == ChannelStatus::Subscribed)
            .await
            .unwrap();

        let ride = store.insert_ride(new_ride(2)).await.unwrap();
        store.insert_participant(ride.id, Uuid::new_v4()).await.unwrap();

        let (events, _) = subscription.channels();
        let event = events.recv().await.unwrap();
        assert_eq!(event.table, Table::Rides);
        assert!(events.try_recv().is_err());

        store.break_feeds();
        let (_, status) = subscription.channels();
        status
            .wait_for(|s| *s == ChannelStatus::ChannelError)
            .await
            .unwrap();
    }
}
