//! Join/leave transitions that keep the seat counter and the participant rows in step.
//!
//! Two implementations share one contract: [`TransactionalSeats`] delegates to the
//! store's single-transaction procedures, [`CompensatingSeats`] orders two writes
//! so that a failure between them errs toward an orphan participant row rather
//! than a leaked seat, and undoes the first write when the second one fails.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    config::SeatStrategy,
    dao::{
        models::{AtomicSeatOutcome, RideEntity, SeatAdjustment, SeatUpdate},
        ride_store::RideBackend,
        storage::{StorageError, with_timeout},
    },
    error::{ConflictKind, ServiceError},
};

/// Why a join or leave did not commit.
#[derive(Debug, Error)]
pub enum SeatError {
    #[error("participant already recorded")]
    AlreadyJoined,
    #[error("no participant to remove")]
    NotJoined,
    #[error("no seat left at commit time")]
    RideFull,
    #[error("ride no longer exists")]
    RideMissing,
    #[error(transparent)]
    Transport(#[from] StorageError),
}

impl From<SeatError> for ServiceError {
    fn from(err: SeatError) -> Self {
        match err {
            SeatError::AlreadyJoined => ConflictKind::AlreadyJoined.into(),
            SeatError::NotJoined => ConflictKind::NotJoined.into(),
            SeatError::RideFull => ConflictKind::RideFull.into(),
            SeatError::RideMissing => ServiceError::NotFound("ride no longer exists".into()),
            SeatError::Transport(source) => ServiceError::Transport(source),
        }
    }
}

/// Result of a committed transition: the ride row as the store left it.
pub type SeatResult = Result<RideEntity, SeatError>;

/// Contract shared by the seat accounting strategies.
pub trait SeatProtocol: Send + Sync {
    /// Record `user_id` as a participant of `ride_id` and take one seat.
    fn join(&self, ride_id: Uuid, user_id: Uuid) -> BoxFuture<'static, SeatResult>;
    /// Remove `user_id` from `ride_id` and give the seat back.
    fn leave(&self, ride_id: Uuid, user_id: Uuid) -> BoxFuture<'static, SeatResult>;
}

/// Build the protocol selected by configuration.
pub fn for_strategy(
    strategy: SeatStrategy,
    backend: Arc<dyn RideBackend>,
    timeout: Duration,
) -> Arc<dyn SeatProtocol> {
    match strategy {
        SeatStrategy::Transactional => Arc::new(TransactionalSeats { backend, timeout }),
        SeatStrategy::Compensating => Arc::new(CompensatingSeats { backend, timeout }),
    }
}

fn committed(outcome: AtomicSeatOutcome) -> SeatResult {
    match outcome {
        AtomicSeatOutcome::Committed(ride) => Ok(ride),
        AtomicSeatOutcome::AlreadyJoined => Err(SeatError::AlreadyJoined),
        AtomicSeatOutcome::NotJoined => Err(SeatError::NotJoined),
        AtomicSeatOutcome::RideFull => Err(SeatError::RideFull),
        AtomicSeatOutcome::Missing => Err(SeatError::RideMissing),
    }
}

/// Both writes happen inside one server-side transaction.
pub struct TransactionalSeats {
    backend: Arc<dyn RideBackend>,
    timeout: Duration,
}

impl SeatProtocol for TransactionalSeats {
    fn join(&self, ride_id: Uuid, user_id: Uuid) -> BoxFuture<'static, SeatResult> {
        let operation = self.backend.join_ride_atomic(ride_id, user_id);
        let timeout = self.timeout;
        Box::pin(async move { committed(with_timeout(timeout, operation).await?) })
    }

    fn leave(&self, ride_id: Uuid, user_id: Uuid) -> BoxFuture<'static, SeatResult> {
        let operation = self.backend.leave_ride_atomic(ride_id, user_id);
        let timeout = self.timeout;
        Box::pin(async move { committed(with_timeout(timeout, operation).await?) })
    }
}

/// Participant write first, seat update second, best-effort undo in between.
pub struct CompensatingSeats {
    backend: Arc<dyn RideBackend>,
    timeout: Duration,
}

impl CompensatingSeats {
    async fn undo_insert(backend: &Arc<dyn RideBackend>, timeout: Duration, ride_id: Uuid, user_id: Uuid) {
        match with_timeout(timeout, backend.delete_participant(ride_id, user_id)).await {
            Ok(_) => debug!(ride_id = %ride_id, user_id = %user_id, "participant insert rolled back"),
            Err(err) => error!(
                ride_id = %ride_id,
                user_id = %user_id,
                error = %err,
                "failed to roll back participant insert; orphan participant row left behind"
            ),
        }
    }

    async fn undo_delete(backend: &Arc<dyn RideBackend>, timeout: Duration, ride_id: Uuid, user_id: Uuid) {
        match with_timeout(timeout, backend.insert_participant(ride_id, user_id)).await {
            Ok(()) | Err(StorageError::UniqueViolation { .. }) => {
                debug!(ride_id = %ride_id, user_id = %user_id, "participant delete rolled back")
            }
            Err(err) => error!(
                ride_id = %ride_id,
                user_id = %user_id,
                error = %err,
                "failed to restore participant row; membership lost while the seat stays taken"
            ),
        }
    }
}

impl SeatProtocol for CompensatingSeats {
    fn join(&self, ride_id: Uuid, user_id: Uuid) -> BoxFuture<'static, SeatResult> {
        let backend = self.backend.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            match with_timeout(timeout, backend.insert_participant(ride_id, user_id)).await {
                Ok(()) => {}
                Err(StorageError::UniqueViolation { .. }) => return Err(SeatError::AlreadyJoined),
                Err(StorageError::MissingParent { .. }) => return Err(SeatError::RideMissing),
                Err(err) => return Err(err.into()),
            }

            let update = with_timeout(timeout, backend.adjust_seats(ride_id, SeatAdjustment::Take)).await;
            match update {
                Ok(SeatUpdate::Applied(ride)) => Ok(ride),
                Ok(SeatUpdate::Exhausted) => {
                    Self::undo_insert(&backend, timeout, ride_id, user_id).await;
                    Err(SeatError::RideFull)
                }
                Ok(SeatUpdate::Missing) => {
                    Self::undo_insert(&backend, timeout, ride_id, user_id).await;
                    Err(SeatError::RideMissing)
                }
                Err(err) => {
                    warn!(ride_id = %ride_id, error = %err, "seat decrement failed after participant insert");
                    Self::undo_insert(&backend, timeout, ride_id, user_id).await;
                    Err(err.into())
                }
            }
        })
    }

    fn leave(&self, ride_id: Uuid, user_id: Uuid) -> BoxFuture<'static, SeatResult> {
        let backend = self.backend.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            if !with_timeout(timeout, backend.delete_participant(ride_id, user_id)).await? {
                return Err(SeatError::NotJoined);
            }

            let update =
                with_timeout(timeout, backend.adjust_seats(ride_id, SeatAdjustment::Release)).await;
            match update {
                Ok(SeatUpdate::Applied(ride)) => Ok(ride),
                Ok(SeatUpdate::Exhausted) => {
                    // The counter already shows full capacity; the participant row is gone either way.
                    warn!(ride_id = %ride_id, "seat release found the ride already at capacity");
                    with_timeout(timeout, backend.find_ride(ride_id))
                        .await?
                        .ok_or(SeatError::RideMissing)
                }
                Ok(SeatUpdate::Missing) => Err(SeatError::RideMissing),
                Err(err) => {
                    warn!(ride_id = %ride_id, error = %err, "seat increment failed after participant delete");
                    Self::undo_delete(&backend, timeout, ride_id, user_id).await;
                    Err(err.into())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{
        models::NewRideEntity,
        ride_store::memory::{Fault, MemoryRideStore},
    };
    use time::macros::{date, time};

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn ride(store: &MemoryRideStore, seats: u32) -> RideEntity {
        store
            .insert_ride(NewRideEntity {
                source: "Mumbai".into(),
                destination: "Pune".into(),
                date: date!(2025 - 01 - 10),
                start_time: time!(09:00),
                end_time: time!(10:00),
                total_seats: seats,
                seats_available: seats,
                creator_id: Uuid::new_v4(),
                creator_name: "A".into(),
                creator_email: "a@vitstudent.ac.in".into(),
                creator_whatsapp: None,
            })
            .await
            .unwrap()
    }

    fn protocol(store: &MemoryRideStore, strategy: SeatStrategy) -> Arc<dyn SeatProtocol> {
        for_strategy(strategy, Arc::new(store.clone()), TIMEOUT)
    }

    #[tokio::test]
    async fn both_strategies_account_seats_identically() {
        for strategy in [SeatStrategy::Transactional, SeatStrategy::Compensating] {
            let store = MemoryRideStore::new();
            let protocol = protocol(&store, strategy);
            let ride = ride(&store, 1).await;
            let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

            let joined = protocol.join(ride.id, first).await.unwrap();
            assert_eq!(joined.seats_available, 0);
            assert!(matches!(protocol.join(ride.id, first).await, Err(SeatError::AlreadyJoined)));
            assert!(matches!(protocol.join(ride.id, second).await, Err(SeatError::RideFull)));
            assert_eq!(store.participants_of(ride.id).await.len(), 1);

            assert!(matches!(protocol.leave(ride.id, second).await, Err(SeatError::NotJoined)));
            let left = protocol.leave(ride.id, first).await.unwrap();
            assert_eq!(left.seats_available, 1);
            assert!(store.participants_of(ride.id).await.is_empty());
        }
    }

    #[tokio::test]
    async fn failed_decrement_removes_the_inserted_participant() {
        let store = MemoryRideStore::new();
        let protocol = protocol(&store, SeatStrategy::Compensating);
        let ride = ride(&store, 2).await;
        let user = Uuid::new_v4();

        store.fail_next(Fault::AdjustSeats);
        let err = protocol.join(ride.id, user).await.unwrap_err();

        assert!(matches!(err, SeatError::Transport(_)));
        assert!(store.participants_of(ride.id).await.is_empty());
        let after = store.find_ride(ride.id).await.unwrap().unwrap();
        assert_eq!(after.seats_available, 2);
    }

    #[tokio::test]
    async fn failed_compensation_leaves_orphan_but_keeps_seats() {
        let store = MemoryRideStore::new();
        let protocol = protocol(&store, SeatStrategy::Compensating);
        let ride = ride(&store, 2).await;
        let user = Uuid::new_v4();

        store.fail_next(Fault::AdjustSeats);
        store.fail_next(Fault::DeleteParticipant);
        assert!(protocol.join(ride.id, user).await.is_err());

        assert_eq!(store.participants_of(ride.id).await.len(), 1);
        let after = store.find_ride(ride.id).await.unwrap().unwrap();
        assert_eq!(after.seats_available, 2);
    }

    #[tokio::test]
    async fn failed_increment_restores_the_participant() {
        let store = MemoryRideStore::new();
        let protocol = protocol(&store, SeatStrategy::Compensating);
        let ride = ride(&store, 2).await;
        let user = Uuid::new_v4();
        protocol.join(ride.id, user).await.unwrap();

        store.fail_next(Fault::AdjustSeats);
        assert!(matches!(
            protocol.leave(ride.id, user).await,
            Err(SeatError::Transport(_))
        ));

        assert_eq!(store.participants_of(ride.id).await.len(), 1);
        let after = store.find_ride(ride.id).await.unwrap().unwrap();
        assert_eq!(after.seats_available, 1);
    }

    #[tokio::test]
    async fn insert_failure_touches_nothing() {
        let store = MemoryRideStore::new();
        let protocol = protocol(&store, SeatStrategy::Compensating);
        let ride = ride(&store, 2).await;

        store.fail_next(Fault::InsertParticipant);
        assert!(protocol.join(ride.id, Uuid::new_v4()).await.is_err());
        assert!(store.participants_of(ride.id).await.is_empty());
        assert_eq!(store.find_ride(ride.id).await.unwrap().unwrap().seats_available, 2);
    }

    #[tokio::test]
    async fn join_on_deleted_ride_reports_missing_for_both_strategies() {
        for strategy in [SeatStrategy::Transactional, SeatStrategy::Compensating] {
            let store = MemoryRideStore::new();
            let protocol = protocol(&store, strategy);
            let ride = ride(&store, 2).await;
            store.delete_ride(ride.id).await.unwrap();

            let err = protocol.join(ride.id, Uuid::new_v4()).await.unwrap_err();
            assert!(matches!(err, SeatError::RideMissing), "{strategy:?}: {err:?}");
            let err = ServiceError::from(err);
            assert!(matches!(err, ServiceError::NotFound(_)));
            assert!(!err.is_retryable());
            assert!(store.participants_of(ride.id).await.is_empty());
        }
    }
}
