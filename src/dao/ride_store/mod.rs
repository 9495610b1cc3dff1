/// In-process backend used by tests and local runs.
pub mod memory;
/// Hosted backend speaking PostgREST and GoTrue over HTTP.
#[cfg(feature = "postgrest-store")]
pub mod postgrest;

use crate::dao::models::{
    AtomicSeatOutcome, NewRideEntity, NewUserProfileEntity, ParticipantEntity, RideEntity,
    RidePatchEntity, SeatAdjustment, SeatUpdate, UserProfileEntity,
};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the relational store holding rides, participants and profiles.
///
/// Each method maps to one round-trip against the backing store. Nothing here
/// spans more than one table except [`RideBackend::delete_ride`] (cascade) and the
/// two `*_atomic` procedures, which must run as a single transaction.
pub trait RideBackend: Send + Sync {
    /// All rides, newest `created_at` first.
    fn list_rides(&self) -> BoxFuture<'static, StorageResult<Vec<RideEntity>>>;
    fn find_ride(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RideEntity>>>;
    fn insert_ride(&self, ride: NewRideEntity) -> BoxFuture<'static, StorageResult<RideEntity>>;
    /// Returns `None` when the row does not exist.
    fn update_ride(
        &self,
        id: Uuid,
        patch: RidePatchEntity,
    ) -> BoxFuture<'static, StorageResult<Option<RideEntity>>>;
    /// Delete the ride and every participant row pointing at it.
    fn delete_ride(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;

    fn joined_ride_ids(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<Uuid>>>;
    fn list_participants(
        &self,
        ride_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;
    /// Fails with [`crate::dao::storage::StorageError::UniqueViolation`] on a duplicate pair.
    fn insert_participant(
        &self,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn delete_participant(
        &self,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Single conditional seat update on the ride row.
    fn adjust_seats(
        &self,
        ride_id: Uuid,
        adjustment: SeatAdjustment,
    ) -> BoxFuture<'static, StorageResult<SeatUpdate>>;

    /// Insert the participant row and take a seat in one transaction.
    fn join_ride_atomic(
        &self,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<AtomicSeatOutcome>>;
    /// Delete the participant row and release the seat in one transaction.
    fn leave_ride_atomic(
        &self,
        ride_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<AtomicSeatOutcome>>;

    fn find_profile(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<UserProfileEntity>>>;
    fn insert_profile(
        &self,
        profile: NewUserProfileEntity,
    ) -> BoxFuture<'static, StorageResult<UserProfileEntity>>;
    fn update_whatsapp(
        &self,
        id: Uuid,
        whatsapp: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserProfileEntity>>>;

    /// Scope subsequent requests to the signed-in user (or anonymous on `None`).
    fn set_access_token(&self, token: Option<String>);
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
