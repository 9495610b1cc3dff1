//! Wire payloads specific to PostgREST and GoTrue.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::dao::{
    identity::AuthIdentity,
    models::{AtomicSeatOutcome, RideEntity, SeatAdjustment, SeatUpdate},
};

use super::error::PostgrestError;

/// Error body returned by PostgREST on failed requests.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Projection of `ride_participants` on `ride_id`.
#[derive(Debug, Deserialize)]
pub struct RideIdRow {
    pub ride_id: Uuid,
}

/// Body of a participant insert.
#[derive(Debug, Serialize)]
pub struct ParticipantInsert {
    pub ride_id: Uuid,
    pub user_id: Uuid,
}

/// Arguments of the `adjust_seats` procedure: `-1` takes a seat, `+1` gives one back.
#[derive(Debug, Serialize)]
pub struct SeatAdjustArgs {
    pub p_ride_id: Uuid,
    pub p_delta: i32,
}

impl SeatAdjustArgs {
    /// Arguments for one seat taken or released.
    pub fn new(ride_id: Uuid, adjustment: SeatAdjustment) -> Self {
        let p_delta = match adjustment {
            SeatAdjustment::Take => -1,
            SeatAdjustment::Release => 1,
        };
        Self {
            p_ride_id: ride_id,
            p_delta,
        }
    }
}

/// `status` field of the `adjust_seats` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatAdjustStatus {
    Applied,
    Exhausted,
    Missing,
}

/// JSON object returned by `adjust_seats`.
#[derive(Debug, Deserialize)]
pub struct SeatAdjustResponse {
    pub status: SeatAdjustStatus,
    #[serde(default)]
    pub ride: Option<RideEntity>,
}

impl SeatAdjustResponse {
    /// Map the procedure status onto a seat update.
    pub fn into_update(self) -> Result<SeatUpdate, PostgrestError> {
        Ok(match self.status {
            SeatAdjustStatus::Applied => SeatUpdate::Applied(self.ride.ok_or(
                PostgrestError::MalformedProcedureResult {
                    procedure: "adjust_seats",
                },
            )?),
            SeatAdjustStatus::Exhausted => SeatUpdate::Exhausted,
            SeatAdjustStatus::Missing => SeatUpdate::Missing,
        })
    }
}

/// Body of the onboarding profile update.
#[derive(Debug, Serialize)]
pub struct WhatsappPatch {
    pub whatsapp: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Arguments of the `join_ride` / `leave_ride` procedures.
#[derive(Debug, Serialize)]
pub struct SeatProcedureArgs {
    pub p_ride_id: Uuid,
    pub p_user_id: Uuid,
}

/// `status` field of the join/leave procedure results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatProcedureStatus {
    Committed,
    AlreadyJoined,
    NotJoined,
    RideFull,
    Missing,
}

/// JSON object returned by the seat procedures.
#[derive(Debug, Deserialize)]
pub struct SeatProcedureResponse {
    pub status: SeatProcedureStatus,
    #[serde(default)]
    pub ride: Option<RideEntity>,
}

impl SeatProcedureResponse {
    /// Map the procedure status onto a seat outcome.
    pub fn into_outcome(self, procedure: &'static str) -> Result<AtomicSeatOutcome, PostgrestError> {
        Ok(match self.status {
            SeatProcedureStatus::Committed => AtomicSeatOutcome::Committed(
                self.ride
                    .ok_or(PostgrestError::MalformedProcedureResult { procedure })?,
            ),
            SeatProcedureStatus::AlreadyJoined => AtomicSeatOutcome::AlreadyJoined,
            SeatProcedureStatus::NotJoined => AtomicSeatOutcome::NotJoined,
            SeatProcedureStatus::RideFull => AtomicSeatOutcome::RideFull,
            SeatProcedureStatus::Missing => AtomicSeatOutcome::Missing,
        })
    }
}

/// Subset of the GoTrue user object.
#[derive(Debug, Deserialize)]
pub struct GoTrueUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Display name as set by the OAuth provider.
#[derive(Debug, Default, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl GoTrueUser {
    /// Identities without an email address cannot be mapped onto a profile.
    pub fn into_identity(self) -> Option<AuthIdentity> {
        let email = self.email.filter(|email| !email.is_empty())?;
        let full_name = self
            .user_metadata
            .full_name
            .or(self.user_metadata.name)
            .filter(|name| !name.trim().is_empty());
        Some(AuthIdentity {
            id: self.id,
            email,
            full_name,
        })
    }
}
