use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

use crate::dao::serde_fmt;

/// Ride row as persisted in the `rides` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RideEntity {
    /// Primary key of the ride.
    pub id: Uuid,
    /// Pickup location label.
    pub source: String,
    /// Drop location label.
    pub destination: String,
    /// Calendar date of the ride.
    #[serde(with = "serde_fmt::date")]
    pub date: Date,
    /// Start of the departure window.
    #[serde(with = "serde_fmt::clock")]
    pub start_time: Time,
    /// End of the departure window (exclusive).
    #[serde(with = "serde_fmt::clock")]
    pub end_time: Time,
    /// Capacity at creation (or after an edit made with no participants).
    pub total_seats: u32,
    /// Seats still free; decremented per join, incremented per leave.
    pub seats_available: u32,
    /// Identifier of the creating user.
    pub creator_id: Uuid,
    /// Creator display name captured at creation.
    pub creator_name: String,
    /// Creator email captured at creation.
    pub creator_email: String,
    /// Creator WhatsApp digits captured at creation, if any.
    #[serde(default)]
    pub creator_whatsapp: Option<String>,
    /// Creation timestamp, immutable.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Insert payload for the `rides` table; identity and timestamp are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewRideEntity {
    pub source: String,
    pub destination: String,
    #[serde(with = "serde_fmt::date")]
    pub date: Date,
    #[serde(with = "serde_fmt::clock")]
    pub start_time: Time,
    #[serde(with = "serde_fmt::clock")]
    pub end_time: Time,
    pub total_seats: u32,
    pub seats_available: u32,
    pub creator_id: Uuid,
    pub creator_name: String,
    pub creator_email: String,
    pub creator_whatsapp: Option<String>,
}

/// Partial update for the `rides` table. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RidePatchEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_fmt::date::option"
    )]
    pub date: Option<Date>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_fmt::clock::option"
    )]
    pub start_time: Option<Time>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_fmt::clock::option"
    )]
    pub end_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_seats: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seats_available: Option<u32>,
}

impl RidePatchEntity {
    /// Whether the patch would not change anything.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch onto a copy of `ride`.
    pub fn apply_to(&self, ride: &RideEntity) -> RideEntity {
        let mut next = ride.clone();
        if let Some(source) = &self.source {
            next.source = source.clone();
        }
        if let Some(destination) = &self.destination {
            next.destination = destination.clone();
        }
        if let Some(date) = self.date {
            next.date = date;
        }
        if let Some(start_time) = self.start_time {
            next.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            next.end_time = end_time;
        }
        if let Some(total_seats) = self.total_seats {
            next.total_seats = total_seats;
        }
        if let Some(seats_available) = self.seats_available {
            next.seats_available = seats_available;
        }
        next
    }
}

/// Row of the `ride_participants` table linking a ride and a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    pub ride_id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

/// Row of the `user_profiles` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfileEntity {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Insert payload for `user_profiles`; the id is the external auth identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewUserProfileEntity {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

/// Direction of a single-seat conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatAdjustment {
    /// `seats_available - 1`, only while `seats_available > 0`.
    Take,
    /// `seats_available + 1`, only while `seats_available < total_seats`.
    Release,
}

/// Result of a conditional seat update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatUpdate {
    /// The update was applied; carries the ride row after the write.
    Applied(RideEntity),
    /// The guard did not hold (no seat left to take, or already at capacity).
    Exhausted,
    /// The ride row no longer exists.
    Missing,
}

/// Result of the transactional join/leave procedures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomicSeatOutcome {
    /// Participant row and seat count were both written; carries the ride after the write.
    Committed(RideEntity),
    /// A participant row for the pair already exists.
    AlreadyJoined,
    /// No participant row exists for the pair.
    NotJoined,
    /// No seat was left at commit time.
    RideFull,
    /// The ride row no longer exists.
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    fn ride() -> RideEntity {
        RideEntity {
            id: Uuid::nil(),
            source: "Mumbai".into(),
            destination: "Pune".into(),
            date: date!(2025 - 01 - 10),
            start_time: time!(09:00),
            end_time: time!(10:00),
            total_seats: 2,
            seats_available: 2,
            creator_id: Uuid::nil(),
            creator_name: "A".into(),
            creator_email: "a@vitstudent.ac.in".into(),
            creator_whatsapp: None,
            created_at: datetime!(2025-01-01 08:00 UTC),
        }
    }

    #[test]
    fn ride_row_decodes_database_shape() {
        let row = serde_json::json!({
            "id": "00000000-0000-0000-0000-000000000000",
            "source": "Mumbai",
            "destination": "Pune",
            "date": "2025-01-10",
            "start_time": "09:00:00",
            "end_time": "10:00:00",
            "total_seats": 2,
            "seats_available": 2,
            "creator_id": "00000000-0000-0000-0000-000000000000",
            "creator_name": "A",
            "creator_email": "a@vitstudent.ac.in",
            "creator_whatsapp": null,
            "created_at": "2025-01-01T08:00:00+00:00"
        });
        let decoded: RideEntity = serde_json::from_value(row).unwrap();
        assert_eq!(decoded, ride());
    }

    #[test]
    fn empty_patch_serializes_to_empty_object() {
        let patch = RidePatchEntity::default();
        assert!(patch.is_empty());
        assert_eq!(serde_json::to_string(&patch).unwrap(), "{}");
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let patch = RidePatchEntity {
            destination: Some("Lonavala".into()),
            end_time: Some(time!(11:00)),
            ..Default::default()
        };
        let next = patch.apply_to(&ride());
        assert_eq!(next.destination, "Lonavala");
        assert_eq!(next.end_time, time!(11:00));
        assert_eq!(next.source, "Mumbai");
        assert_eq!(next.seats_available, 2);
    }
}
