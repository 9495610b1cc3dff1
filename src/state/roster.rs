//! In-memory mirror of the rides table and the signed-in user's memberships.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

use crate::dao::{models::RideEntity, serde_fmt};

/// A ride as held in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ride {
    pub id: Uuid,
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
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Ride {
    /// No seats left.
    pub fn is_full(&self) -> bool {
        self.seats_available == 0
    }
}

impl From<RideEntity> for Ride {
    fn from(entity: RideEntity) -> Self {
        Self {
            id: entity.id,
            source: entity.source,
            destination: entity.destination,
            date: entity.date,
            start_time: entity.start_time,
            end_time: entity.end_time,
            total_seats: entity.total_seats,
            seats_available: entity.seats_available,
            creator_id: entity.creator_id,
            creator_name: entity.creator_name,
            creator_email: entity.creator_email,
            creator_whatsapp: entity.creator_whatsapp,
            created_at: entity.created_at,
        }
    }
}

/// Optional search criteria. Blank text filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub date: Option<Date>,
    /// Rides must not start before this time.
    pub start_time: Option<Time>,
    /// Rides must end by this time.
    pub end_time: Option<Time>,
}

fn contains_ignore_case(haystack: &str, needle: &Option<String>) -> bool {
    match needle.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
    }
}

impl SearchFilters {
    /// Every given filter holds for `ride`. Free seats are not checked here.
    pub fn matches(&self, ride: &Ride) -> bool {
        !ride.is_full()
            && contains_ignore_case(&ride.source, &self.source)
            && contains_ignore_case(&ride.destination, &self.destination)
            && self.date.is_none_or(|date| ride.date == date)
            && self.start_time.is_none_or(|start| ride.start_time >= start)
            && self.end_time.is_none_or(|end| ride.end_time <= end)
    }
}

/// Progress of the most recent loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStatus {
    /// Loads issued but not finished.
    pub pending: u32,
    /// Failure of the newest finished load, cleared by the next success.
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_loaded_at: Option<OffsetDateTime>,
}

impl LoadStatus {
    /// At least one load is pending.
    pub fn is_loading(&self) -> bool {
        self.pending > 0
    }
}

/// Serializable copy of the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterSnapshot {
    pub rides: Vec<Ride>,
    pub joined: Vec<Uuid>,
}

/// Ride list keyed by id in backend order, plus the membership set.
#[derive(Debug, Default)]
pub struct Roster {
    rides: IndexMap<Uuid, Ride>,
    joined: BTreeSet<Uuid>,
    status: LoadStatus,
    rides_ticket: u64,
    joined_ticket: u64,
}

impl Roster {
    /// Empty roster, nothing loaded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the ride list unless a newer load already landed. Returns whether it was applied.
    pub fn apply_rides(&mut self, ticket: u64, rides: Vec<Ride>) -> bool {
        if ticket <= self.rides_ticket {
            return false;
        }
        self.rides_ticket = ticket;
        self.rides = rides.into_iter().map(|ride| (ride.id, ride)).collect();
        self.status.error = None;
        self.status.last_loaded_at = Some(OffsetDateTime::now_utc());
        true
    }

    /// Replace the membership set unless a newer load already landed.
    pub fn apply_joined(&mut self, ticket: u64, joined: impl IntoIterator<Item = Uuid>) -> bool {
        if ticket <= self.joined_ticket {
            return false;
        }
        self.joined_ticket = ticket;
        self.joined = joined.into_iter().collect();
        true
    }

    /// Record a failed load, keeping the existing data.
    pub fn record_failure(&mut self, ticket: u64, message: String) {
        if ticket > self.rides_ticket.min(self.joined_ticket) {
            self.status.error = Some(message);
        }
    }

    /// Forget the membership set, e.g. on sign-out or when another user signs in.
    ///
    /// Membership loads issued before `ticket` can no longer apply.
    pub fn reset_membership(&mut self, ticket: u64) {
        self.joined.clear();
        self.joined_ticket = self.joined_ticket.max(ticket);
    }

    /// Outcome of the newest applied or failed load.
    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    /// Rides in the snapshot.
    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }

    /// Rides in snapshot order, newest first.
    pub fn rides(&self) -> impl Iterator<Item = &Ride> {
        self.rides.values()
    }

    /// Ride by id.
    pub fn get(&self, id: Uuid) -> Option<&Ride> {
        self.rides.get(&id)
    }

    /// Rides with free seats matching `filters`, in snapshot order.
    pub fn search(&self, filters: &SearchFilters) -> Vec<Ride> {
        self.rides
            .values()
            .filter(|ride| filters.matches(ride))
            .cloned()
            .collect()
    }

    /// Rides created by `user_id`.
    pub fn created_by(&self, user_id: Uuid) -> Vec<Ride> {
        self.rides
            .values()
            .filter(|ride| ride.creator_id == user_id)
            .cloned()
            .collect()
    }

    /// Rides in the membership set that are still in the snapshot.
    pub fn joined(&self) -> Vec<Ride> {
        self.rides
            .values()
            .filter(|ride| self.joined.contains(&ride.id))
            .cloned()
            .collect()
    }

    /// Membership set of the signed-in user.
    pub fn joined_ids(&self) -> &BTreeSet<Uuid> {
        &self.joined
    }

    pub fn has_joined(&self, id: Uuid) -> bool {
        self.joined.contains(&id)
    }

    /// False for rides missing from the snapshot.
    pub fn is_created_by(&self, id: Uuid, user_id: Uuid) -> bool {
        self.rides
            .get(&id)
            .is_some_and(|ride| ride.creator_id == user_id)
    }

    /// Put a freshly created ride at the front (newest first).
    pub fn insert_front(&mut self, ride: Ride) {
        self.rides.shift_insert(0, ride.id, ride);
    }

    /// Replace a ride in place, keeping its position.
    pub fn replace(&mut self, ride: Ride) {
        if let Some(slot) = self.rides.get_mut(&ride.id) {
            *slot = ride;
        } else {
            self.insert_front(ride);
        }
    }

    /// Drop a ride and any membership pointing at it.
    pub fn remove(&mut self, id: Uuid) -> Option<Ride> {
        self.joined.remove(&id);
        self.rides.shift_remove(&id)
    }

    /// Record a committed join with the row the backend returned.
    pub fn record_join(&mut self, ride: Ride) {
        self.joined.insert(ride.id);
        self.replace(ride);
    }

    /// Record a committed leave with the row the backend returned.
    pub fn record_leave(&mut self, ride: Ride) {
        self.joined.remove(&ride.id);
        self.replace(ride);
    }

    /// Owned copy for callers that must not hold the lock.
    pub fn snapshot(&self) -> RosterSnapshot {
        RosterSnapshot {
            rides: self.rides.values().cloned().collect(),
            joined: self.joined.iter().copied().collect(),
        }
    }
}
