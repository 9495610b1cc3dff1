use serde::{Deserialize, Serialize};
use time::{Date, Time};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::{changes::ChannelStatus, serde_fmt},
    dto::validation::{validate_location, validate_seat_count, validate_time_window},
    state::{LoadStatus, Ride, SearchFilters},
};

/// Request payload used to offer a new ride.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRideRequest {
    pub source: String,
    pub destination: String,
    #[serde(with = "serde_fmt::date")]
    #[schema(value_type = String, example = "2025-01-10")]
    pub date: Date,
    #[serde(with = "serde_fmt::clock")]
    #[schema(value_type = String, example = "09:00")]
    pub start_time: Time,
    #[serde(with = "serde_fmt::clock")]
    #[schema(value_type = String, example = "10:00")]
    pub end_time: Time,
    /// Seats offered, 1 to 10.
    pub total_seats: u32,
}

impl Validate for CreateRideRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut check = |field: &'static str, result: Result<(), ValidationError>| {
            if let Err(err) = result {
                errors.add(field, err);
            }
        };

        check("source", validate_location(&self.source));
        check("destination", validate_location(&self.destination));
        check(
            "end_time",
            validate_time_window(self.start_time, self.end_time),
        );
        check("total_seats", validate_seat_count(self.total_seats));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Partial edit of a ride. The seat counter itself is never editable.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateRideRequest {
    pub source: Option<String>,
    pub destination: Option<String>,
    #[serde(default, with = "serde_fmt::date::option")]
    #[schema(value_type = Option<String>, example = "2025-01-10")]
    pub date: Option<Date>,
    #[serde(default, with = "serde_fmt::clock::option")]
    #[schema(value_type = Option<String>, example = "09:00")]
    pub start_time: Option<Time>,
    #[serde(default, with = "serde_fmt::clock::option")]
    #[schema(value_type = Option<String>, example = "10:00")]
    pub end_time: Option<Time>,
    /// New capacity; only accepted while nobody has joined.
    pub total_seats: Option<u32>,
}

impl Validate for UpdateRideRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut check = |field: &'static str, result: Result<(), ValidationError>| {
            if let Err(err) = result {
                errors.add(field, err);
            }
        };

        if let Some(source) = &self.source {
            check("source", validate_location(source));
        }
        if let Some(destination) = &self.destination {
            check("destination", validate_location(destination));
        }
        if let Some(seats) = self.total_seats {
            check("total_seats", validate_seat_count(seats));
        }
        // Checked again against the stored ride once both ends are known.
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            check("end_time", validate_time_window(start, end));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Query string accepted by the ride search.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Case-insensitive substring of the pickup label.
    pub source: Option<String>,
    /// Case-insensitive substring of the drop label.
    pub destination: Option<String>,
    /// Exact date, `YYYY-MM-DD`.
    #[serde(default, with = "serde_fmt::date::option")]
    #[param(value_type = Option<String>)]
    pub date: Option<Date>,
    /// Earliest accepted start, `HH:MM`.
    #[serde(default, with = "serde_fmt::clock::option")]
    #[param(value_type = Option<String>)]
    pub start_time: Option<Time>,
    /// Latest accepted end, `HH:MM`.
    #[serde(default, with = "serde_fmt::clock::option")]
    #[param(value_type = Option<String>)]
    pub end_time: Option<Time>,
}

impl From<SearchQuery> for SearchFilters {
    fn from(query: SearchQuery) -> Self {
        Self {
            source: query.source,
            destination: query.destination,
            date: query.date,
            start_time: query.start_time,
            end_time: query.end_time,
        }
    }
}

/// Ride as seen by the signed-in user.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RideSummary {
    pub id: Uuid,
    pub source: String,
    pub destination: String,
    #[serde(with = "serde_fmt::date")]
    #[schema(value_type = String, example = "2025-01-10")]
    pub date: Date,
    #[serde(with = "serde_fmt::clock")]
    #[schema(value_type = String, example = "09:00")]
    pub start_time: Time,
    #[serde(with = "serde_fmt::clock")]
    #[schema(value_type = String, example = "10:00")]
    pub end_time: Time,
    pub total_seats: u32,
    pub seats_available: u32,
    pub creator_id: Uuid,
    pub creator_name: String,
    pub creator_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_whatsapp: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// The signed-in user is a participant.
    pub joined: bool,
    /// The signed-in user created this ride.
    pub mine: bool,
}

impl RideSummary {
    /// Summary of `ride` from the signed-in user's point of view.
    pub fn new(ride: Ride, joined: bool, mine: bool) -> Self {
        Self {
            id: ride.id,
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
            created_at: super::format_timestamp(ride.created_at),
            joined,
            mine,
        }
    }
}

/// Load progress of the roster plus the state of live sync.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RosterStatusResponse {
    /// Rides in the snapshot.
    pub rides: usize,
    /// Rides the signed-in user has joined.
    pub joined: usize,
    pub loading: bool,
    /// Failure of the newest load; the snapshot still holds the last good data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_loaded_at: Option<String>,
    pub sync: ChannelStatus,
    pub degraded: bool,
}

impl RosterStatusResponse {
    /// Status with live sync reported closed.
    pub fn new(rides: usize, joined: usize, status: LoadStatus) -> Self {
        Self {
            rides,
            joined,
            loading: status.is_loading(),
            error: status.error,
            last_loaded_at: status.last_loaded_at.map(super::format_timestamp),
            sync: ChannelStatus::Closed,
            degraded: false,
        }
    }

    /// Attach live sync and storage health.
    pub fn with_sync(mut self, sync: ChannelStatus, degraded: bool) -> Self {
        self.sync = sync;
        self.degraded = degraded;
        self
    }
}

/// Link opening a WhatsApp chat with the ride's creator.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WhatsappLinkResponse {
    /// `wa.me` URL.
    pub url: String,
    /// Pre-filled greeting carried in the link.
    pub message: String,
}
