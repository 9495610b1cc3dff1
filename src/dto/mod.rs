use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Liveness payloads.
pub mod health;
/// Ride forms, filters and summaries.
pub mod ride;
/// Sign-in, onboarding and current-user payloads.
pub mod session;
/// Server-sent event payloads.
pub mod sse;
/// Field validators shared by the request bodies.
pub mod validation;

fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
