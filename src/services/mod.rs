/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Live Sync Coordinator reloading the roster on remote changes.
pub mod live_sync;
/// Ride Store: loads, queries and mutations over the roster snapshot.
pub mod ride_store;
/// Join/leave seat accounting strategies.
pub mod seat_protocol;
/// Sign-in, refresh, sign-out and onboarding.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Backend health polling and degraded mode.
pub mod storage_supervisor;
/// WhatsApp chat links.
pub mod whatsapp;
