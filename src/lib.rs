//! Library crate for carpool-back, exposing modules for binaries and integration tests.

/// Environment-driven runtime configuration.
pub mod config;
/// Storage backends and the entities they exchange.
pub mod dao;
/// Request and response bodies of the HTTP API.
pub mod dto;
/// Errors surfaced to HTTP clients.
pub mod error;
/// Axum router and handlers.
pub mod routes;
/// Session, roster and seat operations.
pub mod services;
/// Shared agent state: session, roster snapshot, broadcast hub.
pub mod state;
