/// Table change notifications.
pub mod changes;
/// External identity lookups.
pub mod identity;
/// Database model definitions.
pub mod models;
/// Ride persistence backends.
pub mod ride_store;
/// Serde formats for calendar dates and times of day.
pub mod serde_fmt;
/// Storage abstraction layer for database operations.
pub mod storage;
