//! Supabase-style backend: PostgREST for tables and procedures, GoTrue for
//! identities and an event-stream endpoint for table changes.

mod changes;
mod config;
mod error;
mod identity;
mod models;
mod store;

pub use changes::PostgrestChangeFeed;
pub use config::PostgrestConfig;
pub use error::{PostgrestError, PostgrestResult};
pub use identity::GoTrueIdentityProvider;
pub use store::PostgrestRideStore;
