//! In-process backend: every primitive runs under one lock, so it behaves like a
//! transactional database with a unique (ride, user) key and cascading deletes.

mod identity;
mod store;

pub use identity::MemoryIdentityProvider;
pub use store::{Fault, MemoryRideStore};
