//! Identity lookups against the external auth provider.

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::storage::StorageResult;

/// Identity attached to a valid access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    /// Stable identifier issued by the auth provider.
    pub id: Uuid,
    /// Email address verified by the provider.
    pub email: String,
    /// Display name from the provider profile, when present.
    pub full_name: Option<String>,
}

/// Resolves access tokens issued by the auth provider.
pub trait IdentityProvider: Send + Sync {
    /// Return the identity for `access_token`, or `None` when the token is invalid or expired.
    fn resolve(&self, access_token: String)
    -> BoxFuture<'static, StorageResult<Option<AuthIdentity>>>;
}
