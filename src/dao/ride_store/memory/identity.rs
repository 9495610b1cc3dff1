use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{
    identity::{AuthIdentity, IdentityProvider},
    storage::StorageResult,
};

/// Token table standing in for the external auth provider.
#[derive(Clone, Default)]
pub struct MemoryIdentityProvider {
    tokens: Arc<DashMap<String, AuthIdentity>>,
}

impl MemoryIdentityProvider {
    /// Provider with no accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `token` resolve to `identity`.
    pub fn issue(&self, token: impl Into<String>, identity: AuthIdentity) {
        self.tokens.insert(token.into(), identity);
    }

    /// Invalidate a previously issued token.
    pub fn revoke(&self, token: &str) {
        self.tokens.remove(token);
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    fn resolve(
        &self,
        access_token: String,
    ) -> BoxFuture<'static, StorageResult<Option<AuthIdentity>>> {
        let identity = self
            .tokens
            .get(&access_token)
            .map(|entry| entry.value().clone());
        Box::pin(async move { Ok(identity) })
    }
}
