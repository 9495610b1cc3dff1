use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};

use crate::dao::{
    identity::{AuthIdentity, IdentityProvider},
    storage::StorageResult,
};

use super::{
    config::PostgrestConfig, error::PostgrestError, models::GoTrueUser, store::PostgrestRideStore,
};

/// Resolves access tokens against the GoTrue `/user` endpoint.
#[derive(Clone)]
pub struct GoTrueIdentityProvider {
    client: Client,
    user_url: Arc<str>,
    anon_key: Arc<str>,
}

impl GoTrueIdentityProvider {
    /// Provider talking to the GoTrue endpoint of `config`.
    pub fn new(client: Client, config: &PostgrestConfig) -> Self {
        Self {
            client,
            user_url: Arc::from(format!("{}/user", config.auth_url())),
            anon_key: Arc::from(config.anon_key.as_str()),
        }
    }
}

impl PostgrestRideStore {
    /// Identity provider of the same deployment, sharing this store's HTTP client.
    pub fn identity_provider(&self) -> GoTrueIdentityProvider {
        GoTrueIdentityProvider::new(self.client.clone(), &self.config)
    }
}

impl IdentityProvider for GoTrueIdentityProvider {
    fn resolve(
        &self,
        access_token: String,
    ) -> BoxFuture<'static, StorageResult<Option<AuthIdentity>>> {
        let provider = self.clone();
        Box::pin(async move {
            let path = provider.user_url.to_string();
            let response = provider
                .client
                .get(path.as_str())
                .header("apikey", provider.anon_key.as_ref())
                .bearer_auth(&access_token)
                .send()
                .await
                .map_err(|source| PostgrestError::RequestSend {
                    path: path.clone(),
                    source,
                })?;

            match response.status() {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
                status if status.is_success() => {
                    let user = response.json::<GoTrueUser>().await.map_err(|source| {
                        PostgrestError::DecodeResponse { path, source }
                    })?;
                    Ok(user.into_identity())
                }
                status => Err(PostgrestError::RequestStatus {
                    path,
                    status,
                    code: None,
                    message: "identity lookup failed".into(),
                }
                .into()),
            }
        })
    }
}
