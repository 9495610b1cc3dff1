//! Signed-in user of this agent and the auth events other components react to.

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};
use uuid::Uuid;

use crate::dao::models::UserProfileEntity;

/// Profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub whatsapp: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// A user without a WhatsApp number still has to finish onboarding.
    pub fn needs_onboarding(&self) -> bool {
        self.whatsapp.is_none()
    }
}

impl From<UserProfileEntity> for User {
    fn from(profile: UserProfileEntity) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            email: profile.email,
            whatsapp: profile.whatsapp.filter(|number| !number.is_empty()),
            created_at: profile.created_at,
        }
    }
}

/// Session state transitions the roster reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Uuid),
    SignedOut,
    TokenRefreshed(Uuid),
}

/// Current user plus access token. Mutated only by the session service.
pub struct Session {
    user: watch::Sender<Option<User>>,
    token: RwLock<Option<String>>,
    gate: Mutex<()>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Signed-out session with no token.
    pub fn new() -> Self {
        let (user, _rx) = watch::channel(None);
        Self {
            user,
            token: RwLock::new(None),
            gate: Mutex::new(()),
        }
    }

    /// Profile of the signed-in user, if any.
    pub fn current_user(&self) -> Option<User> {
        self.user.borrow().clone()
    }

    pub fn current_user_id(&self) -> Option<Uuid> {
        self.user.borrow().as_ref().map(|user| user.id)
    }

    /// Bearer token of the current sign-in.
    pub async fn access_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Serialises sign-in/sign-out/refresh so overlapping calls cannot interleave.
    pub fn gate(&self) -> &Mutex<()> {
        &self.gate
    }

    pub(crate) async fn install(&self, user: User, token: String) {
        *self.token.write().await = Some(token);
        self.user.send_replace(Some(user));
    }

    pub(crate) async fn set_token(&self, token: String) {
        *self.token.write().await = Some(token);
    }

    /// Replace the profile of the signed-in user without changing identity.
    pub(crate) fn update_user(&self, user: User) {
        self.user.send_modify(|current| {
            if current.as_ref().is_some_and(|existing| existing.id == user.id) {
                *current = Some(user);
            }
        });
    }

    pub(crate) async fn clear(&self) {
        *self.token.write().await = None;
        self.user.send_replace(None);
    }
}
