//! Sign-in, token refresh, sign-out and WhatsApp onboarding for the agent's session.

use tracing::{debug, info, warn};

use crate::{
    dao::{
        identity::AuthIdentity,
        models::NewUserProfileEntity,
        storage::{StorageError, with_timeout},
    },
    dto::validation::normalize_whatsapp,
    error::ServiceError,
    services::ride_store,
    state::{AuthEvent, SharedState, User},
};

const DOMAIN_REFUSED: &str = "Please sign in with a college email address";

/// Signed-in user, if any.
pub fn current_user(state: &SharedState) -> Option<User> {
    state.session().current_user()
}

/// Signed in and still missing a WhatsApp number.
pub fn needs_onboarding(state: &SharedState) -> bool {
    state
        .session()
        .current_user()
        .is_some_and(|user| user.needs_onboarding())
}

/// Establish the session from an access token issued by the auth provider.
///
/// Emails outside the allow-listed domains are refused and leave the session
/// signed out. The profile row is created on first sign-in.
pub async fn sign_in(state: &SharedState, access_token: String) -> Result<User, ServiceError> {
    let _gate = state.session().gate().lock().await;
    let timeout = state.config().request_timeout();

    let identity = with_timeout(timeout, state.identity().resolve(access_token.clone()))
        .await?
        .ok_or(ServiceError::Unauthenticated)?;
    if !state.config().is_allowed_email(&identity.email) {
        warn!(email = %identity.email, "sign-in refused for email outside allowed domains");
        if state.session().current_user_id().is_some() {
            clear_session(state).await;
        }
        return Err(ServiceError::Forbidden(DOMAIN_REFUSED.into()));
    }

    let previous_token = state.session().access_token().await;
    state.backend().set_access_token(Some(access_token.clone()));
    let profile = match ensure_profile(state, &identity).await {
        Ok(profile) => profile,
        Err(err) => {
            state.backend().set_access_token(previous_token);
            return Err(err);
        }
    };

    let user = User::from(profile);
    state.session().install(user.clone(), access_token).await;
    info!(user_id = %user.id, onboarding = user.needs_onboarding(), "signed in");

    ride_store::handle_auth_event(state, AuthEvent::SignedIn(user.id)).await;
    Ok(user)
}

/// Swap in a refreshed access token for the same user.
pub async fn refresh(state: &SharedState, access_token: String) -> Result<User, ServiceError> {
    let _gate = state.session().gate().lock().await;
    let user = state
        .session()
        .current_user()
        .ok_or(ServiceError::Unauthenticated)?;

    let identity = with_timeout(
        state.config().request_timeout(),
        state.identity().resolve(access_token.clone()),
    )
    .await?
    .ok_or(ServiceError::Unauthenticated)?;
    if identity.id != user.id {
        return Err(ServiceError::Forbidden(
            "refreshed token belongs to another user; sign in again".into(),
        ));
    }

    state.backend().set_access_token(Some(access_token.clone()));
    state.session().set_token(access_token).await;
    debug!(user_id = %user.id, "access token refreshed");

    ride_store::handle_auth_event(state, AuthEvent::TokenRefreshed(user.id)).await;
    Ok(user)
}

/// End the session. Signing out twice is harmless.
pub async fn sign_out(state: &SharedState) {
    let _gate = state.session().gate().lock().await;
    if state.session().current_user_id().is_none() {
        return;
    }
    clear_session(state).await;
}

/// Store the user's WhatsApp number (digits only, 10 to 15 of them).
pub async fn set_whatsapp(state: &SharedState, raw: &str) -> Result<User, ServiceError> {
    let user = state
        .session()
        .current_user()
        .ok_or(ServiceError::Unauthenticated)?;
    let digits = normalize_whatsapp(raw)?;

    let profile = with_timeout(
        state.config().request_timeout(),
        state.backend().update_whatsapp(user.id, digits),
    )
    .await?
    .ok_or_else(|| ServiceError::NotFound(format!("profile {}", user.id)))?;

    let user = User::from(profile);
    state.session().update_user(user.clone());
    info!(user_id = %user.id, "whatsapp number saved");
    Ok(user)
}

async fn clear_session(state: &SharedState) {
    let user_id = state.session().current_user_id();
    state.session().clear().await;
    state.backend().set_access_token(None);
    info!(user_id = ?user_id, "signed out");
    ride_store::handle_auth_event(state, AuthEvent::SignedOut).await;
}

async fn ensure_profile(
    state: &SharedState,
    identity: &AuthIdentity,
) -> Result<crate::dao::models::UserProfileEntity, ServiceError> {
    let timeout = state.config().request_timeout();
    if let Some(profile) = with_timeout(timeout, state.backend().find_profile(identity.id)).await? {
        return Ok(profile);
    }

    let new_profile = NewUserProfileEntity {
        id: identity.id,
        email: identity.email.clone(),
        name: display_name(identity),
    };
    match with_timeout(timeout, state.backend().insert_profile(new_profile)).await {
        Ok(profile) => {
            info!(user_id = %identity.id, "profile created");
            Ok(profile)
        }
        // Created concurrently by another session of the same user.
        Err(StorageError::UniqueViolation { .. }) => {
            with_timeout(timeout, state.backend().find_profile(identity.id))
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("profile {}", identity.id)))
        }
        Err(err) => Err(err.into()),
    }
}

fn display_name(identity: &AuthIdentity) -> String {
    identity
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            identity
                .email
                .split('@')
                .next()
                .unwrap_or(identity.email.as_str())
                .to_string()
        })
}
