use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{dto::validation::validate_whatsapp, state::User};

/// Access token obtained by the browser from the auth provider.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct SignInRequest {
    #[validate(length(min = 1, message = "Access token is required"))]
    pub access_token: String,
}

/// WhatsApp number entered during onboarding, any formatting.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct WhatsappRequest {
    #[validate(custom(function = "validate_whatsapp"))]
    #[schema(example = "+91 98765 43210")]
    pub whatsapp: String,
}

/// Profile of the signed-in user.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    pub created_at: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            whatsapp: user.whatsapp,
            created_at: super::format_timestamp(user.created_at),
        }
    }
}

/// Current session: `user` is absent when signed out.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    /// Signed in but no WhatsApp number yet.
    pub needs_onboarding: bool,
}

impl From<Option<User>> for SessionResponse {
    fn from(user: Option<User>) -> Self {
        let needs_onboarding = user.as_ref().is_some_and(User::needs_onboarding);
        Self {
            user: user.map(UserSummary::from),
            needs_onboarding,
        }
    }
}
