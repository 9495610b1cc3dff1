use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};
use axum_valid::Valid;

use crate::{
    dto::session::{SessionResponse, SignInRequest, WhatsappRequest},
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Sign-in, sign-out and onboarding of the agent's session.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/session",
            get(current_session).post(sign_in).delete(sign_out),
        )
        .route("/session/refresh", post(refresh))
        .route("/session/whatsapp", put(set_whatsapp))
}

#[utoipa::path(
    get,
    path = "/session",
    tag = "session",
    responses((status = 200, description = "Current session", body = SessionResponse))
)]
pub async fn current_session(State(state): State<SharedState>) -> Json<SessionResponse> {
    Json(SessionResponse::from(session_service::current_user(&state)))
}

/// Sign in with an access token from the auth provider.
#[utoipa::path(
    post,
    path = "/session",
    tag = "session",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "Token invalid or expired"),
        (status = 403, description = "Email outside the allowed college domains")
    )
)]
pub async fn sign_in(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SignInRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    let user = session_service::sign_in(&state, payload.access_token).await?;
    Ok(Json(SessionResponse::from(Some(user))))
}

/// Install a refreshed access token for the signed-in user.
#[utoipa::path(
    post,
    path = "/session/refresh",
    tag = "session",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Token replaced", body = SessionResponse),
        (status = 401, description = "Not signed in or token invalid")
    )
)]
pub async fn refresh(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SignInRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    let user = session_service::refresh(&state, payload.access_token).await?;
    Ok(Json(SessionResponse::from(Some(user))))
}

#[utoipa::path(
    delete,
    path = "/session",
    tag = "session",
    responses((status = 204, description = "Signed out"))
)]
pub async fn sign_out(State(state): State<SharedState>) -> StatusCode {
    session_service::sign_out(&state).await;
    StatusCode::NO_CONTENT
}

/// Save the WhatsApp number that completes onboarding.
#[utoipa::path(
    put,
    path = "/session/whatsapp",
    tag = "session",
    request_body = WhatsappRequest,
    responses(
        (status = 200, description = "Number saved", body = SessionResponse),
        (status = 400, description = "Not 10 to 15 digits")
    )
)]
pub async fn set_whatsapp(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<WhatsappRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    let user = session_service::set_whatsapp(&state, &payload.whatsapp).await?;
    Ok(Json(SessionResponse::from(Some(user))))
}
