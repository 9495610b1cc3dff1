use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::ride::{
        CreateRideRequest, RideSummary, RosterStatusResponse, SearchQuery, UpdateRideRequest,
        WhatsappLinkResponse,
    },
    error::AppError,
    services::ride_store,
    state::{SearchFilters, SharedState},
};

/// Ride roster endpoints: queries over the snapshot and the mutations behind them.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rides", get(search_rides).post(create_ride))
        .route("/rides/mine", get(my_rides))
        .route("/rides/joined", get(joined_rides))
        .route("/rides/status", get(roster_status))
        .route("/rides/reload", post(reload))
        .route(
            "/rides/{id}",
            get(get_ride).put(update_ride).delete(delete_ride),
        )
        .route("/rides/{id}/join", post(join_ride))
        .route("/rides/{id}/leave", post(leave_ride))
        .route("/rides/{id}/whatsapp", get(whatsapp_link))
}

/// Search rides with free seats in the current snapshot.
#[utoipa::path(
    get,
    path = "/rides",
    tag = "rides",
    params(SearchQuery),
    responses((status = 200, description = "Matching rides, newest first", body = [RideSummary]))
)]
pub async fn search_rides(
    State(state): State<SharedState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<RideSummary>> {
    let filters = SearchFilters::from(query);
    let rides = ride_store::search_rides(&state, &filters).await;
    Json(ride_store::summarize(&state, rides).await)
}

/// Offer a new ride as the signed-in user.
#[utoipa::path(
    post,
    path = "/rides",
    tag = "rides",
    request_body = CreateRideRequest,
    responses(
        (status = 201, description = "Ride created", body = RideSummary),
        (status = 400, description = "Invalid ride"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn create_ride(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateRideRequest>>,
) -> Result<(StatusCode, Json<RideSummary>), AppError> {
    let ride = ride_store::create_ride(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(ride_store::summarize_one(&state, ride).await)))
}

/// Rides created by the signed-in user.
#[utoipa::path(
    get,
    path = "/rides/mine",
    tag = "rides",
    responses((status = 200, description = "Own rides", body = [RideSummary]))
)]
pub async fn my_rides(State(state): State<SharedState>) -> Json<Vec<RideSummary>> {
    let rides = ride_store::get_my_rides(&state).await;
    Json(ride_store::summarize(&state, rides).await)
}

/// Rides the signed-in user has joined.
#[utoipa::path(
    get,
    path = "/rides/joined",
    tag = "rides",
    responses((status = 200, description = "Joined rides", body = [RideSummary]))
)]
pub async fn joined_rides(State(state): State<SharedState>) -> Json<Vec<RideSummary>> {
    let rides = ride_store::get_joined_rides(&state).await;
    Json(ride_store::summarize(&state, rides).await)
}

async fn status_response(state: &SharedState) -> RosterStatusResponse {
    let (rides, joined, status) = ride_store::roster_status(state).await;
    RosterStatusResponse::new(rides, joined, status)
        .with_sync(state.sync_status(), state.is_degraded())
}

#[utoipa::path(
    get,
    path = "/rides/status",
    tag = "rides",
    responses((status = 200, description = "Load and sync state", body = RosterStatusResponse))
)]
pub async fn roster_status(State(state): State<SharedState>) -> Json<RosterStatusResponse> {
    Json(status_response(&state).await)
}

/// Reload rides and memberships from the backing store.
#[utoipa::path(
    post,
    path = "/rides/reload",
    tag = "rides",
    responses(
        (status = 200, description = "Snapshot reloaded", body = RosterStatusResponse),
        (status = 503, description = "Store unreachable; previous snapshot kept")
    )
)]
pub async fn reload(
    State(state): State<SharedState>,
) -> Result<Json<RosterStatusResponse>, AppError> {
    ride_store::reload(&state).await?;
    Ok(Json(status_response(&state).await))
}

#[utoipa::path(
    get,
    path = "/rides/{id}",
    tag = "rides",
    params(("id" = Uuid, Path, description = "Ride identifier")),
    responses(
        (status = 200, description = "Ride", body = RideSummary),
        (status = 404, description = "Not in the snapshot")
    )
)]
pub async fn get_ride(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RideSummary>, AppError> {
    let ride = ride_store::get_ride_by_id(&state, id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("ride {id}")))?;
    Ok(Json(ride_store::summarize_one(&state, ride).await))
}

/// Edit route, date, time window or capacity of an own ride.
#[utoipa::path(
    put,
    path = "/rides/{id}",
    tag = "rides",
    params(("id" = Uuid, Path, description = "Ride identifier")),
    request_body = UpdateRideRequest,
    responses(
        (status = 200, description = "Ride updated", body = RideSummary),
        (status = 403, description = "Not the creator"),
        (status = 409, description = "Capacity locked by participants")
    )
)]
pub async fn update_ride(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<UpdateRideRequest>>,
) -> Result<Json<RideSummary>, AppError> {
    let ride = ride_store::update_ride(&state, id, payload).await?;
    Ok(Json(ride_store::summarize_one(&state, ride).await))
}

#[utoipa::path(
    delete,
    path = "/rides/{id}",
    tag = "rides",
    params(("id" = Uuid, Path, description = "Ride identifier")),
    responses(
        (status = 204, description = "Ride and its participants deleted"),
        (status = 403, description = "Not the creator")
    )
)]
pub async fn delete_ride(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    ride_store::delete_ride(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Take a seat on a ride.
#[utoipa::path(
    post,
    path = "/rides/{id}/join",
    tag = "rides",
    params(("id" = Uuid, Path, description = "Ride identifier")),
    responses(
        (status = 200, description = "Joined", body = RideSummary),
        (status = 409, description = "Already joined, own ride, ride full or request in flight")
    )
)]
pub async fn join_ride(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RideSummary>, AppError> {
    let ride = ride_store::join_ride(&state, id).await?;
    Ok(Json(ride_store::summarize_one(&state, ride).await))
}

/// Give a seat back.
#[utoipa::path(
    post,
    path = "/rides/{id}/leave",
    tag = "rides",
    params(("id" = Uuid, Path, description = "Ride identifier")),
    responses(
        (status = 200, description = "Left", body = RideSummary),
        (status = 409, description = "Not joined or request in flight")
    )
)]
pub async fn leave_ride(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RideSummary>, AppError> {
    let ride = ride_store::leave_ride(&state, id).await?;
    Ok(Json(ride_store::summarize_one(&state, ride).await))
}

/// Chat link with the ride's creator.
#[utoipa::path(
    get,
    path = "/rides/{id}/whatsapp",
    tag = "rides",
    params(("id" = Uuid, Path, description = "Ride identifier")),
    responses(
        (status = 200, description = "wa.me link", body = WhatsappLinkResponse),
        (status = 404, description = "Unknown ride or no number shared")
    )
)]
pub async fn whatsapp_link(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WhatsappLinkResponse>, AppError> {
    let (url, message) = ride_store::whatsapp_link(&state, id).await?;
    Ok(Json(WhatsappLinkResponse { url, message }))
}
