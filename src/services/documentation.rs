use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Carpool Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::current_session,
        crate::routes::session::sign_in,
        crate::routes::session::refresh,
        crate::routes::session::sign_out,
        crate::routes::session::set_whatsapp,
        crate::routes::rides::search_rides,
        crate::routes::rides::create_ride,
        crate::routes::rides::my_rides,
        crate::routes::rides::joined_rides,
        crate::routes::rides::roster_status,
        crate::routes::rides::reload,
        crate::routes::rides::get_ride,
        crate::routes::rides::update_ride,
        crate::routes::rides::delete_ride,
        crate::routes::rides::join_ride,
        crate::routes::rides::leave_ride,
        crate::routes::rides::whatsapp_link,
        crate::routes::sse::rides_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::SignInRequest,
            crate::dto::session::WhatsappRequest,
            crate::dto::session::SessionResponse,
            crate::dto::session::UserSummary,
            crate::dto::ride::CreateRideRequest,
            crate::dto::ride::UpdateRideRequest,
            crate::dto::ride::RideSummary,
            crate::dto::ride::RosterStatusResponse,
            crate::dto::ride::WhatsappLinkResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::SyncStatusEvent,
            crate::dto::sse::RosterReloadedEvent,
            crate::dto::sse::RideChangedEvent,
            crate::dto::sse::RideDeletedEvent,
            crate::dto::sse::SeatChangedEvent,
            crate::dao::changes::ChannelStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "session", description = "Sign-in and onboarding"),
        (name = "rides", description = "Ride roster, seats and ownership"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_ride_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/rides/{id}/join"));
        assert!(doc.paths.paths.contains_key("/sse/rides"));
    }
}
