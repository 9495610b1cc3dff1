//! Shared fixtures: one in-process backend, many sessions.
#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use carpool_back::{
    config::{AppConfig, SeatStrategy},
    dao::{
        identity::AuthIdentity,
        ride_store::memory::{MemoryIdentityProvider, MemoryRideStore},
    },
    dto::ride::CreateRideRequest,
    routes,
    services::session_service,
    state::{AppState, Collaborators, SharedState},
};
use serde_json::Value;
use time::macros::{date, time};
use uuid::Uuid;

pub struct World {
    pub store: MemoryRideStore,
    pub identity: MemoryIdentityProvider,
    pub config: AppConfig,
}

impl World {
    pub fn new() -> Self {
        Self::with_strategy(SeatStrategy::Transactional)
    }

    pub fn with_strategy(strategy: SeatStrategy) -> Self {
        Self {
            store: MemoryRideStore::new(),
            identity: MemoryIdentityProvider::new(),
            config: AppConfig::default().with_seat_strategy(strategy),
        }
    }

    /// A fresh, signed-out session on the shared backend.
    pub fn session(&self) -> SharedState {
        AppState::new(
            self.config.clone(),
            Collaborators::memory(&self.store, &self.identity),
        )
    }

    /// Register `name@vitstudent.ac.in` with the identity provider and return its token.
    pub fn issue_token(&self, name: &str) -> String {
        let token = format!("token-{name}");
        self.identity.issue(
            token.clone(),
            AuthIdentity {
                id: Uuid::new_v4(),
                email: format!("{name}@vitstudent.ac.in"),
                full_name: Some(name.to_string()),
            },
        );
        token
    }

    pub async fn signed_in(&self, name: &str) -> SharedState {
        let state = self.session();
        let token = self.issue_token(name);
        session_service::sign_in(&state, token)
            .await
            .expect("sign in");
        state
    }
}

pub fn mumbai_pune(seats: u32) -> CreateRideRequest {
    CreateRideRequest {
        source: "Mumbai".into(),
        destination: "Pune".into(),
        date: date!(2025 - 01 - 10),
        start_time: time!(09:00),
        end_time: time!(10:00),
        total_seats: seats,
    }
}

pub fn app(state: &SharedState) -> Router {
    routes::router(state.clone())
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
