//! Carpool Back binary entrypoint wiring the ride backend, live sync, SSE and REST layers.

use std::{env, net::SocketAddr};

use anyhow::Context;
use axum::Router;
use carpool_back::{
    config::AppConfig,
    dao::ride_store::memory::{MemoryIdentityProvider, MemoryRideStore},
    routes,
    services::{live_sync, ride_store, storage_supervisor},
    state::{AppState, Collaborators, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let collaborators = connect_collaborators(&config).await;
    let app_state = AppState::new(config, collaborators);

    if let Err(err) = ride_store::reload(&app_state).await {
        warn!(error = %err, "initial roster load failed; serving an empty snapshot");
    }
    live_sync::start(&app_state).await;
    tokio::spawn(storage_supervisor::run(app_state.clone()));

    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    live_sync::stop(&app_state).await;
    Ok(())
}

/// Connect to the hosted backend described by the environment, or fall back to
/// the in-process store when it is not configured or unreachable.
#[cfg(feature = "postgrest-store")]
async fn connect_collaborators(config: &AppConfig) -> Collaborators {
    use std::sync::Arc;

    use carpool_back::dao::{
        changes::ChangeFeed,
        ride_store::postgrest::{PostgrestChangeFeed, PostgrestConfig, PostgrestRideStore},
    };

    match PostgrestConfig::from_env() {
        Ok(postgrest) => match PostgrestRideStore::connect(postgrest).await {
            Ok(store) => {
                info!("connected to PostgREST backend");
                let changes = PostgrestChangeFeed::new(&store, config.realtime().subscribe_timeout)
                    .map(|feed| Arc::new(feed) as Arc<dyn ChangeFeed>);
                if changes.is_none() {
                    warn!("no change stream configured; live sync disabled");
                }
                return Collaborators {
                    identity: Arc::new(store.identity_provider()),
                    backend: Arc::new(store),
                    changes,
                };
            }
            Err(err) => warn!(error = %err, "PostgREST backend unreachable"),
        },
        Err(err) => warn!(error = %err, "PostgREST backend not configured"),
    }
    memory_collaborators()
}

#[cfg(not(feature = "postgrest-store"))]
async fn connect_collaborators(_config: &AppConfig) -> Collaborators {
    memory_collaborators()
}

fn memory_collaborators() -> Collaborators {
    warn!("using the in-process ride store; data is lost on exit");
    Collaborators::memory(&MemoryRideStore::new(), &MemoryIdentityProvider::new())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
