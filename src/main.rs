//! Tune Blitz Back binary entrypoint wiring the WebSocket gateway, REST
//! surface, and the Spotify track provider.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dto;
mod error;
mod provider;
mod routes;
mod services;
mod state;

use config::AppConfig;
use provider::spotify::{SpotifyCredentials, SpotifyProvider};
use state::{SessionRegistry, SharedRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let provider = Arc::new(build_spotify_provider()?);
    let registry = SessionRegistry::new(config, provider);

    let app = build_router(registry);

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

    Ok(())
}

/// Build the Spotify provider from environment credentials.
///
/// Missing credentials are tolerated at startup; every start-game will then
/// fail with a provider error until they are configured.
fn build_spotify_provider() -> anyhow::Result<SpotifyProvider> {
    let client_id = env::var("SPOTIFY_CLIENT_ID").unwrap_or_default();
    let client_secret = env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default();

    if client_id.is_empty() || client_secret.is_empty() {
        warn!("SPOTIFY_CLIENT_ID / SPOTIFY_CLIENT_SECRET not set; track fetches will fail");
    }

    SpotifyProvider::new(SpotifyCredentials {
        client_id,
        client_secret,
    })
    .context("building spotify provider")
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(registry: SharedRegistry) -> Router<()> {
    routes::router(registry)
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
