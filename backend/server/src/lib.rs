//! Documentation of the event registration and prize ticket service.
//!
//!
//!
//! # General Infrastructure
//! - Single binary serving the static frontend, the registration endpoint and the admin claim pages
//! - Postgres holds registrants, inbound request metadata and email delivery outcomes
//! - Mailgun delivers tickets
//! - Optional TLS terminated by the binary itself, otherwise plain HTTP behind a proxy
//!
//!
//!
//! # Registration Flow
//!
//! - Visitor scans a flyer QR code (`/qrcodes/<digit>`), we store the request headers and redirect to the form
//! - Form posts to `/submit`, url-encoded or JSON
//! - Government ID is hashed into the public [`identity::Identifier`]
//! - Row is inserted; a second submission for the same ID answers `304 Not Modified` and does nothing else
//! - If the registrant authorized contact, two detached tasks run after the response:
//!   - request metadata is written to the audit table
//!   - a ticket (flyer + QR code) is rendered, emailed, and the outcome recorded
//!
//!
//!
//! # Claim Flow
//!
//! - Ticket QR code points at `/users/<identifier>`
//! - Admin (holding the shared-secret cookie from `/login`) sees one of three pages:
//!   not found, claim prompt, already claimed
//! - Confirming posts to `/claim/<identifier>` and redirects back to the lookup
//!
//!
//!
//! # Shutdown
//!
//! - SIGTERM/Ctrl+C stops accepting connections
//! - In-flight requests get 30 seconds
//! - Background dispatch tasks get up to the same grace period
//! - Database pool closes last
//!
//!
//!
//! # Setup
//!
//! Run against a local Postgres.
//! ```sh
//! DATABASE_URL=postgres://postgres@localhost:5432/qrinvite \
//! RUST_LOG=info,qrinvite=debug \
//! cargo run --bin qrinvite -- --root ./result/static --flyer ./flyer.jpg
//! ```
//!
//! Serve over TLS.
//! ```sh
//! cargo run --bin qrinvite -- --address 0.0.0.0:443 --cert example.crt --key example.key
//! ```
//!
//! Secrets can be mounted instead of passed as flags.
//! ```sh
//! /run/secrets/ADMIN_PASSWORD
//! /run/secrets/ADMIN_COOKIE_VALUE
//! /run/secrets/MAILGUN_API_KEY
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Router,
    handler::HandlerWithoutStateExt,
    http::{HeaderValue, header::CACHE_CONTROL},
    middleware,
    routing::{get, post},
};
use axum_server::{Handle, tls_rustls::RustlsConfig};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod claim;
pub mod config;
pub mod database;
pub mod delivery;
pub mod error;
pub mod identity;
pub mod mail;
pub mod models;
pub mod registration;
pub mod routes;
pub mod state;
pub mod ticket;
pub mod utils;
pub mod views;

#[cfg(test)]
mod test_support;

use auth::{login_handler, login_page, require_admin};
use config::Config;
use routes::{
    claim_handler, health_handler, not_found_handler, qr_inbound_handler, submit_handler,
    user_handler,
};
use state::AppState;

pub const GRACE_PERIOD: Duration = Duration::from_secs(30);

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    // Must run before any TLS configuration is built.
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    let config = Config::load();
    let tls = config.tls()?;
    let address = config.address;

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");
    let app = router(state.clone());

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let service = app.into_make_service();

    match tls {
        Some((cert, key)) => {
            let rustls = RustlsConfig::from_pem_file(&cert, &key)
                .await
                .with_context(|| {
                    format!(
                        "failed to load key pair {} and {}",
                        cert.display(),
                        key.display()
                    )
                })?;

            info!("Server running on https://{address}");
            axum_server::bind_rustls(address, rustls)
                .handle(handle)
                .serve(service)
                .await
                .context("TLS HTTP server failed")?;
        }
        None => {
            info!("Server running on http://{address}");
            axum_server::bind(address)
                .handle(handle)
                .serve(service)
                .await
                .context("HTTP server failed")?;
        }
    }

    state.shutdown(GRACE_PERIOD).await;
    info!("Server has shut down");

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/users/{identifier}", get(user_handler))
        .route("/claim/{identifier}", post(claim_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let assets = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static("max-age=86400,s-maxage=86400"),
        ))
        .service(
            ServeDir::new(&state.config.root)
                .append_index_html_on_directories(true)
                .not_found_service(not_found_handler.into_service()),
        );

    Router::new()
        .route("/health", get(health_handler))
        .route("/submit", post(submit_handler))
        .route("/qrcodes/{code}", get(qr_inbound_handler))
        .route("/login", get(login_page).post(login_handler))
        .merge(admin)
        .fallback_service(assets)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn graceful_shutdown(handle: Handle) {
    shutdown_signal().await;
    handle.graceful_shutdown(Some(GRACE_PERIOD));
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
