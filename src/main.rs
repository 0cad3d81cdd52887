//! # Sign Relay - Main Application Entry Point
//!
//! HTTP relay between clients and two hosted Gradio Spaces:
//! speech2sign (`POST /transcribe`) and sign2speech (`POST /process-video`).
//!
//! ## Startup Sequence:
//! 1. **Configuration** from defaults, config.toml and environment variables
//! 2. **Logging** via tracing
//! 3. **Connection registry**: one connect attempt per service, concurrently;
//!    failures are logged and the server starts anyway
//! 4. **HTTP server** with middleware and routes, stopped gracefully on SIGINT/SIGTERM
//!
//! ## Application Architecture:
//! - **config**: application configuration and service descriptors
//! - **gradio**: remote inference client (Gradio REST API)
//! - **registry**: named connection handles built at startup
//! - **relay**: the shared forwarding logic behind both endpoints
//! - **handlers**: HTTP handlers and multipart parsing
//! - **health**: health and metrics endpoints
//! - **middleware**: request logging and metrics
//! - **error**: error kinds and the JSON error envelope

mod config;
mod error;
mod gradio;
mod handlers;
mod health;
mod middleware;
mod registry;
mod relay;
mod state;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use gradio::GradioConnector;
use registry::ConnectionRegistry;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal set by the signal handlers.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    // Registry is complete before the server accepts its first request
    let connector = GradioConnector::new()?;
    let registry = ConnectionRegistry::connect_all(&config.service_descriptors(), &connector).await;
    if registry.connected_count() == 0 {
        warn!("No Gradio client initialized; every relay request will fail until restart");
    }

    let bind_addr = config.bind_addr();
    let app_state = AppState::new(config, registry);

    setup_signal_handlers();

    info!("Server running on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Last wrap runs first: TracingLogger assigns the request id the others log
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .wrap(TracingLogger::default())
            .configure(handlers::configure_routes)
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing. `RUST_LOG` overrides the default filter,
/// `sign_relay=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sign_relay=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Listen for SIGTERM and SIGINT and raise the shutdown flag on either.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let signals = (
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()),
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()),
        );
        let (mut sigterm, mut sigint) = match signals {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
