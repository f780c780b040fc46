//! # Audio Concatenation Service - Main Application Entry Point
//!
//! An Actix-web HTTP server that joins uploaded audio files with ffmpeg.
//!
//! ## Startup sequence:
//! 1. Load `.env`, set up tracing, load and validate configuration
//! 2. Probe ffmpeg; refuse to start without it
//! 3. Create the staging directory
//! 4. Serve until Ctrl+C, then drain in-flight requests
//!
//! ## Application Architecture:
//! - **config**: Configuration (TOML file + environment variables)
//! - **probe**: ffmpeg availability check (startup and `/health`)
//! - **intake**: Multipart upload parsing and validation
//! - **staging**: Per-operation files on local disk, removed on drop
//! - **concat**: ffmpeg invocation with stream-copy and re-encode strategies
//! - **response**: Streaming the result and releasing the operation
//! - **state**: Shared configuration, runners and metrics
//! - **health**: Health and metrics endpoints
//! - **middleware**: Request metrics
//! - **handlers**: HTTP request handlers
//! - **error**: Error type and HTTP error responses

mod concat;      // ffmpeg concat demuxer runner (concat.rs)
mod config;      // Configuration management (config.rs)
mod error;       // Error handling types (error.rs)
mod handlers;    // HTTP request handlers (handlers/ directory)
mod health;      // Health check endpoints (health.rs)
mod intake;      // Multipart upload intake (intake.rs)
mod middleware;  // Custom middleware (middleware/ directory)
mod probe;       // ffmpeg availability probe (probe.rs)
mod response;    // Streaming responses and cleanup (response.rs)
mod staging;     // Staging area and operations (staging.rs)
mod state;       // Application state management (state.rs)

#[cfg(all(test, unix))]
mod test_fixtures;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::AppConfig;
use crate::staging::StagingArea;
use crate::state::AppState;
use std::path::Path;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting audio-concat-service v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // The service is useless without ffmpeg, so refuse to start.
    let version = probe::probe_ffmpeg(Path::new(&config.ffmpeg.binary))
        .await
        .context("FFmpeg not found. Install FFmpeg to use this service")?;
    info!(version = %version, "FFmpeg available");

    let staging = StagingArea::prepare(&config.storage.staging_dir).with_context(|| {
        format!("failed to prepare staging directory {}", config.storage.staging_dir)
    })?;
    info!(staging_dir = %staging.root().display(), "Staging area ready");

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config, staging);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Middleware runs in reverse registration order for requests
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(TracingLogger::default())
            .configure(configure_routes)
    })
    .bind(&bind_addr)?
    .disable_signals()
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
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping server...");
            // Graceful stop lets in-flight responses finish and clean up their files
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Register every route. Shared by the server and the handler tests.
fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::service_info))
        .route("/health", web::get().to(health::health_check))
        .route("/metrics", web::get().to(health::detailed_metrics))
        .route("/fullAudio", web::post().to(handlers::concatenate_audio));
}

/// Initialize the tracing (logging) system for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "audio_concat_service=trace")
/// - If not set, defaults to "audio_concat_service=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_concat_service=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
