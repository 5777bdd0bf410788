//! # Transcribe Backend - Main Application Entry Point
//!
//! HTTP wrapper around a locally-loaded Whisper model. The server loads
//! the model once at startup, before binding the listener, so a request
//! never observes a half-initialized engine.
//!
//! ## Application Architecture:
//! - **config**: TOML file + environment variable configuration
//! - **error**: API error taxonomy and HTTP status mapping
//! - **state**: Shared application state and request metrics
//! - **device**: Compute device selection (CPU/CUDA/Metal)
//! - **payload**: Upload vs base64 input decoding
//! - **sniff**: Magic-byte media type classification
//! - **artifact**: Temp-file lifecycle with guaranteed cleanup
//! - **audio**: WAV decoding into 16 kHz mono PCM
//! - **transcription**: Model loading and inference
//! - **handlers**: The transcription endpoints
//! - **health**: Health and metrics endpoints
//! - **middleware**: Request telemetry

mod artifact;
mod audio;
mod config;
mod device;
mod error;
mod handlers;
mod health;
mod middleware;
mod payload;
mod sniff;
mod state;
mod transcription;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::AppConfig;
use state::AppState;
use transcription::TranscriptionEngine;

/// Global shutdown flag set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## Startup sequence:
/// 1. Load and validate configuration
/// 2. Select the compute device
/// 3. Load the Whisper model (downloads weights on first run)
/// 4. Bind the HTTP server and serve until a shutdown signal arrives
///
/// Model loading happens before `HttpServer::bind`, so by the time the
/// port is open every request handler has a ready engine.
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting transcribe-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let preference = config.model.device.parse()?;
    let compute_device = device::select_device(preference);
    let device_label = device::device_label(&compute_device);
    info!(device = device_label, "compute device selected");

    let model_size = config.model.size.parse()?;
    let timeout = Duration::from_secs(config.limits.transcription_timeout_secs);

    info!(size = %model_size, "loading whisper model (this may take a while on first run)");
    let engine = TranscriptionEngine::load(model_size, compute_device, timeout).await?;
    info!("model loaded, ready to serve");

    let app_state = AppState::new(config.clone(), engine, device_label);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    // JSON bodies carry base64, which inflates the raw payload by 4/3.
    let json_limit = config.limits.max_upload_bytes * 2;

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().limit(json_limit))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::RequestTelemetry)
            .route("/transcribe", web::post().to(handlers::transcribe_legacy))
            .route("/transcribe_base64", web::post().to(handlers::transcribe_base64))
            .route("/transcribe_file", web::post().to(handlers::transcribe_file))
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
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

/// Initialize structured logging.
///
/// `RUST_LOG` controls the filter; the default keeps this crate at debug
/// and actix-web at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transcribe_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and set the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

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

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
