use axum::http::{header, HeaderValue, Method};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod cache;
mod config;
mod models;
mod routes;
mod stats;

use auth::AuthState;
use cache::StatsCache;
use config::Config;
use models::{load_baseline, load_miners, AppState, MinerStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first (needed for log paths)
    let config = Config::load()?;

    // Set up logging directory
    let log_dir = Path::new(&config.server.log_dir);
    std::fs::create_dir_all(log_dir)?;

    // Create error log file appender
    let error_log_path = log_dir.join("error.log");
    let error_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&error_log_path)?;

    // Initialize logging with both console and file output
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(error_file))
        .with_ansi(false);

    let console_layer = tracing_subscriber::fmt::layer();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!("Starting miner dashboard API");
    tracing::info!("Error log: {}", error_log_path.display());

    // Load seed data
    let miners = load_miners(Path::new(&config.data.miners_file))?;
    tracing::info!(
        "Loaded {} miner records from {}",
        miners.len(),
        config.data.miners_file
    );

    let baseline = load_baseline(Path::new(&config.data.stats_file))?;
    tracing::info!(
        "Loaded baseline statistics from {}",
        config.data.stats_file
    );

    let users = auth::load_users(Path::new(&config.auth.users_file))?;
    tracing::info!("Loaded {} user accounts", users.len());

    let upstream = Arc::new(api::HttpUpstream::new(config.upstream.timeout_secs)?);

    // Initialize app state
    let state = Arc::new(AppState {
        auth: AuthState::new(users, config.auth.token_timeout_secs),
        miners: MinerStore::new(miners, config.data.page_size),
        cache: StatsCache::new(),
        upstream,
        baseline,
        config: config.clone(),
    });

    // Spawn background task to sweep expired bearer tokens
    let state_clone = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            state_clone.auth.tokens.cleanup().await;
        }
    });

    // Build router
    let app = routes::create_router(state)
        .layer(cors_layer(&config.server.cors_origin)?)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            anyhow::anyhow!(
                "Invalid listen address '{}:{}': {}",
                config.server.host,
                config.server.port,
                e
            )
        })?;

    tracing::info!("HTTP server listening on http://{}", addr);

    axum_server::bind(addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

/// CORS restricted to the configured dashboard origin
fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = origin
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid CORS origin '{}': {}", origin, e))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}
