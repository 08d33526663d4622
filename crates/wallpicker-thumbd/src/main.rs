//! Wallpicker thumbnail service
//!
//! Serves cached wallpaper thumbnails, local directory listings and Wallhaven
//! searches over HTTP on localhost, for front-ends that would rather not link
//! the core directly.

mod error;
mod server;
mod types;

use crate::error::{Result, ThumbdError};
use crate::server::{start_server, ServerState, SharedState};
use crate::types::DEFAULT_PORT;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};
use wallpicker_core::{CoreConfig, CoreContext, Preferences};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("wallpicker_thumbd=info".parse()?)
        .add_directive("wallpicker_core=info".parse()?);

    // Use JSON format for structured log collection when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Wallpicker thumbnail service...");

    let port = load_port();
    let config = load_config().await;
    info!("Port: {}", port);
    info!("Cache dir: {:?}", config.cache_dir);
    info!(
        "Cache budget: {} MB",
        config.cache_size_budget_bytes / (1024 * 1024)
    );
    info!("Cache TTL: {} seconds", config.cache_ttl_seconds);
    info!("Rate limit: {} requests/minute", config.rate_limit_per_minute);

    let context = CoreContext::init_with_wallhaven(config).await?;
    let state: SharedState = Arc::new(ServerState::new(context));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
    };
    let served = start_server(state.clone(), port, shutdown)
        .await
        .map_err(|e| ThumbdError::Config(format!("Server error: {}", e)));

    state.context.shutdown().await;
    served
}

fn load_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// Preferences file first, then `WALLPICKER_*` environment overrides
async fn load_config() -> CoreConfig {
    let preferences = match Preferences::default_path() {
        Some(path) => match Preferences::load(&path).await {
            Ok(preferences) => preferences,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Using default preferences");
                Preferences::default()
            }
        },
        None => Preferences::default(),
    };
    if let Err(e) = preferences.validate() {
        warn!(error = %e, "Configured wallpapers directory is unusable");
    }

    CoreConfig::from_preferences(&preferences).with_env()
}
