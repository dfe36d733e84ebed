//! Campus Insight API Server
//!
//! Run with: cargo run --bin campus-insight -- --config insight.toml
//!
//! # Configuration
//!
//! Settings are read from the TOML file given with `--config`, or from the
//! platform config directory (`campus-insight/config.toml`) when none is
//! given. Environment variables override the file:
//!
//! - `INSIGHT_DATA_DIR`: Data directory
//! - `INSIGHT_API_HOST`: Host to bind to (default: 0.0.0.0)
//! - `INSIGHT_API_PORT`: Port to listen on (default: 4321)
//! - `INSIGHT_MAX_RESULTS`: Row cap for a single query (default: 5000)
//! - `INSIGHT_LOG_LEVEL`: Log level (default: info)
//! - `INSIGHT_LOG_FORMAT`: `pretty` or `json`
//! - `RUST_LOG`: Full filter directive, takes precedence over the log level

use anyhow::Context;
use campus_insight::api::{serve, ApiConfig, AppState};
use campus_insight::config::{Config, LoggingConfig};
use campus_insight::query::QueryExecutor;
use campus_insight::storage::{DatasetStore, ReviewStore};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "campus-insight")]
#[command(version, about = "Campus Insight dataset query server")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_default(),
    };
    if let Some(port) = args.port {
        config.api.port = port;
    }

    init_tracing(&config.logging);

    tracing::info!("Starting Campus Insight v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data directory: {}", config.storage.data_dir);

    let store = Arc::new(
        DatasetStore::open(&config.storage.data_dir)
            .await
            .context("Failed to open dataset store")?,
    );
    let ids = store.ids().await?;
    tracing::info!("Found {} persisted dataset(s)", ids.len());

    let executor = Arc::new(QueryExecutor::new(
        Arc::clone(&store),
        config.query.max_results,
    ));

    let reviews = Arc::new(ReviewStore::open(config.storage.reviews_path()).await);
    tracing::info!("Loaded reviews for {} room(s)", reviews.len().await);

    let api_config = ApiConfig::from(&config.api);
    let state = AppState::new(store, executor, Arc::clone(&reviews), api_config.clone());

    serve(state, &api_config).await?;

    if let Err(e) = reviews.save().await {
        tracing::error!("Failed to save reviews on shutdown: {}", e);
    }

    tracing::info!("Campus Insight stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("campus_insight={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
