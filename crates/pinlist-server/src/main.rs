use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use pinlist_api::rate_limit::{DEFAULT_MAX_HITS, RateLimiter};
use pinlist_api::{AppState, AppStateInner, workers};

struct Config {
    db_path: PathBuf,
    host: String,
    port: u16,
    token_sweep: Duration,
    max_hits: u32,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        let var = |name: &str, default: &str| std::env::var(name).unwrap_or_else(|_| default.into());

        let port = var("PINLIST_PORT", "3000")
            .parse()
            .context("PINLIST_PORT must be a port number")?;
        let sweep_hours: u64 = var("PINLIST_TOKEN_SWEEP_HOURS", "24")
            .parse()
            .context("PINLIST_TOKEN_SWEEP_HOURS must be a whole number of hours")?;
        let max_hits = var("PINLIST_RATE_LIMIT_MAX_HITS", &DEFAULT_MAX_HITS.to_string())
            .parse()
            .context("PINLIST_RATE_LIMIT_MAX_HITS must be a positive integer")?;

        Ok(Self {
            db_path: PathBuf::from(var("PINLIST_DB_PATH", "pinlist.db")),
            host: var("PINLIST_HOST", "0.0.0.0"),
            port,
            token_sweep: Duration::from_secs(sweep_hours.max(1) * 60 * 60),
            max_hits,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pinlist=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = pinlist_db::Database::open(&config.db_path)
        .with_context(|| format!("opening database at {}", config.db_path.display()))?;

    // Shared state
    let limiter = Arc::new(RateLimiter::new(config.max_hits));
    let state: AppState = Arc::new(AppStateInner {
        db,
        limiter: limiter.clone(),
    });

    // Background sweeps
    let shutdown = CancellationToken::new();
    let workers = [
        workers::spawn_token_sweeper(state.clone(), config.token_sweep, shutdown.clone()),
        workers::spawn_rate_limit_sweeper(limiter, shutdown.clone()),
    ];

    let app: Router = pinlist_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Pinlist server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    for handle in workers {
        handle.await?;
    }
    info!("Pinlist server stopped");

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels the background workers.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
