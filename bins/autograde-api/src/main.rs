mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use autograde_common::config::GradingConfig;
use autograde_core::judge0::Judge0Client;
use autograde_core::languages::LanguageConfigManager;
use autograde_core::store::{AttemptStore, MemoryAttemptStore, RedisAttemptStore};
use autograde_core::GradingService;
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub struct AppState {
    pub service: GradingService,
    pub sandbox: Arc<Judge0Client>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining requests");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Autograde API booting...");

    let config = GradingConfig::from_env().context("Invalid grading configuration")?;
    let languages = LanguageConfigManager::load_or_builtin(Path::new(&config.languages_path))?;

    let sandbox = Arc::new(Judge0Client::new(&config).context("Invalid sandbox configuration")?);
    info!(url = %config.sandbox_url, workers = config.worker_pool_size, "Sandbox client ready");

    let store: Arc<dyn AttemptStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisAttemptStore::connect(url)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", url))?;
            info!("Connected to Redis: {}", url);
            Arc::new(store)
        }
        None => {
            warn!("REDIS_URL not set, attempts are kept in memory only");
            Arc::new(MemoryAttemptStore::new())
        }
    };

    let state = Arc::new(AppState {
        service: GradingService::new(config, languages, sandbox.clone(), store),
        sandbox,
    });
    metrics::WORKERS_AVAILABLE.set(state.service.available_workers() as i64);

    let app = Router::new().merge(routes::routes()).with_state(state.clone());

    let addr = std::env::var("API_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let cleaned = state.sandbox.cleanup().await;
    info!(submissions = cleaned, "Cleaned up outstanding sandbox submissions");
    Ok(())
}
