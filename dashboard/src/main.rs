use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Router};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dashboard::client::ApiClient;
use dashboard::config::Config;
use dashboard::host::HostBridge;
use dashboard::metrics;
use dashboard::poller::{run_poller, PollerHandle, SharedDashboard};
use dashboard::rest::{self, AppState};
use dashboard::session::SessionManager;
use dashboard::storage::PreferenceStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting fleet dashboard");
    info!("Tracking API: {}", config.api_base_url);
    info!("Auth mode: {:?}", config.auth_mode);
    info!("HTTP server: {}", config.http_addr);

    if let Err(e) = metrics::init_metrics() {
        error!("Failed to register metrics: {}", e);
    }

    let store = Arc::new(PreferenceStore::open(&config.preferences_path).await);
    let prefs = store.get().await;

    let client = ApiClient::new(&config.api_base_url, config.request_timeout(), store.clone())
        .context("building tracking API client")?;
    let session = Arc::new(
        SessionManager::new(config.auth(), store.clone()).context("building session manager")?,
    );

    let dashboard = SharedDashboard::default();
    let (poller, poll_rx) = PollerHandle::new(prefs.selected_site_id.clone());

    let poller_handle = tokio::spawn(run_poller(
        poll_rx,
        client.clone(),
        store.clone(),
        dashboard.clone(),
        config.poll_interval(),
    ));

    let state = AppState {
        client,
        host: HostBridge::new(session.clone(), poller.clone()),
        session,
        store,
        dashboard,
        poller,
    };

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(state));

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("binding {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = poller_handle => {
            error!("Poller task terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
