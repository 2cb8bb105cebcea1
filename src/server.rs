use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::rest::{self, AppState};
use crate::config::{Config, Preferences};
use crate::domain::filter::FilterSpec;
use crate::domain::projector::ColumnSchema;
use crate::domain::scheduler::RefreshScheduler;
use crate::domain::snapshot_store::SnapshotStore;
use crate::domain::view_model::{RebuildOutcome, ViewModel};
use crate::ingest;

pub async fn run(config: Config) -> Result<()> {
    // Init tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.daemon.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "fleet-top daemon starting");

    // Restore the last filter; a stale invalid regex falls back to match-all
    let prefs_path = Preferences::path(&config.daemon)?;
    let prefs = Preferences::load(&prefs_path).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load preferences, using defaults");
        Preferences::default()
    });
    let filter = FilterSpec::from_input(&prefs.filter).unwrap_or_else(|e| {
        warn!(error = %e, "saved filter does not compile, starting unfiltered");
        FilterSpec::default()
    });

    let store = Arc::new(SnapshotStore::new());
    let schema = ColumnSchema::default().with_wrap_width(config.view.wrap_width);
    let view = Arc::new(ViewModel::new(store.clone(), schema, filter));
    let (ingest, ingest_task) = ingest::spawn(store.clone(), config.daemon.ingest_queue);

    if let RebuildOutcome::NoData = view.rebuild().await {
        info!("waiting for machines to report");
    }
    let scheduler = RefreshScheduler::spawn(view.clone(), config.view.refresh_interval())
        .context("starting refresh scheduler")?;

    let app = rest::router(AppState {
        store: store.clone(),
        view: view.clone(),
        ingest,
        started_at: Instant::now(),
    })
    .layer(TraceLayer::new_for_http());

    // Bind HTTP listener
    let http_addr = &config.daemon.http_addr;
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding to {}", http_addr))?;

    info!(addr = %http_addr, "HTTP server listening");

    // Run HTTP server with graceful shutdown
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    // The router owned the last ingest handle, so the writer drains and exits
    scheduler.stop().await;
    match tokio::time::timeout(Duration::from_secs(5), ingest_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "ingestion task ended abnormally"),
        Err(_) => warn!("ingestion task did not stop in time"),
    }

    let prefs = Preferences {
        filter: view.filter_input().await,
    };
    match prefs.save(&prefs_path) {
        Ok(()) => info!(path = %prefs_path.display(), "saved preferences"),
        Err(e) => warn!(error = %e, "failed to save preferences"),
    }

    info!("fleet-top daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down"); },
        _ = terminate => { info!("Received SIGTERM, shutting down"); },
    }
}
