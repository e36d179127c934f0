//! tally-api - HTTP API server for tally

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally_api::middleware::build_rate_limiter;
use tally_api::services::{ReceiptStore, UrlSigner};
use tally_api::{build_router, ApiConfig, AppState};
use tally_core::{DisabledMirror, SheetMirror};
use tally_db::{Database, FilesystemBackend, PoolConfig};
use tally_sheets::{GoogleSheetsClient, SheetsConfig};
use tally_sync::{ReconcileConfig, ReconcileWorker};

/// Initialize tracing with configurable output.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `LOG_FORMAT` | `text` | `json` or `text` |
/// | `LOG_FILE` | unset | enables daily-rotated file logging |
/// | `LOG_ANSI` | auto | force ANSI colors on or off |
/// | `RUST_LOG` | `tally_api=debug,tally_sync=debug,tower_http=debug` | env filter |
fn init_tracing() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tally_api=debug,tally_sync=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("tally-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    let config = ApiConfig::from_env();

    info!("Connecting to database...");
    let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    let mirror: Arc<dyn SheetMirror> = match SheetsConfig::from_env()? {
        Some(sheets) => {
            info!(
                subsystem = "sheets",
                spreadsheet_id = %sheets.spreadsheet_id,
                tab = %sheets.tab,
                "Spreadsheet mirror enabled"
            );
            Arc::new(GoogleSheetsClient::new(sheets)?)
        }
        None => {
            warn!(
                subsystem = "sheets",
                "SHEETS_SPREADSHEET_ID not set, spreadsheet mirror disabled"
            );
            Arc::new(DisabledMirror)
        }
    };

    let mut state = AppState::new(
        Arc::new(db.users.clone()),
        Arc::new(db.categories.clone()),
        Arc::new(db.transactions.clone()),
        mirror,
    )
    .with_rate_limiter(build_rate_limiter(&config.rate_limit));

    match &config.storage.signing_secret {
        Some(secret) => {
            let backend = FilesystemBackend::new(&config.storage.path);
            if let Err(e) = backend.validate().await {
                warn!(
                    subsystem = "storage",
                    path = %config.storage.path,
                    error = %e,
                    "Receipt storage failed its startup probe"
                );
            }
            state = state.with_receipts(ReceiptStore::new(
                Arc::new(backend),
                config.storage.bucket.clone(),
                UrlSigner::new(secret),
                config.storage.public_base_url.clone(),
            ));
            info!(
                subsystem = "storage",
                path = %config.storage.path,
                bucket = %config.storage.bucket,
                "Receipt storage initialized"
            );
        }
        None => warn!(
            subsystem = "storage",
            "STORAGE_SIGNING_SECRET not set, receipt uploads disabled"
        ),
    }

    let reconcile_config = ReconcileConfig::from_env();
    let reconcile_handle = if reconcile_config.enabled() {
        Some(ReconcileWorker::new(state.reconciler.clone(), reconcile_config).start())
    } else {
        info!(subsystem = "sync", "Periodic reconciliation disabled");
        None
    };

    let app = build_router(state, config.allowed_origins.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = reconcile_handle {
        if let Err(e) = handle.shutdown().await {
            warn!(error = %e, "Reconcile worker did not acknowledge shutdown");
        }
    }
    info!("Server stopped");
    Ok(())
}
