use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vqa_core::catalog::{ImageCatalog, StaticCatalog};
use vqa_mirror::{GoogleSheetsBackend, InMemorySheets, MirrorCache, SheetBackend};
use vqa_store::{AssignmentBook, PartitionStore, WorkerRegistry};

use vqa_api::background;
use vqa_api::config::ServerConfig;
use vqa_api::router::build_app_router;
use vqa_api::service::AnnotationService;
use vqa_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "vqa_api=debug,vqa_store=info,vqa_mirror=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Local store ---
    let store = Arc::new(
        PartitionStore::open(&config.output_json_path).with_lock_timeout(config.save_lock_timeout()),
    );
    tracing::info!(
        exo = %store.path(vqa_core::record::Partition::Exo).display(),
        ego = %store.path(vqa_core::record::Partition::Ego).display(),
        "Partition store ready"
    );

    let assignments = Arc::new(
        AssignmentBook::open(&config.assignments_path).expect("Failed to open assignment book"),
    );
    let registry = Arc::new(
        WorkerRegistry::open(&config.workers_path).expect("Failed to open worker registry"),
    );

    // --- Catalog ---
    let catalog: Arc<dyn ImageCatalog> = match &config.catalog_path {
        Some(path) => {
            let catalog = StaticCatalog::load(path).expect("Failed to load image catalog");
            tracing::info!(images = catalog.len(), path = %path.display(), "Image catalog loaded");
            Arc::new(catalog)
        }
        None => {
            tracing::warn!("CATALOG_PATH not set, every save will be rejected as unknown image");
            Arc::new(StaticCatalog::default())
        }
    };

    // --- Remote mirror ---
    let (backend, mirror_backend): (Arc<dyn SheetBackend>, &'static str) = match &config.sheets {
        Some(sheets) => {
            let backend = GoogleSheetsBackend::new(
                &sheets.api_base,
                sheets.spreadsheet_id.clone(),
                sheets.access_token.clone(),
            )
            .expect("Invalid Google Sheets configuration");
            tracing::info!(spreadsheet_id = %sheets.spreadsheet_id, "Mirroring to Google Sheets");
            let backend: Arc<dyn SheetBackend> = Arc::new(backend);
            (backend, "google_sheets")
        }
        None => {
            tracing::warn!("SHEETS_SPREADSHEET_ID not set, mirroring to in-memory sheets");
            let backend: Arc<dyn SheetBackend> = Arc::new(InMemorySheets::new());
            (backend, "in_memory")
        }
    };
    let mirror = Arc::new(MirrorCache::new(backend, config.mirror_config()));

    let service = Arc::new(AnnotationService::new(
        Arc::clone(&store),
        mirror,
        catalog,
        assignments,
        registry,
    ));

    // --- Background jobs ---
    let cancel = CancellationToken::new();
    let sweep_handle = config.sweep_interval().map(|interval| {
        tokio::spawn(background::dedup_sweep::run(
            Arc::clone(&service),
            interval,
            cancel.clone(),
        ))
    });
    if sweep_handle.is_none() {
        tracing::info!("Background dedup sweep disabled");
    }

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        service,
        mirror_backend,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    if let Some(handle) = sweep_handle {
        let _ = tokio::time::timeout(Duration::from_secs(config.shutdown_timeout_secs), handle).await;
        tracing::info!("Dedup sweep job stopped");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
