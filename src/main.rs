use std::sync::Arc;
use tokio::signal;

use certhub::activity;
use certhub::anchor::{AnchorMode, LedgerAnchor};
use certhub::certificates::{CertificateService, IssuanceSettings};
use certhub::config::{Config, StoreBackend};
use certhub::db::{self, MemoryStore, PgStore, Store};
use certhub::fonts::Fonts;
use certhub::raster::LogoLoader;
use certhub::routes;
use certhub::state::AppState;
use certhub::storage::FileStorage;
use certhub::templates;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certhub=info,tower_http=info".into()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let fonts = Fonts::discover(config.font_dir.as_deref())
        .map_err(|e| format!("certificate rendering needs a TrueType font: {}", e))?;
    let fonts = Arc::new(fonts);

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = db::create_pool(&config.database_url).await?;
            db::run_migrations(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store, all data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let blobs = Arc::new(FileStorage::new(config.storage_folder.clone())?);

    let (activity, activity_writer) = activity::spawn_writer(store.clone(), config.activity_buffer);

    let mut service = CertificateService::new(
        store,
        blobs,
        fonts,
        LogoLoader::new(config.logo_fetch_timeout, config.logo_allow_private_hosts)?,
        activity,
        IssuanceSettings {
            base_url: config.public_base_url.clone(),
            default_format: config.artifact_format,
            inline_artifacts: config.inline_artifacts,
            max_upload_bytes: config.max_upload_bytes,
        },
    );
    if config.anchor_mode == AnchorMode::Ledger {
        tracing::warn!("Anchoring to the in-process ledger, receipts do not survive a restart");
        service = service.with_anchor(Arc::new(LedgerAnchor::new()));
    }

    let state = Arc::new(AppState {
        service: Arc::new(service),
        config: config.clone(),
        tera: Arc::new(templates::load()?),
    });
    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("certhub listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last activity sink, so the writer drains and stops.
    if let Err(e) = activity_writer.await {
        tracing::error!("Activity writer panicked: {}", e);
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
