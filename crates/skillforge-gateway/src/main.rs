mod admin;
mod config;
mod error_response;
mod health;
mod lifecycle;
mod logging;
mod mcp;
mod middleware;
mod router;
mod state;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use skillforge_core::SkillCatalog;
use skillforge_log::InvocationLog;
use skillforge_protocol::{EngineConfig, MCPEngine};
use skillforge_session::{SessionRegistry, SessionRegistryConfig};
use skillforge_storage::{
    sqlite::SqliteHandle, LocalMetadataStore, LocalObjectStore, MetadataStore, ObjectStore,
    RemoteMetadataStore, RemoteObjectStore,
};
use skillforge_vault::StaticTokenVerifier;

use config::{GatewayConfig, StorageBackend};
use state::AppState;

const LOG_BROADCAST_CAPACITY: usize = 1024;

fn init_logging() -> tokio::sync::broadcast::Sender<String> {
    let (log_tx, _) = tokio::sync::broadcast::channel::<String>(LOG_BROADCAST_CAPACITY);
    let make_writer = logging::BroadcastMakeWriter {
        sender: log_tx.clone(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(make_writer)
        .init();
    log_tx
}

fn build_storage(
    config: &GatewayConfig,
) -> (Arc<dyn ObjectStore>, Arc<dyn MetadataStore>, Option<SqliteHandle>) {
    match config.storage_backend {
        StorageBackend::Local => {
            let db_path = config.skill_cache_dir.join("skillforge.sqlite3");
            let db = SqliteHandle::open(&db_path).unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to open local sqlite database");
                std::process::exit(2);
            });
            let object_store = Arc::new(LocalObjectStore::new(config.skill_cache_dir.join("objects")));
            let metadata_store = Arc::new(LocalMetadataStore::new(db.clone()));
            (object_store, metadata_store, Some(db))
        }
        StorageBackend::Remote => {
            let object_store = Arc::new(RemoteObjectStore::new(
                config.remote_storage_endpoint.clone(),
                config.object_store_bucket.clone(),
                config.object_store_prefix.clone(),
            ));
            let metadata_store = Arc::new(RemoteMetadataStore::new(
                config.remote_storage_endpoint.clone(),
                config.metadata_table.clone(),
            ));
            (object_store, metadata_store, None)
        }
    }
}

#[tokio::main]
async fn main() {
    let log_tx = init_logging();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration, refusing to start");
            std::process::exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.skill_cache_dir) {
        tracing::error!(error = %e, path = %config.skill_cache_dir.display(), "could not create skill cache dir");
        std::process::exit(1);
    }

    let (object_store, metadata_store, local_db) = build_storage(&config);

    let catalog = Arc::new(SkillCatalog::new(object_store.clone(), metadata_store.clone()));
    match catalog.boot().await {
        Ok(loaded) => tracing::info!(loaded, "catalog boot complete"),
        Err(err) => {
            tracing::error!(error = %err, "catalog boot failed, storage unreachable");
            std::process::exit(2);
        }
    }

    let sessions = Arc::new(SessionRegistry::new(SessionRegistryConfig {
        idle_timeout: chrono::Duration::minutes(config.session_idle_minutes),
        suspended_expiry: chrono::Duration::hours(config.session_expiry_hours),
    }));

    // The invocation log shares the local sqlite database with the
    // metadata store per §4.2/§4.3; a remote-backed deployment still needs
    // somewhere durable to drain to, so it gets its own on-disk database
    // under the cache dir rather than going without an audit log.
    let log_db = match local_db {
        Some(db) => db,
        None => {
            let path = config.skill_cache_dir.join("invocation_log.sqlite3");
            SqliteHandle::open(&path).unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to open invocation log database");
                std::process::exit(2);
            })
        }
    };
    let (invocation_log, log_worker) =
        InvocationLog::spawn(log_db, skillforge_log::DEFAULT_QUEUE_CAPACITY);
    let invocation_log = Arc::new(invocation_log);

    let engine = Arc::new(MCPEngine::new(
        catalog.clone(),
        object_store.clone(),
        sessions.clone(),
        invocation_log.clone(),
        metadata_store.clone(),
        EngineConfig {
            tool_call_timeout: config.tool_call_timeout(),
            retention_days: config.invocation_log_ttl_days,
        },
    ));

    let admin_verifier = config
        .admin_auth_token
        .clone()
        .map(|token| Arc::new(StaticTokenVerifier::new(token)));

    let config = Arc::new(config);
    let state = AppState {
        catalog,
        object_store,
        metadata_store,
        sessions,
        invocation_log,
        engine,
        admin_verifier,
        config: config.clone(),
        log_tx,
    };

    let mut scheduler = match lifecycle::build_scheduler(state.clone(), &config).await {
        Ok(scheduler) => scheduler,
        Err(err) => {
            tracing::error!(error = %err, "failed to build background job scheduler");
            std::process::exit(1);
        }
    };
    if let Err(e) = scheduler.start().await {
        tracing::error!(error = %e, "failed to start background job scheduler");
        std::process::exit(1);
    }

    let app = router::build_router(state);

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %config.bind_addr, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %config.bind_addr, "skillforge-gateway listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = server.await {
        tracing::error!(error = %e, "server crashed");
        std::process::exit(1);
    }

    tracing::info!("shutting down background jobs");
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "scheduler shutdown reported an error");
    }
    let _ = log_worker.await;
    tracing::info!("clean shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
