use crate::config::{BackendConfig, Config};
use aggregator::{AggregationController, HttpBackend};
use discovery::{DiscoveryService, DiscoveryStore};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not create client for backend {name}: {reason}")]
    BackendClient { name: String, reason: String },

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

async fn register_backends(
    controller: &AggregationController,
    backends: &[BackendConfig],
    pull_timeout: Duration,
) -> Result<(), ServerError> {
    for backend in backends {
        let client = HttpBackend::new(backend.url.clone(), pull_timeout).map_err(|e| {
            ServerError::BackendClient {
                name: backend.name.clone(),
                reason: e.to_string(),
            }
        })?;

        controller
            .register_source(
                &backend.name,
                &backend.group,
                &backend.version,
                Arc::new(client),
            )
            .await;
    }
    Ok(())
}

/// Serves the merged document and the admin endpoints until ctrl-c, while the
/// controller keeps the document in sync with the configured backends.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let store = Arc::new(DiscoveryStore::new());
    let controller = AggregationController::new(
        store.clone(),
        Duration::from_secs(config.sync.interval_secs),
    );

    register_backends(
        &controller,
        &config.backends,
        Duration::from_secs(config.sync.pull_timeout_secs),
    )
    .await?;

    let discovery_service = DiscoveryService::new(store, &config.discovery_path);
    let readiness = controller.clone();
    let admin_service = AdminService::new(move || readiness.is_synced());

    // Listeners come up before the first pass so probes answer while syncing
    let listener = config.listener.clone();
    let admin_listener = config.admin_listener.clone();
    let servers = tokio::spawn(async move {
        tokio::try_join!(
            run_http_service(&listener.host, listener.port, discovery_service),
            run_http_service(&admin_listener.host, admin_listener.port, admin_service),
        )
    });

    // The first pass races the signal and the servers too, so a stuck backend
    // cannot hold up shutdown
    let (stop, shutdown) = watch::channel(false);
    let sync = tokio::spawn(async move { controller.run(shutdown).await });

    let result = tokio::select! {
        served = servers => match served {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ServerError::Io(e)),
            Err(e) => Err(ServerError::Task(e)),
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            Ok(())
        }
    };

    stop.send_replace(true);
    let sync_loop = sync.await?;
    sync_loop.await?;
    result
}
