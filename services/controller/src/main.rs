//! landform controller
//!
//! Runs the installation reconciler against the in-memory resource store,
//! optionally seeded from a manifest directory.

use std::sync::Arc;

use anyhow::Result;
use landform_api::Scheme;
use landform_reconcile::{BackoffPolicy, Controller, ControllerConfig, WorkQueue};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use landform_controller::config::Config;
use landform_controller::installation::{Actuator, ActuatorConfig, SharedOperation};
use landform_controller::registry::Registries;
use landform_controller::store::{Client, MemoryStore};
use landform_controller::{manifest, watch as event_watch};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        workers = config.workers,
        reconcile_timeout_secs = config.reconcile_timeout.as_secs(),
        blocked_retry_secs = config.blocked_retry_interval.as_secs(),
        "Starting landform controller"
    );

    let mut scheme = Scheme::new();
    landform_api::install(&mut scheme);

    let registries = Arc::new(Registries::from_config(&config.registries()?));
    let store = Arc::new(MemoryStore::new(scheme.clone()));
    let queue = Arc::new(WorkQueue::new(BackoffPolicy::default()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Subscribe before seeding so no change is missed.
    let mapper_handle = tokio::spawn(event_watch::run_event_mapper(
        Arc::clone(&store),
        Arc::clone(&queue),
        store.subscribe(),
        shutdown_rx.clone(),
    ));

    if let Some(dir) = &config.manifest_dir {
        let objects = manifest::load_manifests(dir, &scheme)?;
        for key in manifest::seed(store.as_ref(), objects).await? {
            queue.add(key).await;
        }
    }

    let operation = Arc::new(SharedOperation::new(Arc::clone(&store), registries));
    let actuator = Arc::new(Actuator::new(
        operation,
        ActuatorConfig {
            blocked_retry_interval: config.blocked_retry_interval,
        },
    ));
    let controller = Controller::new(
        actuator,
        Arc::clone(&queue),
        ControllerConfig {
            workers: config.workers,
            reconcile_timeout: config.reconcile_timeout,
        },
    );
    let stats = controller.stats();
    let controller_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { controller.run(shutdown_rx).await }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = mapper_handle => {
            if let Err(e) = result {
                error!(error = %e, "Event mapper task panicked");
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = controller_handle.await {
        error!(error = %e, "Controller task panicked");
    }

    let (reconciled, requeued, failed, timed_out) = stats.snapshot();
    info!(reconciled, requeued, failed, timed_out, "Controller shutdown complete");
    Ok(())
}
