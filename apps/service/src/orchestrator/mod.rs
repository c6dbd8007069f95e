/// Orchestrator module - coordinates all components
///
/// The orchestrator wires the engine together:
/// - Loads the registry and its history from the data directory
/// - Runs the scheduler loop over the registry
/// - Forwards status changes to the alert dispatcher
/// - Hands out the control surface to user-facing shells


use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::alerts::AlertDispatcher;
use crate::config::Config;
use crate::control::MonitorControl;
use crate::lock::DataDirLock;
use crate::monitoring::{
    ChromeRenderer, Checker, EventBus, HistoryStore, HttpChecker, MonitoringExecutor,
    MonitoringScheduler, Registry, SharedRegistry,
};

/// How long shutdown waits for queued alerts
const ALERT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Main orchestrator for the BUMP engine
pub struct Orchestrator {
    config: Arc<Config>,
    registry: SharedRegistry,
    events: EventBus,
}

impl Orchestrator {
    /// Create and start a new orchestrator, running until Ctrl-C.
    ///
    /// The data directory stays locked for the whole run.
    pub async fn start(config: Config) -> Result<()> {
        let _lock = DataDirLock::acquire(config.lock_path()).context("Cannot start monitoring")?;
        let orchestrator = Self::new(config)?;
        orchestrator
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
            })
            .await
    }

    /// Build the engine with the real HTTP checker and headless renderer
    pub fn new(config: Config) -> Result<Self> {
        let renderer = Arc::new(ChromeRenderer::new(
            config.render.chrome_path.clone(),
            Duration::from_millis(config.render.settle_ms),
        ));
        let checker = HttpChecker::new(&config.http.user_agent, renderer)
            .context("Failed to build HTTP client")?;

        Ok(Self::with_checker(config, Arc::new(checker)))
    }

    /// Build the engine around any checker
    pub fn with_checker(config: Config, checker: Arc<dyn Checker>) -> Self {
        let events = EventBus::default();
        let registry = Registry::new(
            MonitoringExecutor::new(checker),
            HistoryStore::new(config.history_dir()),
            events.clone(),
        )
        .with_stats_window(config.general.stats_window_days)
        .open(config.registry_path(), config.general.bootstrap_defaults);

        info!(
            monitors = registry.len(),
            health = %registry.aggregate_health(),
            data_dir = %config.storage.data_dir.display(),
            "Registry ready"
        );

        Self { config: Arc::new(config), registry: Arc::new(Mutex::new(registry)), events }
    }

    pub fn control(&self) -> MonitorControl {
        MonitorControl::new(self.registry.clone())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run the scheduler and alerting until `shutdown` completes
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let alerts = AlertDispatcher::from_config(&self.config.alerts).spawn(self.events.subscribe());
        let scheduler =
            MonitoringScheduler::new(self.registry.clone(), self.config.resolution()).start();

        info!("Monitoring started");
        shutdown.await;
        info!("Shutting down");

        scheduler.stop().await;
        self.registry.lock().await.save().context("Failed to save monitors on shutdown")?;
        alerts.stop(ALERT_DRAIN_GRACE).await;

        info!("Monitoring stopped");
        Ok(())
    }
}
