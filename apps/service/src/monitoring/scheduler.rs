use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use super::registry::Registry;

/// Registry shared between the scheduler and the control surface
pub type SharedRegistry = Arc<Mutex<Registry>>;

/// Monitoring scheduler - wakes at a fixed resolution and runs due monitors
pub struct MonitoringScheduler {
    registry: SharedRegistry,
    resolution: Duration,
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitoringScheduler {
    pub fn new(registry: SharedRegistry, resolution: Duration) -> Self {
        Self { registry, resolution: resolution.max(Duration::from_millis(1)) }
    }

    /// Spawn the scheduling loop.
    ///
    /// Each tick holds the registry lock while due monitors run, so control
    /// operations are serialized with execution.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut timer = interval(self.resolution);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(resolution = ?self.resolution, "Scheduler started");

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = timer.tick() => {
                        let mut registry = self.registry.lock().await;
                        let executed = registry.tick(Utc::now()).await;
                        if executed > 0 {
                            debug!(executed, "Scheduler tick");
                        }
                    }
                }
            }

            info!("Scheduler stopped");
        });

        SchedulerHandle { shutdown, task }
    }
}

impl SchedulerHandle {
    /// Ask the loop to stop and wait for the tick in progress to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Scheduler task failed: {}", e);
        }
    }
}
