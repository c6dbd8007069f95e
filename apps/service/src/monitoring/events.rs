use tokio::sync::broadcast;
use tracing::debug;

use super::types::{AggregateHealth, CheckResult};

const BUS_CAPACITY: usize = 64;

/// A monitor flipped between passing and failing
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub monitor: String,
    pub url: String,
    pub passed: bool,
    pub result: CheckResult,
}

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A real execution was recorded to history
    ResultRecorded { monitor: String, result: CheckResult },
    StatusChanged(StatusChange),
    HealthChanged(AggregateHealth),
}

/// Fan-out of monitor events to alerting and any other listeners.
///
/// Publishing never blocks or fails; with no subscribers events are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: MonitorEvent) {
        if let MonitorEvent::StatusChanged(change) = &event {
            debug!(monitor = %change.monitor, passed = change.passed, "Event bus: status change");
        }
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BUS_CAPACITY)
    }
}
