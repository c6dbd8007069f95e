//! Monitoring engine module - defines and runs availability checks
//!
//! This module is responsible for:
//! - Defining check variants and judging responses
//! - Executing checks with retries
//! - Keeping per-monitor state, schedules and history
//! - Scheduling due monitors and publishing status events

pub mod check;
pub mod checker;
pub mod events;
pub mod executor;
pub mod history;
pub mod monitor;
pub mod registry;
pub mod render;
pub mod scheduler;
pub mod types;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use check::{Check, CheckType};
pub use checker::{Checker, HttpChecker};
pub use events::{EventBus, MonitorEvent, StatusChange};
pub use executor::MonitoringExecutor;
pub use history::HistoryStore;
pub use monitor::{Monitor, MonitorConfig, MonitorState};
pub use registry::Registry;
pub use render::{ChromeRenderer, Renderer};
pub use scheduler::{MonitoringScheduler, SharedRegistry};
pub use types::{AggregateHealth, CheckResult, MonitorStatus};
