//! Operations exposed to a user-facing shell (CLI, tray, GUI).
//!
//! Every call takes the registry lock, so control operations never interleave
//! with a scheduler tick.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ControlError;
use crate::monitoring::{
    AggregateHealth, CheckResult, Monitor, MonitorConfig, MonitorState, MonitorStatus,
    SharedRegistry,
};

/// Read-only view of a monitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub unique_name: String,
    pub config: MonitorConfig,
    pub state: MonitorState,
    pub status: MonitorStatus,
    pub validation_error: Option<String>,
    pub last_query_passed: Option<bool>,
    pub time_at_last_status_change: Option<DateTime<Utc>>,
    pub avg_uptime: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub next_due: Option<DateTime<Utc>>,
}

impl From<&Monitor> for MonitorSnapshot {
    fn from(monitor: &Monitor) -> Self {
        Self {
            unique_name: monitor.unique_name().to_string(),
            config: monitor.config(),
            state: monitor.state(),
            status: monitor.status(),
            validation_error: monitor.validate().err().map(|e| e.to_string()),
            last_query_passed: monitor.last_query_passed(),
            time_at_last_status_change: monitor.time_at_last_status_change(),
            avg_uptime: monitor.avg_uptime(),
            avg_latency_ms: monitor.avg_latency_ms(),
            next_due: monitor.next_due(),
        }
    }
}

#[derive(Clone)]
pub struct MonitorControl {
    registry: SharedRegistry,
}

impl MonitorControl {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    pub async fn list_monitors(&self) -> Vec<MonitorSnapshot> {
        self.registry.lock().await.monitors().iter().map(MonitorSnapshot::from).collect()
    }

    pub async fn get_monitor(&self, name: &str) -> Result<MonitorSnapshot, ControlError> {
        self.registry
            .lock()
            .await
            .get(name)
            .map(MonitorSnapshot::from)
            .ok_or_else(|| ControlError::NotFound(name.to_string()))
    }

    /// Add an unconfigured monitor under a fresh name
    pub async fn create_monitor(&self) -> Result<MonitorSnapshot, ControlError> {
        let mut registry = self.registry.lock().await;
        registry.create_with_unique_name().map(MonitorSnapshot::from)
    }

    /// Remove a monitor together with its history
    pub async fn delete_monitor(&self, name: &str) -> Result<(), ControlError> {
        self.registry.lock().await.delete(name).map(|_| ())
    }

    pub async fn set_paused(&self, name: &str, paused: bool) -> Result<MonitorSnapshot, ControlError> {
        let mut registry = self.registry.lock().await;
        registry.set_paused(name, paused).map(MonitorSnapshot::from)
    }

    /// Replace a monitor's configuration; rejected configurations change nothing
    pub async fn submit_config(
        &self,
        name: &str,
        config: MonitorConfig,
    ) -> Result<MonitorSnapshot, ControlError> {
        let mut registry = self.registry.lock().await;
        registry.submit_config(name, &config).map(MonitorSnapshot::from)
    }

    /// Run a monitor's check now, outside its schedule
    pub async fn force_execute(&self, name: &str) -> Result<CheckResult, ControlError> {
        self.registry.lock().await.force_execute(name, Utc::now()).await
    }

    /// The last `count` results, oldest first
    pub async fn get_history(&self, name: &str, count: usize) -> Result<Vec<CheckResult>, ControlError> {
        let registry = self.registry.lock().await;
        if !registry.contains(name) {
            return Err(ControlError::NotFound(name.to_string()));
        }
        Ok(registry.history().read_last(name, count)?)
    }

    pub async fn aggregate_health(&self) -> AggregateHealth {
        self.registry.lock().await.aggregate_health()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::monitoring::testing::{ScriptedChecker, registry_with};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn control(checker: ScriptedChecker, dir: &std::path::Path) -> MonitorControl {
        let registry = registry_with(Arc::new(checker), dir).open(dir.join("monitors.json"), false);
        MonitorControl::new(Arc::new(Mutex::new(registry)))
    }

    fn site_config(name: &str) -> MonitorConfig {
        MonitorConfig {
            unique_name: name.into(),
            url: "https://status.example.com".into(),
            check_type: "status_code".into(),
            check_params: "200".into(),
            timeout_seconds: 5.0,
            period_in_seconds: 30,
            retries: 0,
            retry_interval_in_seconds: 0.0,
            multi_line: false,
            ignore_case: false,
            dot_all: false,
        }
    }

    #[tokio::test]
    async fn test_create_configure_execute_delete() {
        let dir = tempfile::tempdir().unwrap();
        let control = control(ScriptedChecker::always(200), dir.path());

        let created = control.create_monitor().await.unwrap();
        assert_eq!(created.unique_name, "New monitor");
        assert_eq!(created.status, MonitorStatus::Invalid);
        assert!(created.validation_error.is_some());

        let configured =
            control.submit_config("New monitor", site_config("Status page")).await.unwrap();
        assert_eq!(configured.unique_name, "Status page");
        assert_eq!(configured.state, MonitorState::Active);

        let result = control.force_execute("Status page").await.unwrap();
        assert!(result.passed);
        assert_eq!(control.get_history("Status page", 10).await.unwrap(), vec![result]);
        assert_eq!(control.get_monitor("Status page").await.unwrap().status, MonitorStatus::Up);

        control.delete_monitor("Status page").await.unwrap();
        assert!(control.list_monitors().await.is_empty());
        assert!(matches!(
            control.get_history("Status page", 10).await,
            Err(ControlError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_submission_reports_why() {
        let dir = tempfile::tempdir().unwrap();
        let control = control(ScriptedChecker::always(200), dir.path());
        control.create_monitor().await.unwrap();
        control.create_monitor().await.unwrap();

        let error = control
            .submit_config("New monitor", site_config("New monitor 2"))
            .await
            .unwrap_err();
        assert!(matches!(error, ControlError::Validation(ValidationError::DuplicateName(_))));

        let bad_url = MonitorConfig { url: "not a url".into(), ..site_config("Fine") };
        assert!(control.submit_config("New monitor", bad_url).await.is_err());

        let names: Vec<String> =
            control.list_monitors().await.into_iter().map(|m| m.unique_name).collect();
        assert_eq!(names, vec!["New monitor", "New monitor 2"]);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let control = control(ScriptedChecker::always(200), dir.path());
        control.create_monitor().await.unwrap();
        control.submit_config("New monitor", site_config("api")).await.unwrap();

        let paused = control.set_paused("api", true).await.unwrap();
        assert_eq!(paused.status, MonitorStatus::Paused);

        let result = control.force_execute("api").await.unwrap();
        assert!(!result.passed);
        assert!(control.get_history("api", 10).await.unwrap().is_empty());

        let resumed = control.set_paused("api", false).await.unwrap();
        assert_eq!(resumed.state, MonitorState::Active);
        assert!(matches!(control.set_paused("ghost", true).await, Err(ControlError::NotFound(_))));
    }
}
