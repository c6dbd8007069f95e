//! The set of monitors, its persistence and the registry-wide health.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::check::{Check, HttpCheck, RegexCheck, RegexFlags};
use super::events::{EventBus, MonitorEvent};
use super::executor::MonitoringExecutor;
use super::history::HistoryStore;
use super::monitor::{ExecutionContext, Monitor, MonitorConfig, MonitorState};
use super::types::{AggregateHealth, CheckResult};
use super::validation::names_collide;
use crate::error::{ControlError, PersistenceError, ValidationError};

/// Base name for monitors created without a name
pub const DEFAULT_MONITOR_NAME: &str = "New monitor";

const DEFAULT_STATS_WINDOW_DAYS: i64 = 7;

#[derive(Serialize, Deserialize)]
struct RegistryFile {
    monitors: Vec<Monitor>,
}

#[derive(Serialize)]
struct RegistryFileRef<'a> {
    monitors: &'a [Monitor],
}

/// Monitors shipped on first start
pub fn default_monitors() -> Vec<Monitor> {
    vec![
        Monitor::new(
            "Google",
            Check::Http(HttpCheck { url: "http://www.google.com".into(), timeout_seconds: 10.0 }),
            16,
        ),
        Monitor::new(
            "GitHub_pew_pew",
            Check::Regex(RegexCheck {
                url: "https://github.com/JeanMariePrevost/p3-project-pew-pew".into(),
                timeout_seconds: 10.0,
                pattern: "proj.*pew".into(),
                flags: RegexFlags::default(),
            }),
            8,
        ),
    ]
}

pub struct Registry {
    monitors: Vec<Monitor>,
    executor: MonitoringExecutor,
    history: HistoryStore,
    events: EventBus,
    /// Registry file; `None` keeps everything in memory
    store_path: Option<PathBuf>,
    stats_window_days: i64,
    last_health: Option<AggregateHealth>,
}

impl Registry {
    pub fn new(executor: MonitoringExecutor, history: HistoryStore, events: EventBus) -> Self {
        Self {
            monitors: Vec::new(),
            executor,
            history,
            events,
            store_path: None,
            stats_window_days: DEFAULT_STATS_WINDOW_DAYS,
            last_health: None,
        }
    }

    pub fn with_stats_window(mut self, days: i64) -> Self {
        self.stats_window_days = days.max(1);
        self
    }

    /// Attach the registry file at `path` and load it.
    ///
    /// A missing file starts from the default monitors (when
    /// `bootstrap_defaults` is set) and writes them out. A malformed file is
    /// moved aside and the registry starts empty.
    pub fn open(mut self, path: impl Into<PathBuf>, bootstrap_defaults: bool) -> Self {
        let path = path.into();
        self.store_path = Some(path.clone());

        match read_registry_file(&path) {
            Ok(Some(monitors)) => {
                info!(count = monitors.len(), path = %path.display(), "Loaded monitors");
                self.monitors = dedup_names(monitors);
            }
            Ok(None) => {
                if bootstrap_defaults {
                    info!(path = %path.display(), "No registry file, creating default monitors");
                    self.monitors = default_monitors();
                }
                self.persist();
            }
            Err(e) => {
                error!(error = %e, "Failed to load registry, starting empty");
                if let PersistenceError::Malformed { .. } = e {
                    move_aside(&path);
                }
            }
        }

        let now = Utc::now();
        let (history, window) = (&self.history, self.stats_window_days);
        for monitor in &mut self.monitors {
            monitor.recalculate_stats(history, window, now);
        }
        self.refresh_health();
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Monitor> {
        self.monitors.iter().find(|monitor| monitor.unique_name() == name)
    }

    fn position(&self, name: &str) -> Result<usize, ControlError> {
        self.monitors
            .iter()
            .position(|monitor| monitor.unique_name() == name)
            .ok_or_else(|| ControlError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether `name` would collide with an existing monitor's name
    pub fn name_taken(&self, name: &str) -> bool {
        self.monitors.iter().any(|monitor| names_collide(monitor.unique_name(), name))
    }

    /// Add a monitor; names must not collide
    pub fn add(&mut self, monitor: Monitor) -> Result<(), ValidationError> {
        if self.name_taken(monitor.unique_name()) {
            return Err(ValidationError::DuplicateName(monitor.unique_name().to_string()));
        }
        info!(monitor = %monitor.unique_name(), "Monitor added");
        self.monitors.push(monitor);
        self.refresh_health();
        Ok(())
    }

    /// Remove a monitor, keeping its history
    pub fn remove(&mut self, name: &str) -> Option<Monitor> {
        let index = self.monitors.iter().position(|monitor| monitor.unique_name() == name)?;
        let monitor = self.monitors.remove(index);
        info!(monitor = %name, "Monitor removed");
        self.refresh_health();
        Some(monitor)
    }

    /// Remove a monitor and its history, then persist.
    ///
    /// The monitor stays registered when its history cannot be removed.
    pub fn delete(&mut self, name: &str) -> Result<Monitor, ControlError> {
        self.position(name)?;
        self.history.delete(name)?;
        let monitor = self.remove(name).ok_or_else(|| ControlError::NotFound(name.to_string()))?;
        self.persist();
        Ok(monitor)
    }

    /// `base` if free, otherwise the first free `base n` for n = 2, 3, ...
    pub fn unique_name(&self, base: &str) -> String {
        if !self.name_taken(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base} {n}"))
            .find(|candidate| !self.name_taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Add an unconfigured monitor under a fresh default name
    pub fn create_with_unique_name(&mut self) -> Result<&Monitor, ControlError> {
        let name = self.unique_name(DEFAULT_MONITOR_NAME);
        self.add(Monitor::placeholder(name))?;
        self.persist();
        let index = self.monitors.len() - 1;
        Ok(&self.monitors[index])
    }

    /// Apply a configuration to the monitor currently called `name`
    pub fn submit_config(&mut self, name: &str, config: &MonitorConfig) -> Result<&Monitor, ControlError> {
        let index = self.position(name)?;
        let taken: Vec<&str> = self
            .monitors
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, monitor)| monitor.unique_name())
            .collect();
        let mut updated = self.monitors[index].clone();
        updated.validate_and_apply_config(config, &taken, &self.history)?;
        self.monitors[index] = updated;

        self.refresh_health();
        self.persist();
        Ok(&self.monitors[index])
    }

    pub fn set_paused(&mut self, name: &str, paused: bool) -> Result<&Monitor, ControlError> {
        let index = self.position(name)?;
        self.monitors[index].set_paused(paused);
        self.refresh_health();
        self.persist();
        Ok(&self.monitors[index])
    }

    /// Execute one monitor immediately, whatever its schedule
    pub async fn force_execute(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<CheckResult, ControlError> {
        let index = self.position(name)?;
        let ctx = ExecutionContext {
            executor: &self.executor,
            history: &self.history,
            events: &self.events,
            stats_window_days: self.stats_window_days,
        };
        let result = self.monitors[index].execute(&ctx, now).await;

        self.refresh_health();
        self.persist();
        Ok(result)
    }

    /// Run every monitor that is due at `now`, in registry order.
    ///
    /// Returns how many executed. The registry is saved once if any did.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> usize {
        let mut executed = 0;

        for index in 0..self.monitors.len() {
            let ctx = ExecutionContext {
                executor: &self.executor,
                history: &self.history,
                events: &self.events,
                stats_window_days: self.stats_window_days,
            };
            if self.monitors[index].execute_if_due(&ctx, now).await.is_some() {
                executed += 1;
                self.refresh_health();
            }
        }

        if executed > 0 {
            debug!(executed, "Tick complete");
            self.persist();
        }
        executed
    }

    pub fn aggregate_health(&self) -> AggregateHealth {
        let mut some_invalid = false;
        for monitor in &self.monitors {
            match monitor.state() {
                MonitorState::Paused => {}
                MonitorState::Invalid => some_invalid = true,
                MonitorState::Active => {
                    if monitor.last_query_passed() == Some(false) {
                        return AggregateHealth::SomeDown;
                    }
                }
            }
        }
        if some_invalid { AggregateHealth::SomeInvalid } else { AggregateHealth::AllUp }
    }

    /// Recompute health and publish it when it changed
    fn refresh_health(&mut self) {
        let health = self.aggregate_health();
        if self.last_health != Some(health) {
            info!(health = %health, "Aggregate health changed");
            self.last_health = Some(health);
            self.events.publish(MonitorEvent::HealthChanged(health));
        }
    }

    /// Write the registry file (atomically, via a temporary file)
    pub fn save(&self) -> Result<(), PersistenceError> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(PersistenceError::io(parent))?;
        }

        let contents = serde_json::to_string_pretty(&RegistryFileRef { monitors: &self.monitors })?;
        let temporary = path.with_extension("json.tmp");
        fs::write(&temporary, contents).map_err(PersistenceError::io(&temporary))?;
        fs::rename(&temporary, path).map_err(PersistenceError::io(path))
    }

    /// Save, logging instead of failing; the in-memory registry stays authoritative
    fn persist(&self) {
        if let Err(e) = self.save() {
            error!(error = %e, "Failed to save monitors");
        }
    }
}

fn read_registry_file(path: &Path) -> Result<Option<Vec<Monitor>>, PersistenceError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistenceError::Io { path: path.to_path_buf(), source: e }),
    };

    let file: RegistryFile = serde_json::from_str(&contents)
        .map_err(|source| PersistenceError::Malformed { path: path.to_path_buf(), source })?;
    Ok(Some(file.monitors))
}

/// Keep the first monitor of every name
fn dedup_names(monitors: Vec<Monitor>) -> Vec<Monitor> {
    let mut kept: Vec<Monitor> = Vec::with_capacity(monitors.len());
    for monitor in monitors {
        if kept.iter().any(|other| names_collide(other.unique_name(), monitor.unique_name())) {
            warn!(monitor = %monitor.unique_name(), "Dropping monitor with duplicate name");
            continue;
        }
        kept.push(monitor);
    }
    kept
}

fn move_aside(path: &Path) {
    let mut aside = path.as_os_str().to_owned();
    aside.push(format!(".bad-{}", Utc::now().format("%Y%m%d%H%M%S")));
    let aside = PathBuf::from(aside);

    match fs::rename(path, &aside) {
        Ok(()) => warn!(path = %aside.display(), "Moved malformed registry file aside"),
        Err(e) => error!(error = %e, "Failed to move malformed registry file aside"),
    }
}
