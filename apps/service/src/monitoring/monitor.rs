//! A named monitor: one check, its schedule, retry policy and running state.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::check::{Check, CheckType, DEFAULT_TIMEOUT_SECONDS, HttpCheck, RegexFlags};
use super::events::{EventBus, MonitorEvent, StatusChange};
use super::executor::{MonitoringExecutor, RetryPolicy};
use super::history::HistoryStore;
use super::types::{CheckResult, MonitorStatus, exception};
use super::validation::{names_collide, validate_monitor_name, validate_period, validate_retries};
use crate::error::ValidationError;

/// Period used for scheduling when the configured one is unusable
pub const FALLBACK_PERIOD_SECONDS: i64 = 3600;

pub const DEFAULT_PERIOD_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Active,
    Paused,
    Invalid,
}

/// Flat, editable form of a monitor's configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub unique_name: String,
    pub url: String,
    pub check_type: String,
    /// Status code, `Key: Value` header, text or regex, depending on `check_type`
    #[serde(default)]
    pub check_params: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    #[serde(default = "default_period")]
    pub period_in_seconds: i64,
    #[serde(default)]
    pub retries: i64,
    #[serde(default)]
    pub retry_interval_in_seconds: f64,
    #[serde(default)]
    pub multi_line: bool,
    #[serde(default)]
    pub ignore_case: bool,
    #[serde(default)]
    pub dot_all: bool,
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_period() -> i64 {
    DEFAULT_PERIOD_SECONDS
}

impl MonitorConfig {
    fn flags(&self) -> RegexFlags {
        RegexFlags { multi_line: self.multi_line, ignore_case: self.ignore_case, dot_all: self.dot_all }
    }
}

/// Everything a monitor needs to execute and record a check
pub struct ExecutionContext<'a> {
    pub executor: &'a MonitoringExecutor,
    pub history: &'a HistoryStore,
    pub events: &'a EventBus,
    pub stats_window_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    unique_name: String,
    check: Check,
    period_in_seconds: i64,
    #[serde(default)]
    retries: i64,
    #[serde(default)]
    retry_interval_in_seconds: f64,
    #[serde(default)]
    paused: bool,
    #[serde(default)]
    last_query_passed: Option<bool>,
    #[serde(default)]
    time_at_last_status_change: Option<DateTime<Utc>>,
    #[serde(default)]
    avg_uptime: Option<f64>,
    #[serde(default)]
    avg_latency_ms: Option<f64>,
    /// `None` means due at the next tick
    #[serde(skip)]
    next_due: Option<DateTime<Utc>>,
}

impl Monitor {
    pub fn new(unique_name: impl Into<String>, check: Check, period_in_seconds: i64) -> Self {
        Self {
            unique_name: unique_name.into(),
            check,
            period_in_seconds,
            retries: 0,
            retry_interval_in_seconds: 0.0,
            paused: false,
            last_query_passed: None,
            time_at_last_status_change: None,
            avg_uptime: None,
            avg_latency_ms: None,
            next_due: None,
        }
    }

    /// A fresh monitor with no URL yet, invalid until configured
    pub fn placeholder(unique_name: impl Into<String>) -> Self {
        let check = Check::Http(HttpCheck { url: String::new(), timeout_seconds: DEFAULT_TIMEOUT_SECONDS });
        Self::new(unique_name, check, DEFAULT_PERIOD_SECONDS)
    }

    pub fn with_retries(mut self, retries: i64, retry_interval_in_seconds: f64) -> Self {
        self.retries = retries;
        self.retry_interval_in_seconds = retry_interval_in_seconds;
        self
    }

    /// Build a monitor from a submitted configuration, rejecting anything invalid.
    ///
    /// Name uniqueness is the registry's concern and is not checked here.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, ValidationError> {
        let unique_name = config.unique_name.trim();
        validate_monitor_name(unique_name)?;

        let check_type: CheckType = config.check_type.parse()?;
        let check = Check::from_parts(
            check_type,
            &config.url,
            config.timeout_seconds,
            &config.check_params,
            config.flags(),
        )?;
        check.validate()?;

        validate_period(config.period_in_seconds)?;
        validate_retries(config.retries, config.retry_interval_in_seconds)?;

        Ok(Self::new(unique_name, check, config.period_in_seconds)
            .with_retries(config.retries, config.retry_interval_in_seconds))
    }

    /// Current configuration in editable form
    pub fn config(&self) -> MonitorConfig {
        let flags = self.check.flags();
        MonitorConfig {
            unique_name: self.unique_name.clone(),
            url: self.check.url().to_string(),
            check_type: self.check.check_type().to_string(),
            check_params: self.check.params(),
            timeout_seconds: self.check.timeout_seconds(),
            period_in_seconds: self.period_in_seconds,
            retries: self.retries,
            retry_interval_in_seconds: self.retry_interval_in_seconds,
            multi_line: flags.multi_line,
            ignore_case: flags.ignore_case,
            dot_all: flags.dot_all,
        }
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn check(&self) -> &Check {
        &self.check
    }

    pub fn period_in_seconds(&self) -> i64 {
        self.period_in_seconds
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn last_query_passed(&self) -> Option<bool> {
        self.last_query_passed
    }

    pub fn time_at_last_status_change(&self) -> Option<DateTime<Utc>> {
        self.time_at_last_status_change
    }

    pub fn avg_uptime(&self) -> Option<f64> {
        self.avg_uptime
    }

    pub fn avg_latency_ms(&self) -> Option<f64> {
        self.avg_latency_ms
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.next_due
    }

    /// Validate the whole configuration as it stands
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_monitor_name(&self.unique_name)?;
        self.check.validate()?;
        validate_period(self.period_in_seconds)?;
        validate_retries(self.retries, self.retry_interval_in_seconds)
    }

    pub fn state(&self) -> MonitorState {
        if self.paused {
            MonitorState::Paused
        } else if self.validate().is_err() {
            MonitorState::Invalid
        } else {
            MonitorState::Active
        }
    }

    pub fn status(&self) -> MonitorStatus {
        match (self.state(), self.last_query_passed) {
            (MonitorState::Paused, _) => MonitorStatus::Paused,
            (MonitorState::Invalid, _) => MonitorStatus::Invalid,
            (MonitorState::Active, Some(true)) => MonitorStatus::Up,
            (MonitorState::Active, Some(false)) => MonitorStatus::Down,
            (MonitorState::Active, None) => MonitorStatus::Unknown,
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            info!(monitor = %self.unique_name, paused, "Monitor pause state changed");
        }
        self.paused = paused;
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due.is_none_or(|due| now >= due)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: u32::try_from(self.retries).unwrap_or(0),
            interval: Duration::try_from_secs_f64(self.retry_interval_in_seconds)
                .unwrap_or_default(),
        }
    }

    fn schedule_next(&mut self, now: DateTime<Utc>) {
        let period = if self.period_in_seconds > 0 {
            self.period_in_seconds
        } else {
            FALLBACK_PERIOD_SECONDS
        };
        let period = TimeDelta::try_seconds(period)
            .unwrap_or(TimeDelta::seconds(FALLBACK_PERIOD_SECONDS));
        self.next_due = Some(now.checked_add_signed(period).unwrap_or(DateTime::<Utc>::MAX_UTC));
    }

    /// Execute the check now, regardless of schedule.
    ///
    /// Paused and invalid monitors produce a synthetic failed result that is
    /// neither recorded nor allowed to change state.
    pub async fn execute(&mut self, ctx: &ExecutionContext<'_>, now: DateTime<Utc>) -> CheckResult {
        self.schedule_next(now);

        match self.state() {
            MonitorState::Paused => {
                debug!(monitor = %self.unique_name, "Skipping paused monitor");
                return CheckResult::skipped(now, exception::PAUSED, "Monitor is paused");
            }
            MonitorState::Invalid => {
                let reason = self
                    .validate()
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Invalid configuration".to_string());
                debug!(monitor = %self.unique_name, reason = %reason, "Skipping invalid monitor");
                return CheckResult::skipped(now, exception::INVALID_CONFIGURATION, reason);
            }
            MonitorState::Active => {}
        }

        let result = ctx.executor.execute_with_retries(&self.check, self.retry_policy()).await;
        self.record(ctx, &result, now);
        result
    }

    /// Execute if the schedule says so
    pub async fn execute_if_due(
        &mut self,
        ctx: &ExecutionContext<'_>,
        now: DateTime<Utc>,
    ) -> Option<CheckResult> {
        if !self.is_due(now) {
            return None;
        }
        Some(self.execute(ctx, now).await)
    }

    fn record(&mut self, ctx: &ExecutionContext<'_>, result: &CheckResult, now: DateTime<Utc>) {
        match self.last_query_passed {
            None => {
                info!(monitor = %self.unique_name, passed = result.passed, "First result recorded");
                self.last_query_passed = Some(result.passed);
                self.time_at_last_status_change = Some(now);
            }
            Some(previous) if previous == result.passed => {}
            Some(_) => {
                if result.passed {
                    info!(monitor = %self.unique_name, "Monitor is back up");
                } else {
                    warn!(
                        monitor = %self.unique_name,
                        reason = result.reason.as_deref().unwrap_or_default(),
                        "Monitor went down"
                    );
                }
                self.last_query_passed = Some(result.passed);
                self.time_at_last_status_change = Some(now);
                ctx.events.publish(MonitorEvent::StatusChanged(StatusChange {
                    monitor: self.unique_name.clone(),
                    url: self.check.url().to_string(),
                    passed: result.passed,
                    result: result.clone(),
                }));
            }
        }

        if let Err(e) = ctx.history.append(&self.unique_name, result) {
            error!(monitor = %self.unique_name, error = %e, "Failed to record result");
        }

        self.refresh_averages(ctx.history, ctx.stats_window_days, now);

        ctx.events.publish(MonitorEvent::ResultRecorded {
            monitor: self.unique_name.clone(),
            result: result.clone(),
        });
    }

    fn window_entries(
        &self,
        history: &HistoryStore,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Option<Vec<CheckResult>> {
        let window = TimeDelta::try_days(window_days).unwrap_or(TimeDelta::MAX);
        let cutoff = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        match history.read_since(&self.unique_name, cutoff) {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!(monitor = %self.unique_name, error = %e, "Failed to read history");
                None
            }
        }
    }

    fn refresh_averages(&mut self, history: &HistoryStore, window_days: i64, now: DateTime<Utc>) {
        if let Some(entries) = self.window_entries(history, window_days, now) {
            self.apply_averages(&entries);
        }
    }

    fn apply_averages(&mut self, entries: &[CheckResult]) {
        if entries.is_empty() {
            self.avg_uptime = None;
            self.avg_latency_ms = None;
            return;
        }

        let count = entries.len() as f64;
        let passed = entries.iter().filter(|entry| entry.passed).count() as f64;
        let latency: f64 =
            entries.iter().map(|entry| entry.latency().num_milliseconds() as f64).sum();

        self.avg_uptime = Some(passed / count);
        self.avg_latency_ms = Some(latency / count);
    }

    /// Recompute averages and the start of the current pass/fail streak from
    /// the trailing `window_days` of history
    pub fn recalculate_stats(&mut self, history: &HistoryStore, window_days: i64, now: DateTime<Utc>) {
        let Some(entries) = self.window_entries(history, window_days, now) else {
            return;
        };
        self.apply_averages(&entries);

        self.last_query_passed = self.last_query_passed.or(entries.last().map(|entry| entry.passed));

        let streak_start = self.last_query_passed.and_then(|current| {
            let start = entries
                .iter()
                .rposition(|entry| entry.passed != current)
                .map_or(0, |index| index + 1);
            entries.get(start).map(|entry| entry.end_time)
        });
        self.time_at_last_status_change = Some(streak_start.unwrap_or(now));
    }

    /// Validate `config` and, if acceptable, make it this monitor's configuration.
    ///
    /// `taken_names` are the names of every other monitor in the registry. On
    /// rejection nothing changes. A rename carries the history file along.
    pub fn validate_and_apply_config(
        &mut self,
        config: &MonitorConfig,
        taken_names: &[&str],
        history: &HistoryStore,
    ) -> Result<(), ValidationError> {
        let candidate = Monitor::from_config(config)?;

        if candidate.unique_name != self.unique_name
            && taken_names.iter().any(|taken| names_collide(taken, &candidate.unique_name))
        {
            return Err(ValidationError::DuplicateName(candidate.unique_name));
        }

        if candidate.unique_name != self.unique_name {
            if let Err(e) = history.rename(&self.unique_name, &candidate.unique_name) {
                error!(
                    from = %self.unique_name,
                    to = %candidate.unique_name,
                    error = %e,
                    "Failed to move history file"
                );
            }
            info!(from = %self.unique_name, to = %candidate.unique_name, "Monitor renamed");
        }

        if candidate.period_in_seconds != self.period_in_seconds {
            self.next_due = None;
        }

        self.unique_name = candidate.unique_name;
        self.check = candidate.check;
        self.period_in_seconds = candidate.period_in_seconds;
        self.retries = candidate.retries;
        self.retry_interval_in_seconds = candidate.retry_interval_in_seconds;

        Ok(())
    }
}
