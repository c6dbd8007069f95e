use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Exception kinds recorded on failed results.
pub mod exception {
    pub const INVALID_CONFIGURATION: &str = "Invalid Configuration";
    pub const PAUSED: &str = "Paused";
    pub const TIMEOUT: &str = "Timeout";
    pub const CONNECTION: &str = "ConnectionError";
    pub const REQUEST: &str = "RequestError";
    pub const BODY: &str = "BodyError";
    pub const HTTP_STATUS: &str = "HttpError";
    pub const RENDER: &str = "RenderError";
    pub const PANIC: &str = "Panic";
}

/// Status of a monitor as shown to the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Paused,
    Invalid,
    Unknown,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
            MonitorStatus::Paused => write!(f, "paused"),
            MonitorStatus::Invalid => write!(f, "invalid"),
            MonitorStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Registry-wide health summary.
///
/// Paused monitors never contribute. A down monitor outranks an invalid one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateHealth {
    AllUp,
    SomeDown,
    SomeInvalid,
}

impl fmt::Display for AggregateHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateHealth::AllUp => write!(f, "all monitors up"),
            AggregateHealth::SomeDown => write!(f, "some monitors down"),
            AggregateHealth::SomeInvalid => write!(f, "some monitors invalid"),
        }
    }
}

/// Outcome of one check execution, as stored in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// When the (last) attempt started
    pub start_time: DateTime<Utc>,

    /// When the (last) attempt finished
    pub end_time: DateTime<Utc>,

    /// Whether the check passed
    pub passed: bool,

    /// Attempts made, including the first
    pub attempts: u32,

    /// HTTP status code, when a response was received
    #[serde(default)]
    pub status_code: Option<u16>,

    /// Status text or other short description of the response
    #[serde(default)]
    pub message: Option<String>,

    /// Why the check failed
    #[serde(default)]
    pub reason: Option<String>,

    /// Kind of error that caused the failure, see [`exception`]
    #[serde(default)]
    pub exception_type: Option<String>,
}

impl CheckResult {
    /// Start a result for an attempt beginning at `start_time`
    pub fn started(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: start_time,
            passed: false,
            attempts: 1,
            status_code: None,
            message: None,
            reason: None,
            exception_type: None,
        }
    }

    /// Synthetic failed result for a check that was never attempted
    pub fn skipped(now: DateTime<Utc>, exception_type: &str, reason: impl Into<String>) -> Self {
        let mut result = Self::started(now);
        result.attempts = 0;
        result.reason = Some(reason.into());
        result.exception_type = Some(exception_type.to_string());
        result
    }

    /// Record the response status
    pub fn with_status(mut self, status_code: u16, message: Option<String>) -> Self {
        self.status_code = Some(status_code);
        self.message = message;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Mark the check as passed
    pub fn success(mut self) -> Self {
        self.passed = true;
        self.end_time = Utc::now();
        self
    }

    /// Mark the check as failed on a verdict, without an error
    pub fn failure(mut self, reason: impl Into<String>) -> Self {
        self.passed = false;
        self.end_time = Utc::now();
        self.reason = Some(reason.into());
        self
    }

    /// Mark the check as failed because of an error
    pub fn error(self, exception_type: &str, reason: impl Into<String>) -> Self {
        let mut result = self.failure(reason);
        result.exception_type = Some(exception_type.to_string());
        result
    }

    pub fn latency(&self) -> TimeDelta {
        self.end_time - self.start_time
    }

    /// Serialize as a single history line (no trailing newline)
    pub fn to_record(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_record(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "PASSED" } else { "FAILED" };
        write!(
            f,
            "[{}] {verdict} in {}ms",
            self.end_time.format("%Y-%m-%d %H:%M:%S"),
            self.latency().num_milliseconds()
        )?;
        if let Some(code) = self.status_code {
            write!(f, " (status {code})")?;
        }
        if self.attempts > 1 {
            write!(f, " after {} attempts", self.attempts)?;
        }
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        if let Some(kind) = &self.exception_type {
            write!(f, " [{kind}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_preserves_every_field() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut result = CheckResult::started(start)
            .with_status(503, Some("Service Unavailable".into()))
            .error(exception::HTTP_STATUS, "Expected status 200, got 503")
            .with_attempts(3);
        result.end_time = start + TimeDelta::milliseconds(250);

        let line = result.to_record().unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(CheckResult::from_record(&line).unwrap(), result);
    }

    #[test]
    fn test_latency() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut result = CheckResult::started(start).success();
        result.end_time = start + TimeDelta::milliseconds(1500);

        assert_eq!(result.latency().num_milliseconds(), 1500);
    }

    #[test]
    fn test_skipped_result_is_a_failure() {
        let result = CheckResult::skipped(Utc::now(), exception::PAUSED, "Monitor is paused");

        assert!(!result.passed);
        assert_eq!(result.attempts, 0);
        assert_eq!(result.exception_type.as_deref(), Some("Paused"));
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let line = r#"{"start_time":"2024-03-01T12:00:00Z","end_time":"2024-03-01T12:00:01Z","passed":true,"attempts":1}"#;
        let result = CheckResult::from_record(line).unwrap();

        assert!(result.passed);
        assert_eq!(result.status_code, None);
        assert_eq!(result.reason, None);
    }
}
