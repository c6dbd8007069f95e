//! Test doubles shared by the monitoring tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;

use super::check::{
    Check, ContentCheck, HeaderCheck, HttpCheck, RegexCheck, RegexFlags, StatusCodeCheck,
};
use super::checker::{Checker, ProbeError, ProbeRequest, ProbeResponse};
use super::events::EventBus;
use super::executor::MonitoringExecutor;
use super::history::HistoryStore;
use super::monitor::Monitor;
use super::registry::Registry;
use super::render::{RenderError, Renderer};

/// Renderer that always returns the same document
pub struct StaticRenderer {
    html: String,
}

impl StaticRenderer {
    pub fn new(html: &str) -> Self {
        Self { html: html.to_string() }
    }
}

#[async_trait::async_trait]
impl Renderer for StaticRenderer {
    async fn render(&self, _url: &str, _timeout: Duration) -> Result<String, RenderError> {
        Ok(self.html.clone())
    }
}

pub type Outcome = Result<u16, ProbeError>;

/// Checker answering from a script of statuses; the last entry repeats
pub struct ScriptedChecker {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    calls: AtomicUsize,
}

impl ScriptedChecker {
    pub fn always(status: u16) -> Self {
        Self::sequence(vec![Ok(status)])
    }

    pub fn sequence(outcomes: Vec<Outcome>) -> Self {
        let fallback = outcomes.last().cloned().unwrap_or(Ok(200));
        Self { script: Mutex::new(outcomes.into()), fallback, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Checker for ScriptedChecker {
    async fn fetch(&self, _request: &ProbeRequest) -> Result<ProbeResponse, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().unwrap().pop_front().unwrap_or_else(|| self.fallback.clone());
        outcome.map(|status| ProbeResponse {
            status,
            reason: None,
            headers: HeaderMap::new(),
            body: Some(String::new()),
        })
    }

    async fn render(&self, _url: &str, _timeout: Duration) -> Result<String, ProbeError> {
        Err(ProbeError::Render("no renderer in scripted checker".into()))
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn http_monitor(name: &str, period_in_seconds: i64) -> Monitor {
    Monitor::new(
        name,
        Check::Http(HttpCheck { url: "https://example.com".into(), timeout_seconds: 5.0 }),
        period_in_seconds,
    )
}

/// In-memory registry (no registry file) with history under `data_dir`
pub fn registry_with(checker: Arc<ScriptedChecker>, data_dir: &Path) -> Registry {
    Registry::new(
        MonitoringExecutor::new(checker),
        HistoryStore::new(data_dir.join("history")),
        EventBus::default(),
    )
}

/// One check of every variant, regex flags set away from their defaults
pub fn every_check_variant() -> Vec<Check> {
    let url = "https://example.com/status".to_string();
    let flags = RegexFlags { multi_line: true, ignore_case: true, dot_all: false };
    vec![
        Check::Http(HttpCheck { url: url.clone(), timeout_seconds: 3.5 }),
        Check::StatusCode(StatusCodeCheck {
            url: url.clone(),
            timeout_seconds: 10.0,
            expected_status_code: 418,
        }),
        Check::Header(HeaderCheck {
            url: url.clone(),
            timeout_seconds: 10.0,
            header_key: "Server".into(),
            header_value: "nginx".into(),
        }),
        Check::Content(ContentCheck {
            url: url.clone(),
            timeout_seconds: 10.0,
            string_to_find: "All systems operational".into(),
        }),
        Check::Regex(RegexCheck {
            url: url.clone(),
            timeout_seconds: 10.0,
            pattern: "proj.*pew".into(),
            flags,
        }),
        Check::RenderedRegex(RegexCheck {
            url,
            timeout_seconds: 20.0,
            pattern: "^<div id=\"app\">".into(),
            flags: RegexFlags { dot_all: true, ..flags },
        }),
    ]
}
