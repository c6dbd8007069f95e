//! Headless-browser rendering for checks that match against the live DOM.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No Chrome or Chromium executable found")]
    BrowserNotFound,

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Rendering timed out after {0:?}")]
    Timeout(Duration),

    #[error("Browser exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Loads a page, lets its scripts run and returns the resulting DOM as HTML.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str, timeout: Duration) -> Result<String, RenderError>;
}

/// Renders with a headless Chrome/Chromium process per request.
///
/// Every render gets a fresh throwaway profile directory, so no state leaks
/// between renders and an aborted render leaves nothing behind.
pub struct ChromeRenderer {
    chrome_path: Option<PathBuf>,
    settle: Duration,
}

impl ChromeRenderer {
    /// `chrome_path` of `None` searches the usual install locations.
    /// `settle` is how long page scripts get to run before the DOM is dumped.
    pub fn new(chrome_path: Option<PathBuf>, settle: Duration) -> Self {
        Self { chrome_path, settle }
    }

    /// Find Chrome executable path.
    pub fn find_chrome() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        let paths: &[&str] = &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ];

        #[cfg(target_os = "linux")]
        let paths: &[&str] = &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ];

        #[cfg(target_os = "windows")]
        let paths: &[&str] = &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];

        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        let paths: &[&str] = &[];

        paths.iter().map(PathBuf::from).find(|path| path.exists())
    }
}

#[async_trait::async_trait]
impl Renderer for ChromeRenderer {
    async fn render(&self, url: &str, limit: Duration) -> Result<String, RenderError> {
        let chrome = self
            .chrome_path
            .clone()
            .or_else(Self::find_chrome)
            .ok_or(RenderError::BrowserNotFound)?;

        let profile = tempfile::tempdir().map_err(|e| RenderError::Launch(e.to_string()))?;

        let mut command = Command::new(&chrome);
        command
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--mute-audio")
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .arg(format!("--virtual-time-budget={}", self.settle.as_millis()))
            .arg("--dump-dom")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(browser = %chrome.display(), url, "Rendering page");

        let child = command.spawn().map_err(|e| RenderError::Launch(e.to_string()))?;

        // Dropping the child on timeout kills the browser.
        let output = timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout(limit))?
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
