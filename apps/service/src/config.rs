use std::{env, fmt, fs, io, path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    ReadFailed {
        path: path::PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write config file {}: {source}", .path.display())]
    WriteFailed {
        path: path::PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    ParseFailed {
        path: path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("No configuration directory available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub storage: StorageConfig,
    pub alerts: AlertsConfig,
    pub http: HttpConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Scheduler resolution in seconds
    pub interval: u64,
    /// DEBUG, INFO, WARNING or ERROR
    pub log_level: String,
    /// Directory for rolling log files; console only when unset
    pub log_dir: Option<path::PathBuf>,
    /// Trailing window for uptime and latency averages
    pub stats_window_days: i64,
    /// Create the default monitors when no registry file exists
    pub bootstrap_defaults: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds `monitors.json` and the `history/` directory
    pub data_dir: path::PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub use_toast: bool,
    pub use_email: bool,
    pub use_sms: bool,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Browser executable; searched for when unset
    pub chrome_path: Option<path::PathBuf>,
    /// Milliseconds page scripts may run before the DOM is captured
    pub settle_ms: u64,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/bump/config.toml or
/// $HOME/.config/...)
pub fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("bump/config.toml"))
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            interval: 1,
            log_level: "INFO".into(),
            log_dir: None,
            stats_window_days: 7,
            bootstrap_defaults: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: "data".into() }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { use_toast: true, use_email: false, use_sms: false, webhook_url: None }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { user_agent: concat!("BUMP/", env!("CARGO_PKG_VERSION")).into() }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { chrome_path: None, settle_ms: 2000 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            storage: StorageConfig::default(),
            alerts: AlertsConfig::default(),
            http: HttpConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };
        let optional_path = |value: &Option<path::PathBuf>| {
            value.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none)".into())
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "General")?;
        write_1(f, "Scheduler Interval (s)", &self.general.interval)?;
        write_1(f, "Log Level", &self.general.log_level)?;
        write_1(f, "Log Directory", &optional_path(&self.general.log_dir))?;
        write_1(f, "Stats Window (days)", &self.general.stats_window_days)?;
        write_1(f, "Bootstrap Defaults", &self.general.bootstrap_defaults)?;
        write_title_1(f, "Storage")?;
        write_1(f, "Data Directory", &self.storage.data_dir.display())?;
        write_title_1(f, "Alerts")?;
        write_1(f, "Toast", &self.alerts.use_toast)?;
        write_1(f, "Email", &self.alerts.use_email)?;
        write_1(f, "SMS", &self.alerts.use_sms)?;
        write_1(f, "Webhook", &self.alerts.webhook_url.as_deref().unwrap_or("(none)"))?;
        write_title_1(f, "HTTP")?;
        write_1(f, "User Agent", &self.http.user_agent)?;
        write_title_1(f, "Render")?;
        write_1(f, "Browser", &optional_path(&self.render.chrome_path))?;
        write_1(f, "Settle Time (ms)", &self.render.settle_ms)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/bump/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// use bump_service::config::Config;
    ///
    /// let cfg = Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), bump_service::config::ConfigError>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(|source| {
                ConfigError::ReadFailed { path: config_path.clone(), source }
            })?;
            toml::from_str(raw_string.as_str())
                .map_err(|source| ConfigError::ParseFailed { path: config_path, source })
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        let write_failed =
            |source| ConfigError::WriteFailed { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        fs::write(path, config_str).map_err(write_failed)
    }

    pub fn registry_path(&self) -> path::PathBuf {
        self.storage.data_dir.join("monitors.json")
    }

    pub fn history_dir(&self) -> path::PathBuf {
        self.storage.data_dir.join("history")
    }

    /// Lock file marking the data directory as in use
    pub fn lock_path(&self) -> path::PathBuf {
        self.storage.data_dir.join(crate::lock::LOCK_FILE_NAME)
    }

    /// How often the scheduler wakes up
    pub fn resolution(&self) -> Duration {
        Duration::from_secs(self.general.interval.max(1))
    }

    /// The configured level, INFO when the name is not recognized
    pub fn log_level(&self) -> LevelFilter {
        Self::parse_log_level(&self.general.log_level).unwrap_or(LevelFilter::INFO)
    }

    /// Map a level name, accepting WARNING as well as WARN
    pub fn parse_log_level(name: &str) -> Option<LevelFilter> {
        match name.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Some(LevelFilter::TRACE),
            "DEBUG" => Some(LevelFilter::DEBUG),
            "INFO" => Some(LevelFilter::INFO),
            "WARN" | "WARNING" => Some(LevelFilter::WARN),
            "ERROR" | "CRITICAL" => Some(LevelFilter::ERROR),
            "OFF" => Some(LevelFilter::OFF),
            _ => None,
        }
    }
}
