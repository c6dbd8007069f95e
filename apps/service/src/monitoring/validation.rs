//! Field-level validation for monitor configurations.
//!
//! Monitor names double as history file names, so they must be usable as a
//! file name on every platform BUMP runs on (the Windows rules are the
//! strictest and are applied everywhere).

use url::Url;

use crate::error::ValidationError;

/// Longest accepted period, one year
pub const MAX_PERIOD_SECONDS: i64 = 365 * 24 * 3600;

/// Longest accepted request timeout, one hour
pub const MAX_TIMEOUT_SECONDS: f64 = 3600.0;

/// Most retries a monitor may make after a failed attempt
pub const MAX_RETRIES: i64 = 100;

/// Longest accepted pause between attempts, one hour
pub const MAX_RETRY_INTERVAL_SECONDS: f64 = 3600.0;

const MAX_NAME_BYTES: usize = 255;

const FORBIDDEN_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Validate HTTP/HTTPS URL endpoint
pub fn validate_http_endpoint(target: &str) -> Result<(), ValidationError> {
    if target.trim().is_empty() {
        return Err(ValidationError::InvalidUrl("URL cannot be empty".into()));
    }

    match Url::parse(target) {
        Ok(url) => {
            let scheme = url.scheme();
            if scheme != "http" && scheme != "https" {
                return Err(ValidationError::InvalidUrl(format!(
                    "Invalid scheme '{scheme}'. Must be http or https"
                )));
            }

            if url.host_str().is_none_or(str::is_empty) {
                return Err(ValidationError::InvalidUrl("URL must have a valid host".into()));
            }

            Ok(())
        }
        Err(e) => {
            if !target.contains("://") {
                Err(ValidationError::InvalidUrl(
                    "URL must include scheme (http:// or https://)".into(),
                ))
            } else {
                Err(ValidationError::InvalidUrl(format!("Invalid URL: {e}")))
            }
        }
    }
}

/// Validate a monitor name for use as a file name
pub fn validate_monitor_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let unsafe_name = |reason: &str| ValidationError::UnsafeName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.len() > MAX_NAME_BYTES {
        return Err(unsafe_name("too long"));
    }

    if let Some(c) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(unsafe_name(&format!("contains '{c}'")));
    }

    if name.chars().any(char::is_control) {
        return Err(unsafe_name("contains control characters"));
    }

    if name.ends_with('.') || name.ends_with(' ') {
        return Err(unsafe_name("ends with a dot or a space"));
    }

    let stem = name.split('.').next().unwrap_or(name).trim_end();
    if RESERVED_NAMES.iter().any(|reserved| reserved.eq_ignore_ascii_case(stem)) {
        return Err(unsafe_name("reserved by the operating system"));
    }

    Ok(())
}

/// Validate a check period
pub fn validate_period(period_seconds: i64) -> Result<(), ValidationError> {
    if !(1..=MAX_PERIOD_SECONDS).contains(&period_seconds) {
        return Err(ValidationError::InvalidPeriod {
            value: period_seconds,
            max: MAX_PERIOD_SECONDS,
        });
    }
    Ok(())
}

/// Validate a request timeout
pub fn validate_timeout(timeout_seconds: f64) -> Result<(), ValidationError> {
    if !timeout_seconds.is_finite()
        || timeout_seconds <= 0.0
        || timeout_seconds > MAX_TIMEOUT_SECONDS
    {
        return Err(ValidationError::InvalidTimeout(timeout_seconds));
    }
    Ok(())
}

/// Validate the retry policy fields
pub fn validate_retries(retries: i64, retry_interval_seconds: f64) -> Result<(), ValidationError> {
    if !(0..=MAX_RETRIES).contains(&retries) {
        return Err(ValidationError::InvalidRetries(retries));
    }
    if !retry_interval_seconds.is_finite()
        || !(0.0..=MAX_RETRY_INTERVAL_SECONDS).contains(&retry_interval_seconds)
    {
        return Err(ValidationError::InvalidRetryInterval(retry_interval_seconds));
    }
    Ok(())
}

/// Map a monitor name onto a string safe to use as a file stem.
///
/// Valid names come back unchanged.
pub fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if FORBIDDEN_NAME_CHARS.contains(&c) || c.is_control() { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_end_matches(['.', ' ']);

    if cleaned.is_empty() {
        return "_".to_string();
    }
    if validate_monitor_name(cleaned).is_err() {
        return format!("_{cleaned}");
    }
    cleaned.to_string()
}

/// Whether two monitor names would share a history file.
///
/// Names are compared by file stem and without regard to case, since the
/// history directory may live on a case-insensitive filesystem.
pub fn names_collide(a: &str, b: &str) -> bool {
    sanitize_file_stem(a).to_lowercase() == sanitize_file_stem(b).to_lowercase()
}
