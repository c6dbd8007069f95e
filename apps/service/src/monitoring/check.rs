//! The check variants a monitor can run and how each one judges a response.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use regex::{Regex, RegexBuilder};
use reqwest::header::HeaderName;
use serde::{Deserialize, Serialize};

use super::checker::{Checker, ProbeError, ProbeRequest, ProbeResponse};
use super::types::{CheckResult, exception};
use super::validation::{validate_http_endpoint, validate_timeout};
use crate::error::ValidationError;

pub const DEFAULT_TIMEOUT_SECONDS: f64 = 10.0;

/// Reason recorded when a regex check finds no match
pub const REGEX_MISMATCH: &str = "Did not match regex pattern";

/// Names of the check variants, as used in configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Http,
    StatusCode,
    Header,
    Content,
    Regex,
    RenderedRegex,
}

impl CheckType {
    pub const ALL: [CheckType; 6] = [
        CheckType::Http,
        CheckType::StatusCode,
        CheckType::Header,
        CheckType::Content,
        CheckType::Regex,
        CheckType::RenderedRegex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::Http => "http",
            CheckType::StatusCode => "status_code",
            CheckType::Header => "header",
            CheckType::Content => "content",
            CheckType::Regex => "regex",
            CheckType::RenderedRegex => "rendered_regex",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CheckType::ALL
            .into_iter()
            .find(|check_type| check_type.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ValidationError::UnknownCheckType(wanted.to_string()))
    }
}

/// Plain reachability: HEAD request, passes on 200
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpCheck {
    pub url: String,
    pub timeout_seconds: f64,
}

/// Passes when the response status equals `expected_status_code`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCodeCheck {
    pub url: String,
    pub timeout_seconds: f64,
    pub expected_status_code: u16,
}

/// Passes when a response header has exactly the expected value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderCheck {
    pub url: String,
    pub timeout_seconds: f64,
    pub header_key: String,
    pub header_value: String,
}

/// Passes when the body of a 200 response contains a substring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentCheck {
    pub url: String,
    pub timeout_seconds: f64,
    pub string_to_find: String,
}

/// Passes when a regex matches the page, raw or rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexCheck {
    pub url: String,
    pub timeout_seconds: f64,
    pub pattern: String,
    #[serde(default)]
    pub flags: RegexFlags,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexFlags {
    #[serde(default)]
    pub multi_line: bool,
    #[serde(default)]
    pub ignore_case: bool,
    #[serde(default)]
    pub dot_all: bool,
}

impl RegexCheck {
    pub fn compile(&self) -> Result<Regex, ValidationError> {
        if self.pattern.is_empty() {
            return Err(ValidationError::InvalidPattern("pattern cannot be empty".into()));
        }
        RegexBuilder::new(&self.pattern)
            .multi_line(self.flags.multi_line)
            .case_insensitive(self.flags.ignore_case)
            .dot_matches_new_line(self.flags.dot_all)
            .build()
            .map_err(|e| ValidationError::InvalidPattern(e.to_string()))
    }
}

/// A check definition, tagged by `type` when serialized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Check {
    Http(HttpCheck),
    StatusCode(StatusCodeCheck),
    Header(HeaderCheck),
    Content(ContentCheck),
    Regex(RegexCheck),
    RenderedRegex(RegexCheck),
}

impl Check {
    /// Build a check from the flat fields of a submitted configuration.
    ///
    /// `params` carries the variant-specific value: the expected status code,
    /// `Key: Value` for headers, the text to find, or the regex pattern.
    pub fn from_parts(
        check_type: CheckType,
        url: &str,
        timeout_seconds: f64,
        params: &str,
        flags: RegexFlags,
    ) -> Result<Self, ValidationError> {
        let url = url.trim().to_string();

        let check = match check_type {
            CheckType::Http => Check::Http(HttpCheck { url, timeout_seconds }),
            CheckType::StatusCode => {
                let expected_status_code = params.trim().parse().map_err(|_| {
                    ValidationError::InvalidParameters(format!(
                        "expected status code must be a number, got '{}'",
                        params.trim()
                    ))
                })?;
                Check::StatusCode(StatusCodeCheck { url, timeout_seconds, expected_status_code })
            }
            CheckType::Header => {
                let (key, value) = params.split_once(':').ok_or_else(|| {
                    ValidationError::InvalidParameters(
                        "header check expects 'Key: Value'".to_string(),
                    )
                })?;
                Check::Header(HeaderCheck {
                    url,
                    timeout_seconds,
                    header_key: key.trim().to_string(),
                    header_value: value.trim().to_string(),
                })
            }
            CheckType::Content => Check::Content(ContentCheck {
                url,
                timeout_seconds,
                string_to_find: params.to_string(),
            }),
            CheckType::Regex => {
                Check::Regex(RegexCheck { url, timeout_seconds, pattern: params.to_string(), flags })
            }
            CheckType::RenderedRegex => Check::RenderedRegex(RegexCheck {
                url,
                timeout_seconds,
                pattern: params.to_string(),
                flags,
            }),
        };

        Ok(check)
    }

    pub fn check_type(&self) -> CheckType {
        match self {
            Check::Http(_) => CheckType::Http,
            Check::StatusCode(_) => CheckType::StatusCode,
            Check::Header(_) => CheckType::Header,
            Check::Content(_) => CheckType::Content,
            Check::Regex(_) => CheckType::Regex,
            Check::RenderedRegex(_) => CheckType::RenderedRegex,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Check::Http(c) => &c.url,
            Check::StatusCode(c) => &c.url,
            Check::Header(c) => &c.url,
            Check::Content(c) => &c.url,
            Check::Regex(c) | Check::RenderedRegex(c) => &c.url,
        }
    }

    pub fn timeout_seconds(&self) -> f64 {
        match self {
            Check::Http(c) => c.timeout_seconds,
            Check::StatusCode(c) => c.timeout_seconds,
            Check::Header(c) => c.timeout_seconds,
            Check::Content(c) => c.timeout_seconds,
            Check::Regex(c) | Check::RenderedRegex(c) => c.timeout_seconds,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds()).unwrap_or_default()
    }

    /// The variant-specific parameter, in the form accepted by [`Check::from_parts`]
    pub fn params(&self) -> String {
        match self {
            Check::Http(_) => String::new(),
            Check::StatusCode(c) => c.expected_status_code.to_string(),
            Check::Header(c) => format!("{}: {}", c.header_key, c.header_value),
            Check::Content(c) => c.string_to_find.clone(),
            Check::Regex(c) | Check::RenderedRegex(c) => c.pattern.clone(),
        }
    }

    pub fn flags(&self) -> RegexFlags {
        match self {
            Check::Regex(c) | Check::RenderedRegex(c) => c.flags,
            _ => RegexFlags::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_http_endpoint(self.url())?;
        validate_timeout(self.timeout_seconds())?;

        match self {
            Check::Http(_) => Ok(()),
            Check::StatusCode(c) => {
                if !(100..=599).contains(&c.expected_status_code) {
                    return Err(ValidationError::InvalidParameters(format!(
                        "expected status code must be between 100 and 599, got {}",
                        c.expected_status_code
                    )));
                }
                Ok(())
            }
            Check::Header(c) => {
                if c.header_key.is_empty() {
                    return Err(ValidationError::InvalidParameters(
                        "header key cannot be empty".to_string(),
                    ));
                }
                HeaderName::from_bytes(c.header_key.as_bytes()).map_err(|_| {
                    ValidationError::InvalidParameters(format!(
                        "'{}' is not a valid header name",
                        c.header_key
                    ))
                })?;
                Ok(())
            }
            Check::Content(c) => {
                if c.string_to_find.is_empty() {
                    return Err(ValidationError::InvalidParameters(
                        "text to find cannot be empty".to_string(),
                    ));
                }
                Ok(())
            }
            Check::Regex(c) | Check::RenderedRegex(c) => c.compile().map(|_| ()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Run the check once.
    ///
    /// Never fails: transport errors and invalid definitions come back as a
    /// failed result carrying the exception kind.
    pub async fn execute(&self, checker: &dyn Checker) -> CheckResult {
        let started = CheckResult::started(Utc::now());

        if let Err(error) = self.validate() {
            return started.error(exception::INVALID_CONFIGURATION, error.to_string());
        }

        match self {
            Check::Http(c) => {
                let outcome = checker.fetch(&ProbeRequest::head(&c.url, self.timeout())).await;
                judge(started, outcome, |response| expect_status(response, 200))
            }
            Check::StatusCode(c) => {
                let outcome = checker.fetch(&ProbeRequest::get(&c.url, self.timeout())).await;
                judge(started, outcome, |response| expect_status(response, c.expected_status_code))
            }
            Check::Header(c) => {
                let outcome = checker.fetch(&ProbeRequest::get(&c.url, self.timeout())).await;
                judge(started, outcome, |response| {
                    match response.headers.get(c.header_key.as_str()) {
                        None => Err(format!("Header '{}' not present", c.header_key)),
                        Some(value) if value.to_str().ok() == Some(c.header_value.as_str()) => {
                            Ok(())
                        }
                        Some(value) => Err(format!(
                            "Header '{}' was '{}', expected '{}'",
                            c.header_key,
                            String::from_utf8_lossy(value.as_bytes()),
                            c.header_value
                        )),
                    }
                })
            }
            Check::Content(c) => {
                let outcome =
                    checker.fetch(&ProbeRequest::get(&c.url, self.timeout()).with_body()).await;
                judge(started, outcome, |response| {
                    expect_status(response, 200)?;
                    if body_of(response).contains(&c.string_to_find) {
                        Ok(())
                    } else {
                        Err(format!("Text '{}' not found in response", c.string_to_find))
                    }
                })
            }
            Check::Regex(c) => {
                let regex = match c.compile() {
                    Ok(regex) => regex,
                    Err(error) => {
                        return started.error(exception::INVALID_CONFIGURATION, error.to_string());
                    }
                };
                let outcome =
                    checker.fetch(&ProbeRequest::get(&c.url, self.timeout()).with_body()).await;
                judge(started, outcome, |response| {
                    expect_status(response, 200)?;
                    if regex.is_match(body_of(response)) {
                        Ok(())
                    } else {
                        Err(REGEX_MISMATCH.to_string())
                    }
                })
            }
            Check::RenderedRegex(c) => {
                let regex = match c.compile() {
                    Ok(regex) => regex,
                    Err(error) => {
                        return started.error(exception::INVALID_CONFIGURATION, error.to_string());
                    }
                };
                match checker.render(&c.url, self.timeout()).await {
                    Ok(html) if regex.is_match(&html) => started.success(),
                    Ok(_) => started.failure(REGEX_MISMATCH),
                    Err(error) => started.error(error.exception_type(), error.to_string()),
                }
            }
        }
    }
}

fn body_of(response: &ProbeResponse) -> &str {
    response.body.as_deref().unwrap_or_default()
}

fn expect_status(response: &ProbeResponse, expected: u16) -> Result<(), String> {
    if response.status == expected {
        return Ok(());
    }
    match &response.reason {
        Some(reason) => Err(format!("Expected status {expected}, got {} {reason}", response.status)),
        None => Err(format!("Expected status {expected}, got {}", response.status)),
    }
}

/// Turn a transport outcome and a verdict into a result.
///
/// A failed verdict on a non-2xx response is recorded as an HTTP error.
fn judge(
    started: CheckResult,
    outcome: Result<ProbeResponse, ProbeError>,
    verdict: impl FnOnce(&ProbeResponse) -> Result<(), String>,
) -> CheckResult {
    let response = match outcome {
        Ok(response) => response,
        Err(error) => return started.error(error.exception_type(), error.to_string()),
    };

    let result = started.with_status(response.status, response.reason.clone());
    match verdict(&response) {
        Ok(()) => result.success(),
        Err(reason) if !(200..300).contains(&response.status) => {
            result.error(exception::HTTP_STATUS, reason)
        }
        Err(reason) => result.failure(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::checker::HttpChecker;
    use crate::monitoring::testing::{StaticRenderer, every_check_variant};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn checker_rendering(html: &str) -> HttpChecker {
        HttpChecker::new("bump-tests", Arc::new(StaticRenderer::new(html))).unwrap()
    }

    fn checker() -> HttpChecker {
        checker_rendering("<html></html>")
    }

    fn regex(url: &str, pattern: &str) -> Check {
        Check::Regex(RegexCheck {
            url: url.to_string(),
            timeout_seconds: 5.0,
            pattern: pattern.to_string(),
            flags: RegexFlags::default(),
        })
    }

    #[test]
    fn test_serialized_form_is_tagged() {
        let check = Check::Header(HeaderCheck {
            url: "https://example.com".into(),
            timeout_seconds: 10.0,
            header_key: "Server".into(),
            header_value: "nginx".into(),
        });

        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["type"], "header");
        assert_eq!(json["header_key"], "Server");
        assert_eq!(serde_json::from_value::<Check>(json).unwrap(), check);
    }

    #[test]
    fn test_every_variant_survives_serialization() {
        let checks = every_check_variant();
        let kinds: Vec<CheckType> = checks.iter().map(Check::check_type).collect();
        assert_eq!(kinds, CheckType::ALL);

        for check in checks {
            let json = serde_json::to_string(&check).unwrap();
            let value: serde_json::Value = serde_json::from_str(&json).unwrap();
            assert_eq!(value["type"], check.check_type().as_str(), "{json}");

            let restored: Check = serde_json::from_str(&json).unwrap();
            assert_eq!(restored, check, "{json}");
            assert_eq!(restored.check_type(), check.check_type());
            assert_eq!(restored.flags(), check.flags());
        }
    }

    #[test]
    fn test_regex_flags_default_when_absent() {
        let json = r#"{"type":"regex","url":"https://github.com","timeout_seconds":10.0,"pattern":"proj.*pew"}"#;
        let check: Check = serde_json::from_str(json).unwrap();

        assert_eq!(check.flags(), RegexFlags::default());
        assert_eq!(check.params(), "proj.*pew");
    }

    #[test]
    fn test_check_type_parsing() {
        assert_eq!("rendered_regex".parse::<CheckType>().unwrap(), CheckType::RenderedRegex);
        assert_eq!(" HTTP ".parse::<CheckType>().unwrap(), CheckType::Http);
        assert!("ping".parse::<CheckType>().is_err());
    }

    #[test]
    fn test_from_parts_parses_params() {
        let check = Check::from_parts(
            CheckType::Header,
            " https://example.com ",
            5.0,
            "Content-Type: text/html; charset=utf-8",
            RegexFlags::default(),
        )
        .unwrap();

        match &check {
            Check::Header(c) => {
                assert_eq!(c.url, "https://example.com");
                assert_eq!(c.header_key, "Content-Type");
                assert_eq!(c.header_value, "text/html; charset=utf-8");
            }
            other => panic!("unexpected check {other:?}"),
        }
        assert_eq!(check.params(), "Content-Type: text/html; charset=utf-8");

        assert!(
            Check::from_parts(CheckType::StatusCode, "https://x.io", 5.0, "abc", RegexFlags::default())
                .is_err()
        );
        assert!(
            Check::from_parts(CheckType::Header, "https://x.io", 5.0, "no colon", RegexFlags::default())
                .is_err()
        );
    }

    #[test]
    fn test_validation() {
        assert!(regex("https://example.com", "proj.*pew").is_valid());
        assert!(!regex("https://example.com", "(unclosed").is_valid());
        assert!(!regex("https://example.com", "").is_valid());
        assert!(!regex("", "ok").is_valid());
        assert!(!Check::Http(HttpCheck { url: "https://a.io".into(), timeout_seconds: 0.0 }).is_valid());
        assert!(
            !Check::StatusCode(StatusCodeCheck {
                url: "https://a.io".into(),
                timeout_seconds: 1.0,
                expected_status_code: 42,
            })
            .is_valid()
        );
        assert!(
            !Check::Content(ContentCheck {
                url: "https://a.io".into(),
                timeout_seconds: 1.0,
                string_to_find: String::new(),
            })
            .is_valid()
        );
    }

    #[tokio::test]
    async fn test_invalid_check_fails_without_a_request() {
        let result = regex("", "ok").execute(&checker()).await;

        assert!(!result.passed);
        assert_eq!(result.exception_type.as_deref(), Some(exception::INVALID_CONFIGURATION));
    }

    #[tokio::test]
    async fn test_http_check_uses_head_and_requires_200() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/up"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/moved"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let up = Check::Http(HttpCheck { url: format!("{}/up", server.uri()), timeout_seconds: 5.0 });
        let result = up.execute(&checker()).await;
        assert!(result.passed);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.message.as_deref(), Some("OK"));

        let moved =
            Check::Http(HttpCheck { url: format!("{}/moved", server.uri()), timeout_seconds: 5.0 });
        let result = moved.execute(&checker()).await;
        assert!(!result.passed);
        assert_eq!(result.exception_type, None);
    }

    #[tokio::test]
    async fn test_server_error_is_an_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let check = Check::Http(HttpCheck { url: server.uri(), timeout_seconds: 5.0 });
        let result = check.execute(&checker()).await;

        assert!(!result.passed);
        assert_eq!(result.status_code, Some(500));
        assert_eq!(result.exception_type.as_deref(), Some(exception::HTTP_STATUS));
        assert!(result.reason.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_status_code_check_matches_expected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let expect_404 = Check::StatusCode(StatusCodeCheck {
            url: server.uri(),
            timeout_seconds: 5.0,
            expected_status_code: 404,
        });
        assert!(expect_404.execute(&checker()).await.passed);

        let expect_200 = Check::StatusCode(StatusCodeCheck {
            url: server.uri(),
            timeout_seconds: 5.0,
            expected_status_code: 200,
        });
        assert!(!expect_200.execute(&checker()).await.passed);
    }

    #[tokio::test]
    async fn test_header_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).insert_header("server", "nginx"))
            .mount(&server)
            .await;

        let header = |value: &str| {
            Check::Header(HeaderCheck {
                url: server.uri(),
                timeout_seconds: 5.0,
                header_key: "Server".into(),
                header_value: value.into(),
            })
        };

        assert!(header("nginx").execute(&checker()).await.passed);

        let result = header("apache").execute(&checker()).await;
        assert!(!result.passed);
        assert!(result.reason.unwrap().contains("nginx"));
    }

    #[tokio::test]
    async fn test_content_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Welcome back</h1>"))
            .mount(&server)
            .await;

        let content = |text: &str| {
            Check::Content(ContentCheck {
                url: server.uri(),
                timeout_seconds: 5.0,
                string_to_find: text.into(),
            })
        };

        assert!(content("Welcome").execute(&checker()).await.passed);
        assert!(!content("Goodbye").execute(&checker()).await.passed);
    }

    #[tokio::test]
    async fn test_regex_check_matches_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repo"))
            .respond_with(ResponseTemplate::new(200).set_body_string("... p3-project-pew-pew ..."))
            .mount(&server)
            .await;

        let url = format!("{}/repo", server.uri());

        let result = regex(&url, "proj.*pew").execute(&checker()).await;
        assert!(result.passed);

        let result = regex(&url, "^nothing here$").execute(&checker()).await;
        assert!(!result.passed);
        assert_eq!(result.reason.as_deref(), Some(REGEX_MISMATCH));
        assert_eq!(result.exception_type, None);
    }

    #[tokio::test]
    async fn test_regex_flags_apply() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("first line\nSECOND line"))
            .mount(&server)
            .await;

        let mut check = RegexCheck {
            url: server.uri(),
            timeout_seconds: 5.0,
            pattern: "line.second".into(),
            flags: RegexFlags::default(),
        };
        assert!(!Check::Regex(check.clone()).execute(&checker()).await.passed);

        check.flags = RegexFlags { multi_line: false, ignore_case: true, dot_all: true };
        assert!(Check::Regex(check).execute(&checker()).await.passed);
    }

    #[tokio::test]
    async fn test_rendered_regex_matches_rendered_dom() {
        let checker = checker_rendering("<div id=\"app\">Loaded by script</div>");
        let check = |pattern: &str| {
            Check::RenderedRegex(RegexCheck {
                url: "https://spa.example.com".into(),
                timeout_seconds: 5.0,
                pattern: pattern.into(),
                flags: RegexFlags::default(),
            })
        };

        assert!(check("Loaded by \\w+").execute(&checker).await.passed);

        let result = check("Not rendered").execute(&checker).await;
        assert!(!result.passed);
        assert_eq!(result.reason.as_deref(), Some(REGEX_MISMATCH));
    }
}
