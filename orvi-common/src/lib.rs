//! Common types shared across the Orvi crates.
//!
//! This crate holds the settings sections every other crate reads (engine
//! tuning, browser launch, capacity, captcha provider, artifact locations)
//! and the observability helpers used by binaries and integration tests.
//! It has no knowledge of how settings are loaded; see `orvi-config` for the
//! YAML/environment loader.
//!
//! # Overview
//!
//! - [`EngineSettings`]: retry budget, backoff curve, and wait timeouts
//! - [`CapacitySettings`]: concurrent browser session cap and overflow policy
//! - [`BrowserSettings`]: WebDriver endpoint and launch arguments
//! - [`CaptchaSettings`]: captcha provider wiring
//! - [`observability`]: centralised tracing/logging initialisation
//!
//! # Examples
//!
//! ```rust
//! use orvi_common::{CapacityPolicy, EngineSettings};
//! use std::time::Duration;
//!
//! let engine = EngineSettings::default();
//! assert_eq!(engine.retry_limit, 3);
//! assert_eq!(engine.initial_backoff(), Duration::from_millis(500));
//! assert_eq!(orvi_common::CapacitySettings::default().policy, CapacityPolicy::Reject);
//! ```
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod observability;

/// Tuning knobs for the step interpreter and sequence runner.
///
/// Every duration is stored in milliseconds (or seconds where the field name
/// says so) to keep the YAML readable; use the accessor methods to obtain
/// [`Duration`] values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Attempts per step before a `StepExecutionError` is raised.
    pub retry_limit: u32,
    /// Backoff before the second attempt.
    pub initial_backoff_ms: u64,
    /// Growth factor applied to the backoff after every failed attempt.
    pub backoff_multiplier: f64,
    /// Upper bound for a single backoff pause.
    pub max_backoff_ms: u64,
    /// Element wait used when a step does not carry its own `timeout`.
    pub default_timeout_ms: u64,
    /// Page-load wait used by `navigate` when the step has no `timeout`.
    pub navigation_timeout_ms: u64,
    /// Element wait used for steps flagged `optional`.
    pub optional_timeout_ms: u64,
    /// Bound on the best-effort final screenshot.
    pub screenshot_timeout_ms: u64,
    /// Hard ceiling on a whole execution.
    pub run_timeout_secs: u64,
    /// Page region holding the coordinate challenge when a `dynamic_input`
    /// step does not name one.
    pub challenge_selector: String,
    /// Candidates clicked, in order, to clear an overlay between attempts.
    pub modal_dismiss_selectors: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 8_000,
            default_timeout_ms: 5_000,
            navigation_timeout_ms: 30_000,
            optional_timeout_ms: 2_000,
            screenshot_timeout_ms: 10_000,
            run_timeout_secs: 300,
            challenge_selector: "p-inputgroup-addon".to_string(),
            modal_dismiss_selectors: vec![
                "button:has-text('Entendido')".to_string(),
                "button[aria-label='Close']".to_string(),
                ".modal .close".to_string(),
            ],
        }
    }
}

impl EngineSettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn optional_timeout(&self) -> Duration {
        Duration::from_millis(self.optional_timeout_ms)
    }

    pub fn screenshot_timeout(&self) -> Duration {
        Duration::from_millis(self.screenshot_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

/// What to do with a request that arrives while every session is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityPolicy {
    /// Fail immediately with a capacity error.
    Reject,
    /// Wait up to `queue_timeout_ms` for a session, then fail.
    Queue,
}

/// Global cap on concurrently provisioned browser sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacitySettings {
    pub max_sessions: usize,
    pub policy: CapacityPolicy,
    pub queue_timeout_ms: u64,
}

impl Default for CapacitySettings {
    fn default() -> Self {
        Self {
            max_sessions: 1,
            policy: CapacityPolicy::Reject,
            queue_timeout_ms: 30_000,
        }
    }
}

impl CapacitySettings {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }
}

/// How browser sessions are launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// WebDriver endpoint (chromedriver by default).
    pub webdriver_url: String,
    pub headless: bool,
    pub window_size: (u32, u32),
    pub lang: String,
    /// Appended verbatim to the Chrome command line.
    pub extra_args: Vec<String>,
    /// Base delay between typed characters.
    pub key_delay_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: false,
            window_size: (1920, 1080),
            lang: "es-DO".to_string(),
            extra_args: Vec::new(),
            key_delay_ms: 50,
        }
    }
}

/// Supported captcha providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptchaProvider {
    AntiCaptcha,
    Disabled,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaSettings {
    pub provider: CaptchaProvider,
    /// Provider key; falls back to `ANTICAPTCHA_API_KEY` at startup.
    pub api_key: Option<String>,
    pub endpoint: String,
    pub poll_interval_ms: u64,
    /// Bound on a single solve, distinct from page-wait timeouts.
    pub timeout_ms: u64,
}

impl Default for CaptchaSettings {
    fn default() -> Self {
        Self {
            provider: CaptchaProvider::AntiCaptcha,
            api_key: None,
            endpoint: "https://api.anti-captcha.com/".to_string(),
            poll_interval_ms: 3_000,
            timeout_ms: 120_000,
        }
    }
}

impl std::fmt::Debug for CaptchaSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptchaSettings")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl CaptchaSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where diagnostic artifacts are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    pub screenshot_dir: PathBuf,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            screenshot_dir: PathBuf::from("screenshots"),
        }
    }
}

/// HTTP front-end settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Tokio worker threads; `None` lets the runtime pick.
    pub worker_threads: Option<usize>,
    /// How long in-flight runs get to wind down after a shutdown signal.
    pub shutdown_grace_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            worker_threads: None,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl ServerSettings {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Logging section of the configuration file; turned into an
/// [`observability::LogConfig`] by the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: Option<PathBuf>,
    pub format: observability::LogFormat,
    pub stderr: bool,
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: None,
            format: observability::LogFormat::Text,
            stderr: true,
            filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_engine_section_keeps_defaults() {
        let engine: EngineSettings =
            serde_json::from_str(r#"{"retry_limit": 5, "initial_backoff_ms": 100}"#).unwrap();
        assert_eq!(engine.retry_limit, 5);
        assert_eq!(engine.initial_backoff(), Duration::from_millis(100));
        assert_eq!(engine.default_timeout(), Duration::from_secs(5));
        assert!(!engine.modal_dismiss_selectors.is_empty());
    }

    #[test]
    fn capacity_policy_is_lowercase_on_the_wire() {
        let cap: CapacitySettings =
            serde_json::from_str(r#"{"max_sessions": 4, "policy": "queue"}"#).unwrap();
        assert_eq!(cap.max_sessions, 4);
        assert_eq!(cap.policy, CapacityPolicy::Queue);
    }

    #[test]
    fn captcha_debug_hides_key() {
        let settings = CaptchaSettings {
            api_key: Some("super-secret".into()),
            ..CaptchaSettings::default()
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
