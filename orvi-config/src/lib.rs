//! Loader for service configuration with YAML + environment overlays.
//!
//! Sources are merged in order: the YAML file (if any), inline YAML snippets,
//! then `ORVI_`-prefixed environment variables using `__` as the section
//! separator (`ORVI_ENGINE__RETRY_LIMIT=5`). After merging, `${VAR}`
//! placeholders anywhere in string values are expanded from the process
//! environment, so secrets can stay out of the file:
//!
//! ```yaml
//! captcha:
//!   api_key: "${ANTICAPTCHA_API_KEY}"
//! credentials:
//!   BHD_USER: "${BANK_USER}"
//! ```
//!
//! Every section is optional; an empty document yields the defaults from
//! `orvi-common`.
use config::{Config, Environment, File};
use orvi_common::{
    ArtifactSettings, BrowserSettings, CapacitySettings, CaptchaSettings, EngineSettings,
    LoggingSettings, ServerSettings,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "ORVI";
const CAPTCHA_KEY_ENV: &str = "ANTICAPTCHA_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("configuration schema error: {0}")]
    Schema(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("coordinate file {path} is invalid: {reason}")]
    Coordinates { path: PathBuf, reason: String },
}

/// Fully merged service configuration.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct OrviConfig {
    pub version: Option<String>,
    pub server: ServerSettings,
    pub browser: BrowserSettings,
    pub engine: EngineSettings,
    pub capacity: CapacitySettings,
    pub captcha: CaptchaSettings,
    pub artifacts: ArtifactSettings,
    pub logging: LoggingSettings,
    /// JSON file holding the coordinate card, used when a request omits
    /// `coordinates`.
    pub coordinates_file: Option<PathBuf>,
    /// Named secrets resolvable from step data as `env:NAME`; they overlay
    /// the process environment snapshot taken at startup.
    pub credentials: BTreeMap<String, String>,
}

impl std::fmt::Debug for OrviConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrviConfig")
            .field("version", &self.version)
            .field("server", &self.server)
            .field("browser", &self.browser)
            .field("engine", &self.engine)
            .field("capacity", &self.capacity)
            .field("captcha", &self.captcha)
            .field("artifacts", &self.artifacts)
            .field("logging", &self.logging)
            .field("coordinates_file", &self.coordinates_file)
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) if s.contains('$') => {
            let mut cur = std::mem::take(s);
            for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                let expanded = shellexpand::env(&cur)
                    .map(|cow| cow.into_owned())
                    .unwrap_or_else(|_| cur.clone());
                if expanded == cur {
                    break;
                }
                cur = expanded;
            }
            *s = cur;
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder around the `config` crate wiring (YAML + env overrides).
pub struct OrviConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env_prefix: &'static str,
}

impl Default for OrviConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl OrviConfigLoader {
    /// ```
    /// use orvi_config::OrviConfigLoader;
    ///
    /// let cfg = OrviConfigLoader::new()
    ///     .with_yaml_str("engine:\n  retry_limit: 4\n")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(cfg.engine.retry_limit, 4);
    /// assert_eq!(cfg.capacity.max_sessions, 1);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env_prefix: ENV_PREFIX,
        }
    }

    /// Attach a YAML/TOML/JSON file that must exist; format is inferred from
    /// the suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, for deployments configured purely
    /// through the environment.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet (tests, CLI overrides).
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and produce the typed configuration.
    ///
    /// Environment variables are added last so they win over files. A
    /// missing captcha key is taken from `ANTICAPTCHA_API_KEY`.
    pub fn load(self) -> Result<OrviConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(self.env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let mut typed: OrviConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Schema(e.to_string()))?;

        if typed.captcha.api_key.as_deref().is_none_or(str::is_empty) {
            typed.captcha.api_key = std::env::var(CAPTCHA_KEY_ENV).ok().filter(|k| !k.is_empty());
        }

        tracing::debug!(
            target: "config",
            retry_limit = typed.engine.retry_limit,
            max_sessions = typed.capacity.max_sessions,
            has_captcha_key = typed.captcha.api_key.is_some(),
            credentials = typed.credentials.len(),
            "configuration loaded"
        );
        Ok(typed)
    }
}

/// Read a coordinate card from a JSON object of `code -> value`.
///
/// Values may be strings or numbers; anything else is rejected. Codes are
/// returned as written; normalisation happens when the engine builds its
/// lookup table.
pub fn load_coordinates_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: Value = serde_json::from_str(&raw).map_err(|e| ConfigError::Coordinates {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let Value::Object(entries) = parsed else {
        return Err(ConfigError::Coordinates {
            path: path.to_path_buf(),
            reason: "expected a JSON object of code -> value".into(),
        });
    };

    entries
        .into_iter()
        .map(|(code, value)| match value {
            Value::String(s) => Ok((code, s)),
            Value::Number(n) => Ok((code, n.to_string())),
            other => Err(ConfigError::Coordinates {
                path: path.to_path_buf(),
                reason: format!("value for '{code}' must be a string, got {other}"),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("BANK_USER", Some("alice"), || {
            let mut v = json!("user=${BANK_USER}");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("user=alice"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars(
            [("BANK_HOST", Some("bank.example")), ("BANK_PATH", Some("login"))],
            || {
                let mut v = json!([
                    "https://$BANK_HOST",
                    { "url": "https://${BANK_HOST}/${BANK_PATH}" },
                    3,
                    false,
                    null
                ]);
                expand_env_in_value(&mut v);
                assert_eq!(
                    v,
                    json!([
                        "https://bank.example",
                        { "url": "https://bank.example/login" },
                        3,
                        false,
                        null
                    ])
                );
            },
        );
    }

    #[test]
    fn expansion_follows_chained_variables() {
        temp_env::with_vars(
            [
                ("INNER", Some("9012")),
                ("MIDDLE", Some("pin-${INNER}")),
                ("OUTER", Some("[${MIDDLE}]")),
            ],
            || {
                let mut v = json!("value=${OUTER}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("value=[pin-9012]"));
            },
        );
    }

    #[test]
    fn cyclic_variables_terminate() {
        temp_env::with_vars([("LOOP_A", Some("${LOOP_B}")), ("LOOP_B", Some("${LOOP_A}"))], || {
            let mut v = json!("x=${LOOP_A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("key=${ORVI_TEST_DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("key=${ORVI_TEST_DOES_NOT_EXIST}"));
    }

    #[test]
    fn debug_output_lists_credential_names_only() {
        let mut cfg = OrviConfig::default();
        cfg.credentials.insert("BHD_PASS".into(), "hunter2".into());
        let rendered = format!("{cfg:?}");
        assert!(rendered.contains("BHD_PASS"));
        assert!(!rendered.contains("hunter2"));
    }
}
