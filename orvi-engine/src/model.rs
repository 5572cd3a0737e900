//! Wire definitions and their typed, validated form.
//!
//! [`SequenceDef`] / [`StepDef`] mirror the JSON accepted by `POST /execute`.
//! [`compile`] turns them into [`Sequence`] / [`Step`], where each action
//! carries exactly the fields it needs. Anything missing or unknown is a
//! [`ConfigurationError`], so a bad request never reaches a browser.
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    pub action: String,
    #[serde(default)]
    pub element: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub target_element: Option<String>,
    /// Milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Seconds to settle after the step succeeds.
    #[serde(default)]
    pub wait_after: Option<f64>,
    #[serde(default)]
    pub optional: bool,
    /// Accepted for compatibility; coordinates come from the request or the
    /// configured coordinate file.
    #[serde(default)]
    pub lookup_source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceDef {
    pub title: String,
    pub steps: Vec<StepDef>,
    #[serde(default)]
    pub intents_number: Option<u32>,
    #[serde(default)]
    pub target_element: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub target_element_wait: Option<f64>,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct ExecutionRequest {
    pub sequences: Vec<SequenceDef>,
    /// Falls back to the configured coordinate file when absent.
    #[serde(default)]
    pub coordinates: Option<BTreeMap<String, String>>,
    /// Caller deadline for the whole run, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl std::fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("sequences", &self.sequences.len())
            .field("coordinates", &self.coordinates.as_ref().map(|c| c.len()))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Where an `input` value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRef {
    Literal(String),
    /// `env:NAME`, looked up in the startup credential snapshot.
    Env(String),
    /// `coord:CODE`, looked up in the coordinate map.
    Coordinate(String),
}

impl DataRef {
    pub fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix("env:") {
            DataRef::Env(name.trim().to_string())
        } else if let Some(code) = raw.strip_prefix("coord:") {
            DataRef::Coordinate(code.trim().to_string())
        } else {
            DataRef::Literal(raw.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Navigate { url: String },
    Input { element: String, value: DataRef },
    Click { element: String },
    /// Wait for `target`, or only pause for `wait_after` when there is none.
    Wait { target: Option<String> },
    /// Read the challenge code from `challenge` (or the configured region),
    /// look it up and type the value into `element`.
    DynamicInput {
        element: String,
        challenge: Option<String>,
    },
    /// Screenshot `image`, solve it and type the answer into `input`.
    SolveCaptcha { image: String, input: String },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Navigate { .. } => "navigate",
            Action::Input { .. } => "input",
            Action::Click { .. } => "click",
            Action::Wait { .. } => "wait",
            Action::DynamicInput { .. } => "dynamic_input",
            Action::SolveCaptcha { .. } => "solve_captcha",
        }
    }

    /// Selector the action interacts with, if any.
    pub fn element(&self) -> Option<&str> {
        match self {
            Action::Input { element, .. }
            | Action::Click { element }
            | Action::DynamicInput { element, .. } => Some(element),
            Action::SolveCaptcha { input, .. } => Some(input),
            Action::Wait { target } => target.as_deref(),
            Action::Navigate { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub index: usize,
    pub action: Action,
    /// Post-condition checked after every action except navigate and wait.
    pub target: Option<String>,
    pub timeout: Option<Duration>,
    pub wait_after: Duration,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub index: usize,
    pub title: String,
    pub steps: Vec<Step>,
    /// Whole-sequence attempt budget.
    pub intents: u32,
    pub target: Option<String>,
    /// `None` falls back to the engine's default step timeout.
    pub target_wait: Option<Duration>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn seconds(location: &str, field: &str, value: Option<f64>) -> Result<Duration, ConfigurationError> {
    let secs = value.unwrap_or(0.0);
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigurationError::Invalid {
            location: location.to_string(),
            reason: format!("`{field}` must be a non-negative number of seconds"),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigurationError::Invalid {
        location: location.to_string(),
        reason: format!("`{field}` of {secs} seconds is out of range"),
    })
}

fn compile_step(seq: usize, index: usize, def: &StepDef) -> Result<Step, ConfigurationError> {
    let location = format!("sequence {seq} step {index}");
    let require = |value: &Option<String>, action: &'static str, field: &'static str| {
        non_empty(value)
            .map(str::to_string)
            .ok_or_else(|| ConfigurationError::MissingField {
                location: location.clone(),
                action,
                field,
            })
    };

    let action = match def.action.trim().to_ascii_lowercase().as_str() {
        "navigate" | "browse" => {
            let url = require(&def.data, "navigate", "data")?;
            url::Url::parse(&url).map_err(|e| ConfigurationError::Invalid {
                location: location.clone(),
                reason: format!("`data` is not an absolute URL: {e}"),
            })?;
            Action::Navigate { url }
        }
        "input" => Action::Input {
            element: require(&def.element, "input", "element")?,
            value: DataRef::parse(def.data.as_deref().ok_or_else(|| {
                ConfigurationError::MissingField {
                    location: location.clone(),
                    action: "input",
                    field: "data",
                }
            })?),
        },
        "click" => Action::Click {
            element: require(&def.element, "click", "element")?,
        },
        "wait" => {
            let target = non_empty(&def.target_element)
                .or_else(|| non_empty(&def.element))
                .map(str::to_string);
            if target.is_none() && def.wait_after.unwrap_or(0.0) <= 0.0 {
                return Err(ConfigurationError::MissingField {
                    location,
                    action: "wait",
                    field: "target_element",
                });
            }
            Action::Wait { target }
        }
        "dynamic_input" => Action::DynamicInput {
            element: require(&def.element, "dynamic_input", "element")?,
            challenge: non_empty(&def.data).map(str::to_string),
        },
        "solve_captcha" | "captcha" => Action::SolveCaptcha {
            image: require(&def.data, "solve_captcha", "data")?,
            input: require(&def.element, "solve_captcha", "element")?,
        },
        other => {
            return Err(ConfigurationError::UnknownAction {
                location,
                action: other.to_string(),
            });
        }
    };

    // `wait` already waits for its own target.
    let target = match action {
        Action::Wait { .. } => None,
        _ => non_empty(&def.target_element).map(str::to_string),
    };

    Ok(Step {
        index,
        action,
        target,
        timeout: def.timeout.map(Duration::from_millis),
        wait_after: seconds(&location, "wait_after", def.wait_after)?,
        optional: def.optional,
    })
}

/// Validate and type every sequence. Fails on the first bad definition.
pub fn compile(defs: &[SequenceDef]) -> Result<Vec<Sequence>, ConfigurationError> {
    if defs.is_empty() {
        return Err(ConfigurationError::NoSequences);
    }
    defs.iter()
        .enumerate()
        .map(|(seq, def)| {
            let location = format!("sequence {seq} ({})", def.title);
            let steps = def
                .steps
                .iter()
                .enumerate()
                .map(|(index, step)| compile_step(seq, index, step))
                .collect::<Result<Vec<_>, _>>()?;
            let intents = def.intents_number.unwrap_or(1);
            if intents == 0 {
                return Err(ConfigurationError::Invalid {
                    location,
                    reason: "`intents_number` must be at least 1".into(),
                });
            }
            Ok(Sequence {
                index: seq,
                title: def.title.clone(),
                steps,
                intents,
                target: non_empty(&def.target_element).map(str::to_string),
                target_wait: def
                    .target_element_wait
                    .map(|secs| seconds(&location, "target_element_wait", Some(secs)))
                    .transpose()?,
            })
        })
        .collect()
}
