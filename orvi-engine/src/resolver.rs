//! Dynamic value resolution.
//!
//! Coordinate challenges are resolved against a per-request [`CoordinateMap`];
//! `env:` references against the [`Credentials`] snapshot taken at startup.
//! Both hold secrets, so their `Debug` output lists sizes or names only.
use crate::model::DataRef;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

const MAX_CODE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("malformed challenge code {0:?}")]
    MalformedCode(String),

    #[error("code `{0}` is not in the coordinate map")]
    MissingCoordinate(String),

    #[error("coordinate codes {0:?} collide after normalisation")]
    DuplicateCode(String),

    #[error("credential `{0}` is not set")]
    MissingCredential(String),
}

/// Normalise a challenge code: strip whitespace, upper-case, and drop leading
/// zeros from purely numeric codes.
///
/// ```
/// use orvi_engine::resolver::normalize_code;
///
/// assert_eq!(normalize_code(" h3 ").unwrap(), "H3");
/// assert_eq!(normalize_code("07").unwrap(), "7");
/// assert!(normalize_code("H-3").is_err());
/// ```
pub fn normalize_code(raw: &str) -> Result<String, ResolveError> {
    let code: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if code.is_empty()
        || code.len() > MAX_CODE_LEN
        || !code.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ResolveError::MalformedCode(raw.to_string()));
    }
    if code.chars().all(|c| c.is_ascii_digit()) {
        let trimmed = code.trim_start_matches('0');
        return Ok(if trimmed.is_empty() { "0" } else { trimmed }.to_string());
    }
    Ok(code)
}

fn code_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z]{0,2}\d{1,3}").ok())
        .as_ref()
}

/// Pull a coordinate code out of on-page challenge text.
///
/// A single-word text wins when it is a valid code; otherwise the last
/// letter/digit token (`"Coordenada B07"` gives `B07`, `"Clave 07"` gives `7`).
pub fn extract_code(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if !trimmed.contains(char::is_whitespace) {
        if let Ok(code) = normalize_code(trimmed) {
            return Some(code);
        }
    }
    code_re()?
        .find_iter(trimmed)
        .last()
        .and_then(|m| normalize_code(m.as_str()).ok())
}

/// Challenge code to secret value. Keys are normalised and unique.
#[derive(Clone, Default)]
pub struct CoordinateMap {
    entries: BTreeMap<String, String>,
}

impl CoordinateMap {
    pub fn new<I, K, V>(raw: I) -> Result<Self, ResolveError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut entries = BTreeMap::new();
        for (key, value) in raw {
            let code = normalize_code(key.as_ref())?;
            if entries.insert(code, value.into()).is_some() {
                return Err(ResolveError::DuplicateCode(key.as_ref().to_string()));
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact match on the normalised code.
    pub fn lookup(&self, code: &str) -> Result<&str, ResolveError> {
        let code = normalize_code(code)?;
        self.entries
            .get(&code)
            .map(String::as_str)
            .ok_or(ResolveError::MissingCoordinate(code))
    }
}

impl std::fmt::Debug for CoordinateMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateMap")
            .field("codes", &self.entries.len())
            .finish()
    }
}

/// Read-only credential snapshot. Names are matched case-insensitively.
#[derive(Clone, Default)]
pub struct Credentials {
    values: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_uppercase(), v.into()))
                .collect(),
        }
    }

    /// Snapshot the process environment.
    pub fn from_env() -> Self {
        Self::new(std::env::vars())
    }

    /// Overlay `overrides` (later wins).
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (k, v) in overrides {
            self.values.insert(k.as_ref().to_ascii_uppercase(), v.into());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_ascii_uppercase())
            .map(String::as_str)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("names", &self.values.len())
            .finish()
    }
}

/// Pure lookup over one run's read-only inputs.
#[derive(Debug, Clone, Copy)]
pub struct DynamicValueResolver<'a> {
    coordinates: &'a CoordinateMap,
    credentials: &'a Credentials,
}

impl<'a> DynamicValueResolver<'a> {
    pub fn new(coordinates: &'a CoordinateMap, credentials: &'a Credentials) -> Self {
        Self {
            coordinates,
            credentials,
        }
    }

    pub fn coordinate(&self, code: &str) -> Result<&'a str, ResolveError> {
        self.coordinates.lookup(code)
    }

    pub fn resolve<'s>(&self, data: &'s DataRef) -> Result<&'s str, ResolveError>
    where
        'a: 's,
    {
        match data {
            DataRef::Literal(value) => Ok(value),
            DataRef::Env(name) => self
                .credentials
                .get(name)
                .ok_or_else(|| ResolveError::MissingCredential(name.clone())),
            DataRef::Coordinate(code) => self.coordinate(code),
        }
    }
}
