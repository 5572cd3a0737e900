//! Minimal JSON HTTP client with safe logging and retries.
//!
//! - Request options: timeout, retries
//! - Never logs secret values: sensitive headers and sensitive JSON body
//!   fields (`clientKey`, `api_key`, ...) are redacted
//! - Retries network failures, 429 and 5xx with exponential backoff and
//!   `Retry-After` support
//! - Optional raw request/response logging via `ORVI_HTTP_RAW=1`
//!
//! ```no_run
//! # async fn demo() -> Result<(), orvi_http::HttpError> {
//! let client = orvi_http::HttpClient::new("https://api.example.com/")?;
//! let got: serde_json::Value = client
//!     .post_json("createTask", &serde_json::json!({"clientKey": "k"}), orvi_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use uuid::Uuid;

const RAW_ENV: &str = "ORVI_HTTP_RAW";
const RAW_MAX_BODY: usize = 16 * 1024;
const SNIPPET_MAX: usize = 500;
const BASE_BACKOFF_MS: u64 = 200;

/// JSON fields and query keys whose values are never written to logs.
const SECRET_KEYS: &[&str] = &[
    "clientkey",
    "client_key",
    "api_key",
    "apikey",
    "key",
    "token",
    "secret",
    "password",
    "authorization",
];

fn raw_enabled() -> bool {
    matches!(
        std::env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn is_secret_key(key: &str) -> bool {
    SECRET_KEYS.contains(&key.to_ascii_lowercase().as_str())
}

/// Replace secret-looking fields in a JSON document with `<redacted>`.
fn redact_json(v: &mut Value) {
    match v {
        Value::Object(map) => {
            for (k, val) in map.iter_mut() {
                if is_secret_key(k) {
                    *val = Value::String("<redacted>".into());
                } else {
                    redact_json(val);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_json),
        _ => {}
    }
}

/// Render a body for logs: JSON bodies are redacted, other bytes are
/// summarised by length.
fn loggable_body(bytes: &[u8], limit: usize) -> String {
    let mut text = match serde_json::from_slice::<Value>(bytes) {
        Ok(mut v) => {
            redact_json(&mut v);
            v.to_string()
        }
        Err(_) => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => return format!("<{} binary bytes>", bytes.len()),
        },
    };
    if text.len() > limit {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let val = if is_secret_key(&key) || key.eq_ignore_ascii_case("x-api-key") {
                "<redacted>".to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}")]
    Api { status: StatusCode, message: String },
}

impl HttpError {
    /// True for failures a caller may reasonably retry later.
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Network(_) => true,
            HttpError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}

/// Per-request tuning knobs.
///
/// ```
/// use orvi_http::RequestOpts;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     retries: Some(0),
///     ..Default::default()
/// };
/// assert_eq!(opts.retries, Some(0));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestOpts {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
}

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

impl HttpClient {
    /// Construct a client anchored to a base URL. Relative paths are joined
    /// onto it, so the base should end with `/`.
    ///
    /// ```
    /// use orvi_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com/")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 2);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: Duration::from_secs(15),
            max_retries: 2,
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    /// POST JSON with per-request options.
    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(Method::POST, path, Some(body), opts)
            .await
    }

    async fn request_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        opts: RequestOpts,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self
            .base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))?;
        let body_bytes = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let req_id = Uuid::new_v4().simple().to_string();

        let mut attempt = 0usize;
        loop {
            let mut rb = self
                .inner
                .request(method.clone(), url.clone())
                .timeout(timeout);
            if let Some(bytes) = &body_bytes {
                rb = rb
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(bytes.clone());
            }

            tracing::debug!(
                req_id = %req_id,
                attempt = attempt + 1,
                max_retries,
                method = %method,
                host_path = %format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
                timeout_ms = timeout.as_millis() as u64,
                "http.request.start"
            );
            if raw_enabled() {
                let body = body_bytes
                    .as_deref()
                    .map(|b| loggable_body(b, RAW_MAX_BODY))
                    .unwrap_or_default();
                tracing::debug!(target: "http.raw", %req_id, %method, url = %url, %body, "request");
            }

            let t0 = std::time::Instant::now();
            let outcome = match rb.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let headers = resp.headers().clone();
                    resp.bytes()
                        .await
                        .map(|bytes| (status, headers, bytes))
                        .map_err(|e| e.to_string())
                }
                Err(err) => Err(err.to_string()),
            };

            let (status, headers, bytes) = match outcome {
                Ok(parts) => parts,
                Err(message) if attempt < max_retries => {
                    attempt += 1;
                    let delay = backoff_for(attempt);
                    tracing::warn!(
                        req_id = %req_id,
                        attempt,
                        max_retries,
                        backoff_ms = delay.as_millis() as u64,
                        message = %message,
                        "http.retrying.network"
                    );
                    sleep(delay).await;
                    continue;
                }
                Err(message) => {
                    tracing::warn!(req_id = %req_id, attempt, message = %message, "http.network_error");
                    return Err(HttpError::Network(message));
                }
            };

            let duration_ms = t0.elapsed().as_millis() as u64;
            let snippet = loggable_body(&bytes, SNIPPET_MAX);
            tracing::debug!(
                req_id = %req_id,
                %status,
                duration_ms,
                body_len = bytes.len(),
                "http.response"
            );
            if raw_enabled() {
                tracing::debug!(
                    target: "http.raw",
                    %req_id,
                    %status,
                    headers = ?redact_headers(&headers),
                    body = %loggable_body(&bytes, RAW_MAX_BODY),
                    "response"
                );
            }

            if status.is_success() {
                return serde_json::from_slice::<T>(&bytes).map_err(|e| {
                    tracing::warn!(
                        req_id = %req_id,
                        serde_err = %e,
                        body_snippet = %snippet,
                        "http.response.decode_error"
                    );
                    HttpError::Decode(e.to_string(), snippet)
                });
            }

            let message = extract_error_message(&bytes);
            let retryable =
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < max_retries {
                attempt += 1;
                let delay = retry_after(&headers).unwrap_or_else(|| backoff_for(attempt));
                tracing::warn!(
                    req_id = %req_id,
                    %status,
                    attempt,
                    max_retries,
                    backoff_ms = delay.as_millis() as u64,
                    message = %message,
                    "http.retrying"
                );
                sleep(delay).await;
                continue;
            }

            tracing::warn!(req_id = %req_id, %status, message = %message, "http.error");
            return Err(HttpError::Api { status, message });
        }
    }
}

fn backoff_for(attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(10) as u32;
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(1u64 << shift))
}

fn retry_after(h: &HeaderMap) -> Option<Duration> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}

/// Pull a human message out of common error envelopes:
/// `{"error":{"message":..}}`, `{"message":..}`, `{"errorDescription":..}`,
/// `{"detail":..}`, `{"error":".."}`.
fn extract_error_message(body: &[u8]) -> String {
    let Ok(v) = serde_json::from_slice::<Value>(body) else {
        return loggable_body(body, SNIPPET_MAX);
    };
    let candidates = [
        v.pointer("/error/message"),
        v.get("message"),
        v.get("errorDescription"),
        v.get("detail"),
        v.get("error"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|c| c.as_str().filter(|s| !s.is_empty()).map(str::to_string))
        .unwrap_or_else(|| loggable_body(body, SNIPPET_MAX))
}
