use crate::preprocess;
use crate::traits::{CaptchaChallenge, CaptchaError, CaptchaSolution, CaptchaSolver};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use orvi_common::CaptchaSettings;
use orvi_http::{HttpClient, RequestOpts};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

const ZERO_BALANCE: &str = "ERROR_ZERO_BALANCE";

/// Client for the anti-captcha.com task API.
///
/// A solve is two calls: `createTask` returns a task id, then
/// `getTaskResult` is polled until the status is `ready` or the solve
/// timeout elapses.
pub struct AntiCaptchaClient {
    http: HttpClient,
    client_key: String,
    poll_interval: Duration,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest<'a> {
    client_key: &'a str,
    task: TaskBody<'a>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum TaskBody<'a> {
    #[serde(rename = "ImageToTextTask")]
    ImageToText { body: String },
    #[serde(rename = "RecaptchaV2TaskProxyless", rename_all = "camelCase")]
    RecaptchaV2 {
        #[serde(rename = "websiteURL")]
        website_url: &'a str,
        website_key: &'a str,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskResponse {
    #[serde(default)]
    error_id: u32,
    error_code: Option<String>,
    error_description: Option<String>,
    task_id: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultRequest<'a> {
    client_key: &'a str,
    task_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultResponse {
    #[serde(default)]
    error_id: u32,
    error_code: Option<String>,
    error_description: Option<String>,
    status: Option<String>,
    solution: Option<TaskSolution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskSolution {
    text: Option<String>,
    g_recaptcha_response: Option<String>,
}

/// Binarised image, or the original bytes when it cannot be decoded.
fn prepared_image(png: &[u8]) -> Cow<'_, [u8]> {
    match preprocess::binarize(png) {
        Ok(clean) => Cow::Owned(clean),
        Err(err) => {
            warn!(target: "captcha.anticaptcha", error = %err, "image preprocessing failed; sending original");
            Cow::Borrowed(png)
        }
    }
}

/// Time left before `deadline`, as a per-request HTTP timeout.
fn within(deadline: Instant) -> RequestOpts {
    RequestOpts {
        timeout: Some(deadline.saturating_duration_since(Instant::now())),
        ..RequestOpts::default()
    }
}

fn provider_error(code: Option<String>, description: Option<String>) -> CaptchaError {
    let code = code.unwrap_or_else(|| "UNKNOWN".to_string());
    if code == ZERO_BALANCE {
        return CaptchaError::InsufficientBalance;
    }
    CaptchaError::Provider {
        code,
        description: description.unwrap_or_default(),
    }
}

impl AntiCaptchaClient {
    pub fn new(
        client_key: impl Into<String>,
        endpoint: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Self, CaptchaError> {
        let http = HttpClient::new(endpoint)?.with_timeout(Duration::from_secs(30));
        Ok(Self {
            http,
            client_key: client_key.into(),
            poll_interval,
            timeout,
        })
    }

    pub fn from_settings(key: &str, settings: &CaptchaSettings) -> Result<Self, CaptchaError> {
        Self::new(
            key,
            &settings.endpoint,
            settings.poll_interval(),
            settings.timeout(),
        )
    }

    async fn create_task(
        &self,
        challenge: &CaptchaChallenge,
        deadline: Instant,
    ) -> Result<u64, CaptchaError> {
        let task = match challenge {
            CaptchaChallenge::Image { png } => TaskBody::ImageToText {
                body: STANDARD.encode(prepared_image(png)),
            },
            CaptchaChallenge::SiteKey { site_key, page_url } => TaskBody::RecaptchaV2 {
                website_url: page_url,
                website_key: site_key,
            },
        };
        let req = CreateTaskRequest {
            client_key: &self.client_key,
            task,
        };
        let resp: CreateTaskResponse = self
            .http
            .post_json("createTask", &req, within(deadline))
            .await?;
        if resp.error_id != 0 {
            return Err(provider_error(resp.error_code, resp.error_description));
        }
        resp.task_id.ok_or_else(|| CaptchaError::Provider {
            code: "NO_TASK_ID".into(),
            description: "createTask returned no taskId".into(),
        })
    }

    async fn poll_result(&self, task_id: u64, deadline: Instant) -> Result<String, CaptchaError> {
        let req = TaskResultRequest {
            client_key: &self.client_key,
            task_id,
        };
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(CaptchaError::Timeout(self.timeout.as_millis() as u64));
            }
            sleep(self.poll_interval.min(deadline - now)).await;

            let resp: TaskResultResponse = self
                .http
                .post_json("getTaskResult", &req, within(deadline))
                .await?;
            if resp.error_id != 0 {
                return Err(provider_error(resp.error_code, resp.error_description));
            }
            match resp.status.as_deref() {
                Some("ready") => {
                    let text = resp
                        .solution
                        .and_then(|s| s.text.or(s.g_recaptcha_response))
                        .unwrap_or_default();
                    return Ok(text);
                }
                other => {
                    debug!(target: "captcha.anticaptcha", task_id, status = ?other, "task pending");
                }
            }
        }
    }

    async fn run_task(
        &self,
        challenge: &CaptchaChallenge,
        started: Instant,
    ) -> Result<CaptchaSolution, CaptchaError> {
        let deadline = started + self.timeout;
        let kind = challenge.kind();

        let task_id = self.create_task(challenge, deadline).await.inspect_err(|e| {
            warn!(target: "captcha.anticaptcha", kind, error = %e, "createTask failed");
        })?;
        info!(target: "captcha.anticaptcha", kind, task_id, "task created");

        let text = self.poll_result(task_id, deadline).await?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(CaptchaError::EmptySolution);
        }
        info!(
            target: "captcha.anticaptcha",
            task_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            len = text.len(),
            "captcha solved"
        );
        Ok(CaptchaSolution {
            text,
            task_id: Some(task_id),
        })
    }
}

#[async_trait]
impl CaptchaSolver for AntiCaptchaClient {
    /// The whole exchange, HTTP retries included, is bounded by the solve
    /// timeout.
    async fn solve(&self, challenge: CaptchaChallenge) -> Result<CaptchaSolution, CaptchaError> {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.run_task(&challenge, started)).await {
            Ok(Err(CaptchaError::Http(err))) if started.elapsed() >= self.timeout => {
                debug!(target: "captcha.anticaptcha", error = %err, "request cut off by solve timeout");
                Err(CaptchaError::Timeout(self.timeout.as_millis() as u64))
            }
            Ok(result) => result,
            Err(_) => {
                warn!(
                    target: "captcha.anticaptcha",
                    kind = challenge.kind(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "solve timed out"
                );
                Err(CaptchaError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }

    fn provider(&self) -> &str {
        "anticaptcha"
    }
}
