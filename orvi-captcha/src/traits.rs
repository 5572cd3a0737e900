use async_trait::async_trait;
use orvi_http::HttpError;
use serde::{Deserialize, Serialize};

/// What the page asked us to solve.
#[derive(Clone)]
pub enum CaptchaChallenge {
    /// PNG bytes of the captcha image element.
    Image { png: Vec<u8> },
    /// reCAPTCHA v2 widget identified by its site key.
    SiteKey { site_key: String, page_url: String },
}

impl CaptchaChallenge {
    pub fn kind(&self) -> &'static str {
        match self {
            CaptchaChallenge::Image { .. } => "image",
            CaptchaChallenge::SiteKey { .. } => "sitekey",
        }
    }
}

impl std::fmt::Debug for CaptchaChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptchaChallenge::Image { png } => f
                .debug_struct("Image")
                .field("bytes", &png.len())
                .finish(),
            CaptchaChallenge::SiteKey { site_key, page_url } => f
                .debug_struct("SiteKey")
                .field("site_key", site_key)
                .field("page_url", page_url)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaSolution {
    /// Text to type, or the token to inject for site-key challenges.
    pub text: String,
    /// Provider task id, useful when reporting a bad solution.
    pub task_id: Option<u64>,
}

#[derive(thiserror::Error, Debug)]
pub enum CaptchaError {
    #[error("captcha solve timed out after {0} ms")]
    Timeout(u64),

    #[error("provider rejected task ({code}): {description}")]
    Provider { code: String, description: String },

    #[error("insufficient provider balance")]
    InsufficientBalance,

    #[error("provider returned an empty solution")]
    EmptySolution,

    #[error("challenge kind `{0}` is not supported by this solver")]
    Unsupported(&'static str),

    #[error("http: {0}")]
    Http(#[from] HttpError),
}

#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Solve one challenge, bounded by the solver's own timeout.
    async fn solve(&self, challenge: CaptchaChallenge) -> Result<CaptchaSolution, CaptchaError>;

    /// Short provider name for logs.
    fn provider(&self) -> &str;
}
