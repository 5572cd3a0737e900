//! Captcha solving for portal flows.
//!
//! The engine only sees the [`traits::CaptchaSolver`] trait. The production
//! implementation is [`anticaptcha::AntiCaptchaClient`], which submits a task
//! and polls for its result. Image challenges are binarised first
//! ([`preprocess::binarize`]).

pub mod anticaptcha;
pub mod preprocess;
pub mod traits;

pub use anticaptcha::AntiCaptchaClient;
pub use traits::{CaptchaChallenge, CaptchaError, CaptchaSolution, CaptchaSolver};

use orvi_common::{CaptchaProvider, CaptchaSettings};
use std::sync::Arc;

/// Build the solver selected by the `captcha` settings section.
///
/// Returns `Ok(None)` when solving is disabled or no key is configured; the
/// engine then fails captcha steps with a solver error instead of starting.
pub fn solver_from_settings(
    settings: &CaptchaSettings,
) -> Result<Option<Arc<dyn CaptchaSolver>>, CaptchaError> {
    match settings.provider {
        CaptchaProvider::Disabled => Ok(None),
        CaptchaProvider::AntiCaptcha => {
            let Some(key) = settings.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
                tracing::warn!(
                    target: "captcha.anticaptcha",
                    "no API key configured; captcha steps will fail"
                );
                return Ok(None);
            };
            let client = AntiCaptchaClient::from_settings(key, settings)?;
            Ok(Some(Arc::new(client)))
        }
    }
}
