use crate::error::DriverError;
use async_trait::async_trait;
use std::time::Duration;

/// One live browser page owned by a single execution.
///
/// Implementations are not expected to tolerate concurrent use; the engine
/// holds the session exclusively for the duration of a run. Every wait is
/// bounded by the `timeout` the caller passes.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` and wait for the document to be ready.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    async fn reload(&self, timeout: Duration) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    /// Wait until some element matching `selector` is displayed.
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Non-blocking visibility check.
    async fn is_visible(&self, selector: &str) -> Result<bool, DriverError>;

    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Click the field, clear it, and type `text`.
    async fn fill(&self, selector: &str, text: &str, timeout: Duration) -> Result<(), DriverError>;

    async fn inner_text(&self, selector: &str, timeout: Duration) -> Result<String, DriverError>;

    /// PNG of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// PNG of a single element.
    async fn element_screenshot(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, DriverError>;

    /// End the session. Called exactly once per session by the runner.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Opens fresh, independent sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, DriverError>;
}
