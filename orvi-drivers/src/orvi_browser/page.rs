use crate::error::DriverError;
use crate::orvi_browser::{behavioral::Typist, launch::CORE_EVASIONS};
use crate::selector::Selector;
use crate::session::BrowserSession;
use async_trait::async_trait;
use fantoccini::{elements::Element, Client};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A [`BrowserSession`] over a `fantoccini` WebDriver client.
pub struct WebDriverPage {
    client: Client,
    typist: Typist,
}

impl WebDriverPage {
    pub fn new(client: Client, typist: Typist) -> Self {
        Self { client, typist }
    }

    async fn apply_evasions(&self) {
        if let Err(err) = self.client.execute(CORE_EVASIONS, vec![]).await {
            debug!(target: "browser.session", error = %err, "evasion script failed");
        }
    }

    /// First displayed element matching `selector`, if any right now.
    async fn first_visible(&self, selector: &Selector) -> Result<Option<Element>, DriverError> {
        let elements = self.client.find_all(selector.locator()).await?;
        for element in elements {
            match element.is_displayed().await {
                Ok(true) => return Ok(Some(element)),
                Ok(false) => {}
                Err(err) => match DriverError::from(err) {
                    // Replaced while we looked; the next poll sees the new node.
                    DriverError::Stale(_) => {}
                    other => return Err(other),
                },
            }
        }
        Ok(None)
    }

    /// Poll until an element matching `raw` is displayed, or time out.
    async fn visible_element(&self, raw: &str, limit: Duration) -> Result<Element, DriverError> {
        let selector = Selector::parse(raw);
        let deadline = Instant::now() + limit;
        loop {
            if let Some(element) = self.first_visible(&selector).await? {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::timeout(raw, limit));
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BrowserSession for WebDriverPage {
    async fn goto(&self, url: &str, limit: Duration) -> Result<(), DriverError> {
        debug!(target: "browser.session", %url, "navigate");
        timeout(limit, self.client.goto(url))
            .await
            .map_err(|_| DriverError::timeout(format!("navigation to {url}"), limit))?
            .map_err(|e| match DriverError::from(e) {
                DriverError::Other(msg) => DriverError::Navigation(msg),
                other => other,
            })?;
        self.apply_evasions().await;
        Ok(())
    }

    async fn reload(&self, limit: Duration) -> Result<(), DriverError> {
        debug!(target: "browser.session", "reload");
        timeout(limit, self.client.refresh())
            .await
            .map_err(|_| DriverError::timeout("page reload", limit))??;
        self.apply_evasions().await;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn wait_visible(&self, selector: &str, limit: Duration) -> Result<(), DriverError> {
        self.visible_element(selector, limit).await.map(|_| ())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, DriverError> {
        Ok(self.first_visible(&Selector::parse(selector)).await?.is_some())
    }

    async fn click(&self, selector: &str, limit: Duration) -> Result<(), DriverError> {
        let element = self.visible_element(selector, limit).await?;
        element.click().await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str, limit: Duration) -> Result<(), DriverError> {
        let element = self.visible_element(selector, limit).await?;
        element.click().await?;
        element.clear().await?;
        self.typist.type_into(&element, text).await?;
        Ok(())
    }

    async fn inner_text(&self, selector: &str, limit: Duration) -> Result<String, DriverError> {
        let element = self.visible_element(selector, limit).await?;
        Ok(element.text().await?)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(self.client.screenshot().await?)
    }

    async fn element_screenshot(
        &self,
        selector: &str,
        limit: Duration,
    ) -> Result<Vec<u8>, DriverError> {
        let element = self.visible_element(selector, limit).await?;
        Ok(element.screenshot().await?)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.client.clone().close().await?;
        debug!(target: "browser.session", "session closed");
        Ok(())
    }
}
