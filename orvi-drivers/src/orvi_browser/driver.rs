use crate::error::DriverError;
use crate::orvi_browser::{behavioral::Typist, launch::build_launch_arguments, page::WebDriverPage};
use crate::session::{BrowserSession, SessionFactory};
use async_trait::async_trait;
use fantoccini::ClientBuilder;
use orvi_common::BrowserSettings;
use serde_json::json;
use tracing::info;
use webdriver::capabilities::Capabilities;

/// Opens a new Chromium session per execution through a running WebDriver
/// service (chromedriver by default at `http://localhost:9515`).
#[derive(Debug, Clone)]
pub struct WebDriverSessionFactory {
    settings: BrowserSettings,
}

impl WebDriverSessionFactory {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::new();
        let args = build_launch_arguments(&self.settings);
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({
                "args": args,
                "excludeSwitches": ["enable-automation"],
            }),
        );
        caps.insert("pageLoadStrategy".to_string(), json!("normal"));
        caps
    }
}

#[async_trait]
impl SessionFactory for WebDriverSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, DriverError> {
        let client = ClientBuilder::native()
            .capabilities(self.capabilities())
            .connect(&self.settings.webdriver_url)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        info!(
            target: "browser.session",
            webdriver = %self.settings.webdriver_url,
            headless = self.settings.headless,
            "session opened"
        );
        let typist = Typist::new(self.settings.key_delay_ms);
        Ok(Box::new(WebDriverPage::new(client, typist)))
    }
}
