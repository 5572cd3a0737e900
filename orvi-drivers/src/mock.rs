//! Scripted in-memory browser for tests.
//!
//! A [`MockSession`] is a cheap handle over shared state: clones observe the
//! same page, so a test keeps one handle for assertions while the engine owns
//! another. Selectors are matched by exact string.
use crate::error::DriverError;
use crate::session::{BrowserSession, SessionFactory};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Smallest valid PNG signature; enough for artifact tests.
pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone)]
struct MockElement {
    visible: bool,
    text: String,
    /// Failed lookups left before the element shows up.
    hidden_for: u32,
    stale_once: bool,
}

#[derive(Debug, Clone)]
struct Overlay {
    selector: String,
    dismiss: String,
    active: bool,
}

#[derive(Debug, Default)]
struct MockState {
    url: String,
    elements: HashMap<String, MockElement>,
    overlays: Vec<Overlay>,
    reveal_on_click: HashMap<String, Vec<String>>,
    stall: bool,
    unusable: bool,
    fail_screenshot: bool,
    navigations: Vec<String>,
    reloads: u32,
    fills: Vec<(String, String)>,
    clicks: Vec<String>,
    lookups: HashMap<String, u32>,
    closes: u32,
}

#[derive(Clone, Default)]
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn insert(&self, selector: &str, element: MockElement) {
        self.state().elements.insert(selector.to_string(), element);
    }

    /// A visible element with the given text.
    pub fn with_element(self, selector: &str, text: &str) -> Self {
        self.insert(
            selector,
            MockElement {
                visible: true,
                text: text.to_string(),
                hidden_for: 0,
                stale_once: false,
            },
        );
        self
    }

    /// Present in the DOM but never displayed.
    pub fn with_hidden_element(self, selector: &str) -> Self {
        self.insert(
            selector,
            MockElement {
                visible: false,
                text: String::new(),
                hidden_for: 0,
                stale_once: false,
            },
        );
        self
    }

    /// Visible only after `misses` lookups have failed.
    pub fn appears_after(self, selector: &str, misses: u32) -> Self {
        self.insert(
            selector,
            MockElement {
                visible: true,
                text: String::new(),
                hidden_for: misses,
                stale_once: false,
            },
        );
        self
    }

    /// The next interaction with `selector` fails as a stale reference.
    pub fn stale_once(self, selector: &str) -> Self {
        if let Some(el) = self.state().elements.get_mut(selector) {
            el.stale_once = true;
        }
        self
    }

    /// Clicking `clicked` makes `revealed` visible.
    pub fn reveal_on_click(self, clicked: &str, revealed: &str) -> Self {
        {
            let mut state = self.state();
            state
                .reveal_on_click
                .entry(clicked.to_string())
                .or_default()
                .push(revealed.to_string());
            state
                .elements
                .entry(revealed.to_string())
                .or_insert(MockElement {
                    visible: false,
                    text: String::new(),
                    hidden_for: 0,
                    stale_once: false,
                });
        }
        self
    }

    /// A modal that intercepts clicks and typing until `dismiss` is clicked.
    pub fn with_overlay(self, selector: &str, dismiss: &str) -> Self {
        self.state().overlays.push(Overlay {
            selector: selector.to_string(),
            dismiss: dismiss.to_string(),
            active: true,
        });
        self
    }

    /// Every wait blocks for its full timeout, then times out.
    pub fn stall_waits(self) -> Self {
        self.state().stall = true;
        self
    }

    pub fn fail_screenshots(self) -> Self {
        self.state().fail_screenshot = true;
        self
    }

    pub fn at_url(self, url: &str) -> Self {
        self.state().url = url.to_string();
        self
    }

    /// Make every later call fail as if the browser crashed.
    pub fn lose_session(&self) {
        self.state().unusable = true;
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    pub fn reloads(&self) -> u32 {
        self.state().reloads
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.state().fills.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state().clicks.clone()
    }

    /// How many times `selector` was looked up.
    pub fn lookups(&self, selector: &str) -> u32 {
        self.state().lookups.get(selector).copied().unwrap_or(0)
    }

    pub fn close_count(&self) -> u32 {
        self.state().closes
    }

    pub fn overlay_active(&self, selector: &str) -> bool {
        self.state()
            .overlays
            .iter()
            .any(|o| o.selector == selector && o.active)
    }

    async fn stall(&self, what: &str, limit: Duration) -> Result<(), DriverError> {
        let stalled = self.state().stall;
        if stalled {
            tokio::time::sleep(limit).await;
            return Err(DriverError::timeout(what, limit));
        }
        Ok(())
    }

    /// Resolve `selector` for reading or interaction.
    fn locate(&self, selector: &str, interact: bool, limit: Duration) -> Result<String, DriverError> {
        let mut state = self.state();
        if state.unusable {
            return Err(DriverError::Unusable("invalid session id".into()));
        }
        *state.lookups.entry(selector.to_string()).or_default() += 1;

        if state
            .overlays
            .iter()
            .any(|o| o.active && (o.selector == selector || o.dismiss == selector))
        {
            return Ok(String::new());
        }

        let blocking_overlay = state
            .overlays
            .iter()
            .find(|o| o.active)
            .map(|o| o.selector.clone());

        let Some(element) = state.elements.get_mut(selector) else {
            return Err(DriverError::timeout(selector, limit));
        };
        if element.hidden_for > 0 {
            element.hidden_for -= 1;
            return Err(DriverError::timeout(selector, limit));
        }
        if !element.visible {
            return Err(DriverError::timeout(selector, limit));
        }
        if interact {
            if element.stale_once {
                element.stale_once = false;
                return Err(DriverError::Stale(selector.to_string()));
            }
            if let Some(overlay) = blocking_overlay {
                return Err(DriverError::Intercepted(format!(
                    "{selector} is covered by {overlay}"
                )));
            }
        }
        Ok(element.text.clone())
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn goto(&self, url: &str, limit: Duration) -> Result<(), DriverError> {
        self.stall(url, limit).await?;
        let mut state = self.state();
        if state.unusable {
            return Err(DriverError::Unusable("invalid session id".into()));
        }
        state.url = url.to_string();
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn reload(&self, limit: Duration) -> Result<(), DriverError> {
        self.stall("reload", limit).await?;
        let mut state = self.state();
        if state.unusable {
            return Err(DriverError::Unusable("invalid session id".into()));
        }
        state.reloads += 1;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.state().url.clone())
    }

    async fn wait_visible(&self, selector: &str, limit: Duration) -> Result<(), DriverError> {
        self.stall(selector, limit).await?;
        self.locate(selector, false, limit).map(|_| ())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, DriverError> {
        let state = self.state();
        if state.unusable {
            return Err(DriverError::Unusable("invalid session id".into()));
        }
        if state
            .overlays
            .iter()
            .any(|o| o.active && (o.selector == selector || o.dismiss == selector))
        {
            return Ok(true);
        }
        Ok(state
            .elements
            .get(selector)
            .is_some_and(|e| e.visible && e.hidden_for == 0))
    }

    async fn click(&self, selector: &str, limit: Duration) -> Result<(), DriverError> {
        self.stall(selector, limit).await?;
        self.locate(selector, true, limit)?;
        let mut state = self.state();
        state.clicks.push(selector.to_string());
        for overlay in state.overlays.iter_mut() {
            if overlay.active && overlay.dismiss == selector {
                overlay.active = false;
            }
        }
        if let Some(revealed) = state.reveal_on_click.get(selector).cloned() {
            for target in revealed {
                if let Some(el) = state.elements.get_mut(&target) {
                    el.visible = true;
                }
            }
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str, limit: Duration) -> Result<(), DriverError> {
        self.stall(selector, limit).await?;
        self.locate(selector, true, limit)?;
        self.state()
            .fills
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn inner_text(&self, selector: &str, limit: Duration) -> Result<String, DriverError> {
        self.stall(selector, limit).await?;
        self.locate(selector, false, limit)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let state = self.state();
        if state.unusable {
            return Err(DriverError::Unusable("invalid session id".into()));
        }
        if state.fail_screenshot {
            return Err(DriverError::Other("screenshot failed".into()));
        }
        Ok(FAKE_PNG.to_vec())
    }

    async fn element_screenshot(
        &self,
        selector: &str,
        limit: Duration,
    ) -> Result<Vec<u8>, DriverError> {
        self.stall(selector, limit).await?;
        self.locate(selector, false, limit)?;
        Ok(FAKE_PNG.to_vec())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.state().closes += 1;
        Ok(())
    }
}

/// Hands out clones of one scripted session.
pub struct MockSessionFactory {
    session: MockSession,
    launch_error: Option<String>,
    opened: AtomicUsize,
}

impl MockSessionFactory {
    pub fn new(session: MockSession) -> Self {
        Self {
            session,
            launch_error: None,
            opened: AtomicUsize::new(0),
        }
    }

    /// A factory whose browser never starts.
    pub fn failing(message: &str) -> Self {
        Self {
            session: MockSession::new(),
            launch_error: Some(message.to_string()),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn session(&self) -> MockSession {
        self.session.clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, DriverError> {
        if let Some(message) = &self.launch_error {
            return Err(DriverError::Launch(message.clone()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.session.clone()))
    }
}
