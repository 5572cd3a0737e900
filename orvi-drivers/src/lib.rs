//! Browser driver layer.
//!
//! The engine drives pages only through [`session::BrowserSession`], opened by
//! a [`session::SessionFactory`]. Two implementations live here:
//!
//! - [`orvi_browser::driver::WebDriverSessionFactory`]: Chromium through a
//!   running WebDriver service (`fantoccini`)
//! - `mock::MockSessionFactory` (feature `mock`): scripted pages for tests
//!
//! Selectors are CSS, or Playwright-style `tag:has-text('X')` which
//! [`selector::Selector`] rewrites to XPath.
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod orvi_browser;
pub mod selector;
pub mod session;

pub use error::DriverError;
pub use selector::Selector;
pub use session::{BrowserSession, SessionFactory};
