//! Browser-facing seam. [`Page`] is the set of page interactions the
//! rest of the crate drives; [`chromium`] is the real implementation.
//! Tests substitute a scripted fake.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub mod chromium;

pub use chromium::{find_chromium, BrowserHandle, ChromiumPage};

/// Browser user-agent, also sent by the media downloader so asset
/// requests look like they come from the same session.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                              AppleWebKit/537.36 (KHTML, like Gecko) \
                              Chrome/131.0.0.0 Safari/537.36";

/// Identifies an element located by an earlier [`Page::query`] call.
///
/// Handles go stale when the page re-renders. Operations on a stale
/// handle return an error; callers are expected to re-query rather
/// than retry the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// Everything the scraping pipeline needs from a live page.
#[async_trait]
pub trait Page: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// All elements currently matching `selector`, in document order.
    /// An invalid selector is an error; zero matches is not.
    async fn query(&self, selector: &str) -> Result<Vec<ElementHandle>>;

    async fn is_visible(&self, element: ElementHandle) -> Result<bool>;

    async fn text(&self, element: ElementHandle) -> Result<String>;

    async fn inner_html(&self, element: ElementHandle) -> Result<String>;

    async fn scroll_into_view(&self, element: ElementHandle) -> Result<()>;

    /// Trusted pointer click at the element's location.
    async fn click(&self, element: ElementHandle) -> Result<()>;

    /// `element.click()` from script. Works where the pointer click is
    /// intercepted by an overlay.
    async fn click_scripted(&self, element: ElementHandle) -> Result<()>;

    /// Fire a synthetic bubbling `click` event at the element.
    async fn dispatch_click(&self, element: ElementHandle) -> Result<()>;

    /// Set an input's value and fire `input`/`change` events.
    async fn fill(&self, element: ElementHandle, value: &str) -> Result<()>;

    /// Run a JS function with `this` bound to the element.
    async fn eval_on(&self, element: ElementHandle, function: &str) -> Result<Value>;

    /// Evaluate a page-level expression.
    async fn eval(&self, script: &str) -> Result<Value>;

    /// Wait until the DOM stops churning, up to `timeout`. Timing out
    /// is quiet degradation, not an error.
    async fn settle(&self, timeout: Duration) -> Result<()>;

    async fn pause(&self, delay: Duration);

    /// Serialize the current document.
    async fn snapshot(&self) -> Result<String>;
}
