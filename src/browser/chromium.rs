// Copyright 2026 Magpie Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-backed [`Page`] built on chromiumoxide.
//!
//! Located elements live in a registry keyed by [`ElementHandle`];
//! element scripts run with `this` bound to the remote node, so a
//! handle whose node left the DOM fails the call instead of silently
//! acting on the wrong element.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::js_protocol::runtime::CallFunctionOnReturns;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page as TabPage;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{ElementHandle, Page, USER_AGENT};
use crate::config::Config;

const SETTLE_POLL: Duration = Duration::from_millis(250);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. MAGPIE_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("MAGPIE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.magpie/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".magpie/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".magpie/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".magpie/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".magpie/chromium/chrome-linux64/chrome"),
                home.join(".magpie/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    if let Ok(path) = which::which("google-chrome") {
        return Some(path);
    }
    if let Ok(path) = which::which("chromium") {
        return Some(path);
    }
    if let Ok(path) = which::which("chromium-browser") {
        return Some(path);
    }

    // 4. Common macOS locations
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// A launched browser process plus its CDP event loop.
pub struct BrowserHandle {
    browser: Browser,
    event_loop: JoinHandle<()>,
    timeout: Duration,
}

impl BrowserHandle {
    pub async fn launch(config: &Config) -> Result<Self> {
        let chrome_path = find_chromium().context(
            "Chromium not found. Install Chrome/Chromium or set MAGPIE_CHROMIUM_PATH.",
        )?;

        info!(
            "launching browser: {} (headless={})",
            chrome_path.display(),
            config.headless
        );

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1920, 1080)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if config.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch Chromium")?;

        // Drive CDP events until the browser goes away.
        let event_loop = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            event_loop,
            timeout: config.timeout,
        })
    }

    pub async fn new_page(&self) -> Result<ChromiumPage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        page.execute(SetUserAgentOverrideParams::new(USER_AGENT))
            .await
            .context("failed to set user agent")?;

        Ok(ChromiumPage {
            page,
            timeout: self.timeout,
            elements: Mutex::new(Registry::default()),
        })
    }

    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await.ok();
        // The event loop ends on its own once the process is gone.
        if tokio::time::timeout(Duration::from_secs(5), &mut self.event_loop)
            .await
            .is_err()
        {
            self.event_loop.abort();
        }
        Ok(())
    }
}

#[derive(Default)]
struct Registry {
    next: u64,
    live: HashMap<u64, Element>,
}

impl Registry {
    fn insert(&mut self, element: Element) -> ElementHandle {
        let id = self.next;
        self.next += 1;
        self.live.insert(id, element);
        ElementHandle(id)
    }
}

/// One browser tab.
pub struct ChromiumPage {
    page: TabPage,
    timeout: Duration,
    elements: Mutex<Registry>,
}

impl ChromiumPage {
    /// Serialize the tab's cookies for session persistence.
    pub async fn export_cookies(&self) -> Result<Value> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .context("failed to read cookies")?;
        serde_json::to_value(cookies).context("failed to serialize cookies")
    }

    /// Restore cookies captured by [`ChromiumPage::export_cookies`].
    /// Returns how many were applied.
    pub async fn import_cookies(&self, stored: Value) -> Result<usize> {
        let cookies: Vec<CookieParam> =
            serde_json::from_value(stored).context("saved session has an unexpected shape")?;
        let count = cookies.len();
        self.page
            .set_cookies(cookies)
            .await
            .context("failed to restore cookies")?;
        Ok(count)
    }

    /// Run `function` with `this` bound to the element behind `handle`.
    async fn call_on(&self, handle: ElementHandle, function: &str) -> Result<Value> {
        let registry = self.elements.lock().await;
        let element = registry
            .live
            .get(&handle.0)
            .ok_or_else(|| anyhow!("stale element handle {}", handle.0))?;
        let returns = element
            .call_js_fn(function, false)
            .await
            .context("element script call failed")?;
        drop(registry);
        js_result(returns)
    }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.elements.lock().await.live.clear();

        debug!("navigating to {url}");
        match tokio::time::timeout(self.timeout, self.page.goto(url)).await {
            Ok(result) => {
                result.with_context(|| format!("navigation to {url} failed"))?;
            }
            Err(_) => bail!("navigation to {url} timed out after {:?}", self.timeout),
        }
        let _ = tokio::time::timeout(self.timeout, self.page.wait_for_navigation()).await;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .page
            .url()
            .await
            .context("failed to read page url")?
            .unwrap_or_default())
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let found = self
            .page
            .find_elements(selector)
            .await
            .with_context(|| format!("querySelectorAll({selector:?}) failed"))?;
        let mut registry = self.elements.lock().await;
        Ok(found.into_iter().map(|el| registry.insert(el)).collect())
    }

    async fn is_visible(&self, element: ElementHandle) -> Result<bool> {
        let value = self
            .call_on(
                element,
                "function() { \
                     const rect = this.getBoundingClientRect(); \
                     const style = window.getComputedStyle(this); \
                     return rect.width > 0 && rect.height > 0 \
                         && style.display !== 'none' \
                         && style.visibility !== 'hidden'; \
                 }",
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text(&self, element: ElementHandle) -> Result<String> {
        let value = self
            .call_on(
                element,
                "function() { return this.innerText || this.textContent || ''; }",
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn inner_html(&self, element: ElementHandle) -> Result<String> {
        let value = self
            .call_on(element, "function() { return this.innerHTML; }")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn scroll_into_view(&self, element: ElementHandle) -> Result<()> {
        self.call_on(
            element,
            "function() { \
                 this.scrollIntoView({ block: 'center', inline: 'nearest' }); \
                 return true; \
             }",
        )
        .await?;
        Ok(())
    }

    async fn click(&self, element: ElementHandle) -> Result<()> {
        let registry = self.elements.lock().await;
        let target = registry
            .live
            .get(&element.0)
            .ok_or_else(|| anyhow!("stale element handle {}", element.0))?;
        target.click().await.context("pointer click failed")?;
        Ok(())
    }

    async fn click_scripted(&self, element: ElementHandle) -> Result<()> {
        self.call_on(element, "function() { this.click(); return true; }")
            .await?;
        Ok(())
    }

    async fn dispatch_click(&self, element: ElementHandle) -> Result<()> {
        self.call_on(
            element,
            "function() { \
                 this.dispatchEvent(new MouseEvent('click', { \
                     bubbles: true, cancelable: true, view: window })); \
                 return true; \
             }",
        )
        .await?;
        Ok(())
    }

    async fn fill(&self, element: ElementHandle, value: &str) -> Result<()> {
        let function = format!(
            "function() {{ \
                 this.focus(); \
                 this.value = '{}'; \
                 this.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                 this.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                 return true; \
             }}",
            sanitize_js_string(value)
        );
        self.call_on(element, &function).await?;
        Ok(())
    }

    async fn eval_on(&self, element: ElementHandle, function: &str) -> Result<Value> {
        self.call_on(element, function).await
    }

    async fn eval(&self, script: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("failed to evaluate script")?;
        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn settle(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut previous = None;
        let mut stable_polls = 0u32;
        while tokio::time::Instant::now() < deadline {
            let count = self
                .eval("(() => document.getElementsByTagName('*').length)()")
                .await?
                .as_u64();
            if count.is_some() && count == previous {
                stable_polls += 1;
                // Two quiet polls in a row counts as settled.
                if stable_polls >= 2 {
                    return Ok(());
                }
            } else {
                stable_polls = 0;
                previous = count;
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
        debug!("page did not settle within {timeout:?}");
        Ok(())
    }

    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    async fn snapshot(&self) -> Result<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to capture document snapshot")?;
        result
            .into_value::<String>()
            .map_err(|e| anyhow!("snapshot was not a string: {e:?}"))
    }
}

fn js_result(returns: CallFunctionOnReturns) -> Result<Value> {
    if let Some(exception) = returns.exception_details {
        bail!("script threw: {}", exception.text);
    }
    Ok(returns.result.value.unwrap_or(Value::Null))
}

/// Sanitize a string for safe injection into a JavaScript string literal.
fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}                       // Strip null bytes
            '<' => result.push_str("\\x3c"), // Prevent </script> injection
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}
