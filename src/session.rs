//! Sign-in and session reuse. Cookies from a successful sign-in are
//! saved to disk and restored on the next run, so the credential flow
//! only runs when the saved session has expired.

use std::fs;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::archive;
use crate::browser::{ChromiumPage, ElementHandle, Page};
use crate::config::Config;
use crate::scrape::selectors::Locator;

const PAGE_GRACE: Duration = Duration::from_secs(2);
/// The post-submit redirect dance takes a beat longer.
const POST_SUBMIT_GRACE: Duration = Duration::from_secs(3);
const FIELD_GRACE: Duration = Duration::from_millis(500);
const SETTLE_BUDGET: Duration = Duration::from_secs(10);

/// Ways into the sign-in form from the landing page.
const SIGN_IN_ENTRY: &[Locator] = &[
    Locator { selector: "button", label: Some("sign in") },
    Locator { selector: "a", label: Some("sign in") },
    Locator { selector: "[role=\"button\"]", label: Some("sign in") },
    Locator { selector: "a[href*=\"/sign_in\"]", label: None },
    Locator { selector: ".sign-in-btn", label: None },
    Locator { selector: "#sign-in-button", label: None },
];

/// The "Sign In" affordance itself, whose presence on an on-site page
/// means nobody is signed in.
const SIGN_IN_PROMPT: &[Locator] = &[
    Locator { selector: "a", label: Some("sign in") },
    Locator { selector: "button", label: Some("sign in") },
];

const EMAIL_FIELD: &[&str] = &[
    "input[name=\"email\"]",
    "input[type=\"email\"]",
    "input[id=\"email\"]",
    "input[placeholder*=\"email\" i]",
    "input[name=\"user_email\"]",
    "input[name=\"login\"]",
    "#user_email",
    ".email-input",
];

const PASSWORD_FIELD: &[&str] = &[
    "input[name=\"password\"]",
    "input[type=\"password\"]",
    "input[id=\"password\"]",
    "input[placeholder*=\"password\" i]",
    "input[name=\"user_password\"]",
    "#user_password",
    ".password-input",
];

const SUBMIT_CONTROLS: &[Locator] = &[
    Locator { selector: "button[type=\"submit\"]", label: None },
    Locator { selector: "input[type=\"submit\"]", label: None },
    Locator { selector: "button", label: Some("sign in") },
    Locator { selector: "button", label: Some("login") },
    Locator { selector: "button", label: Some("登录") },
    Locator { selector: ".login-button", label: None },
    Locator { selector: ".signin-button", label: None },
    Locator { selector: "[data-testid=\"login-button\"]", label: None },
    Locator { selector: "[data-testid=\"signin-button\"]", label: None },
];

/// Elements only a signed-in member sees.
const SIGNED_IN_MARKERS: &[&str] = &[
    ".user-avatar",
    ".user-menu",
    ".account-menu",
    "a[href*=\"logout\"]",
    "a[href*=\"sign_out\"]",
    ".current-user",
    ".header-user",
];

/// Get the page signed in: restore saved cookies when they still hold,
/// run the credential flow otherwise, and save the fresh cookies for
/// next time.
pub async fn establish(page: &ChromiumPage, config: &Config) -> Result<()> {
    restore_saved(page, config).await;

    if signed_in(page, config).await {
        info!("existing session is still valid");
        return Ok(());
    }

    sign_in(page, config).await?;

    match page.export_cookies().await {
        Ok(cookies) => save_session(config, &cookies),
        Err(error) => warn!("could not export session cookies: {error}"),
    }
    Ok(())
}

/// Whether the landing page looks signed in. Best-effort: any browser
/// failure reads as signed out.
pub async fn signed_in(page: &dyn Page, config: &Config) -> bool {
    if let Err(error) = page.navigate(&config.site_url).await {
        warn!("could not open the site to check the session: {error}");
        return false;
    }
    let _ = page.settle(SETTLE_BUDGET).await;
    page.pause(PAGE_GRACE).await;

    if any_signed_in_marker(page).await {
        return true;
    }

    let here = page.current_url().await.unwrap_or_default();
    if on_login_page(&here) {
        debug!("redirected to the sign-in page at {here}");
        return false;
    }

    // Still on the site with no member markers: the presence of the
    // Sign In affordance decides it.
    if same_host(&here, &config.site_url) {
        return locate_first(page, SIGN_IN_PROMPT).await.is_none();
    }
    false
}

/// Drive the credential flow. This is the one step that is fatal when
/// it fails; nothing downstream works anonymously.
pub async fn sign_in(page: &dyn Page, config: &Config) -> Result<()> {
    info!("signing in");
    page.navigate(&config.site_url).await?;
    let _ = page.settle(SETTLE_BUDGET).await;
    page.pause(PAGE_GRACE).await;

    let mut on_form = false;
    if let Some(entry) = locate_first(page, SIGN_IN_ENTRY).await {
        match page.click(entry).await {
            Ok(()) => on_form = true,
            Err(error) => debug!("sign-in button did not take the click: {error}"),
        }
    }
    if !on_form {
        debug!("opening the sign-in form directly at {}", config.login_url);
        page.navigate(&config.login_url).await?;
    }
    let _ = page.settle(SETTLE_BUDGET).await;
    page.pause(PAGE_GRACE).await;

    fill_field(page, EMAIL_FIELD, &config.email)
        .await
        .context("could not fill the email field on the sign-in form")?;
    let password_field = fill_field(page, PASSWORD_FIELD, &config.password)
        .await
        .context("could not fill the password field on the sign-in form")?;

    match locate_first(page, SUBMIT_CONTROLS).await {
        Some(submit) => page
            .click(submit)
            .await
            .context("could not click the sign-in button")?,
        None => {
            debug!("no submit control, submitting the form from script");
            page.eval_on(
                password_field,
                "function() { \
                     const form = this.form; \
                     if (form) { \
                         form.requestSubmit ? form.requestSubmit() : form.submit(); \
                     } \
                     return true; \
                 }",
            )
            .await
            .context("could not submit the sign-in form")?;
        }
    }

    let _ = page.settle(SETTLE_BUDGET).await;
    page.pause(POST_SUBMIT_GRACE).await;

    let landed = page.current_url().await.unwrap_or_default();
    if !landed.is_empty() && !on_login_page(&landed) {
        info!("signed in");
        return Ok(());
    }
    if any_signed_in_marker(page).await {
        info!("signed in");
        return Ok(());
    }
    bail!("sign-in did not take, check MAGPIE_EMAIL and MAGPIE_PASSWORD")
}

async fn restore_saved(page: &ChromiumPage, config: &Config) {
    if !config.auth_file.exists() {
        return;
    }
    let raw = match fs::read_to_string(&config.auth_file) {
        Ok(raw) => raw,
        Err(error) => {
            warn!("could not read the saved session state: {error}");
            return;
        }
    };
    let stored: Value = match serde_json::from_str(&raw) {
        Ok(stored) => stored,
        Err(error) => {
            warn!("saved session state is not JSON ({error}), discarding it");
            let _ = fs::remove_file(&config.auth_file);
            return;
        }
    };
    match page.import_cookies(stored).await {
        Ok(applied) => debug!("restored {applied} saved session cookies"),
        Err(error) => {
            warn!("saved session state is unusable ({error}), discarding it");
            let _ = fs::remove_file(&config.auth_file);
        }
    }
}

fn save_session(config: &Config, cookies: &Value) {
    let body = match serde_json::to_vec_pretty(cookies) {
        Ok(body) => body,
        Err(error) => {
            warn!("could not serialize session cookies: {error}");
            return;
        }
    };
    match archive::write_atomic(&config.auth_file, &body) {
        Ok(()) => debug!("saved session state to {}", config.auth_file.display()),
        Err(error) => warn!("could not save the session state: {error}"),
    }
}

async fn any_signed_in_marker(page: &dyn Page) -> bool {
    for &marker in SIGNED_IN_MARKERS {
        let handles = match page.query(marker).await {
            Ok(handles) => handles,
            Err(_) => continue,
        };
        for handle in handles {
            if page.is_visible(handle).await.unwrap_or(false) {
                debug!("found a signed-in marker: {marker}");
                return true;
            }
        }
    }
    false
}

/// First visible element matching any strategy, respecting labels.
async fn locate_first(page: &dyn Page, strategies: &[Locator]) -> Option<ElementHandle> {
    for locator in strategies {
        let handles = match page.query(locator.selector).await {
            Ok(handles) => handles,
            Err(error) => {
                debug!("query {:?} failed: {error}", locator.selector);
                continue;
            }
        };
        for handle in handles {
            if !page.is_visible(handle).await.unwrap_or(false) {
                continue;
            }
            if let Some(label) = locator.label {
                let text = page.text(handle).await.unwrap_or_default();
                if !text.to_lowercase().contains(label) {
                    continue;
                }
            }
            return Some(handle);
        }
    }
    None
}

/// Fill the first workable field from `candidates`, reading the value
/// back to confirm it stuck. Field contents are never logged.
async fn fill_field(
    page: &dyn Page,
    candidates: &[&str],
    value: &str,
) -> Option<ElementHandle> {
    for &selector in candidates {
        let handles = match page.query(selector).await {
            Ok(handles) => handles,
            Err(_) => continue,
        };
        for handle in handles {
            if !page.is_visible(handle).await.unwrap_or(false) {
                continue;
            }
            if let Err(error) = page.fill(handle, value).await {
                debug!("field {selector:?} would not take input: {error}");
                continue;
            }
            page.pause(FIELD_GRACE).await;
            match page.eval_on(handle, "function() { return this.value; }").await {
                Ok(Value::String(seen)) if seen == value => return Some(handle),
                Ok(_) => debug!("field {selector:?} did not keep the value"),
                Err(error) => debug!("could not read {selector:?} back: {error}"),
            }
        }
    }
    None
}

fn on_login_page(url: &str) -> bool {
    url.contains("sign_in") || url.to_lowercase().contains("login")
}

fn same_host(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a.host_str().is_some() && a.host_str() == b.host_str(),
        _ => false,
    }
}
