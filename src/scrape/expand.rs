//! Expansion driver: clicks through "Previous Comments" pagination and
//! "more" truncation links until the thread stops growing.
//!
//! UI-loop discipline: every loop is iteration-capped, every action is
//! individually fallible without aborting the pass, and progress is
//! measured between rounds so a wedged page exits early instead of
//! burning the whole cap.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::selectors::{self, Locator};
use crate::browser::{ElementHandle, Page};

/// Budget for the first, trusted click attempt on a control.
const CLICK_TIMEOUT: Duration = Duration::from_secs(3);

/// Caps and delays for one expansion run.
#[derive(Debug, Clone, Copy)]
pub struct ExpansionTuning {
    pub pagination_rounds: u32,
    pub expansion_rounds: u32,
    /// Consecutive identical-looking rounds tolerated before giving up.
    pub stall_rounds: u32,
    /// Extra pagination+expansion cycles after the main loops settle.
    pub reconvergence_passes: u32,
    pub settle_delay: Duration,
    pub pre_click_delay: Duration,
    pub expand_delay: Duration,
    pub idle_timeout: Duration,
    pub prime_pause: Duration,
}

impl Default for ExpansionTuning {
    fn default() -> Self {
        Self {
            pagination_rounds: 10,
            expansion_rounds: 8,
            stall_rounds: 3,
            reconvergence_passes: 2,
            settle_delay: Duration::from_millis(500),
            pre_click_delay: Duration::from_millis(500),
            expand_delay: Duration::from_millis(1500),
            idle_timeout: Duration::from_secs(10),
            prime_pause: Duration::from_millis(1000),
        }
    }
}

/// Progress of one expansion run, passed into and returned from each
/// loop so nothing accumulates in hidden shared state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionState {
    pub pagination_clicks: u64,
    pub expansion_clicks: u64,
    /// Visible truncation links seen in the previous expansion round.
    pub last_visible: Option<usize>,
    /// Consecutive expansion rounds with an unchanged visible count.
    pub stalled_rounds: u32,
}

impl ExpansionState {
    pub fn total_clicks(&self) -> u64 {
        self.pagination_clicks + self.expansion_clicks
    }
}

/// Which click strategy landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMethod {
    Pointer,
    Scripted,
    Synthetic,
}

/// Run the full expansion pass against an already-loaded thread page:
/// prime lazy loading, drain pagination, expand truncated bodies, then
/// re-run bounded convergence cycles because a loaded batch can reveal
/// new truncation links and vice versa.
pub async fn expand_thread(page: &dyn Page, tuning: &ExpansionTuning) -> ExpansionState {
    prime_lazy_loading(page, tuning).await;

    let mut state = ExpansionState::default();
    state = pagination_pass(page, tuning, state).await;
    state = expansion_pass(page, tuning, tuning.expansion_rounds, state).await;

    let follow_up_rounds = tuning.expansion_rounds.min(3);
    for pass in 0..tuning.reconvergence_passes {
        let before = state.total_clicks();
        if pass > 0 {
            prime_lazy_loading(page, tuning).await;
        }
        let pagination_before = state.pagination_clicks;
        state = pagination_pass(page, tuning, state).await;
        if state.pagination_clicks > pagination_before {
            state = expansion_pass(page, tuning, follow_up_rounds, state).await;
        }
        if state.total_clicks() == before {
            debug!("thread stopped growing (pass {pass})");
            break;
        }
    }

    info!(
        "expansion settled: pagination={}, expansions={}",
        state.pagination_clicks, state.expansion_clicks
    );
    state
}

/// Click every visible "Previous Comments" control, round after round,
/// until a round finds none or clicks nothing.
async fn pagination_pass(
    page: &dyn Page,
    tuning: &ExpansionTuning,
    mut state: ExpansionState,
) -> ExpansionState {
    for round in 0..tuning.pagination_rounds {
        let controls = locate_visible(page, selectors::PREVIOUS_BATCH).await;
        if controls.is_empty() {
            debug!("round {round}: no pagination controls visible");
            break;
        }

        let mut clicked = 0u64;
        for control in controls {
            if let Err(error) = page.scroll_into_view(control).await {
                debug!("pagination control would not scroll into view: {error}");
            }
            page.pause(tuning.pre_click_delay).await;
            match page.click(control).await {
                Ok(()) => {
                    clicked += 1;
                    state.pagination_clicks += 1;
                    page.pause(tuning.expand_delay).await;
                }
                Err(error) => warn!("failed to click a pagination control: {error}"),
            }
        }

        if clicked == 0 {
            debug!("pagination round {round} clicked nothing, stopping");
            break;
        }
        debug!("round {round}: loaded {clicked} earlier comment batches");
        let _ = page.settle(tuning.idle_timeout).await;
        page.pause(tuning.settle_delay).await;
    }
    state
}

/// Expand visible "more" truncation links for up to `rounds` rounds.
/// Exits early when none are visible, when a round clicks nothing, or
/// when the visible count repeats often enough to call it a stall.
async fn expansion_pass(
    page: &dyn Page,
    tuning: &ExpansionTuning,
    rounds: u32,
    mut state: ExpansionState,
) -> ExpansionState {
    state.last_visible = None;
    state.stalled_rounds = 0;

    for round in 0..rounds {
        let links = locate_visible(page, selectors::TRUNCATED_MORE).await;
        if links.is_empty() {
            debug!("round {round}: no truncation links visible");
            break;
        }

        if state.last_visible == Some(links.len()) {
            state.stalled_rounds += 1;
            if state.stalled_rounds >= tuning.stall_rounds {
                warn!(
                    "expansion stalled at round {round}, {} visible links are not moving",
                    links.len()
                );
                break;
            }
        } else {
            state.stalled_rounds = 0;
            state.last_visible = Some(links.len());
        }

        let mut clicked = 0u64;
        for link in links {
            if let Err(error) = page.scroll_into_view(link).await {
                debug!("truncation link would not scroll into view: {error}");
            }
            page.pause(tuning.pre_click_delay).await;
            match cascade_click(page, link).await {
                Ok(method) => {
                    clicked += 1;
                    state.expansion_clicks += 1;
                    debug!("expanded a truncated body via {method:?}");
                    page.pause(tuning.expand_delay).await;
                }
                Err(error) => {
                    warn!("every click strategy failed on a truncation link: {error}");
                }
            }
        }

        if clicked == 0 {
            debug!("expansion round {round} clicked nothing, stopping");
            break;
        }
        page.pause(tuning.settle_delay).await;
    }
    state
}

/// First locate strategy yielding anything wins. Kept elements must be
/// visible, and where the strategy carries a label their text must
/// contain it (case-insensitive).
async fn locate_visible(page: &dyn Page, strategies: &[Locator]) -> Vec<ElementHandle> {
    for locator in strategies {
        let handles = match page.query(locator.selector).await {
            Ok(handles) => handles,
            Err(error) => {
                debug!("query {:?} failed: {error}", locator.selector);
                continue;
            }
        };
        if handles.is_empty() {
            continue;
        }

        let mut kept = Vec::new();
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
            kept.push(handle);
        }
        if !kept.is_empty() {
            return kept;
        }
    }
    Vec::new()
}

/// Click strategies in descending order of fidelity. The pointer click
/// fails on overlapped controls, `element.click()` fails when a
/// handler swallows it, and the synthetic event is the last resort.
async fn cascade_click(page: &dyn Page, link: ElementHandle) -> Result<ClickMethod> {
    match tokio::time::timeout(CLICK_TIMEOUT, page.click(link)).await {
        Ok(Ok(())) => return Ok(ClickMethod::Pointer),
        Ok(Err(error)) => debug!("pointer click failed ({error}), trying scripted click"),
        Err(_) => debug!("pointer click timed out, trying scripted click"),
    }
    match page.click_scripted(link).await {
        Ok(()) => return Ok(ClickMethod::Scripted),
        Err(error) => debug!("scripted click failed ({error}), trying synthetic event"),
    }
    page.dispatch_click(link)
        .await
        .context("synthetic click event failed")?;
    Ok(ClickMethod::Synthetic)
}

/// Pre-pass: poke the page until the virtualized comment list actually
/// materializes. Scroll the drawer into view, nudge the viewport, jump
/// the drawer to its end and back, then toggle zoom, which reliably
/// forces a re-layout. Everything here is best-effort.
async fn prime_lazy_loading(page: &dyn Page, tuning: &ExpansionTuning) {
    if let Ok(regions) = page.query(selectors::COMMENT_REGION).await {
        if let Some(&region) = regions.first() {
            let _ = page.scroll_into_view(region).await;
        }
    }
    page.pause(tuning.prime_pause).await;

    for _ in 0..3 {
        let _ = page
            .eval("(() => { window.scrollBy(0, 300); return true; })()")
            .await;
        page.pause(tuning.prime_pause * 3 / 2).await;
    }

    let jump_to_end = format!(
        "(() => {{ \
             const region = document.querySelector('{}'); \
             if (region) {{ region.scrollTop = region.scrollHeight; }} \
             return true; \
         }})()",
        selectors::COMMENT_REGION
    );
    let _ = page.eval(&jump_to_end).await;
    page.pause(tuning.prime_pause * 2).await;

    let jump_to_top = format!(
        "(() => {{ \
             const region = document.querySelector('{}'); \
             if (region) {{ region.scrollTop = 0; }} \
             return true; \
         }})()",
        selectors::COMMENT_REGION
    );
    let _ = page.eval(&jump_to_top).await;
    page.pause(tuning.prime_pause).await;

    for zoom in ["0.9", "1.0"] {
        let script = format!("(() => {{ document.body.style.zoom = '{zoom}'; return true; }})()");
        let _ = page.eval(&script).await;
        page.pause(tuning.prime_pause).await;
    }
}
