//! Thread capture: drive a logged-in page through expansion, snapshot
//! the DOM once, and turn it into a [`ThreadArchive`].

pub mod expand;
pub mod extract;
pub mod normalize;
pub mod selectors;
pub mod verify;

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::archive::ThreadArchive;
use crate::browser::Page;
use expand::ExpansionTuning;

/// Mighty renders threads into the page a beat after navigation
/// completes, so give it one before looking for anything.
const NAVIGATION_GRACE: Duration = Duration::from_secs(2);

/// One comment with its replies nested beneath it, to arbitrary depth.
/// Field order is the on-disk JSON order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    pub text: String,
    pub author: String,
    pub timestamp: String,
    #[serde(default)]
    pub replies: Vec<CommentNode>,
}

/// The post a thread hangs off. `url` is the resolved browser URL at
/// capture time, which can differ from the one requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContent {
    pub title: String,
    pub content: String,
    pub author: String,
    pub timestamp: String,
    pub url: String,
}

/// Count every comment in the forest, at all depths.
pub fn total_node_count(comments: &[CommentNode]) -> u64 {
    comments
        .iter()
        .map(|node| 1 + total_node_count(&node.replies))
        .sum()
}

/// Capture one thread end to end on an already-authenticated page:
/// navigate, expand until quiet, snapshot once, extract offline.
pub async fn capture_thread(
    page: &dyn Page,
    url: &str,
    tuning: &ExpansionTuning,
) -> Result<ThreadArchive> {
    info!("capturing thread {url}");
    page.navigate(url).await?;
    page.pause(NAVIGATION_GRACE).await;

    let state = expand::expand_thread(page, tuning).await;
    debug!("expansion finished after {} clicks", state.total_clicks());
    let _ = page.settle(tuning.idle_timeout).await;

    let snapshot = page
        .snapshot()
        .await
        .context("failed to snapshot the expanded page")?;
    let resolved = page
        .current_url()
        .await
        .unwrap_or_else(|_| url.to_string());

    // Parsing is CPU-bound, keep it off the async workers.
    let (post, comments, audit) = tokio::task::spawn_blocking(move || {
        let post = extract::post_content(&snapshot, &resolved);
        let comments = extract::comment_tree(&snapshot);
        let audit = verify::audit(verify::expected_total(&snapshot), total_node_count(&comments));
        (post, comments, audit)
    })
    .await
    .context("extraction task panicked")?;
    audit.log();

    Ok(ThreadArchive::new(url.to_string(), post, comments))
}
