//! Durable capture artifacts: the JSON document a thread capture
//! produces, plus the atomic file writer the rest of the crate uses.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::scrape::{total_node_count, CommentNode, PostContent};

/// One captured thread. Field order is the on-disk JSON order, and the
/// field names are load-bearing for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadArchive {
    pub url: String,
    pub scraped_at: DateTime<Local>,
    pub post: PostContent,
    pub total_comments: u64,
    pub comments: Vec<CommentNode>,
}

impl ThreadArchive {
    /// Stamp a fresh capture. `url` is the URL that was requested,
    /// which can differ from the resolved one recorded in `post`.
    pub fn new(url: String, post: PostContent, comments: Vec<CommentNode>) -> Self {
        Self {
            url,
            scraped_at: Local::now(),
            post,
            total_comments: total_node_count(&comments),
            comments,
        }
    }

    /// `{scraped_at}_{post_id}.json`. Deriving the stamp from
    /// `scraped_at` keeps the name and the payload in agreement.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.json",
            self.scraped_at.format("%Y%m%d_%H%M%S"),
            post_id(&self.url)
        )
    }

    /// Write the archive under `dir`, creating it if needed. Returns
    /// the path written.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        let body = serde_json::to_vec_pretty(self).context("failed to serialize the archive")?;
        write_atomic(&path, &body)?;
        info!(
            "archived {} comments to {}",
            self.total_comments,
            path.display()
        );
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a thread archive", path.display()))
    }
}

/// Last path segment of a thread URL with query and fragment stripped,
/// or `unknown` when the URL has no usable tail.
pub fn post_id(url: &str) -> String {
    let tail = url.rsplit('/').next().unwrap_or_default();
    let tail = tail.split('?').next().unwrap_or_default();
    let tail = tail.split('#').next().unwrap_or_default();
    if tail.is_empty() {
        "unknown".to_string()
    } else {
        tail.to_string()
    }
}

/// Write `bytes` to `path` through a temp file in the same directory,
/// so readers only ever see a complete file. Creates parent
/// directories as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    // Staging in the destination directory keeps the final rename on
    // one filesystem.
    let mut staged = NamedTempFile::new_in(&dir)
        .with_context(|| format!("failed to stage a file in {}", dir.display()))?;
    staged
        .write_all(bytes)
        .with_context(|| format!("failed to write staged data for {}", path.display()))?;
    staged
        .flush()
        .with_context(|| format!("failed to flush staged data for {}", path.display()))?;
    staged
        .as_file()
        .sync_all()
        .with_context(|| format!("failed to sync staged data for {}", path.display()))?;
    staged
        .persist(path)
        .map_err(|error| error.error)
        .with_context(|| format!("failed to move staged file into {}", path.display()))?;
    Ok(())
}
