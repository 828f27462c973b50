//! `magpie scrape`: capture one or more discussion threads into JSON
//! archives, optionally rendering vault notes in the same run.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use crate::browser::{BrowserHandle, ChromiumPage};
use crate::config::Config;
use crate::media::MediaStore;
use crate::scrape::expand::ExpansionTuning;
use crate::{scrape, session, vault};

pub async fn run(mut urls: Vec<String>, urls_file: Option<&Path>, to_vault: bool) -> Result<()> {
    if let Some(path) = urls_file {
        urls.extend(read_urls_file(path)?);
    }
    if urls.is_empty() {
        bail!("nothing to scrape, pass thread URLs or --urls-file");
    }

    let config = Config::load();
    config.validate()?;

    let browser = BrowserHandle::launch(&config).await?;
    let result = scrape_all(&browser, &config, &urls, to_vault).await;

    // Report the capture outcome even when shutdown is messy.
    if let Err(error) = browser.close().await {
        warn!("browser did not shut down cleanly: {error}");
    }
    result
}

async fn scrape_all(
    browser: &BrowserHandle,
    config: &Config,
    urls: &[String],
    to_vault: bool,
) -> Result<()> {
    let page = browser.new_page().await?;
    session::establish(&page, config).await?;

    let tuning = config.expansion_tuning();
    let media = MediaStore::new(config.attachments_dir());
    let mut captured = 0usize;

    for url in urls {
        match capture_one(&page, config, &tuning, &media, url, to_vault).await {
            Ok(()) => captured += 1,
            Err(error) => error!("capture of {url} failed: {error:#}"),
        }
    }

    if captured == 0 {
        bail!("every capture failed");
    }
    info!("scrape finished: {captured}/{} threads captured", urls.len());
    Ok(())
}

async fn capture_one(
    page: &ChromiumPage,
    config: &Config,
    tuning: &ExpansionTuning,
    media: &MediaStore,
    url: &str,
    to_vault: bool,
) -> Result<()> {
    let archive = scrape::capture_thread(page, url, tuning).await?;
    let path = archive.persist(&config.output_dir)?;
    println!(
        "Captured {} comments from {url}",
        archive.total_comments
    );
    println!("  -> {}", path.display());

    if to_vault {
        let note = vault::write_note(&archive, media, &config.articles_dir()).await?;
        println!("  -> {}", note.display());
    }
    Ok(())
}

/// One URL per line. Blank lines and `#` comments are skipped.
fn read_urls_file(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
