//! Media localization: download the images a captured fragment
//! references into the shared attachments directory and rewrite the
//! fragment to point at them. Assets are named by content hash, so an
//! image referenced from ten comments is stored exactly once.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::archive;
use crate::browser::USER_AGENT;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: u32 = 2;

/// Downloads and stores attachments for one run. Shared across every
/// note in a batch so the URL cache spans the whole conversion.
pub struct MediaStore {
    client: reqwest::Client,
    dir: PathBuf,
    /// Remote URL to stored file name, for URLs already fetched.
    seen: Mutex<HashMap<String, String>>,
}

impl MediaStore {
    pub fn new(dir: PathBuf) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            dir,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Localize every downloadable image in `fragment`, resolving
    /// relative references against `base_url`. A failed download keeps
    /// the remote source; the note is still written.
    pub async fn localize(&self, fragment: &str, base_url: &str) -> String {
        if fragment.trim().is_empty() {
            return fragment.to_string();
        }
        let sources = collect_sources(fragment);
        if sources.is_empty() {
            return fragment.to_string();
        }

        let mut mapping = HashMap::new();
        for raw in sources {
            let unescaped = unescape_attr(&raw);
            let Some(absolute) = resolve_url(base_url, &unescaped) else {
                debug!("skipping unresolvable image source {raw:?}");
                continue;
            };
            match self.attach(&absolute).await {
                Ok(name) => {
                    mapping.insert(raw, format!("../attachments/{name}"));
                }
                Err(error) => {
                    warn!("image download failed for {absolute}, keeping the remote source: {error}");
                }
            }
        }
        if mapping.is_empty() {
            return fragment.to_string();
        }
        rewrite_sources(fragment, &mapping)
    }

    /// Fetch one URL into the store, reusing the cached name when this
    /// run has already fetched it. Returns the stored file name.
    async fn attach(&self, url: &str) -> Result<String> {
        if let Some(name) = self.seen.lock().await.get(url) {
            return Ok(name.clone());
        }

        let (bytes, content_type) = self.fetch(url).await?;
        let name = asset_name(&bytes, extension_for(content_type.as_deref(), url));
        let path = self.dir.join(&name);
        if path.exists() {
            debug!("asset {name} already stored");
        } else {
            archive::write_atomic(&path, &bytes)?;
            debug!("stored attachment {name} ({} bytes)", bytes.len());
        }

        self.seen.lock().await.insert(url.to_string(), name.clone());
        Ok(name)
    }

    /// GET with a small retry budget: exponential backoff on server
    /// errors, Retry-After on rate limits.
    async fn fetch(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let mut retries = 0u32;
        loop {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let content_type = response
                            .headers()
                            .get(CONTENT_TYPE)
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_string);
                        let bytes = response
                            .bytes()
                            .await
                            .context("failed to read the image body")?;
                        return Ok((bytes.to_vec(), content_type));
                    }
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS && retries < MAX_RETRIES {
                        retries += 1;
                        let wait = response
                            .headers()
                            .get(RETRY_AFTER)
                            .and_then(|value| value.to_str().ok())
                            .and_then(|value| value.parse::<u64>().ok())
                            .unwrap_or(2)
                            .min(10);
                        debug!("rate limited on {url}, backing off {wait}s");
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                        continue;
                    }
                    if status.is_server_error() && retries < MAX_RETRIES {
                        retries += 1;
                        debug!("server error {status} on {url}, retrying");
                        tokio::time::sleep(backoff(retries)).await;
                        continue;
                    }
                    bail!("image request failed with {status}");
                }
                Err(error) if retries < MAX_RETRIES => {
                    retries += 1;
                    debug!("request for {url} failed ({error}), retrying");
                    tokio::time::sleep(backoff(retries)).await;
                }
                Err(error) => return Err(error).context("image request failed"),
            }
        }
    }
}

fn backoff(retries: u32) -> Duration {
    Duration::from_millis(500 * 2u64.pow(retries.saturating_sub(1)))
}

fn img_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Browser-serialized markup quotes attributes with double quotes.
    // The mandatory whitespace keeps `data-src` from matching.
    RE.get_or_init(|| {
        Regex::new(r#"(?is)(<img\b[^>]*?\ssrc\s*=\s*")([^"]*)(")"#)
            .expect("img src regex is valid")
    })
}

/// Distinct `src` values exactly as written in the fragment.
fn collect_sources(fragment: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    img_src_re()
        .captures_iter(fragment)
        .map(|caps| caps[2].to_string())
        .filter(|src| seen.insert(src.clone()))
        .collect()
}

fn rewrite_sources(fragment: &str, mapping: &HashMap<String, String>) -> String {
    img_src_re()
        .replace_all(fragment, |caps: &regex::Captures<'_>| {
            match mapping.get(&caps[2]) {
                Some(local) => format!("{}{}{}", &caps[1], local, &caps[3]),
                None => caps[0].to_string(),
            }
        })
        .to_string()
}

/// Resolve an image reference against the page URL. Anchors, inline
/// data and script URLs are not downloadable.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("data:")
        || href.starts_with("javascript:")
    {
        return None;
    }
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|url| url.to_string())
}

/// `{16 hex chars of sha256}.{ext}`. The hash is over the bytes, so
/// the same image under two URLs still collapses to one file.
fn asset_name(bytes: &[u8], ext: &'static str) -> String {
    let digest = Sha256::digest(bytes);
    let mut name = String::with_capacity(16 + 1 + ext.len());
    for byte in digest.iter().take(8) {
        let _ = write!(name, "{byte:02x}");
    }
    name.push('.');
    name.push_str(ext);
    name
}

/// Content-Type first, URL extension second, `.jpg` as the last
/// resort.
fn extension_for(content_type: Option<&str>, url: &str) -> &'static str {
    if let Some(kind) = content_type {
        if kind.contains("image/jpeg") || kind.contains("image/jpg") {
            return "jpg";
        }
        if kind.contains("image/png") {
            return "png";
        }
        if kind.contains("image/gif") {
            return "gif";
        }
        if kind.contains("image/webp") {
            return "webp";
        }
        if kind.contains("image/svg") {
            return "svg";
        }
    }
    if let Ok(parsed) = Url::parse(url) {
        let path = parsed.path().to_ascii_lowercase();
        for ext in ["jpg", "jpeg", "png", "gif", "webp", "svg"] {
            if path.ends_with(&format!(".{ext}")) {
                return if ext == "jpeg" { "jpg" } else { ext };
            }
        }
    }
    "jpg"
}

fn unescape_attr(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
