//! Vault rendering: turn a [`ThreadArchive`] into an Obsidian note
//! with YAML frontmatter, the post body, and a numbered heading per
//! comment, plus localized media.
//!
//! Comment nesting maps to heading depth (capped at h6) with dotted
//! numbering carrying the structure past the cap, so the note outline
//! mirrors the reply tree.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Result;
use chrono::{Duration, Local, NaiveDate};
use futures::future::{BoxFuture, FutureExt};
use regex::Regex;
use tracing::info;

use crate::archive::{self, ThreadArchive};
use crate::media::MediaStore;
use crate::scrape::{CommentNode, PostContent};

/// Convert a site-relative timestamp like `2w` or `3d` into an
/// absolute `YYYY-MM-DD` date. Anything unparseable becomes today.
pub fn published_date(relative: &str) -> String {
    relative_to_date(relative, Local::now().date_naive())
        .format("%Y-%m-%d")
        .to_string()
}

fn relative_to_date(relative: &str, today: NaiveDate) -> NaiveDate {
    let trimmed = relative.trim().to_lowercase();
    let Some(caps) = relative_re().captures(&trimmed) else {
        return today;
    };
    let amount: i64 = caps[1].parse().unwrap_or(0);
    let days = match &caps[2] {
        "d" => amount,
        "w" => amount.saturating_mul(7),
        "m" => amount.saturating_mul(30),
        "y" => amount.saturating_mul(365),
        _ => 0,
    }
    .min(365_000);
    today
        .checked_sub_signed(Duration::days(days))
        .unwrap_or(today)
}

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)([dwmy])").expect("relative time regex is valid"))
}

/// Strip characters that break file names, collapse whitespace, and
/// cap the length. An empty result becomes `Untitled`.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|ch| !matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|ch| !ch.is_control())
        .collect();
    let mut cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() > 100 {
        cleaned = cleaned.chars().take(100).collect::<String>().trim_end().to_string();
    }
    if cleaned.is_empty() {
        "Untitled".to_string()
    } else {
        cleaned
    }
}

/// `YYYY-MM-DD - Title.md`, the vault's note naming convention.
pub fn note_file_name(title: &str, published: &str) -> String {
    format!("{published} - {}.md", sanitize_title(title))
}

/// The note's YAML frontmatter. The field set is fixed; empty fields
/// stay present so every note in the vault has the same shape.
pub fn frontmatter(post: &PostContent, url: &str) -> String {
    let title = post.title.trim();
    let title = yaml_quote(if title.is_empty() { "Untitled" } else { title });
    let author = post.author.trim();
    let published = published_date(&post.timestamp);
    format!(
        "---\n\
         title: {title}\n\
         source: {url}\n\
         author: {author}\n\
         published: {published}\n\
         summary:\n\
         tags:\n\
         \x20 - t-clipping\n\
         \x20 - mighty_import\n\
         updated:\n\
         status: inbox\n\
         insight:\n\
         aliases:\n\
         ---\n\n"
    )
}

fn yaml_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// HTML fragment to Markdown. Hashtag and mention chips link back
/// into the community, which a vault reader cannot follow; they are
/// unwrapped to their text before conversion.
pub fn to_markdown(fragment: &str) -> String {
    if fragment.trim().is_empty() {
        return String::new();
    }
    let cleaned = strip_network_anchors(fragment);
    collapse_blank_lines(&html2md::parse_html(&cleaned))
}

fn strip_network_anchors(fragment: &str) -> String {
    let pass = chip_anchor_re().replace_all(fragment, "$1");
    member_link_re().replace_all(&pass, "$1").into_owned()
}

fn chip_anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<a\b[^>]*\bclass="[^"]*mighty-(?:hashtag|mention)[^"]*"[^>]*>(.*?)</a>"#)
            .expect("chip anchor regex is valid")
    })
}

fn member_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<a\b[^>]*\bhref="[^"]*/(?:members|spaces|hashtags)/[^"]*"[^>]*>(.*?)</a>"#)
            .expect("member link regex is valid")
    })
}

fn collapse_blank_lines(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut prev_empty = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !prev_empty {
                lines.push("");
                prev_empty = true;
            }
        } else {
            lines.push(line);
            prev_empty = false;
        }
    }
    lines.join("\n").trim().to_string()
}

/// Render a fully-localized archive into the note text.
pub fn note_markdown(archive: &ThreadArchive) -> String {
    let mut note = frontmatter(&archive.post, &archive.url);

    let title = archive.post.title.trim();
    note.push_str("# ");
    note.push_str(if title.is_empty() { "Untitled" } else { title });
    note.push('\n');

    let content = to_markdown(&archive.post.content);
    if !content.is_empty() {
        note.push('\n');
        note.push_str(&content);
        note.push('\n');
    }

    if !archive.comments.is_empty() {
        note.push_str(&format!("\n## Comments ({})\n", archive.total_comments));
        for (index, comment) in archive.comments.iter().enumerate() {
            note.push_str(&comment_section(comment, &(index + 1).to_string(), 0));
        }
    }
    note
}

fn comment_section(comment: &CommentNode, numbering: &str, depth: usize) -> String {
    let hashes = "#".repeat((3 + depth).min(6));
    let author = comment.author.trim();
    let author = if author.is_empty() { "Anonymous" } else { author };
    let mut section = format!("\n{hashes} {numbering}. {author}\n");

    let stamp = comment.timestamp.trim();
    if !stamp.is_empty() {
        section.push_str(&format!("*{stamp}*\n"));
    }
    let body = to_markdown(&comment.text);
    if !body.is_empty() {
        section.push('\n');
        section.push_str(&body);
        section.push('\n');
    }
    for (index, reply) in comment.replies.iter().enumerate() {
        let child = format!("{numbering}.{}", index + 1);
        section.push_str(&comment_section(reply, &child, depth + 1));
    }
    section
}

/// Localize every fragment's media, then render. A failed download
/// leaves the remote source in place; the note is still complete.
pub async fn render_note(archive: &ThreadArchive, media: &MediaStore) -> String {
    let base = if archive.post.url.trim().is_empty() {
        archive.url.as_str()
    } else {
        archive.post.url.as_str()
    };

    let mut localized = archive.clone();
    localized.post.content = media.localize(&archive.post.content, base).await;
    localized.comments = localize_comments(media, &archive.comments, base).await;
    note_markdown(&localized)
}

fn localize_comments<'a>(
    media: &'a MediaStore,
    comments: &'a [CommentNode],
    base: &'a str,
) -> BoxFuture<'a, Vec<CommentNode>> {
    async move {
        let mut out = Vec::with_capacity(comments.len());
        for comment in comments {
            out.push(CommentNode {
                text: media.localize(&comment.text, base).await,
                author: comment.author.clone(),
                timestamp: comment.timestamp.clone(),
                replies: localize_comments(media, &comment.replies, base).await,
            });
        }
        out
    }
    .boxed()
}

/// Render and write the note into the articles directory.
pub async fn write_note(
    archive: &ThreadArchive,
    media: &MediaStore,
    articles_dir: &Path,
) -> Result<PathBuf> {
    let note = render_note(archive, media).await;
    let published = published_date(&archive.post.timestamp);
    let path = articles_dir.join(note_file_name(&archive.post.title, &published));
    archive::write_atomic(&path, note.as_bytes())?;
    info!("wrote vault note {}", path.display());
    Ok(path)
}
