//! Fragment normalizer: strips the interaction chrome the site bakes
//! into captured comment bodies, leaving only author-written markup.
//!
//! Normalization is idempotent. Running it over its own output changes
//! nothing, so fragments can be re-normalized on load without damage.

use std::sync::OnceLock;

use regex::Regex;

/// Visible labels of interaction controls, localized variants included.
/// An anchor whose entire trimmed text case-folds to one of these is
/// chrome, not content. Anchors merely containing a label ("more about
/// pricing") are content and stay.
const ACTION_LABELS: &[&str] = &[
    "reply", "delete", "edit", "more", "回复", "删除", "编辑", "更多",
];

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<a\b[^>]*>(.*?)</a>").expect("anchor regex is valid"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag regex is valid"))
}

fn empty_p_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<p[^>]*>\s*</p>").expect("empty-p regex is valid"))
}

fn empty_div_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<div[^>]*>\s*</div>").expect("empty-div regex is valid"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex is valid"))
}

/// Normalize one captured HTML fragment: drop action anchors, drop
/// blocks left empty by that, collapse whitespace runs to single
/// spaces, and trim. Returns the empty string for fragments with no
/// surviving content.
pub fn normalize_fragment(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let stripped = strip_action_anchors(html);
    let collapsed = drop_empty_blocks(&stripped);
    whitespace_re()
        .replace_all(&collapsed, " ")
        .trim()
        .to_string()
}

fn strip_action_anchors(html: &str) -> String {
    anchor_re()
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let label = tag_re().replace_all(&caps[1], "");
            if is_action_label(&label) {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

fn is_action_label(text: &str) -> bool {
    let folded = text.trim().to_lowercase();
    ACTION_LABELS.iter().any(|label| *label == folded)
}

/// Remove `<p>`/`<div>` pairs that contain only whitespace. Runs to a
/// fixed point so a wrapper emptied by removing its child goes too.
fn drop_empty_blocks(html: &str) -> String {
    let mut current = html.to_string();
    loop {
        let after_p = empty_p_re().replace_all(&current, "").into_owned();
        let pass = empty_div_re().replace_all(&after_p, "").into_owned();
        if pass == current {
            return pass;
        }
        current = pass;
    }
}
