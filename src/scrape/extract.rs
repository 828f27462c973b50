//! Snapshot extraction: turns one serialized document into the post
//! plus a recursive comment tree.
//!
//! Extraction is pure. The driver finishes expanding the live page,
//! takes a single snapshot, and everything below works on that string,
//! so a capture can be re-extracted offline bit-for-bit.

use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use super::selectors;
use super::{normalize, total_node_count, CommentNode, PostContent};

/// Post bodies shorter than this are assumed to be a hit on some other
/// element, not the actual content.
const MIN_POST_CONTENT_LEN: usize = 20;

/// Extract the comment forest from a document snapshot.
///
/// The structural root query is tried first; if site markup drifted
/// and it matches nothing, every list item in the comment region is
/// partitioned into roots (no enclosing list item) and replies.
pub fn comment_tree(document: &str) -> Vec<CommentNode> {
    let html = Html::parse_document(document);

    let roots: Vec<ElementRef<'_>> = html.select(&css(selectors::ROOT_ITEMS)).collect();
    if !roots.is_empty() {
        debug!("structural root query matched {} roots", roots.len());
        return roots.into_iter().filter_map(extract_node).collect();
    }

    let Some(region) = html.select(&css(selectors::COMMENT_REGION)).next() else {
        debug!("comment region missing from snapshot");
        return Vec::new();
    };
    let items: Vec<ElementRef<'_>> = region
        .select(&css("li"))
        .filter(|item| is_own(*item, region))
        .collect();
    info!(
        "structural root query missed, partitioned {} items by nesting",
        items.len()
    );
    items.into_iter().filter_map(extract_node).collect()
}

/// One comment item, recursing into the list items exactly one level
/// below it. Items whose body normalizes to nothing are dropped along
/// with their whole subtree.
fn extract_node(item: ElementRef<'_>) -> Option<CommentNode> {
    let text = normalize::normalize_fragment(&body_html(item));
    let author = field_text(item, selectors::COMMENT_AUTHOR);
    let timestamp = field_text(item, selectors::COMMENT_TIME);
    let replies: Vec<CommentNode> = child_items(item)
        .into_iter()
        .filter_map(extract_node)
        .collect();

    if text.is_empty() {
        if !replies.is_empty() {
            warn!(
                "dropping empty comment by {author:?} along with {} replies",
                total_node_count(&replies)
            );
        }
        return None;
    }

    Some(CommentNode {
        text,
        author,
        timestamp,
        replies,
    })
}

/// Extract the post the thread hangs off. Missing fields come back
/// empty rather than failing the capture.
pub fn post_content(document: &str, url: &str) -> PostContent {
    let html = Html::parse_document(document);
    PostContent {
        title: first_text(&html, selectors::POST_TITLE),
        content: first_html(&html, selectors::POST_CONTENT, MIN_POST_CONTENT_LEN),
        author: first_text(&html, selectors::POST_AUTHOR),
        timestamp: first_text(&html, selectors::POST_TIME),
        url: url.to_string(),
    }
}

/// This comment's own body: the first body element whose nearest
/// enclosing list item is the item itself, never one belonging to a
/// nested reply.
fn body_html(item: ElementRef<'_>) -> String {
    item.select(&css(selectors::COMMENT_BODY))
        .find(|body| is_own(*body, item))
        .map(|body| body.inner_html())
        .unwrap_or_default()
}

/// List items exactly one comment level below `item`: the reply list.
/// Deeper descendants have an intervening list item and are handled by
/// recursion; stray `<li>` from markup lists inside the body carry no
/// comment body and get dropped by the empty-text rule.
fn child_items<'a>(item: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    item.select(&css("li"))
        .filter(|child| is_own(*child, item))
        .collect()
}

/// True when walking up from `descendant` reaches `scope` before any
/// list item, i.e. the node belongs to this comment rather than to a
/// nested reply.
fn is_own(descendant: ElementRef<'_>, scope: ElementRef<'_>) -> bool {
    for node in descendant.ancestors() {
        if node.id() == scope.id() {
            return true;
        }
        if is_list_item(node) {
            return false;
        }
    }
    false
}

fn is_list_item(node: NodeRef<'_, Node>) -> bool {
    ElementRef::wrap(node).is_some_and(|element| element.value().name() == "li")
}

/// First candidate selector with an owned, non-empty match wins.
fn field_text(item: ElementRef<'_>, candidates: &[&str]) -> String {
    for selector in candidates {
        for found in item.select(&css(selector)) {
            if !is_own(found, item) {
                continue;
            }
            let text = collapse_text(found);
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

fn first_text(html: &Html, candidates: &[&str]) -> String {
    for selector in candidates {
        if let Some(element) = html.select(&css(selector)).next() {
            let text = collapse_text(element);
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

fn first_html(html: &Html, candidates: &[&str], min_len: usize) -> String {
    for selector in candidates {
        if let Some(element) = html.select(&css(selector)).next() {
            let content = element.inner_html().trim().to_string();
            if content.len() > min_len {
                return content;
            }
        }
    }
    String::new()
}

fn collapse_text(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn css(selector: &str) -> Selector {
    Selector::parse(selector).expect("selector is valid")
}
