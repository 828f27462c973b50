//! Snapshot extraction against realistic thread markup, plus the full
//! capture path from a scripted page to a finished archive.

mod common;

use common::{SimElement, SimPage, SimPhase};
use magpie::scrape::expand::ExpansionTuning;
use magpie::scrape::extract::{comment_tree, post_content};
use magpie::scrape::selectors::PREVIOUS_BATCH;
use magpie::scrape::{capture_thread, total_node_count};

const THREAD_URL: &str = "https://example.mn.co/posts/941";

// ── Fixture builders ──

fn comment_li(author: &str, body: &str, replies: &str) -> String {
    format!(
        r#"<li>
            <div class="comment-author">{author}</div>
            <span class="timestamp">2d</span>
            <div class="comment-body">{body}</div>
            {replies}
        </li>"#
    )
}

fn replies_list(items: &str) -> String {
    format!("<ul>{items}</ul>")
}

/// A two-wide subtree of the given depth under each node.
fn subtree(prefix: &str, depth: usize) -> String {
    if depth == 0 {
        return String::new();
    }
    let children: String = (1..=2)
        .map(|index| {
            let name = format!("{prefix}.{index}");
            comment_li(
                &name,
                &format!("<p>note from {name}</p>"),
                &subtree(&name, depth - 1),
            )
        })
        .collect();
    replies_list(&children)
}

fn thread_document(tally: &str, items: &str) -> String {
    format!(
        r#"<html><body>
        <div id="detail-layout"><div class="detail-layout-content-wrapper">
            <div class="detail-layout-title">Focus check-in</div>
            <div class="detail-layout-description mighty-wysiwyg-content mighty-max-content-width fr-view">
                <p>What did everyone ship this week? Tell us below.</p>
            </div>
        </div></div>
        <span class="post-author">Ann Chen</span>
        <span class="post-time">3d</span>
        <div id="flyout-right-drawer-region"><div class="comments-sidebar-layout">
            <div class="comment-sidebar-header"><div class="comment-count">{tally}</div></div>
        </div></div>
        <div id="sidebar-comments-region"><div><div class="comments-region">
            <ul>{items}</ul>
        </div></div></div>
        </body></html>"#
    )
}

// ── Pure extraction ──

#[test]
fn test_deep_tree_keeps_every_level() {
    // Two roots, each two children, each two grandchildren: 14 nodes.
    let items: String = (1..=2)
        .map(|index| {
            let name = format!("c{index}");
            comment_li(&name, &format!("<p>note from {name}</p>"), &subtree(&name, 2))
        })
        .collect();
    let document = thread_document("14 comments", &items);

    let tree = comment_tree(&document);

    assert_eq!(tree.len(), 2);
    assert_eq!(total_node_count(&tree), 14);
    assert_eq!(tree[0].author, "c1");
    assert_eq!(tree[0].replies.len(), 2);
    assert_eq!(tree[0].replies[1].author, "c1.2");
    assert_eq!(tree[0].replies[1].replies.len(), 2);
    assert!(tree[0].replies[1].replies[0].replies.is_empty());
    assert!(tree[1].replies[0].text.contains("note from c2.1"));
}

#[test]
fn test_drifted_markup_partitions_by_nesting() {
    // The structural root path is gone; roots are told apart from
    // replies purely by list-item nesting.
    let reply = comment_li("Reed", "<p>agreed</p>", "");
    let document = format!(
        r#"<html><body>
        <div id="sidebar-comments-region"><section><ul>
            {root_one}
            {root_two}
        </ul></section></div>
        </body></html>"#,
        root_one = comment_li("Ann", "<p>first</p>", &replies_list(&reply)),
        root_two = comment_li("Bo", "<p>second</p>", ""),
    );

    let tree = comment_tree(&document);

    assert_eq!(tree.len(), 2);
    assert_eq!(total_node_count(&tree), 3);
    assert_eq!(tree[0].replies.len(), 1);
    assert_eq!(tree[0].replies[0].author, "Reed");
    assert!(tree[1].replies.is_empty());
}

#[test]
fn test_blank_comment_drops_its_subtree() {
    let orphan = comment_li("Reed", "<p>reply under a blank parent</p>", "");
    let items = format!(
        "{}{}",
        comment_li("Ghost", "<p>  </p>", &replies_list(&orphan)),
        comment_li("Ann", "<p>still here</p>", ""),
    );
    let document = thread_document("3 comments", &items);

    let tree = comment_tree(&document);

    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].author, "Ann");
    assert_eq!(total_node_count(&tree), 1);
}

#[test]
fn test_post_extracted_alongside_comments() {
    let document = thread_document("1 comment", &comment_li("Bo", "<p>hi</p>", ""));

    let post = post_content(&document, THREAD_URL);

    assert_eq!(post.title, "Focus check-in");
    assert!(post.content.contains("ship this week"));
    assert_eq!(post.author, "Ann Chen");
    assert_eq!(post.timestamp, "3d");
    assert_eq!(post.url, THREAD_URL);
}

// ── Full capture path ──

#[tokio::test]
async fn test_capture_thread_end_to_end() {
    let reply = comment_li("Reed", "<p>count me in</p>", "");
    let items = format!(
        "{}{}",
        comment_li(
            "Ann Chen",
            r##"<p>Shipped the importer.</p><a href="#">Reply</a>"##,
            &replies_list(&reply),
        ),
        comment_li("Bo", "<p>Closed out the billing bug.</p>", ""),
    );
    // The tally advertises one more comment than the page holds; the
    // audit reports the shortfall but the capture still lands.
    let document = thread_document("4 comments", &items);
    let page = SimPage::new(vec![SimPhase::new(THREAD_URL).document(&document)]);

    let archive = capture_thread(&page, THREAD_URL, &ExpansionTuning::default())
        .await
        .unwrap();

    assert_eq!(archive.url, THREAD_URL);
    assert_eq!(archive.post.title, "Focus check-in");
    assert_eq!(archive.post.url, THREAD_URL);
    assert_eq!(archive.total_comments, 3);
    assert_eq!(archive.comments.len(), 2);
    assert_eq!(archive.comments[0].replies.len(), 1);
    assert!(archive.comments[0].text.contains("Shipped the importer."));
    assert!(!archive.comments[0].text.contains("Reply"));
    assert!(archive.file_name().ends_with("_941.json"));
}

#[tokio::test]
async fn test_capture_snapshots_after_expansion() {
    // The thread starts with a hidden batch; only the post-click phase
    // holds the comments, so they only appear if expansion ran first.
    let bare = thread_document("2 comments", "");
    let full = thread_document(
        "2 comments",
        &format!(
            "{}{}",
            comment_li("Ann", "<p>early comment</p>", ""),
            comment_li("Bo", "<p>late comment</p>", ""),
        ),
    );
    let page = SimPage::new(vec![
        SimPhase::new(THREAD_URL)
            .document(&bare)
            .element(SimElement::new(9, &[PREVIOUS_BATCH[0].selector]).text("Previous Comments")),
        SimPhase::new(THREAD_URL).document(&full),
    ]);

    let archive = capture_thread(&page, THREAD_URL, &ExpansionTuning::default())
        .await
        .unwrap();

    assert_eq!(page.clicks(), vec!["pointer:9"]);
    assert_eq!(archive.total_comments, 2);
    assert!(archive.comments[1].text.contains("late comment"));
}
