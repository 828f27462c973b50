//! Shape of the persisted capture file: exact key layout, naming, and
//! the load/persist roundtrip.

use assert_json_diff::assert_json_eq;
use chrono::{Local, TimeZone};
use magpie::archive::ThreadArchive;
use magpie::scrape::{CommentNode, PostContent};
use pretty_assertions::assert_eq;
use serde_json::json;

fn sample_archive() -> ThreadArchive {
    let scraped_at = Local
        .with_ymd_and_hms(2026, 8, 22, 14, 30, 11)
        .single()
        .expect("fixture timestamp is valid");
    ThreadArchive {
        url: "https://example.mn.co/posts/12345".to_string(),
        scraped_at,
        post: PostContent {
            title: "Focus check-in".to_string(),
            content: "<p>What did everyone ship?</p>".to_string(),
            author: "Ann Chen".to_string(),
            timestamp: "3d".to_string(),
            url: "https://example.mn.co/posts/12345".to_string(),
        },
        total_comments: 3,
        comments: vec![
            CommentNode {
                text: "<p>Shipped the importer.</p>".to_string(),
                author: "Bo".to_string(),
                timestamp: "2d".to_string(),
                replies: vec![CommentNode {
                    text: "<p>count me in</p>".to_string(),
                    author: "Reed".to_string(),
                    timestamp: "1d".to_string(),
                    replies: Vec::new(),
                }],
            },
            CommentNode {
                text: "<p>Closed the billing bug.</p>".to_string(),
                author: "Ann Chen".to_string(),
                timestamp: "2d".to_string(),
                replies: Vec::new(),
            },
        ],
    }
}

/// Assert the keys appear in the serialized text in the given order,
/// scanning forward from each hit.
fn assert_key_order(serialized: &str, keys: &[&str]) {
    let mut from = 0;
    for key in keys {
        let marker = format!("\"{key}\":");
        let at = serialized[from..]
            .find(&marker)
            .unwrap_or_else(|| panic!("{marker} missing after byte {from}"));
        from += at + marker.len();
    }
}

#[test]
fn test_capture_value_shape() {
    let archive = sample_archive();
    let expected = json!({
        "url": "https://example.mn.co/posts/12345",
        "scraped_at": serde_json::to_value(archive.scraped_at).unwrap(),
        "post": {
            "title": "Focus check-in",
            "content": "<p>What did everyone ship?</p>",
            "author": "Ann Chen",
            "timestamp": "3d",
            "url": "https://example.mn.co/posts/12345",
        },
        "total_comments": 3,
        "comments": [
            {
                "text": "<p>Shipped the importer.</p>",
                "author": "Bo",
                "timestamp": "2d",
                "replies": [
                    {
                        "text": "<p>count me in</p>",
                        "author": "Reed",
                        "timestamp": "1d",
                        "replies": [],
                    }
                ],
            },
            {
                "text": "<p>Closed the billing bug.</p>",
                "author": "Ann Chen",
                "timestamp": "2d",
                "replies": [],
            },
        ],
    });

    assert_json_eq!(serde_json::to_value(&archive).unwrap(), expected);
}

#[test]
fn test_capture_key_order_is_stable() {
    let serialized = serde_json::to_string(&sample_archive()).unwrap();

    assert_key_order(
        &serialized,
        &["url", "scraped_at", "post", "total_comments", "comments"],
    );
    assert_key_order(
        &serialized,
        &["post", "title", "content", "author", "timestamp", "url"],
    );
    assert_key_order(
        &serialized,
        &["comments", "text", "author", "timestamp", "replies"],
    );
}

#[test]
fn test_file_name_derives_from_capture() {
    let archive = sample_archive();
    assert_eq!(archive.file_name(), "20260822_143011_12345.json");
}

#[test]
fn test_persist_then_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let archive = sample_archive();

    let path = archive.persist(dir.path()).unwrap();
    let restored = ThreadArchive::load(&path).unwrap();

    assert_eq!(restored, archive);
    assert_eq!(
        path.file_name().and_then(|name| name.to_str()),
        Some("20260822_143011_12345.json")
    );
}

#[test]
fn test_new_counts_the_whole_forest() {
    let archive = ThreadArchive::new(
        "https://example.mn.co/posts/8?utm=x".to_string(),
        PostContent::default(),
        sample_archive().comments,
    );

    assert_eq!(archive.total_comments, 3);
    assert!(archive.file_name().ends_with("_8.json"));
}
