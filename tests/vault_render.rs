//! Vault note rendering: frontmatter, heading layout, comment
//! numbering, and media rewriting through the full note pipeline.

use magpie::archive::ThreadArchive;
use magpie::media::MediaStore;
use magpie::scrape::{CommentNode, PostContent};
use magpie::vault::{note_markdown, write_note};
use regex::Regex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn comment(text: &str, author: &str, replies: Vec<CommentNode>) -> CommentNode {
    CommentNode {
        text: text.to_string(),
        author: author.to_string(),
        timestamp: "2d".to_string(),
        replies,
    }
}

fn sample_archive() -> ThreadArchive {
    let url = "https://example.mn.co/posts/12345".to_string();
    ThreadArchive::new(
        url.clone(),
        PostContent {
            title: "Focus check-in".to_string(),
            content: "<p>What did everyone ship?</p>".to_string(),
            author: "Ann Chen".to_string(),
            timestamp: "3d".to_string(),
            url,
        },
        vec![
            comment(
                "<p>Shipped the importer.</p>",
                "Bo",
                vec![comment("<p>count me in</p>", "Reed", Vec::new())],
            ),
            comment("<p>Closed the billing bug.</p>", "Ann Chen", Vec::new()),
        ],
    )
}

#[test]
fn test_note_layout() {
    let note = note_markdown(&sample_archive());

    assert!(note.starts_with("---\n"));
    assert!(note.contains("title: \"Focus check-in\"\n"));
    assert!(note.contains("source: https://example.mn.co/posts/12345\n"));
    assert!(note.contains("author: Ann Chen\n"));
    assert!(note.contains("  - t-clipping\n"));
    assert!(note.contains("status: inbox\n"));

    let published = Regex::new(r"published: \d{4}-\d{2}-\d{2}\n").unwrap();
    assert!(published.is_match(&note));

    assert!(note.contains("# Focus check-in\n"));
    assert!(note.contains("What did everyone ship?"));
    assert!(note.contains("## Comments (3)\n"));
    assert!(note.contains("### 1. Bo\n"));
    assert!(note.contains("#### 1.1. Reed\n"));
    assert!(note.contains("### 2. Ann Chen\n"));
    assert!(note.contains("Shipped the importer."));
    assert!(note.contains("*2d*\n"));
}

#[test]
fn test_anonymous_and_unstamped_comments_render() {
    let mut archive = sample_archive();
    archive.comments = vec![CommentNode {
        text: "<p>quietly posted</p>".to_string(),
        author: String::new(),
        timestamp: String::new(),
        replies: Vec::new(),
    }];

    let note = note_markdown(&archive);

    assert!(note.contains("### 1. Anonymous\n"));
    assert!(!note.contains("**\n"));
    assert!(note.contains("quietly posted"));
}

#[tokio::test]
async fn test_write_note_lands_in_articles() {
    let dir = tempfile::tempdir().unwrap();
    let articles = dir.path().join("articles");
    let store = MediaStore::new(dir.path().join("attachments"));

    let written = write_note(&sample_archive(), &store, &articles)
        .await
        .unwrap();

    assert_eq!(written.parent(), Some(articles.as_path()));
    let name = written.file_name().and_then(|name| name.to_str()).unwrap();
    let pattern = Regex::new(r"^\d{4}-\d{2}-\d{2} - Focus check-in\.md$").unwrap();
    assert!(pattern.is_match(name), "unexpected note name: {name}");

    let body = std::fs::read_to_string(&written).unwrap();
    assert!(body.contains("## Comments (3)"));
}

#[tokio::test]
async fn test_images_in_post_and_replies_are_localized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shot.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(&[0x89u8, b'P', b'N', b'G', 9, 9][..]),
        )
        .mount(&server)
        .await;

    let mut archive = sample_archive();
    archive.post.url = format!("{}/posts/12345", server.uri());
    archive.post.content = format!(r#"<p>before</p><img src="{}/shot.png">"#, server.uri());
    archive.comments = vec![comment(
        "<p>root</p>",
        "Bo",
        vec![comment(
            &format!(r#"<p>nested</p><img src="{}/shot.png">"#, server.uri()),
            "Reed",
            Vec::new(),
        )],
    )];

    let dir = tempfile::tempdir().unwrap();
    let articles = dir.path().join("articles");
    let attachments = dir.path().join("attachments");
    let store = MediaStore::new(attachments.clone());

    let written = write_note(&archive, &store, &articles).await.unwrap();
    let body = std::fs::read_to_string(&written).unwrap();

    assert!(body.contains("../attachments/"));
    assert!(!body.contains(&server.uri()));
    assert_eq!(
        std::fs::read_dir(&attachments).unwrap().count(),
        1,
        "both references resolve to one stored asset"
    );
}
