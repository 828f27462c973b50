//! Selector inventory for the capture pipeline. Every DOM dependency
//! of thread extraction lives here so a markup change on the site is
//! a one-file fix. Sign-in selectors live with the session code.
//!
//! Ordered lists are fallback chains: the first selector is the exact
//! structural path observed on the site, later entries get broader.

/// A locate strategy: a CSS selector plus an optional label check.
///
/// The label is a lowercase fragment the element's visible text must
/// contain. Broad selectors (`a` across the whole page) rely on it to
/// pick out the actual affordance.
#[derive(Debug, Clone, Copy)]
pub struct Locator {
    pub selector: &'static str,
    pub label: Option<&'static str>,
}

/// The comment drawer holding the whole thread.
pub const COMMENT_REGION: &str = "#sidebar-comments-region";

/// Root comment items, as direct children of the known list path.
pub const ROOT_ITEMS: &str =
    "#sidebar-comments-region > div > div.comments-region > ul > li";

/// Body fragment of a single comment.
pub const COMMENT_BODY: &str = ".comment-body";

/// "Previous Comments" pagination controls, structural path first.
pub const PREVIOUS_BATCH: &[Locator] = &[
    Locator {
        selector: "#sidebar-comments-region > div > div.comments-region > div > div.load-more-wrapper-previous > a",
        label: None,
    },
    Locator {
        selector: "a",
        label: Some("previous comments"),
    },
];

/// "more" links on truncated bodies. Not scoped to the drawer: a long
/// post body is truncated the same way and should be expanded too.
pub const TRUNCATED_MORE: &[Locator] = &[
    Locator {
        selector: ".comment-body.mighty-wysiwyg-content.fr-view.wysiwyg-comment.long.is-truncated > a",
        label: Some("more"),
    },
    Locator {
        selector: "a.more.text-color-grey-3-link",
        label: Some("more"),
    },
];

pub const COMMENT_AUTHOR: &[&str] = &[
    ".comment-author",
    ".user-name",
    ".author-name",
    ".comment-header .name",
];

pub const COMMENT_TIME: &[&str] = &[".timestamp", ".comment-time", ".time-ago", "time"];

/// The site's own comment tally, shown in the drawer header.
pub const COMMENT_COUNT: &[&str] = &[
    "#flyout-right-drawer-region > div.comments-sidebar-layout > div.comment-sidebar-header > div.comment-count",
    "#flyout-right-drawer-region > div.comments-sidebar-layout > div.comment-sidebar-header > h2",
    ".comment-count",
    ".comments-count",
];

pub const POST_TITLE: &[&str] = &[
    "#detail-layout > div.detail-layout-content-wrapper > div.detail-layout-title",
    ".detail-layout-title",
    "#detail-layout h1",
    ".post-title",
    ".article-title",
    "h1",
    "[data-testid=\"post-title\"]",
];

pub const POST_CONTENT: &[&str] = &[
    "#detail-layout > div.detail-layout-content-wrapper > div.detail-layout-description.mighty-wysiwyg-content.mighty-max-content-width.fr-view",
    ".detail-layout-description.mighty-wysiwyg-content",
    ".detail-layout-description",
    ".mighty-wysiwyg-content",
    ".post-content .content",
    ".post-content",
    ".post-body .content",
    ".post-body",
    "[data-testid=\"post-content\"]",
    ".main-post .content",
    ".content",
    ".main-content",
    "[class*=\"content\"]",
];

pub const POST_AUTHOR: &[&str] = &[
    ".post-author",
    ".author-name",
    ".user-name",
    "[data-testid=\"author\"]",
];

pub const POST_TIME: &[&str] = &[".post-time", ".timestamp", ".published-date", "time"];
