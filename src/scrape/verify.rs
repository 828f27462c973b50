//! Completeness audit: compares how many comments were extracted
//! against the tally the site shows in the drawer header.
//!
//! The audit is advisory. A shortfall is reported loudly so a stalled
//! expansion run is visible in the logs, but it never fails a capture.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};

use super::selectors;

/// Outcome of comparing extracted count to the site's advertised tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountAudit {
    /// Everything the site advertises was captured. Also covers the
    /// tally lagging behind fresh replies (extracted > expected).
    Exact { total: u64 },
    Shortfall {
        expected: u64,
        extracted: u64,
        missing: u64,
    },
    /// The site exposed no tally; nothing to compare against.
    Unavailable { extracted: u64 },
}

pub fn audit(expected: Option<u64>, extracted: u64) -> CountAudit {
    match expected {
        Some(expected) if extracted < expected => CountAudit::Shortfall {
            expected,
            extracted,
            missing: expected - extracted,
        },
        Some(_) => CountAudit::Exact { total: extracted },
        None => CountAudit::Unavailable { extracted },
    }
}

impl CountAudit {
    pub fn log(&self) {
        match *self {
            CountAudit::Exact { total } => {
                info!("extracted count matches the site tally ({total})");
            }
            CountAudit::Shortfall {
                expected,
                extracted,
                missing,
            } => {
                warn!(
                    "site advertises {expected} comments but {extracted} were extracted, {missing} missing"
                );
            }
            CountAudit::Unavailable { extracted } => {
                info!("no site tally found, skipping completeness check ({extracted} extracted)");
            }
        }
    }
}

/// Read the advertised comment total out of a document snapshot.
///
/// Tries each known tally selector in order; a matching element whose
/// text has no integer in it does not stop the search.
pub fn expected_total(document: &str) -> Option<u64> {
    let html = Html::parse_document(document);
    for selector in selectors::COMMENT_COUNT {
        let parsed = Selector::parse(selector).expect("selector is valid");
        for element in html.select(&parsed) {
            let text: String = element.text().collect();
            if let Some(total) = first_integer(&text) {
                return Some(total);
            }
        }
    }
    None
}

fn first_integer(text: &str) -> Option<u64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\d+").expect("integer regex is valid"));
    re.find(text)?.as_str().parse().ok()
}
