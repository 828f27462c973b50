// Copyright 2026 Magpie Contributors
// SPDX-License-Identifier: Apache-2.0

//! Magpie archives discussion threads from a Mighty Networks community
//! into local JSON captures and an Obsidian-style Markdown vault.
//!
//! The pipeline has four stages: a browser-side expansion driver that
//! clicks every "Previous Comments" and "more" affordance until the
//! thread stops growing, a pure extractor that turns one DOM snapshot
//! into a recursive comment tree, a completeness audit against the
//! site's own comment counter, and a normalizer that strips UI chrome
//! from captured HTML fragments.

pub mod archive;
pub mod browser;
pub mod cli;
pub mod config;
pub mod media;
pub mod scrape;
pub mod session;
pub mod vault;

pub use archive::ThreadArchive;
pub use config::Config;
pub use scrape::{CommentNode, PostContent};
