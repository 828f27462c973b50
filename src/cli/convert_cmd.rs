//! `magpie convert`: render captured JSON archives into vault notes
//! without touching the browser.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{error, info};

use crate::archive::ThreadArchive;
use crate::config::Config;
use crate::media::MediaStore;
use crate::vault;

pub async fn run(capture: Option<&Path>) -> Result<()> {
    let config = Config::load();
    let media = MediaStore::new(config.attachments_dir());
    let articles = config.articles_dir();

    let files = match capture {
        Some(path) => vec![path.to_path_buf()],
        None => list_captures(&config.output_dir)?,
    };
    if files.is_empty() {
        bail!("no captures found under {}", config.output_dir.display());
    }

    let mut converted = 0usize;
    for file in &files {
        match convert_one(file, &media, &articles).await {
            Ok(note) => {
                println!("{} -> {}", file.display(), note.display());
                converted += 1;
            }
            Err(error) => error!("conversion of {} failed: {error:#}", file.display()),
        }
    }

    if converted == 0 {
        bail!("every conversion failed");
    }
    info!("conversion finished: {converted}/{} captures", files.len());
    Ok(())
}

async fn convert_one(file: &Path, media: &MediaStore, articles: &Path) -> Result<PathBuf> {
    let archive = ThreadArchive::load(file)?;
    vault::write_note(&archive, media, articles).await
}

/// Every `*.json` directly under the output directory, sorted so batch
/// runs are deterministic.
fn list_captures(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.context("failed to read a directory entry")?.path();
        if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_captures_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("a.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let files = list_captures(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }
}
