use std::fs::{self, Permissions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::rewrite::SCRATCH_PREFIX;

#[derive(Debug, Clone)]
pub struct FileTask {
    pub path: PathBuf,
    pub len: u64,
    pub permissions: Permissions,
}

impl FileTask {
    pub fn load(path: PathBuf) -> Result<Self> {
        let metadata =
            fs::metadata(&path).with_context(|| format!("metadata for {}", path.display()))?;
        Ok(Self {
            len: metadata.len(),
            permissions: metadata.permissions(),
            path,
        })
    }
}

pub fn validate_root(root: &Path) -> Result<()> {
    let metadata = fs::metadata(root)
        .with_context(|| format!("input directory {} not found", root.display()))?;
    if !metadata.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    Ok(())
}

pub fn collect_files(root: &Path) -> Vec<PathBuf> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        // Left behind when a run was killed mid-rewrite.
        if entry.file_name().to_string_lossy().starts_with(SCRATCH_PREFIX) {
            debug!(path = %entry.path().display(), "skipping leftover scratch file");
            continue;
        }
        files.push(entry.into_path());
    }
    files
}
