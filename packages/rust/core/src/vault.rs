//! Discover note titles in an Obsidian vault.

use std::path::Path;

use tracing::{info, instrument, warn};

use distill_shared::{DistillError, Result};

/// Recursively collect the stems of `*.md` files under `root`, sorted.
///
/// Any path component starting with `.` (`.obsidian/`, `.trash/`, hidden
/// notes) is skipped. A missing or non-directory root is a validation error;
/// unreadable subdirectories are logged and skipped.
#[instrument(skip_all, fields(vault = %root.display()))]
pub fn scan_vault(root: &Path) -> Result<Vec<String>> {
    if !root.exists() {
        return Err(DistillError::validation(format!(
            "vault path not found: {}",
            root.display()
        )));
    }
    if !root.is_dir() {
        return Err(DistillError::validation(format!(
            "vault path is not a directory: {}",
            root.display()
        )));
    }

    let mut titles = Vec::new();
    walk(root, &mut titles)?;
    titles.sort();

    info!(notes = titles.len(), "vault scanned");
    Ok(titles)
}

fn walk(dir: &Path, titles: &mut Vec<String>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| DistillError::io(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| DistillError::io(dir, e))?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            if let Err(e) = walk(&path, titles) {
                warn!(path = %path.display(), error = %e, "skipping unreadable directory");
            }
        } else if (file_type.is_file() || (file_type.is_symlink() && path.is_file()))
            && path.extension().is_some_and(|ext| ext == "md")
        {
            if let Some(stem) = path.file_stem().map(|s| s.to_string_lossy()) {
                if !stem.is_empty() {
                    titles.push(stem.into_owned());
                }
            }
        }
    }

    Ok(())
}
