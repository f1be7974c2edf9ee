use std::{
    fs, io,
    path::{Path, PathBuf},
};

#[cfg(windows)]
use std::os::windows::fs::MetadataExt;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio_util::sync::CancellationToken;
use walkdir::{DirEntry, WalkDir};

use crate::types::ScanOptions;

/// Non-fatal problem hit while enumerating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkWarning {
    pub path: String,
    pub code: &'static str,
    pub message: String,
}

/// Lists every regular file under `root`, top-down, siblings sorted by name.
///
/// Unreadable entries are reported through `on_warning` and skipped.
/// Returns early with whatever was collected once `cancel` fires.
pub fn walk_files(
    root: &Path,
    options: &ScanOptions,
    cancel: &CancellationToken,
    mut on_warning: impl FnMut(WalkWarning),
) -> anyhow::Result<Vec<PathBuf>> {
    let excludes = build_globset(&options.excludes)?;
    let mut walker = WalkDir::new(root).follow_links(options.follow_symlinks).sort_by_file_name();
    if let Some(d) = options.max_depth {
        // max_depth counts directory levels below root; files of the last level stay visible
        walker = walker.max_depth(d as usize + 1);
    }

    let mut files = Vec::new();
    let it = walker.into_iter().filter_entry(|e| {
        // root itself is never filtered
        e.depth() == 0 || (!matches_excludes(e.path(), &excludes) && (options.include_hidden || !is_hidden(e)))
    });
    for entry in it {
        if cancel.is_cancelled() {
            break;
        }
        match entry {
            Ok(e) => {
                if e.file_type().is_file() || is_unfollowed_file_link(&e) {
                    files.push(e.into_path());
                }
            }
            Err(err) => on_warning(warning_for(&err)),
        }
    }
    Ok(files)
}

/// A symlink that walkdir reports as-is (links not followed) and that does
/// not point at a directory. Dangling links count too; the scanner records
/// them as "File does not exist".
fn is_unfollowed_file_link(entry: &DirEntry) -> bool {
    entry.path_is_symlink()
        && entry.file_type().is_symlink()
        && !fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false)
}

fn warning_for(err: &walkdir::Error) -> WalkWarning {
    let path = err.path().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
    // Mit follow_links meldet walkdir tote Links als NotFound-Fehler
    let dangling = err.io_error().map(|io| io.kind() == io::ErrorKind::NotFound).unwrap_or(false)
        && err
            .path()
            .and_then(|p| fs::symlink_metadata(p).ok())
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
    if dangling {
        WalkWarning { path, code: "broken_link", message: "symbolic link target is missing".into() }
    } else {
        WalkWarning { path, code: "walk_failed", message: err.to_string() }
    }
}

/// The folder a scan may start from: existing, a directory.
pub fn is_valid_root(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

pub(crate) fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        if p.trim().is_empty() {
            continue;
        }
        // Backslashes zu Slashes, passend zur Normalisierung in `matches_excludes`.
        let norm = p.trim().replace('\\', "/");
        b.add(Glob::new(&norm)?);
    }
    Ok(b.build()?)
}

fn matches_excludes(path: &Path, set: &GlobSet) -> bool {
    if set.is_empty() {
        return false;
    }
    let s = path.to_string_lossy().replace('\\', "/");
    set.is_match(&s)
}

#[cfg(windows)]
fn is_hidden(entry: &DirEntry) -> bool {
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    entry
        .metadata()
        .map(|md| md.file_attributes() & (FILE_ATTRIBUTE_HIDDEN | FILE_ATTRIBUTE_SYSTEM) != 0)
        .unwrap_or(false)
}

#[cfg(not(windows))]
fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}
