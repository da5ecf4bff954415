//! Local path enumeration.
//!
//! Walks the upload root and produces a deterministic sequence of
//! relative paths, pruning excluded and hidden entries.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::error::SyncError;

/// One local file selected for upload.
///
/// The relative path doubles as the remote filesystem key and always
/// uses forward slashes.
#[derive(Debug, Clone)]
pub struct LocalEntry {
    rel_path: String,
    source: PathBuf,
    size: u64,
}

impl LocalEntry {
    /// Root-relative path, forward-slash separated.
    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    /// Absolute location of the local file.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Byte length at enumeration time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Remote directory holding this file, if it is not at the root.
    pub fn parent_dir(&self) -> Option<&str> {
        self.rel_path.rsplit_once('/').map(|(dir, _)| dir)
    }

    /// Reads the file contents.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.source)
    }
}

/// Enumerates the files to upload beneath `root`.
///
/// A single-file root yields exactly one entry named by its basename;
/// naming a file explicitly overrides exclusion and hidden filtering.
/// A directory root is walked pre-order with children sorted by name.
/// Subdirectories and files whose absolute path is in `excluded`, or
/// whose name starts with `.`, are pruned — an excluded directory and
/// everything beneath it never appears in the sequence.
///
/// Exclusions are normalized to absolute paths once here, so matching
/// does not depend on the current working directory.
pub fn enumerate(root: &Path, excluded: &[PathBuf]) -> Result<Vec<LocalEntry>, SyncError> {
    let root = std::path::absolute(root)?;
    let meta = std::fs::metadata(&root)
        .map_err(|_| SyncError::RootNotFound(root.display().to_string()))?;

    if meta.is_file() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SyncError::RootNotFound(root.display().to_string()))?;
        return Ok(vec![LocalEntry {
            rel_path: name,
            source: root,
            size: meta.len(),
        }]);
    }

    let excluded: HashSet<PathBuf> = excluded
        .iter()
        .map(|p| std::path::absolute(p))
        .collect::<Result<_, _>>()?;

    let mut entries = Vec::new();
    walk(&root, &root, &excluded, &mut entries)?;
    Ok(entries)
}

fn walk(
    root: &Path,
    current: &Path,
    excluded: &HashSet<PathBuf>,
    out: &mut Vec<LocalEntry>,
) -> Result<(), SyncError> {
    let mut children: Vec<_> =
        std::fs::read_dir(current)?.collect::<Result<Vec<_>, std::io::Error>>()?;
    children.sort_by_key(|entry| entry.file_name());

    for child in children {
        let path = child.path();
        if excluded.contains(&path) || is_hidden(&child.file_name()) {
            continue;
        }
        // file_type() does not follow symlinks; a symlinked directory
        // is never descended, so link cycles cannot loop the walk.
        let file_type = child.file_type()?;
        if file_type.is_dir() {
            walk(root, &path, excluded, out)?;
        } else if file_type.is_file() {
            push_file(root, path, child.metadata()?.len(), out)?;
        } else if file_type.is_symlink() {
            // A symlink to a regular file uploads like the file itself;
            // broken links and links to directories are skipped.
            match std::fs::metadata(&path) {
                Ok(meta) if meta.is_file() => push_file(root, path, meta.len(), out)?,
                _ => {}
            }
        }
    }
    Ok(())
}

fn push_file(
    root: &Path,
    path: PathBuf,
    size: u64,
    out: &mut Vec<LocalEntry>,
) -> Result<(), SyncError> {
    let rel_path = path
        .strip_prefix(root)
        .map_err(std::io::Error::other)?
        .to_string_lossy()
        .replace('\\', "/");
    out.push(LocalEntry {
        rel_path,
        source: path,
        size,
    });
    Ok(())
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
