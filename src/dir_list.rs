//! Non-recursive directory listing.
//!
//! Lists the immediate children of a directory without following symlinks,
//! so the tree builder can decide per entry whether to hash it, descend
//! into it, or skip it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DirListError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub name: OsString,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    /// Sockets, fifos, device nodes.
    Special,
}

/// Lists the entries of `dir`, sorted by name.
///
/// Symlinks are reported as such and never resolved. Entries whose metadata
/// cannot be read are skipped, since a concurrent delete or a permission
/// problem on a single child must not hide its siblings.
pub fn list_directory(dir: &Path) -> Result<Vec<FsEntry>, DirListError> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            DirListError::PermissionDenied(dir.to_path_buf())
        } else {
            DirListError::Io(e)
        }
    })?;

    let mut entries = Vec::new();

    for entry in read_dir {
        let entry = entry.map_err(DirListError::Io)?;
        let path = entry.path();

        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let file_type = metadata.file_type();

        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Special
        };

        entries.push(FsEntry {
            name: entry.file_name(),
            kind,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(entries)
}
