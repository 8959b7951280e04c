//! Checksum trees of the scanned installation roots.
//!
//! Directory listing is sequential; hashing runs on a bounded rayon pool
//! since file reads dominate the cost of a scan.

use crate::checksum::{ChecksumAlgorithm, checksum_file};
use crate::dir_list::{DirListError, EntryKind, list_directory};
use crate::record::FileRecord;
use crate::util::paths::relative_key;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("Cannot start hashing workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Checksummed files keyed by normalized relative path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChecksumTree {
    pub files: BTreeMap<String, FileRecord>,
    /// Files or directories that could not be read. They are absent from
    /// `files`.
    pub unreadable: Vec<String>,
}

impl ChecksumTree {
    /// Merges `other` into `self`. On a key collision the entry already
    /// present is kept.
    pub fn merge(&mut self, other: ChecksumTree) {
        for (key, record) in other.files {
            match self.files.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(slot) => {
                    warn!("Path {} scanned twice, keeping first result", slot.key());
                }
            }
        }
        self.unreadable.extend(other.unreadable);
    }
}

pub struct TreeBuilder {
    algorithm: ChecksumAlgorithm,
    pool: rayon::ThreadPool,
}

impl TreeBuilder {
    /// Creates a builder hashing on `workers` threads. Zero picks the number
    /// of available CPUs.
    pub fn new(algorithm: ChecksumAlgorithm, workers: usize) -> Result<Self, TreeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("checksum-{i}"))
            .build()?;

        Ok(TreeBuilder { algorithm, pool })
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Runs `op` inside the hashing pool, so parallel iterators it creates
    /// share the same thread bound.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Checksums the regular files below `root.join(start)`.
    ///
    /// Keys are relative to `root`, not to `start`. With `recursive` unset
    /// only the immediate files of the start directory are included.
    /// Symlinks and special files are skipped. Unreadable files and
    /// directories end up in `unreadable`, never in an error.
    pub fn build_tree(&self, root: &Path, start: &str, recursive: bool) -> ChecksumTree {
        let start_dir = if start.is_empty() {
            root.to_path_buf()
        } else {
            root.join(start)
        };

        let mut candidates = Vec::new();
        let mut unreadable = Vec::new();
        collect_files(root, &start_dir, recursive, &mut candidates, &mut unreadable);

        let algorithm = self.algorithm;
        let hashed: Vec<_> = self.pool.install(|| {
            candidates
                .into_par_iter()
                .map(|(key, path)| {
                    let result = checksum_file(&path, algorithm);
                    (key, result)
                })
                .collect()
        });

        let mut tree = ChecksumTree {
            files: BTreeMap::new(),
            unreadable,
        };

        for (key, result) in hashed {
            match result {
                Ok(checksum) => {
                    let mut record = FileRecord::new(key.clone());
                    record.checksum = Some(checksum.digest);
                    record.modified_at = Some(checksum.mtime);
                    record.size_bytes = Some(checksum.size);
                    tree.files.insert(key, record);
                }
                Err(e) => {
                    warn!("Cannot checksum {}: {}", key, e);
                    tree.unreadable.push(key);
                }
            }
        }

        info!(
            "Checksummed {} files below {} ({} unreadable)",
            tree.files.len(),
            start_dir.display(),
            tree.unreadable.len()
        );

        tree
    }
}

fn collect_files(
    root: &Path,
    dir: &Path,
    recursive: bool,
    out: &mut Vec<(String, PathBuf)>,
    unreadable: &mut Vec<String>,
) {
    let entries = match list_directory(dir) {
        Ok(entries) => entries,
        Err(DirListError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            debug!("Directory {} does not exist", dir.display());
            return;
        }
        Err(e) => {
            warn!("Cannot list {}: {}", dir.display(), e);
            unreadable.push(relative_key(root, dir).unwrap_or_else(|| ".".to_string()));
            return;
        }
    };

    for entry in entries {
        let path = dir.join(&entry.name);
        match entry.kind {
            EntryKind::File => match relative_key(root, &path) {
                Some(key) => out.push((key, path)),
                None => warn!("Skipping non UTF-8 path {}", path.display()),
            },
            EntryKind::Dir if recursive => collect_files(root, &path, recursive, out, unreadable),
            EntryKind::Dir => {}
            EntryKind::Symlink | EntryKind::Special => {
                debug!("Skipping {} (not a regular file)", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn builder() -> TreeBuilder {
        TreeBuilder::new(ChecksumAlgorithm::Md5, 2).unwrap()
    }

    fn keys(tree: &ChecksumTree) -> Vec<&str> {
        tree.files.keys().map(String::as_str).collect()
    }

    #[test]
    fn non_recursive_walk_lists_top_level_files_only() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("index.php"), "<?php").unwrap();
        fs::create_dir(root.join("wp-admin")).unwrap();
        fs::write(root.join("wp-admin/admin.php"), "admin").unwrap();

        let tree = builder().build_tree(root, "", false);

        assert_eq!(keys(&tree), vec!["index.php"]);
        let record = &tree.files["index.php"];
        assert_eq!(
            record.checksum.as_deref(),
            Some(ChecksumAlgorithm::Md5.digest_bytes(b"<?php").as_str())
        );
        assert_eq!(record.size_bytes, Some(5));
        assert!(record.modified_at.is_some());
    }

    #[test]
    fn recursive_walk_keys_are_relative_to_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("wp-includes/js/jquery")).unwrap();
        fs::write(root.join("wp-includes/load.php"), "load").unwrap();
        fs::write(root.join("wp-includes/js/jquery/jquery.js"), "jq").unwrap();

        let tree = builder().build_tree(root, "wp-includes", true);

        assert_eq!(
            keys(&tree),
            vec!["wp-includes/js/jquery/jquery.js", "wp-includes/load.php"]
        );
        assert!(tree.unreadable.is_empty());
    }

    #[test]
    fn missing_start_directory_yields_empty_tree() {
        let temp = TempDir::new().unwrap();

        let tree = builder().build_tree(temp.path(), "wp-admin", true);

        assert!(tree.files.is_empty());
        assert!(tree.unreadable.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn symlinks_are_skipped_and_not_followed() {
        let temp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir(root.join("wp-admin")).unwrap();
        fs::write(outside.path().join("secret.php"), "secret").unwrap();
        fs::write(root.join("wp-admin/real.php"), "real").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("wp-admin/escape")).unwrap();
        std::os::unix::fs::symlink(root.join("wp-admin/real.php"), root.join("wp-admin/alias.php"))
            .unwrap();

        let tree = builder().build_tree(root, "wp-admin", true);

        assert_eq!(keys(&tree), vec!["wp-admin/real.php"]);
    }

    #[test]
    #[cfg(unix)]
    fn unreadable_file_is_omitted_not_fatal() {
        use std::os::unix::fs::PermissionsExt;

        if crate::util::fs::skip_permission_test("unreadable_file_is_omitted_not_fatal") {
            return;
        }

        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("ok.php"), "ok").unwrap();
        fs::write(root.join("locked.php"), "locked").unwrap();
        fs::set_permissions(root.join("locked.php"), fs::Permissions::from_mode(0o000)).unwrap();

        let tree = builder().build_tree(root, "", false);

        fs::set_permissions(root.join("locked.php"), fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(keys(&tree), vec!["ok.php"]);
        assert_eq!(tree.unreadable, vec!["locked.php".to_string()]);
    }

    #[test]
    fn merge_keeps_first_entry_on_collision() {
        let mut first = ChecksumTree::default();
        let mut a = FileRecord::new("a.php");
        a.checksum = Some("first".to_string());
        first.files.insert("a.php".to_string(), a);

        let mut second = ChecksumTree::default();
        let mut dup = FileRecord::new("a.php");
        dup.checksum = Some("second".to_string());
        second.files.insert("a.php".to_string(), dup);
        second
            .files
            .insert("b.php".to_string(), FileRecord::new("b.php"));
        second.unreadable.push("c.php".to_string());

        first.merge(second);

        assert_eq!(first.files.len(), 2);
        assert_eq!(first.files["a.php"].checksum.as_deref(), Some("first"));
        assert_eq!(first.unreadable, vec!["c.php".to_string()]);
    }

    #[test]
    fn many_files_hash_in_parallel() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir(root.join("wp-includes")).unwrap();
        for i in 0..200 {
            fs::write(root.join(format!("wp-includes/f{i}.php")), format!("{i}")).unwrap();
        }

        let tree = TreeBuilder::new(ChecksumAlgorithm::Sha256, 4)
            .unwrap()
            .build_tree(root, "wp-includes", true);

        assert_eq!(tree.files.len(), 200);
        assert_eq!(
            tree.files["wp-includes/f7.php"].checksum.as_deref(),
            Some(ChecksumAlgorithm::Sha256.digest_bytes(b"7").as_str())
        );
    }
}
