//! Where the files of an installation live on disk.

use crate::util::paths::split_first_segment;
use std::path::{Path, PathBuf};

/// The scanned roots of an installation and the customization directory
/// mapping.
#[derive(Debug, Clone)]
pub struct InstallLayout {
    root: PathBuf,
    core_dirs: Vec<String>,
    content_dir_name: String,
    /// Actual customization directory when the deployment moved or renamed
    /// it.
    content_dir: Option<PathBuf>,
}

impl InstallLayout {
    pub fn new(
        root: impl Into<PathBuf>,
        core_dirs: Vec<String>,
        content_dir_name: impl Into<String>,
        content_dir: Option<PathBuf>,
    ) -> Self {
        InstallLayout {
            root: root.into(),
            core_dirs,
            content_dir_name: content_dir_name.into(),
            content_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Subdirectories scanned recursively, relative to the root.
    pub fn core_dirs(&self) -> &[String] {
        &self.core_dirs
    }

    pub fn content_dir_name(&self) -> &str {
        &self.content_dir_name
    }

    /// Resolves a manifest path to its on-disk location.
    ///
    /// The direct location below the root wins when it exists. Otherwise a
    /// path whose first segment is the canonical customization directory
    /// name is moved into the configured customization directory. Only the
    /// first segment is rewritten.
    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        let (base, rest) = self.locate(relative_path);
        base.join(rest)
    }

    /// Resolves a manifest path for modification.
    ///
    /// Returns `None` when an existing directory between the base and the
    /// target is a symlink: writing or deleting through it could reach
    /// outside the installation. Directories that do not exist yet are
    /// accepted.
    pub fn resolve_for_write(&self, relative_path: &str) -> Option<PathBuf> {
        let (base, rest) = self.locate(relative_path);

        let mut dir = base.to_path_buf();
        let parents = Path::new(rest).parent().map(Path::components);
        for component in parents.into_iter().flatten() {
            dir.push(component);
            match dir.symlink_metadata() {
                Ok(meta) if meta.file_type().is_symlink() => return None,
                Ok(_) => {}
                Err(_) => break,
            }
        }

        Some(base.join(rest))
    }

    /// True when `resolve` would not pick the direct location.
    pub fn is_rewritten(&self, relative_path: &str) -> bool {
        self.resolve(relative_path) != self.root.join(relative_path)
    }

    /// Splits a manifest path into the directory it lives under and the
    /// remainder below that directory.
    fn locate<'a>(&'a self, relative_path: &'a str) -> (&'a Path, &'a str) {
        if self.root.join(relative_path).symlink_metadata().is_ok() {
            return (self.root.as_path(), relative_path);
        }

        match (&self.content_dir, split_first_segment(relative_path)) {
            (Some(content_dir), (first, Some(rest)))
                if first == self.content_dir_name && !rest.is_empty() =>
            {
                (content_dir.as_path(), rest)
            }
            _ => (self.root.as_path(), relative_path),
        }
    }
}
