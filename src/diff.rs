//! Line diff between the published original of a file and its local copy.

use crate::layout::InstallLayout;
use crate::manifest::{ManifestError, ManifestProvider};
use crate::util::paths::normalize_relative;
use similar::TextDiff;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("Cannot compare {path}: {reason}")]
    NotComparable { path: String, reason: &'static str },
    #[error("Manifest for release {version} unavailable: {source}")]
    ManifestUnavailable {
        version: String,
        source: ManifestError,
    },
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, std::io::Error),
}

pub struct DiffRenderer<'a> {
    layout: &'a InstallLayout,
    provider: &'a dyn ManifestProvider,
    locale: String,
}

impl<'a> DiffRenderer<'a> {
    pub fn new(
        layout: &'a InstallLayout,
        provider: &'a dyn ManifestProvider,
        locale: impl Into<String>,
    ) -> Self {
        DiffRenderer {
            layout,
            provider,
            locale: locale.into(),
        }
    }

    /// Renders a unified diff from the original of `relative_path` in
    /// `version` to the local file. An empty string means no line differs.
    pub fn diff(&self, relative_path: &str, version: &str) -> Result<String, DiffError> {
        let path = normalize_relative(relative_path);
        let not_comparable = |reason| DiffError::NotComparable {
            path: path.clone(),
            reason,
        };

        let manifest = self
            .provider
            .manifest(version, &self.locale)
            .map_err(|source| DiffError::ManifestUnavailable {
                version: version.to_string(),
                source,
            })?;
        if !manifest.contains_key(&path) {
            return Err(not_comparable("not a file of this release"));
        }

        let local_path = self.layout.resolve(&path);
        if !local_path.is_file() {
            return Err(not_comparable("no local file"));
        }

        let original = match self.provider.original_content(version, &path) {
            Ok(Some(content)) => content,
            Ok(None) => return Err(not_comparable("original content unavailable")),
            Err(source) => {
                return Err(DiffError::ManifestUnavailable {
                    version: version.to_string(),
                    source,
                });
            }
        };
        let local = std::fs::read(&local_path).map_err(|e| DiffError::Io(local_path, e))?;

        if original == local {
            return Ok(String::new());
        }

        let original = String::from_utf8_lossy(&original);
        let local = String::from_utf8_lossy(&local);
        let diff = TextDiff::from_lines(&*original, &*local);

        Ok(diff
            .unified_diff()
            .context_radius(3)
            .header(&format!("original/{path}"), &format!("local/{path}"))
            .to_string())
    }
}
