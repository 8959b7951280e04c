//! Reconciliation of the local installation against the release manifest.
//!
//! Three sources are merged: the manifest, the checksum tree of the scanned
//! roots and the suppression store. Every non-exempt path drawn from the
//! manifest and the local tree lands in exactly one of the four
//! classifications. Suppressed paths are still classified, only flagged.

use crate::checksum::{checksum_file, digests_match};
use crate::exempt::PathClassifier;
use crate::layout::InstallLayout;
use crate::manifest::{ManifestError, ManifestProvider};
use crate::record::{Classification, FileRecord};
use crate::suppression::SuppressionStore;
use crate::tree::{ChecksumTree, TreeBuilder};
use crate::util::fs::is_writable;
use crate::util::hashing::path_key;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Manifest for release {version} unavailable: {source}")]
    ManifestUnavailable {
        version: String,
        source: ManifestError,
    },
}

/// The four disjoint classifications of one scan, each sorted by path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub added: Vec<FileRecord>,
    pub removed: Vec<FileRecord>,
    pub modified: Vec<FileRecord>,
    pub stable: Vec<FileRecord>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub stable: usize,
    /// Flagged records hidden by a suppression.
    pub suppressed: usize,
}

impl Summary {
    pub fn actionable(&self) -> usize {
        self.added + self.removed + self.modified - self.suppressed
    }
}

impl Reconciliation {
    /// Added, removed and modified records with their classification,
    /// including suppressed ones.
    pub fn flagged(&self) -> impl Iterator<Item = (Classification, &FileRecord)> {
        self.added
            .iter()
            .map(|r| (Classification::Added, r))
            .chain(self.removed.iter().map(|r| (Classification::Removed, r)))
            .chain(self.modified.iter().map(|r| (Classification::Modified, r)))
    }

    /// Flagged records an operator still has to look at.
    pub fn actionable(&self) -> impl Iterator<Item = (Classification, &FileRecord)> {
        self.flagged().filter(|(_, r)| !r.suppressed)
    }

    pub fn summary(&self) -> Summary {
        Summary {
            added: self.added.len(),
            removed: self.removed.len(),
            modified: self.modified.len(),
            stable: self.stable.len(),
            suppressed: self.flagged().filter(|(_, r)| r.suppressed).count(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.actionable().next().is_none()
    }

    fn push(&mut self, class: Classification, record: FileRecord) {
        match class {
            Classification::Stable => self.stable.push(record),
            Classification::Modified => self.modified.push(record),
            Classification::Removed => self.removed.push(record),
            Classification::Added => self.added.push(record),
        }
    }
}

pub struct ReconciliationEngine<'a> {
    layout: &'a InstallLayout,
    provider: &'a dyn ManifestProvider,
    classifier: &'a PathClassifier,
    trees: &'a TreeBuilder,
    store: &'a SuppressionStore,
    locale: String,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        layout: &'a InstallLayout,
        provider: &'a dyn ManifestProvider,
        classifier: &'a PathClassifier,
        trees: &'a TreeBuilder,
        store: &'a SuppressionStore,
        locale: impl Into<String>,
    ) -> Self {
        ReconciliationEngine {
            layout,
            provider,
            classifier,
            trees,
            store,
            locale: locale.into(),
        }
    }

    /// Classifies every non-exempt path of the installation against the
    /// manifest of `version`.
    ///
    /// Fails only when the manifest cannot be obtained. Per-file read
    /// failures are reflected in the result, and an unreadable suppression
    /// store only means nothing is hidden.
    pub fn reconcile(&self, version: &str) -> Result<Reconciliation, ReconcileError> {
        let manifest = self
            .provider
            .manifest(version, &self.locale)
            .map_err(|source| ReconcileError::ManifestUnavailable {
                version: version.to_string(),
                source,
            })?;
        info!(
            "Manifest for {} ({}) lists {} files",
            version,
            self.locale,
            manifest.len()
        );

        let tree = self.local_tree();
        let unreadable: HashSet<&str> = tree.unreadable.iter().map(String::as_str).collect();
        let suppressed: HashSet<String> = match self.store.get_all() {
            Ok(entries) => entries.into_keys().collect(),
            Err(e) => {
                warn!("Cannot read suppressions, reporting every discrepancy: {}", e);
                HashSet::new()
            }
        };

        let root = self.layout.root();

        let expected: Vec<(Classification, FileRecord)> = self.trees.install(|| {
            manifest
                .par_iter()
                .filter(|(path, _)| !self.classifier.is_exempt(path))
                .map(|(path, expected)| self.classify_expected(path, expected, &tree, &unreadable))
                .collect()
        });

        let mut result = Reconciliation::default();
        for (class, record) in expected {
            result.push(class, record);
        }

        let unexpected = tree
            .files
            .values()
            .filter(|r| !manifest.contains_key(&r.relative_path))
            .filter(|r| !self.classifier.is_exempt(&r.relative_path));
        for local in unexpected {
            let mut record = local.clone();
            record.fixable = is_writable(&root.join(&record.relative_path));
            result.added.push(record);
        }

        // An unreadable local file outside the manifest is still a local
        // file.
        let listed: BTreeSet<&str> = result.added.iter().map(|r| r.relative_path.as_str()).collect();
        let mut unreadable_added: Vec<FileRecord> = unreadable
            .iter()
            .filter(|p| !manifest.contains_key(**p) && !listed.contains(**p))
            .filter(|p| !self.classifier.is_exempt(p))
            .filter(|p| root.join(p).is_file())
            .map(|p| {
                let mut record = FileRecord::new(*p);
                record.fixable = is_writable(&root.join(p));
                record
            })
            .collect();
        result.added.append(&mut unreadable_added);

        for list in [
            &mut result.added,
            &mut result.removed,
            &mut result.modified,
            &mut result.stable,
        ] {
            list.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
            for record in list.iter_mut() {
                record.suppressed = suppressed.contains(&path_key(&record.relative_path));
            }
        }

        let summary = result.summary();
        info!(
            "Reconciled: {} stable, {} modified, {} removed, {} added ({} suppressed)",
            summary.stable, summary.modified, summary.removed, summary.added, summary.suppressed
        );

        Ok(result)
    }

    /// Root files plus both core subtrees.
    fn local_tree(&self) -> ChecksumTree {
        let root = self.layout.root();
        let mut tree = self.trees.build_tree(root, "", false);
        for dir in self.layout.core_dirs() {
            tree.merge(self.trees.build_tree(root, dir, true));
        }
        tree
    }

    fn classify_expected(
        &self,
        path: &str,
        expected: &str,
        tree: &ChecksumTree,
        unreadable: &HashSet<&str>,
    ) -> (Classification, FileRecord) {
        let mut record = FileRecord::new(path);

        let local = if let Some(scanned) = tree.files.get(path) {
            Ok(scanned.clone())
        } else {
            let resolved = self.layout.resolve(path);
            if unreadable.contains(path) && !self.layout.is_rewritten(path) {
                Err(resolved)
            } else {
                match std::fs::symlink_metadata(&resolved) {
                    Ok(meta) if meta.is_file() => match checksum_file(&resolved, self.trees.algorithm()) {
                        Ok(sum) => {
                            let mut scanned = FileRecord::new(path);
                            scanned.checksum = Some(sum.digest);
                            scanned.modified_at = Some(sum.mtime);
                            scanned.size_bytes = Some(sum.size);
                            Ok(scanned)
                        }
                        Err(e) => {
                            warn!("Cannot checksum {}: {}", resolved.display(), e);
                            Err(resolved)
                        }
                    },
                    Ok(_) => {
                        debug!("{} is not a regular file", resolved.display());
                        Err(resolved)
                    }
                    Err(_) => {
                        let parent = resolved.parent().map(Path::to_path_buf);
                        record.fixable = parent.as_deref().is_some_and(is_writable);
                        return (Classification::Removed, record);
                    }
                }
            }
        };

        match local {
            Ok(scanned) => {
                let matches = scanned
                    .checksum
                    .as_deref()
                    .is_some_and(|local| digests_match(local, expected));
                if matches {
                    record.checksum = scanned.checksum;
                    (Classification::Stable, record)
                } else {
                    let file = self.layout.resolve(path);
                    record.checksum = scanned.checksum;
                    record.modified_at = scanned.modified_at;
                    record.size_bytes = scanned.size_bytes;
                    record.fixable = is_writable(&file);
                    (Classification::Modified, record)
                }
            }
            // Present but unreadable never counts as a match.
            Err(file) => {
                let meta = std::fs::symlink_metadata(&file).ok();
                record.modified_at = meta.as_ref().and_then(|m| m.modified().ok());
                record.size_bytes = meta.as_ref().map(|m| m.len());
                record.fixable = is_writable(&file);
                (Classification::Modified, record)
            }
        }
    }
}
