//! Operator-requested bulk actions on flagged paths.
//!
//! A batch arrives as an action name, a confirmation flag and a list of
//! `classification@path` strings. The request is validated as a whole
//! before anything is touched; after that, individual failures only lower
//! the processed count. Each batch produces one audit event naming the
//! affected paths and one summary event with the counts.

use crate::audit::{AuditEvent, AuditSink, Severity};
use crate::layout::InstallLayout;
use crate::manifest::ManifestProvider;
use crate::record::Classification;
use crate::suppression::{SuppressionEntry, SuppressionStore};
use crate::util::fs::write_atomic;
use crate::util::paths::{is_contained, normalize_relative};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

const ENTRY_DELIMITER: char = '@';

#[derive(Debug, thiserror::Error)]
pub enum RemediationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Restore,
    Delete,
    MarkFixed,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Restore => "restore",
            Action::Delete => "delete",
            Action::MarkFixed => "fixed",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Action::Restore => "Core file restored",
            Action::Delete => "Non-core file deleted",
            Action::MarkFixed => "Core file marked as fixed",
        }
    }

    fn severity(self) -> Severity {
        match self {
            Action::Restore => Severity::Info,
            Action::Delete => Severity::Notice,
            Action::MarkFixed => Severity::Warning,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = RemediationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restore" => Ok(Action::Restore),
            "delete" => Ok(Action::Delete),
            "fixed" | "markFixed" | "mark-fixed" => Ok(Action::MarkFixed),
            other => Err(RemediationError::InvalidRequest(format!(
                "Action '{other}' is not supported"
            ))),
        }
    }
}

/// A decoded `classification@path` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub classification: Classification,
    pub relative_path: String,
}

impl BatchEntry {
    /// Splits on the first delimiter; the path may itself contain one.
    /// Returns `None` for anything that does not decode to a known
    /// classification and a path inside the installation.
    pub fn decode(raw: &str) -> Option<BatchEntry> {
        let (class, path) = raw.split_once(ENTRY_DELIMITER)?;
        let classification = class.parse().ok()?;
        let relative_path = normalize_relative(path);
        if !is_contained(&relative_path) {
            return None;
        }

        Some(BatchEntry {
            classification,
            relative_path,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{}{}",
            self.classification, ENTRY_DELIMITER, self.relative_path
        )
    }
}

/// A validated batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub action: Action,
    pub entries: Vec<BatchEntry>,
    /// Number of submitted entries, malformed ones included.
    pub selected: usize,
}

impl BatchRequest {
    /// Validates a submitted batch. Malformed entries are dropped with a
    /// warning; a missing action, a missing confirmation, an unknown action
    /// or an empty entry set reject the whole batch.
    pub fn parse<S: AsRef<str>>(
        action: Option<&str>,
        confirmed: bool,
        entries: &[S],
    ) -> Result<BatchRequest, RemediationError> {
        let action = action.ok_or_else(|| {
            RemediationError::InvalidRequest("No action was requested".to_string())
        })?;
        if !confirmed {
            return Err(RemediationError::InvalidRequest(
                "You need to confirm that you understand the risk of this operation".to_string(),
            ));
        }
        let action: Action = action.parse()?;
        if entries.is_empty() {
            return Err(RemediationError::InvalidRequest(
                "No files were selected".to_string(),
            ));
        }

        let decoded = entries
            .iter()
            .map(AsRef::as_ref)
            .filter_map(|raw| {
                let entry = BatchEntry::decode(raw);
                if entry.is_none() {
                    warn!("Skipping malformed entry '{}'", raw);
                }
                entry
            })
            .collect();

        Ok(BatchRequest {
            action,
            entries: decoded,
            selected: entries.len(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub selected: usize,
    /// Relative paths the action succeeded on, in submission order.
    pub affected_paths: Vec<String>,
    /// Set when the batch stopped early on request.
    pub cancelled: bool,
}

pub struct RemediationController<'a> {
    layout: &'a InstallLayout,
    provider: &'a dyn ManifestProvider,
    store: &'a SuppressionStore,
    audit: &'a dyn AuditSink,
    version: String,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> RemediationController<'a> {
    pub fn new(
        layout: &'a InstallLayout,
        provider: &'a dyn ManifestProvider,
        store: &'a SuppressionStore,
        audit: &'a dyn AuditSink,
        version: impl Into<String>,
    ) -> Self {
        RemediationController {
            layout,
            provider,
            store,
            audit,
            version: version.into(),
            cancel: None,
        }
    }

    /// Checks `flag` before every entry and stops once it is raised.
    pub fn with_cancellation(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Validates and applies a submitted batch.
    pub fn submit<S: AsRef<str>>(
        &self,
        action: Option<&str>,
        confirmed: bool,
        entries: &[S],
    ) -> Result<BatchOutcome, RemediationError> {
        let request = BatchRequest::parse(action, confirmed, entries)?;
        Ok(self.apply(&request))
    }

    pub fn apply(&self, request: &BatchRequest) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            selected: request.selected,
            ..BatchOutcome::default()
        };

        for entry in &request.entries {
            if self.cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                info!("Batch cancelled after {} entries", outcome.processed);
                outcome.cancelled = true;
                break;
            }

            let done = match request.action {
                Action::Restore => self.restore(&entry.relative_path),
                Action::Delete => self.delete(&entry.relative_path),
                Action::MarkFixed => self.mark_fixed(entry),
            };

            if done {
                outcome.processed += 1;
                outcome.affected_paths.push(entry.relative_path.clone());
            }
        }

        self.report(request.action, &outcome);
        outcome
    }

    fn restore(&self, relative_path: &str) -> bool {
        let content = match self.provider.original_content(&self.version, relative_path) {
            Ok(Some(content)) => content,
            Ok(None) => {
                warn!("No original content for {}", relative_path);
                return false;
            }
            Err(e) => {
                warn!("Cannot fetch original content for {}: {}", relative_path, e);
                return false;
            }
        };

        let Some(target) = self.writable_target(relative_path) else {
            return false;
        };
        if let Some(parent) = target.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            debug!("Cannot create {}: {}", parent.display(), e);
        }

        match write_atomic(&target, &content, restored_permissions(&target)) {
            Ok(()) => {
                debug!("Restored {}", target.display());
                true
            }
            Err(e) => {
                warn!("Cannot restore {}: {}", target.display(), e);
                false
            }
        }
    }

    fn delete(&self, relative_path: &str) -> bool {
        let Some(target) = self.writable_target(relative_path) else {
            return false;
        };
        match std::fs::remove_file(&target) {
            Ok(()) => {
                debug!("Deleted {}", target.display());
                true
            }
            Err(e) => {
                warn!("Cannot delete {}: {}", target.display(), e);
                false
            }
        }
    }

    fn writable_target(&self, relative_path: &str) -> Option<PathBuf> {
        let target = self.layout.resolve_for_write(relative_path);
        if target.is_none() {
            warn!("Skipping {}: a parent directory is a symlink", relative_path);
        }
        target
    }

    fn mark_fixed(&self, entry: &BatchEntry) -> bool {
        let suppression = SuppressionEntry::now(&entry.relative_path, entry.classification);
        match self.store.suppress(suppression) {
            Ok(added) => added,
            Err(e) => {
                warn!("Cannot suppress {}: {}", entry.relative_path, e);
                false
            }
        }
    }

    fn report(&self, action: Action, outcome: &BatchOutcome) {
        let message = match outcome.affected_paths.as_slice() {
            [] => format!("{}: (no entries)", action.title()),
            [single] => format!("{}: {}", action.title(), single),
            many => format!(
                "{}: (multiple entries): {}",
                action.title(),
                many.join(",")
            ),
        };
        self.audit.report(AuditEvent::new(action.severity(), message));

        self.audit.report(AuditEvent::new(
            Severity::Info,
            format!(
                "{} out of {} files were successfully processed.",
                outcome.processed, outcome.selected
            ),
        ));
    }
}

/// Keeps the mode of a file being overwritten; new files get 0644.
#[cfg(unix)]
fn restored_permissions(target: &Path) -> Option<std::fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;

    Some(
        std::fs::metadata(target)
            .map(|m| m.permissions())
            .unwrap_or_else(|_| std::fs::Permissions::from_mode(0o644)),
    )
}

#[cfg(not(unix))]
fn restored_permissions(target: &Path) -> Option<std::fs::Permissions> {
    std::fs::metadata(target).map(|m| m.permissions()).ok()
}
