use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Outcome of comparing one path against the release manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Local checksum equals the manifest checksum.
    Stable,
    /// Present locally and in the manifest, checksums differ.
    Modified,
    /// In the manifest, absent locally.
    Removed,
    /// Present locally under a scanned root, absent from the manifest.
    Added,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Stable => "stable",
            Classification::Modified => "modified",
            Classification::Removed => "removed",
            Classification::Added => "added",
        }
    }

    /// Single column status code used in listings.
    pub fn code(self) -> &'static str {
        match self {
            Classification::Stable => ".",
            Classification::Modified => "M",
            Classification::Removed => "R",
            Classification::Added => "A",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown classification: {0}")]
pub struct UnknownClassification(pub String);

impl FromStr for Classification {
    type Err = UnknownClassification;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stable" => Ok(Classification::Stable),
            "modified" => Ok(Classification::Modified),
            "removed" => Ok(Classification::Removed),
            "added" => Ok(Classification::Added),
            other => Err(UnknownClassification(other.to_string())),
        }
    }
}

/// One file observed locally or expected by the manifest during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Normalized, `/` separated path relative to the installation root.
    pub relative_path: String,
    /// Local checksum, when the file could be read.
    pub checksum: Option<String>,
    pub modified_at: Option<SystemTime>,
    pub size_bytes: Option<u64>,
    /// Whether the process could write the location at scan time.
    pub fixable: bool,
    /// Whether an operator accepted this path as a false positive.
    pub suppressed: bool,
}

impl FileRecord {
    pub fn new(relative_path: impl Into<String>) -> Self {
        FileRecord {
            relative_path: relative_path.into(),
            checksum: None,
            modified_at: None,
            size_bytes: None,
            fixable: false,
            suppressed: false,
        }
    }
}
