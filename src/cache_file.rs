//! Versioned TOML documents holding keyed entries.
//!
//! Backs both the suppression cache and the option store. Each document
//! carries a `[metadata]` table whose version is checked before the entries
//! are parsed.

use crate::util::fs::write_atomic;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CacheFileError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Unsupported cache file version: {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Metadata {
    version: u32,
}

/// Extracts only the metadata table. Deliberately lenient so that a file
/// written by a future version reports its version instead of a parse error.
#[derive(Debug, Deserialize)]
struct MetadataOnly {
    metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheFile<V> {
    metadata: Metadata,
    #[serde(default = "BTreeMap::new")]
    pub entries: BTreeMap<String, V>,
}

impl<V> Default for CacheFile<V> {
    fn default() -> Self {
        CacheFile::new(BTreeMap::new())
    }
}

impl<V> CacheFile<V> {
    const SUPPORTED_VERSION: u32 = 1;

    pub fn new(entries: BTreeMap<String, V>) -> Self {
        CacheFile {
            metadata: Metadata {
                version: Self::SUPPORTED_VERSION,
            },
            entries,
        }
    }
}

impl<V: Serialize + DeserializeOwned> CacheFile<V> {
    pub fn from_toml(content: &str) -> Result<Self, CacheFileError> {
        let metadata_only: MetadataOnly = toml::from_str(content)?;

        if metadata_only.metadata.version != Self::SUPPORTED_VERSION {
            return Err(CacheFileError::UnsupportedVersion(
                metadata_only.metadata.version,
            ));
        }

        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, CacheFileError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, CacheFileError> {
        let content = std::fs::read_to_string(path).map_err(|e| map_io(path, e))?;

        Self::from_toml(&content)
    }

    /// Loads `path`, treating a missing file as an empty document.
    pub fn load_or_default(path: &Path) -> Result<Self, CacheFileError> {
        match Self::load(path) {
            Err(CacheFileError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            other => other,
        }
    }

    /// Saves the document atomically.
    pub fn save(&self, path: &Path) -> Result<(), CacheFileError> {
        let content = self.to_toml()?;

        write_atomic(path, content.as_bytes(), None).map_err(|e| map_io(path, e))
    }
}

fn map_io(path: &Path, e: std::io::Error) -> CacheFileError {
    if e.kind() == ErrorKind::PermissionDenied {
        CacheFileError::PermissionDenied(path.to_path_buf())
    } else {
        CacheFileError::Io(e)
    }
}
