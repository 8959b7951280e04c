//! Persistent store of operator-accepted paths.
//!
//! Entries are keyed by [`path_key`] of the relative path and never expire.
//! Writers serialize on an advisory lock file next to the cache, and every
//! write goes through an atomic rename, so concurrent batches can only race
//! on which of two identical suppressions lands first.

use crate::cache_file::{CacheFile, CacheFileError};
use crate::record::Classification;
use crate::util::hashing::path_key;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SuppressionError {
    #[error("Suppression cache error: {0}")]
    CacheFile(#[from] CacheFileError),
    #[error("Cannot lock suppression cache {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuppressionEntry {
    pub relative_path: String,
    /// Classification the path had when it was suppressed.
    pub classification: Classification,
    /// Unix seconds.
    pub suppressed_at: i64,
}

impl SuppressionEntry {
    pub fn now(relative_path: impl Into<String>, classification: Classification) -> Self {
        SuppressionEntry {
            relative_path: relative_path.into(),
            classification,
            suppressed_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn key(&self) -> String {
        path_key(&self.relative_path)
    }
}

#[derive(Debug, Clone)]
pub struct SuppressionStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl SuppressionStore {
    /// Opens the store for `namespace` inside `state_dir`. Nothing is
    /// created until the first write.
    pub fn open(state_dir: &Path, namespace: &str) -> Self {
        SuppressionStore {
            path: state_dir.join(format!("{namespace}.cache.toml")),
            lock_path: state_dir.join(format!("{namespace}.cache.lock")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds `entry` under `key`. Returns false, without touching the
    /// stored entry, if the key is already present.
    pub fn add(&self, key: &str, entry: SuppressionEntry) -> Result<bool, SuppressionError> {
        let _lock = self.lock(true)?;

        let mut cache = CacheFile::<SuppressionEntry>::load_or_default(&self.path)?;
        if cache.entries.contains_key(key) {
            debug!("Suppression {} already present", key);
            return Ok(false);
        }

        debug!("Suppressing {} as {}", entry.relative_path, key);
        cache.entries.insert(key.to_string(), entry);
        cache.save(&self.path)?;

        Ok(true)
    }

    /// Convenience for [`SuppressionStore::add`] keyed by the entry's path.
    pub fn suppress(&self, entry: SuppressionEntry) -> Result<bool, SuppressionError> {
        let key = entry.key();
        self.add(&key, entry)
    }

    /// Removes the entry under `key`. Returns whether one existed.
    pub fn remove(&self, key: &str) -> Result<bool, SuppressionError> {
        if !self.path.exists() {
            return Ok(false);
        }

        let _lock = self.lock(true)?;

        let mut cache = CacheFile::<SuppressionEntry>::load_or_default(&self.path)?;
        if cache.entries.remove(key).is_none() {
            return Ok(false);
        }
        cache.save(&self.path)?;

        Ok(true)
    }

    pub fn get_all(&self) -> Result<BTreeMap<String, SuppressionEntry>, SuppressionError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        // Writers replace the cache by atomic rename, so a reader that cannot
        // create the lock file (read-only state directory) still sees a whole
        // file.
        let _lock = match self.lock(false) {
            Ok(lock) => Some(lock),
            Err(e) => {
                debug!("Reading suppressions unlocked: {}", e);
                None
            }
        };

        Ok(CacheFile::<SuppressionEntry>::load_or_default(&self.path)?.entries)
    }

    fn lock(&self, exclusive: bool) -> Result<File, SuppressionError> {
        let lock_err = |source: std::io::Error| SuppressionError::Lock {
            path: self.lock_path.clone(),
            source,
        };

        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(lock_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(lock_err)?;

        if exclusive {
            FileExt::lock_exclusive(&file).map_err(lock_err)?;
        } else {
            FileExt::lock_shared(&file).map_err(lock_err)?;
        }

        // Dropping the handle releases the lock.
        Ok(file)
    }
}
