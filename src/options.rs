//! Scalar settings persisted between runs, such as one-time migration flags.

use crate::cache_file::{CacheFile, CacheFileError};
use std::path::{Path, PathBuf};

pub const INTEGRITY_STARTUP: &str = "integrity_startup";

#[derive(Debug, Clone)]
pub struct OptionStore {
    path: PathBuf,
}

impl OptionStore {
    pub fn open(state_dir: &Path) -> Self {
        OptionStore {
            path: state_dir.join("options.toml"),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, CacheFileError> {
        let mut file = CacheFile::<String>::load_or_default(&self.path)?;
        Ok(file.entries.remove(key))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), CacheFileError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(CacheFileError::Io)?;
        }

        let mut file = CacheFile::<String>::load_or_default(&self.path)?;
        file.entries.insert(key.to_string(), value.to_string());
        file.save(&self.path)
    }
}
