//! Settings of one verified installation.
//!
//! Values come from an optional `coreward.toml` in the installation root (or
//! an explicit file), then command line overrides, then built-in defaults.
//! The release and locale are detected from the installation when not set.

use crate::checksum::ChecksumAlgorithm;
use crate::layout::InstallLayout;
use crate::util::paths::is_contained;
use regex::Regex;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "coreward.toml";

const DEFAULT_LOCALE: &str = "en_US";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const MAX_TIMEOUT_SECS: u64 = 60;
const STATE_DIR_NAME: &str = ".coreward";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("No release configured and none found in {0}")]
    ReleaseUndetected(PathBuf),
}

/// On-disk shape of the config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    release: Option<String>,
    locale: Option<String>,
    core_dirs: Option<Vec<String>>,
    content_dir_name: Option<String>,
    content_dir: Option<PathBuf>,
    manifest_dir: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
    workers: Option<usize>,
    algorithm: Option<ChecksumAlgorithm>,
    audit_log: Option<PathBuf>,
}

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub release: Option<String>,
    pub manifest_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub audit_log: Option<PathBuf>,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    /// Configured or detected release. `None` if neither worked.
    pub release: Option<String>,
    pub locale: String,
    pub core_dirs: Vec<String>,
    pub content_dir_name: String,
    pub content_dir: Option<PathBuf>,
    pub manifest_dir: PathBuf,
    pub state_dir: PathBuf,
    pub request_timeout: Duration,
    /// Zero means one worker per CPU.
    pub workers: usize,
    pub algorithm: ChecksumAlgorithm,
    pub audit_log: Option<PathBuf>,
}

impl Config {
    pub fn load(root: &Path, overrides: &Overrides) -> Result<Config, ConfigError> {
        let root = root.canonicalize().map_err(|source| ConfigError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let file = match &overrides.config {
            Some(path) => read_config_file(path)?.ok_or_else(|| ConfigError::Io {
                path: path.clone(),
                source: std::io::Error::from(ErrorKind::NotFound),
            })?,
            None => read_config_file(&root.join(CONFIG_FILE_NAME))?.unwrap_or_default(),
        };

        let resolve = |p: PathBuf| if p.is_absolute() { p } else { root.join(p) };

        let core_dirs = file
            .core_dirs
            .unwrap_or_else(|| vec!["wp-admin".to_string(), "wp-includes".to_string()]);
        if core_dirs.len() != 2 {
            return Err(ConfigError::Invalid(format!(
                "core_dirs must name exactly two directories, got {}",
                core_dirs.len()
            )));
        }
        if let Some(bad) = core_dirs.iter().find(|d| !is_contained(d)) {
            return Err(ConfigError::Invalid(format!(
                "core directory '{bad}' is not inside the installation"
            )));
        }

        let content_dir_name = file
            .content_dir_name
            .unwrap_or_else(|| "wp-content".to_string());
        if content_dir_name.is_empty() || content_dir_name.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "content_dir_name '{content_dir_name}' must be a single path segment"
            )));
        }

        let timeout_secs = overrides
            .timeout_secs
            .or(file.request_timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if !(1..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "request timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds, got {timeout_secs}"
            )));
        }

        let state_dir = overrides
            .state_dir
            .clone()
            .or(file.state_dir)
            .map(&resolve)
            .unwrap_or_else(|| root.join(STATE_DIR_NAME));
        let manifest_dir = overrides
            .manifest_dir
            .clone()
            .or(file.manifest_dir)
            .map(&resolve)
            .unwrap_or_else(|| state_dir.join("manifests"));

        let detected = detect_release(&root.join(&core_dirs[1]).join("version.php"));

        let release = overrides
            .release
            .clone()
            .or(file.release)
            .or_else(|| detected.release.clone());
        let locale = file
            .locale
            .or(detected.locale)
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());

        Ok(Config {
            release,
            locale,
            core_dirs,
            content_dir_name,
            content_dir: file.content_dir.map(&resolve),
            manifest_dir,
            state_dir,
            request_timeout: Duration::from_secs(timeout_secs),
            workers: overrides.workers.or(file.workers).unwrap_or(0),
            algorithm: file.algorithm.unwrap_or_default(),
            audit_log: overrides.audit_log.clone().or(file.audit_log).map(&resolve),
            root,
        })
    }

    /// The release to verify, failing when it is neither configured nor
    /// detectable.
    pub fn require_release(&self) -> Result<&str, ConfigError> {
        self.release.as_deref().ok_or_else(|| {
            ConfigError::ReleaseUndetected(self.root.join(&self.core_dirs[1]).join("version.php"))
        })
    }

    pub fn layout(&self) -> InstallLayout {
        InstallLayout::new(
            &self.root,
            self.core_dirs.clone(),
            &self.content_dir_name,
            self.content_dir.clone(),
        )
    }
}

fn read_config_file(path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    debug!("Loading config from {}", path.display());

    toml::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Detected {
    release: Option<String>,
    locale: Option<String>,
}

/// Reads `$wp_version` and `$wp_local_package` from a version file.
fn detect_release(version_file: &Path) -> Detected {
    let Ok(content) = std::fs::read_to_string(version_file) else {
        debug!("No version file at {}", version_file.display());
        return Detected::default();
    };

    Detected {
        release: capture_assignment(&content, "wp_version"),
        locale: capture_assignment(&content, "wp_local_package"),
    }
}

fn capture_assignment(content: &str, variable: &str) -> Option<String> {
    let pattern = format!(r#"\${variable}\s*=\s*['"]([^'"]+)['"]\s*;"#);
    let regex = Regex::new(&pattern).ok()?;
    regex
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
