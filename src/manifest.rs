//! Sources of the trusted release manifest.
//!
//! A manifest maps every file of a release to its published checksum. The
//! engine only sees the [`ManifestProvider`] trait; this module ships a
//! provider reading a local mirror of the release authority and a wrapper
//! bounding how long any provider may take.

use crate::util::paths::{is_contained, normalize_relative};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, warn};

/// Relative path to expected checksum.
pub type Manifest = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Release {version} ({locale}) is not supported")]
    Unsupported { version: String, locale: String },
    #[error("Malformed manifest {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Manifest source unreachable: {0}")]
    Unreachable(String),
    #[error("Manifest fetch timed out after {0:?}")]
    Timeout(Duration),
}

pub trait ManifestProvider: Send + Sync {
    /// Fetches the manifest of `version` for `locale`.
    fn manifest(&self, version: &str, locale: &str) -> Result<Manifest, ManifestError>;

    /// Fetches the published content of `relative_path`, named the way the
    /// manifest names it. `Ok(None)` means the source has no copy.
    fn original_content(
        &self,
        version: &str,
        relative_path: &str,
    ) -> Result<Option<Vec<u8>>, ManifestError>;
}

impl<P: ManifestProvider + ?Sized> ManifestProvider for Arc<P> {
    fn manifest(&self, version: &str, locale: &str) -> Result<Manifest, ManifestError> {
        (**self).manifest(version, locale)
    }

    fn original_content(
        &self,
        version: &str,
        relative_path: &str,
    ) -> Result<Option<Vec<u8>>, ManifestError> {
        (**self).original_content(version, relative_path)
    }
}

/// The document shape published by the release authority.
#[derive(Debug, Deserialize)]
struct ChecksumsDocument {
    checksums: ChecksumsField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChecksumsField {
    Files(BTreeMap<String, String>),
    /// The authority answers `"checksums": false` for unknown releases.
    Unavailable(bool),
}

/// Reads manifests from a local mirror laid out as:
///
/// ```text
/// <dir>/<version>/checksums-<locale>.json   (preferred)
/// <dir>/<version>/checksums.json            (fallback)
/// <dir>/<version>/files/<relative path>     (original content)
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryManifestProvider {
    dir: PathBuf,
}

impl DirectoryManifestProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectoryManifestProvider { dir: dir.into() }
    }

    fn release_dir(&self, version: &str) -> Option<PathBuf> {
        if !is_contained(version) || version.contains('/') {
            return None;
        }
        Some(self.dir.join(version))
    }

    fn read_document(path: &Path) -> Result<Option<ChecksumsDocument>, ManifestError> {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ManifestError::Unreachable(format!(
                    "{}: {}",
                    path.display(),
                    e
                )));
            }
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|source| ManifestError::Malformed {
                path: path.to_path_buf(),
                source,
            })
    }
}

impl ManifestProvider for DirectoryManifestProvider {
    fn manifest(&self, version: &str, locale: &str) -> Result<Manifest, ManifestError> {
        let unsupported = || ManifestError::Unsupported {
            version: version.to_string(),
            locale: locale.to_string(),
        };

        if !self.dir.is_dir() {
            return Err(ManifestError::Unreachable(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }

        let release_dir = self.release_dir(version).ok_or_else(unsupported)?;

        let mut candidates = Vec::new();
        if is_contained(locale) && !locale.contains('/') {
            candidates.push(release_dir.join(format!("checksums-{locale}.json")));
        }
        candidates.push(release_dir.join("checksums.json"));

        for candidate in candidates {
            let Some(document) = Self::read_document(&candidate)? else {
                continue;
            };

            debug!("Using manifest {}", candidate.display());

            let files = match document.checksums {
                ChecksumsField::Files(files) => files,
                ChecksumsField::Unavailable(_) => return Err(unsupported()),
            };

            let mut manifest = Manifest::new();
            for (path, checksum) in files {
                let normalized = normalize_relative(&path);
                if !is_contained(&normalized) {
                    warn!("Ignoring manifest entry outside the installation: {}", path);
                    continue;
                }
                manifest.entry(normalized).or_insert(checksum);
            }
            return Ok(manifest);
        }

        Err(unsupported())
    }

    fn original_content(
        &self,
        version: &str,
        relative_path: &str,
    ) -> Result<Option<Vec<u8>>, ManifestError> {
        let Some(release_dir) = self.release_dir(version) else {
            return Ok(None);
        };
        if !is_contained(relative_path) {
            return Ok(None);
        }

        let path = release_dir.join("files").join(relative_path);
        match std::fs::read(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ManifestError::Unreachable(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Bounds the time any call to the inner provider may take.
///
/// The call runs on a helper thread; if it does not answer in time the
/// result is [`ManifestError::Timeout`] and the late answer is discarded.
#[derive(Clone)]
pub struct TimeoutManifestProvider {
    inner: Arc<dyn ManifestProvider>,
    timeout: Duration,
}

impl TimeoutManifestProvider {
    pub fn new(inner: Arc<dyn ManifestProvider>, timeout: Duration) -> Self {
        TimeoutManifestProvider { inner, timeout }
    }

    fn call<T, F>(&self, f: F) -> Result<T, ManifestError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ManifestProvider) -> Result<T, ManifestError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);

        std::thread::Builder::new()
            .name("manifest-fetch".to_string())
            .spawn(move || {
                // The receiver is gone if we already timed out.
                let _ = tx.send(f(inner.as_ref()));
            })
            .map_err(|e| ManifestError::Unreachable(e.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ManifestError::Timeout(self.timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ManifestError::Unreachable(
                "manifest fetch aborted".to_string(),
            )),
        }
    }
}

impl ManifestProvider for TimeoutManifestProvider {
    fn manifest(&self, version: &str, locale: &str) -> Result<Manifest, ManifestError> {
        let version = version.to_string();
        let locale = locale.to_string();
        self.call(move |inner| inner.manifest(&version, &locale))
    }

    fn original_content(
        &self,
        version: &str,
        relative_path: &str,
    ) -> Result<Option<Vec<u8>>, ManifestError> {
        let version = version.to_string();
        let relative_path = relative_path.to_string();
        self.call(move |inner| inner.original_content(&version, &relative_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_release(dir: &Path, version: &str, name: &str, json: &str) {
        let release = dir.join(version);
        fs::create_dir_all(&release).unwrap();
        fs::write(release.join(name), json).unwrap();
    }

    #[test]
    fn reads_generic_manifest() {
        let temp = TempDir::new().unwrap();
        write_release(
            temp.path(),
            "6.4.2",
            "checksums.json",
            r#"{"checksums": {"index.php": "h1", "./wp-admin/about.php": "h2"}}"#,
        );

        let manifest = DirectoryManifestProvider::new(temp.path())
            .manifest("6.4.2", "en_US")
            .unwrap();

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest["index.php"], "h1");
        assert_eq!(manifest["wp-admin/about.php"], "h2");
    }

    #[test]
    fn prefers_locale_specific_manifest() {
        let temp = TempDir::new().unwrap();
        write_release(
            temp.path(),
            "6.4.2",
            "checksums.json",
            r#"{"checksums": {"index.php": "en"}}"#,
        );
        write_release(
            temp.path(),
            "6.4.2",
            "checksums-de_DE.json",
            r#"{"checksums": {"index.php": "de"}}"#,
        );
        let provider = DirectoryManifestProvider::new(temp.path());

        assert_eq!(provider.manifest("6.4.2", "de_DE").unwrap()["index.php"], "de");
        assert_eq!(provider.manifest("6.4.2", "fr_FR").unwrap()["index.php"], "en");
    }

    #[test]
    fn false_checksums_mean_unsupported() {
        let temp = TempDir::new().unwrap();
        write_release(temp.path(), "0.1", "checksums.json", r#"{"checksums": false}"#);

        let result = DirectoryManifestProvider::new(temp.path()).manifest("0.1", "en_US");

        assert!(matches!(result, Err(ManifestError::Unsupported { .. })));
    }

    #[test]
    fn unknown_release_is_unsupported() {
        let temp = TempDir::new().unwrap();

        let result = DirectoryManifestProvider::new(temp.path()).manifest("9.9", "en_US");

        assert!(matches!(result, Err(ManifestError::Unsupported { .. })));
    }

    #[test]
    fn missing_mirror_is_unreachable() {
        let temp = TempDir::new().unwrap();

        let result =
            DirectoryManifestProvider::new(temp.path().join("missing")).manifest("6.4", "en_US");

        assert!(matches!(result, Err(ManifestError::Unreachable(_))));
    }

    #[test]
    fn malformed_document_is_reported() {
        let temp = TempDir::new().unwrap();
        write_release(temp.path(), "6.4", "checksums.json", "{not json");

        let result = DirectoryManifestProvider::new(temp.path()).manifest("6.4", "en_US");

        assert!(matches!(result, Err(ManifestError::Malformed { .. })));
    }

    #[test]
    fn escaping_entries_and_versions_are_rejected() {
        let temp = TempDir::new().unwrap();
        write_release(
            temp.path(),
            "6.4",
            "checksums.json",
            r#"{"checksums": {"../evil.php": "x", "/etc/passwd": "y", "ok.php": "z"}}"#,
        );
        let provider = DirectoryManifestProvider::new(temp.path());

        let manifest = provider.manifest("6.4", "en_US").unwrap();
        assert_eq!(manifest.keys().collect::<Vec<_>>(), vec!["ok.php"]);

        assert!(matches!(
            provider.manifest("../6.4", "en_US"),
            Err(ManifestError::Unsupported { .. })
        ));
    }

    #[test]
    fn original_content_reads_release_files() {
        let temp = TempDir::new().unwrap();
        let files = temp.path().join("6.4/files/wp-admin");
        fs::create_dir_all(&files).unwrap();
        fs::write(files.join("about.php"), "original").unwrap();
        let provider = DirectoryManifestProvider::new(temp.path());

        assert_eq!(
            provider.original_content("6.4", "wp-admin/about.php").unwrap(),
            Some(b"original".to_vec())
        );
        assert_eq!(provider.original_content("6.4", "missing.php").unwrap(), None);
        assert_eq!(
            provider
                .original_content("6.4", "../6.4/files/wp-admin/about.php")
                .unwrap(),
            None
        );
    }

    struct SlowProvider(Duration);

    impl ManifestProvider for SlowProvider {
        fn manifest(&self, _version: &str, _locale: &str) -> Result<Manifest, ManifestError> {
            std::thread::sleep(self.0);
            Ok(Manifest::from([("index.php".to_string(), "h".to_string())]))
        }

        fn original_content(
            &self,
            _version: &str,
            _relative_path: &str,
        ) -> Result<Option<Vec<u8>>, ManifestError> {
            std::thread::sleep(self.0);
            Ok(Some(b"content".to_vec()))
        }
    }

    #[test]
    fn timeout_wrapper_passes_fast_answers_through() {
        let provider = TimeoutManifestProvider::new(
            Arc::new(SlowProvider(Duration::ZERO)),
            Duration::from_secs(5),
        );

        assert_eq!(provider.manifest("6.4", "en_US").unwrap().len(), 1);
        assert_eq!(
            provider.original_content("6.4", "index.php").unwrap(),
            Some(b"content".to_vec())
        );
    }

    #[test]
    fn timeout_wrapper_aborts_slow_fetches() {
        let provider = TimeoutManifestProvider::new(
            Arc::new(SlowProvider(Duration::from_secs(2))),
            Duration::from_millis(50),
        );

        match provider.manifest("6.4", "en_US") {
            Err(ManifestError::Timeout(d)) => assert_eq!(d, Duration::from_millis(50)),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }
}
