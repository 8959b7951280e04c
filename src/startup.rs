//! One-time suppression of paths that are expected to differ on a live
//! installation.

use crate::layout::InstallLayout;
use crate::options::{INTEGRITY_STARTUP, OptionStore};
use crate::record::Classification;
use crate::suppression::{SuppressionEntry, SuppressionStore};
use tracing::{debug, info, warn};

const DEFAULT_LOCALE: &str = "en_US";

/// Server and site configuration files, suppressed unconditionally.
const ALWAYS: &[&str] = &[
    "php.ini",
    ".htaccess",
    ".htpasswd",
    ".ftpquota",
    "wp-includes/.htaccess",
    "wp-admin/setup-config.php",
    "wp-config.php",
    "sitemap.xml",
    "sitemap.xml.gz",
    "readme.html",
    "error_log",
];

/// Legacy entry points and error pages some hosts add.
const IF_PRESENT: &[&str] = &[
    "wp-pass.php",
    "wp-rss.php",
    "wp-feed.php",
    "wp-register.php",
    "wp-atom.php",
    "wp-commentsrss2.php",
    "wp-rss2.php",
    "wp-rdf.php",
    "404.php",
    "503.php",
    "500.php",
    "500.shtml",
    "400.shtml",
    "401.shtml",
    "402.shtml",
    "403.shtml",
    "404.shtml",
    "405.shtml",
    "406.shtml",
    "407.shtml",
    "408.shtml",
    "409.shtml",
    "healthcheck.html",
];

/// Files localized builds ship with different content.
const LOCALIZED: &[&str] = &["wp-includes/version.php", "wp-config-sample.php"];

/// Suppresses the known-benign paths of the installation, once per state
/// directory. Returns how many new suppressions were written; zero when the
/// routine already ran.
///
/// Storage failures never fail the scan that triggered the routine. They are
/// logged and the routine is not marked done, so the next run retries.
pub fn apply_startup_suppressions(
    layout: &InstallLayout,
    store: &SuppressionStore,
    options: &OptionStore,
    locale: &str,
) -> usize {
    match options.get(INTEGRITY_STARTUP) {
        Ok(Some(state)) if state == "done" => {
            debug!("Startup suppressions already applied");
            return 0;
        }
        Ok(_) => {}
        Err(e) => warn!("Cannot read option {}: {}", INTEGRITY_STARTUP, e),
    }

    let exists = |path: &str| layout.root().join(path).symlink_metadata().is_ok();

    let mut candidates: Vec<&str> = ALWAYS.to_vec();
    candidates.extend(IF_PRESENT.iter().copied().filter(|p| exists(p)));
    if locale != DEFAULT_LOCALE {
        candidates.extend(LOCALIZED.iter().copied().filter(|p| exists(p)));
    }

    let mut added = 0;
    let mut first_failure = None;
    for path in candidates {
        match store.suppress(SuppressionEntry::now(path, Classification::Added)) {
            Ok(true) => added += 1,
            Ok(false) => {}
            Err(e) => {
                debug!("Cannot suppress {}: {}", path, e);
                first_failure.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_failure {
        warn!("Startup suppressions not stored, retrying on the next run: {}", e);
        return added;
    }

    if let Err(e) = options.set(INTEGRITY_STARTUP, "done") {
        warn!("Cannot record startup suppressions as applied: {}", e);
    }
    info!("Applied {} startup suppressions", added);

    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hashing::path_key;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup(temp: &TempDir) -> (InstallLayout, SuppressionStore, OptionStore) {
        let root = temp.path().join("site");
        fs::create_dir_all(root.join("wp-includes")).unwrap();
        let state = temp.path().join("state");
        (
            InstallLayout::new(
                &root,
                vec!["wp-admin".to_string(), "wp-includes".to_string()],
                "wp-content",
                None,
            ),
            SuppressionStore::open(&state, "integrity"),
            OptionStore::open(&state),
        )
    }

    fn touch(root: &Path, path: &str) {
        fs::write(root.join(path), "").unwrap();
    }

    #[test]
    fn suppresses_config_files_and_present_legacy_files() {
        let temp = TempDir::new().unwrap();
        let (layout, store, options) = setup(&temp);
        touch(layout.root(), "wp-rss.php");
        touch(layout.root(), "wp-includes/version.php");

        let added = apply_startup_suppressions(&layout, &store, &options, "en_US");

        assert_eq!(added, ALWAYS.len() + 1);
        let all = store.get_all().unwrap();
        assert!(all.contains_key(&path_key("wp-config.php")));
        assert!(all.contains_key(&path_key("wp-rss.php")));
        assert!(!all.contains_key(&path_key("wp-feed.php")));
        assert!(!all.contains_key(&path_key("wp-includes/version.php")));
        assert_eq!(
            all[&path_key(".htaccess")].classification,
            Classification::Added
        );
    }

    #[test]
    fn localized_installations_also_suppress_localized_files() {
        let temp = TempDir::new().unwrap();
        let (layout, store, options) = setup(&temp);
        touch(layout.root(), "wp-includes/version.php");

        apply_startup_suppressions(&layout, &store, &options, "de_DE");

        let all = store.get_all().unwrap();
        assert!(all.contains_key(&path_key("wp-includes/version.php")));
        assert!(!all.contains_key(&path_key("wp-config-sample.php")));
    }

    #[test]
    fn runs_only_once() {
        let temp = TempDir::new().unwrap();
        let (layout, store, options) = setup(&temp);

        apply_startup_suppressions(&layout, &store, &options, "en_US");
        store.remove(&path_key("wp-config.php")).unwrap();
        let second = apply_startup_suppressions(&layout, &store, &options, "en_US");

        assert_eq!(second, 0);
        assert!(!store.get_all().unwrap().contains_key(&path_key("wp-config.php")));
        assert_eq!(
            options.get(INTEGRITY_STARTUP).unwrap().as_deref(),
            Some("done")
        );
    }

    #[test]
    fn unusable_state_dir_is_retried_not_fatal() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("site");
        fs::create_dir(&root).unwrap();
        // A regular file where the state directory should be.
        let state = temp.path().join("state");
        fs::write(&state, "").unwrap();
        let layout = InstallLayout::new(&root, vec![], "wp-content", None);
        let store = SuppressionStore::open(&state, "integrity");
        let options = OptionStore::open(&state);

        let added = apply_startup_suppressions(&layout, &store, &options, "en_US");

        assert_eq!(added, 0);
        assert!(options.get(INTEGRITY_STARTUP).is_err());
        assert!(store.get_all().unwrap().is_empty());
    }
}
