mod common;

use common::{RELEASE, Site, coreward_cmd, stdout_of};
use predicates::prelude::*;

#[test]
fn status_is_clean_when_files_match_the_release() {
    let site = Site::new();
    site.write("index.php", "<?php // index");
    site.write("wp-admin/about.php", "<?php // about");
    site.publish(&[
        ("index.php", "<?php // index"),
        ("wp-admin/about.php", "<?php // about"),
    ]);

    coreward_cmd(site.root())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn status_classifies_stable_removed_and_added() {
    let site = Site::new();
    site.write("a.php", "h1");
    site.write("c.php", "h3");
    site.publish(&[("a.php", "h1"), ("b.php", "h2")]);

    let output = site.run(&["status"]);
    let stdout = stdout_of(&output);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout.contains("R  b.php"));
    assert!(stdout.contains("A  c.php"));
    assert!(!stdout.contains("a.php"));
    assert!(!stdout.contains("M "));
}

#[test]
fn status_all_lists_stable_files() {
    let site = Site::new();
    site.write("a.php", "h1");
    site.publish(&[("a.php", "h1")]);

    coreward_cmd(site.root())
        .args(["status", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".  a.php"))
        .stdout(predicate::str::contains(".  wp-includes/version.php"));
}

#[test]
fn status_reports_modified_core_files_with_size() {
    let site = Site::new();
    site.write("wp-includes/load.php", "tampered!");
    site.publish(&[("wp-includes/load.php", "original")]);

    coreward_cmd(site.root())
        .arg("status")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("M  wp-includes/load.php (9 bytes, "));
}

#[test]
fn status_ignores_exempt_and_unscanned_paths() {
    let site = Site::new();
    site.write("favicon.ico", "icon");
    site.write("license.txt", "text");
    site.write("coreward.toml", "");
    site.write("wp-content/plugins/hello/hello.php", "plugin");
    site.write("wp-content/uploads/2024/shell.php", "not scanned");
    site.publish(&[
        ("license.txt", "upstream text"),
        ("wp-content/themes/twenty/style.php", "theme"),
    ]);

    coreward_cmd(site.root())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn status_hides_startup_suppressions() {
    let site = Site::new();
    site.write("wp-config.php", "<?php define('DB_NAME', 'x');");
    site.write(".htaccess", "RewriteEngine On");
    site.publish(&[]);

    coreward_cmd(site.root())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    coreward_cmd(site.root())
        .args(["status", "--show-suppressed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("A  wp-config.php (")
            .and(predicate::str::contains("(suppressed)")));
}

#[test]
fn status_fails_when_the_manifest_is_unavailable() {
    let site = Site::new();
    site.write("index.php", "<?php");

    coreward_cmd(site.root())
        .arg("status")
        .assert()
        .code(255)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains(format!(
            "Manifest for release {RELEASE} unavailable"
        )));
}

#[test]
fn status_fails_for_an_unpublished_release_override() {
    let site = Site::new();
    site.publish(&[]);

    coreward_cmd(site.root())
        .args(["--release", "1.0", "status"])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("Manifest for release 1.0 unavailable"));
}

#[test]
fn status_fails_without_a_detectable_release() {
    let site = Site::new();
    std::fs::remove_file(site.path("wp-includes/version.php")).unwrap();

    coreward_cmd(site.root())
        .arg("status")
        .assert()
        .code(255)
        .stderr(predicate::str::contains("No release configured"));
}

#[test]
fn status_maps_a_renamed_content_directory() {
    let site = Site::new();
    site.write("app/index.php", "<?php // silence");
    site.write("coreward.toml", "content_dir = \"app\"\n");
    site.publish(&[("wp-content/index.php", "<?php // silence")]);

    coreward_cmd(site.root())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn status_rejects_an_invalid_config_file() {
    let site = Site::new();
    site.write("coreward.toml", "request_timeout_secs = \"soon\"\n");
    site.publish(&[]);

    coreward_cmd(site.root())
        .arg("status")
        .assert()
        .code(255)
        .stderr(predicate::str::contains("Invalid config file"));
}

#[test]
#[cfg(unix)]
fn status_marks_unwritable_files() {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    if common::skip_permission_test("status_marks_unwritable_files") {
        return;
    }

    let site = Site::new();
    site.write("wp-admin/about.php", "tampered");
    fs::set_permissions(
        site.path("wp-admin/about.php"),
        fs::Permissions::from_mode(0o444),
    )
    .unwrap();
    site.publish(&[("wp-admin/about.php", "original")]);

    coreward_cmd(site.root())
        .arg("status")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("(no permission)"));
}

#[test]
fn status_survives_an_unusable_state_directory() {
    let site = Site::new();
    site.write("a.php", "h1");
    site.write("c.php", "h3");
    site.publish(&[("a.php", "h1")]);
    let outside = tempfile::TempDir::new().unwrap();
    let state_file = outside.path().join("statefile");
    std::fs::write(&state_file, "").unwrap();

    coreward_cmd(site.root())
        .arg("--state-dir")
        .arg(&state_file)
        .arg("--manifest-dir")
        .arg(site.path(".coreward/manifests"))
        .arg("status")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("A  c.php"))
        .stderr(predicate::str::contains("Startup suppressions not stored"));
}
