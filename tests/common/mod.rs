use assert_cmd::{Command, cargo::cargo_bin_cmd};
use md5::{Digest, Md5};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::TempDir;

pub const RELEASE: &str = "6.4.2";

pub fn coreward_cmd(cwd: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("coreward");
    cmd.arg("-C").arg(cwd);
    cmd
}

pub fn md5_hex(content: &str) -> String {
    format!("{:x}", Md5::digest(content.as_bytes()))
}

/// An installation with a manifest mirror in its default location.
pub struct Site {
    temp: TempDir,
}

impl Site {
    /// Creates a site declaring `RELEASE` in its version file. The version
    /// file is part of every published manifest.
    pub fn new() -> Self {
        let site = Site {
            temp: TempDir::new().unwrap(),
        };
        site.write(
            "wp-includes/version.php",
            &format!("<?php\n$wp_version = '{RELEASE}';\n"),
        );
        site
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Publishes `files` (path, content) as the manifest and originals of
    /// `RELEASE`.
    pub fn publish(&self, files: &[(&str, &str)]) {
        let release_dir = self.path(&format!(".coreward/manifests/{RELEASE}"));
        fs::create_dir_all(&release_dir).unwrap();

        let version_file = format!("<?php\n$wp_version = '{RELEASE}';\n");
        let mut checksums = serde_json::Map::new();
        for (path, content) in files
            .iter()
            .copied()
            .chain([("wp-includes/version.php", version_file.as_str())])
        {
            checksums.insert(path.to_string(), md5_hex(content).into());

            let original = release_dir.join("files").join(path);
            fs::create_dir_all(original.parent().unwrap()).unwrap();
            fs::write(original, content).unwrap();
        }

        let document = serde_json::json!({ "checksums": checksums });
        fs::write(release_dir.join("checksums.json"), document.to_string()).unwrap();
    }

    #[allow(dead_code)]
    pub fn run(&self, args: &[&str]) -> Output {
        coreward_cmd(self.root())
            .args(args)
            .output()
            .expect("failed to run coreward")
    }
}

// Each integration test file is compiled as its own crate, and not all of
// them read stdout.
#[allow(dead_code)]
pub fn stdout_of(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("stdout should be UTF-8")
}

/// True under root, where permission bits are not enforced. Prints a notice
/// so the skip shows in test output.
#[cfg(unix)]
#[allow(dead_code)]
pub fn skip_permission_test(name: &str) -> bool {
    let root = nix::unistd::geteuid().is_root();
    if root {
        eprintln!("skipping {name}: permission bits are not enforced for root");
    }
    root
}
