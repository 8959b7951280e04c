use std::fs::Permissions;
use std::io::Write;
use std::path::Path;

/// Replaces `path` with `contents` atomically.
///
/// Writes to a temporary file next to `path`, fsyncs it, then renames it
/// into place, so readers observe either the old or the new content. The
/// temporary file is created private; pass `permissions` to widen them.
pub fn write_atomic(
    path: &Path,
    contents: &[u8],
    permissions: Option<Permissions>,
) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(contents)?;
    if let Some(permissions) = permissions {
        temp_file.as_file().set_permissions(permissions)?;
    }
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Returns true if the running process may write to `path`.
///
/// Missing paths are not writable. The answer is only a snapshot and must
/// not be cached across scans.
#[cfg(unix)]
pub fn is_writable(path: &Path) -> bool {
    use nix::unistd::{AccessFlags, access};

    access(path, AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
pub fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

/// True when permission bits are not enforced for the test process, which
/// is the case under root. Prints a notice so the skip shows in test output.
#[cfg(all(test, unix))]
pub fn skip_permission_test(name: &str) -> bool {
    let root = nix::unistd::geteuid().is_root();
    if root {
        eprintln!("skipping {name}: permission bits are not enforced for root");
    }
    root
}
