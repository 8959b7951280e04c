use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("File modified during checksumming: {0}")]
    ConcurrentModification(PathBuf),
}

/// Content digest used to compare local files with manifest entries.
///
/// Release manifests publish MD5 sums, so that is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn digest_bytes(self, bytes: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Md5 => format!("{:x}", Md5::digest(bytes)),
            ChecksumAlgorithm::Sha256 => format!("{:x}", Sha256::digest(bytes)),
        }
    }
}

pub struct FileChecksum {
    /// Lowercase hex.
    pub digest: String,
    /// Modification time captured after checksumming.
    pub mtime: SystemTime,
    /// File size in bytes.
    pub size: u64,
}

/// Computes the checksum of a file with concurrent modification detection.
///
/// # Behavior
/// - Records the file's modification time before reading
/// - Reads the file in chunks and feeds the selected digest
/// - Verifies the modification time hasn't changed after reading
/// - Returns an error if the file was modified during checksumming
///
/// # Errors
/// - `ChecksumError::Io`: File doesn't exist or other I/O errors
/// - `ChecksumError::PermissionDenied`: Insufficient permissions to read the file
/// - `ChecksumError::ConcurrentModification`: File was detected as being modified while
///   checksumming. Note that the absence of this error is *not* a guarantee that the
///   file was *not* modified.
pub fn checksum_file(path: &Path, algorithm: ChecksumAlgorithm) -> Result<FileChecksum, ChecksumError> {
    match algorithm {
        ChecksumAlgorithm::Md5 => checksum_with::<Md5>(path),
        ChecksumAlgorithm::Sha256 => checksum_with::<Sha256>(path),
    }
}

fn checksum_with<D: Digest>(path: &Path) -> Result<FileChecksum, ChecksumError> {
    let metadata_before = std::fs::metadata(path).map_err(|e| map_open_error(path, e))?;
    let mtime_before = metadata_before.modified().map_err(ChecksumError::Io)?;

    let mut file = File::open(path).map_err(|e| map_open_error(path, e))?;
    let mut hasher = D::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(ChecksumError::Io)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let metadata_after = std::fs::metadata(path).map_err(ChecksumError::Io)?;
    let mtime_after = metadata_after.modified().map_err(ChecksumError::Io)?;

    if mtime_before != mtime_after {
        return Err(ChecksumError::ConcurrentModification(path.to_path_buf()));
    }

    let digest = to_hex(&hasher.finalize());

    debug!("Checksum of {} is {}", path.display(), digest);

    Ok(FileChecksum {
        digest,
        mtime: mtime_after,
        size: metadata_after.len(),
    })
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn map_open_error(path: &Path, e: std::io::Error) -> ChecksumError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        ChecksumError::PermissionDenied(path.to_path_buf())
    } else {
        ChecksumError::Io(e)
    }
}

/// Compares two hex digests, ignoring case.
pub fn digests_match(local: &str, expected: &str) -> bool {
    local.eq_ignore_ascii_case(expected.trim())
}
