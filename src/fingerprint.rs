//! Content fingerprinting for tracked files.
//!
//! A fingerprint pairs the MD5 digest of a file's content with its last
//! modification time, rendered the way snapshot records store it.

use std::{
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
    time::SystemTime,
};

use md5::{Digest, Md5};
use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};

const HASH_CHUNK_BYTES: usize = 32 * 1024;

const MODIFY_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Digest and modification time observed for a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Lowercase hex MD5 digest of the file content.
    pub hash: String,
    /// Last modification time, `YYYY-MM-DD HH:MM:SS`, local time.
    pub modify: String,
}

/// Errors that may occur while fingerprinting a file.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// Failed to open the file for hashing.
    #[error("Failed to open {path}: {source}")]
    Open {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed while reading file content.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to read file metadata for the modification time.
    #[error("Failed to read metadata of {path}: {source}")]
    Metadata {
        /// Path whose metadata was unavailable.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to format the modification timestamp.
    #[error("Failed to format modification time: {0}")]
    FormatTime(time::error::Format),
}

/// Compute the digest and modification time for `path`.
pub fn fingerprint(path: &Path) -> Result<Fingerprint, FingerprintError> {
    let hash = hash_file(path)?;
    let modify = modification_time(path)?;
    Ok(Fingerprint { hash, modify })
}

/// Compute the MD5 hex digest of a file, streaming in fixed-size chunks.
///
/// Chunking only bounds memory; the digest is identical to a one-shot hash
/// of the whole content.
fn hash_file(path: &Path) -> Result<String, FingerprintError> {
    let mut file = File::open(path).map_err(|source| FingerprintError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; HASH_CHUNK_BYTES];
    loop {
        let read = file
            .read(&mut buf)
            .map_err(|source| FingerprintError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn modification_time(path: &Path) -> Result<String, FingerprintError> {
    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|source| FingerprintError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
    format_modify_time(modified).map_err(FingerprintError::FormatTime)
}

/// Render a filesystem timestamp in local time at second precision.
fn format_modify_time(stamp: SystemTime) -> Result<String, time::error::Format> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::from(stamp).to_offset(offset).format(MODIFY_FORMAT)
}
