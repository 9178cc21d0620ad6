//! Error types for archive assembly.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors that can occur while building, reading or extracting archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// A listed file is missing or unreadable.
    #[error("failed to read {}: {source}", path.display())]
    Filesystem { path: PathBuf, source: io::Error },

    /// Failed to write an extracted entry.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// The zip container could not be encoded or decoded.
    #[error("zip error: {0}")]
    Zip(String),

    /// An entry name would escape the extraction root.
    #[error("invalid archive entry name: {0}")]
    InvalidEntryName(String),

    /// Walking the working directory failed.
    #[error("failed to list files under {}: {reason}", path.display())]
    ListFailed { path: PathBuf, reason: String },
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(e: zip::result::ZipError) -> Self {
        ArchiveError::Zip(e.to_string())
    }
}
