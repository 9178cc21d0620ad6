//! Error types for repository fetching and source conversion.

use thiserror::Error;

use crate::archive::ArchiveError;

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors that can occur while fetching or converting package sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The HTTP client could not be created.
    #[error("failed to create HTTP client: {0}")]
    ClientBuild(String),

    /// Download failed at the transport level.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The repository host answered with a non-success status.
    #[error("fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The requested subfolder does not exist at the given ref.
    #[error("subfolder '{subfolder}' not found in {owner}/{repo}")]
    SubfolderNotFound {
        owner: String,
        repo: String,
        subfolder: String,
    },

    /// The downloaded archive could not be read.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Converting the source layout failed.
    #[error("source conversion failed ({command}): {reason}")]
    Conversion { command: String, reason: String },
}
