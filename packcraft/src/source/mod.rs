//! Package sources outside the working directory.
//!
//! - [`SourceFetcher`]: download a subtree of a hosted repository at a ref
//!   (implemented for GitHub zipballs by [`GitHubFetcher`]).
//! - [`SourceConverter`]: convert a source-format project into the
//!   metadata layout the registry expects (implemented by running an
//!   external command, [`CommandConverter`]).

mod convert;
mod error;
mod github;

use crate::archive::Archive;

pub use convert::{CommandConverter, SourceConverter};
pub use error::{SourceError, SourceResult};
pub use github::{extract_subfolder, GitHubFetcher, GITHUB_API_URL};

/// Downloads a repository subtree as an archive.
pub trait SourceFetcher {
    /// Fetch `subfolder` of `owner/repo` at `git_ref` (default branch when
    /// `None`). Entry names are relative to the subfolder.
    fn fetch(
        &self,
        owner: &str,
        repo: &str,
        subfolder: &str,
        git_ref: Option<&str>,
    ) -> SourceResult<Archive>;
}
