//! Error types for the publisher module.

use std::fmt;
use std::time::Duration;

use crate::archive::ArchiveError;
use crate::org::OrgError;
use crate::project::ProjectError;
use crate::registry::RegistryError;
use crate::source::SourceError;

/// Result type for publisher operations.
pub type PublishResult<T> = Result<T, PublishError>;

/// Errors that can occur while building and publishing a package version.
#[derive(Debug)]
pub enum PublishError {
    /// Invalid package definition or build settings. Raised before
    /// anything is submitted.
    Configuration(String),

    /// A managed dependency is not installed in the resolution org.
    DependencyLookup {
        org: String,
        namespace: String,
        version: String,
    },

    /// The registry reported a failed build. Carries every error detail
    /// message, newline-joined.
    PackageUploadFailure(String),

    /// A dependency repeats along its own resolution path.
    CyclicDependency { chain: Vec<String> },

    /// Polling was cancelled before the request reached a terminal state.
    Cancelled { request_id: String },

    /// Polling exceeded the configured limit.
    PollTimeout {
        request_id: String,
        elapsed: Duration,
    },

    /// Packaging or archive encoding failed.
    Archive(ArchiveError),

    /// A registry call failed.
    Registry(RegistryError),

    /// Fetching or converting package source failed.
    Source(SourceError),

    /// The resolution org could not be acquired.
    Org(OrgError),

    /// The project manifest is invalid.
    Project(ProjectError),
}

impl PublishError {
    /// Whether the error was raised during pre-flight validation.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PublishError::Configuration(_) | PublishError::Project(_)
        )
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Configuration(msg) => write!(f, "{}", msg),
            PublishError::DependencyLookup {
                org,
                namespace,
                version,
            } => {
                write!(
                    f,
                    "Could not find installed dependency in org {}: {}@{}",
                    org, namespace, version
                )
            }
            PublishError::PackageUploadFailure(msg) => write!(f, "{}", msg),
            PublishError::CyclicDependency { chain } => {
                write!(f, "cyclic dependency: {}", chain.join(" -> "))
            }
            PublishError::Cancelled { request_id } => {
                write!(f, "polling of request {} was cancelled", request_id)
            }
            PublishError::PollTimeout {
                request_id,
                elapsed,
            } => {
                write!(
                    f,
                    "request {} did not finish within {}s",
                    request_id,
                    elapsed.as_secs()
                )
            }
            PublishError::Archive(e) => write!(f, "archive error: {}", e),
            PublishError::Registry(e) => write!(f, "registry error: {}", e),
            PublishError::Source(e) => write!(f, "source error: {}", e),
            PublishError::Org(e) => write!(f, "org error: {}", e),
            PublishError::Project(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PublishError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PublishError::Archive(e) => Some(e),
            PublishError::Registry(e) => Some(e),
            PublishError::Source(e) => Some(e),
            PublishError::Org(e) => Some(e),
            PublishError::Project(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArchiveError> for PublishError {
    fn from(e: ArchiveError) -> Self {
        PublishError::Archive(e)
    }
}

impl From<RegistryError> for PublishError {
    fn from(e: RegistryError) -> Self {
        PublishError::Registry(e)
    }
}

impl From<SourceError> for PublishError {
    fn from(e: SourceError) -> Self {
        PublishError::Source(e)
    }
}

impl From<OrgError> for PublishError {
    fn from(e: OrgError) -> Self {
        PublishError::Org(e)
    }
}

impl From<ProjectError> for PublishError {
    fn from(e: ProjectError) -> Self {
        PublishError::Project(e)
    }
}
