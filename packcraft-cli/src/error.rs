//! CLI error type and exit codes.

use std::fmt;

use packcraft::config::ConfigError;
use packcraft::project::ProjectError;
use packcraft::publisher::PublishError;

/// Exit code for failures caused by invalid input or settings.
pub const EXIT_CONFIGURATION: u8 = 2;

/// Exit code after the user interrupted a build.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Errors surfaced to the command line.
#[derive(Debug)]
pub enum CliError {
    /// Missing or invalid tool configuration.
    Config(String),
    /// The project manifest could not be used.
    Project(ProjectError),
    /// The build itself failed.
    Publish(PublishError),
    /// Writing the result failed.
    Output(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) | CliError::Project(_) => EXIT_CONFIGURATION,
            CliError::Publish(PublishError::Cancelled { .. }) => EXIT_INTERRUPTED,
            CliError::Publish(e) if e.is_configuration() => EXIT_CONFIGURATION,
            CliError::Publish(_) | CliError::Output(_) => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Project(e) => write!(f, "Project error: {}", e),
            CliError::Publish(e) => write!(f, "Build failed: {}", e),
            CliError::Output(msg) => write!(f, "Output error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Project(e) => Some(e),
            CliError::Publish(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ProjectError> for CliError {
    fn from(e: ProjectError) -> Self {
        CliError::Project(e)
    }
}

impl From<PublishError> for CliError {
    fn from(e: PublishError) -> Self {
        CliError::Publish(e)
    }
}
