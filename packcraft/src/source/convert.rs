//! Conversion from source-format projects to the metadata layout.
//!
//! The conversion itself is an external tool; this module only runs it and
//! reports failures.

use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use super::{SourceError, SourceResult};

/// Converts a source-format directory into metadata format.
pub trait SourceConverter {
    /// Convert `source` into `output`, naming the package `package_name`.
    fn convert(&self, source: &Path, output: &Path, package_name: &str) -> SourceResult<()>;
}

/// Runs `sfdx force:source:convert` (or a compatible program).
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
}

impl Default for CommandConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandConverter {
    /// Use the `sfdx` program found on `PATH`.
    pub fn new() -> Self {
        Self::with_program("sfdx")
    }

    /// Use a specific program (path or name).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Program that will be invoked.
    pub fn program(&self) -> &str {
        &self.program
    }

    fn describe(&self) -> String {
        format!("{} force:source:convert", self.program)
    }
}

impl SourceConverter for CommandConverter {
    fn convert(&self, source: &Path, output: &Path, package_name: &str) -> SourceResult<()> {
        info!(
            source = %source.display(),
            output = %output.display(),
            "Converting from source format to metadata format"
        );

        let result = Command::new(&self.program)
            .arg("force:source:convert")
            .arg("-d")
            .arg(output)
            .arg("-r")
            .arg(source)
            .arg("-n")
            .arg(package_name)
            .output();

        match result {
            Ok(out) if out.status.success() => {
                debug!(stdout = %String::from_utf8_lossy(&out.stdout), "Conversion finished");
                Ok(())
            }
            Ok(out) => Err(SourceError::Conversion {
                command: self.describe(),
                reason: format!(
                    "{}: {}",
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            }),
            Err(e) => Err(SourceError::Conversion {
                command: self.describe(),
                reason: format!(
                    "'{}' could not be started: {}. Please ensure it is installed and on PATH.",
                    self.program, e
                ),
            }),
        }
    }
}
