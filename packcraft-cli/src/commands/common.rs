//! Arguments and helpers shared across CLI commands.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use packcraft::config::{config_file_path, ConfigFile};
use packcraft::logging::LoggingConfig;
use packcraft::registry::ToolingClient;
use packcraft::version::VersionBump;

use crate::error::CliError;

/// Options accepted by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Path to config.ini (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `packcraft=trace` (RUST_LOG wins)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

impl GlobalArgs {
    /// The config file this invocation reads.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config_file_path)
    }

    /// Load tool configuration. An explicit path must exist; the default
    /// location may be absent.
    pub fn load_config(&self) -> Result<ConfigFile, CliError> {
        match &self.config {
            Some(path) => Ok(ConfigFile::load_from(path)?),
            None => Ok(ConfigFile::load()?),
        }
    }

    /// Logging settings from config with the CLI level applied.
    pub fn logging(&self, config: &ConfigFile) -> LoggingConfig {
        match &self.log_level {
            Some(level) => config.logging.clone().with_level(level.clone()),
            None => config.logging.clone(),
        }
    }
}

/// Version bump selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum BumpArg {
    /// Next major version after a release
    Major,
    /// Next minor version after a release
    Minor,
    /// Next patch version after a release
    Patch,
}

impl From<BumpArg> for VersionBump {
    fn from(arg: BumpArg) -> Self {
        match arg {
            BumpArg::Major => VersionBump::Major,
            BumpArg::Minor => VersionBump::Minor,
            BumpArg::Patch => VersionBump::Patch,
        }
    }
}

/// Connect to the registry named in `[registry]`.
pub fn connect_registry(config: &ConfigFile) -> Result<ToolingClient, CliError> {
    let settings = &config.registry;
    let (Some(instance_url), Some(access_token)) =
        (settings.instance_url.as_ref(), settings.access_token.as_ref())
    else {
        return Err(CliError::Config(
            "Registry access requires instance_url and access_token in the [registry] \
             section of config.ini"
                .to_string(),
        ));
    };

    ToolingClient::with_timeout(
        instance_url.clone(),
        access_token.clone(),
        settings.api_version.clone(),
        std::time::Duration::from_secs(settings.timeout_secs),
    )
    .map_err(|e| CliError::Config(e.to_string()))
}
