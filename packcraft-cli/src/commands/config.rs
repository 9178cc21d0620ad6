//! Configuration inspection commands.
//!
//! `config show` prints the effective settings with secrets masked;
//! `config path` prints the file being read.

use clap::Subcommand;
use packcraft::config::ConfigFile;

use super::common::GlobalArgs;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, global: &GlobalArgs) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            let config = global.load_config()?;
            for line in render(&config) {
                println!("{}", line);
            }
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", global.config_path().display());
            Ok(())
        }
    }
}

fn mask(secret: Option<&str>) -> String {
    match secret {
        Some(s) if !s.is_empty() => "********".to_string(),
        _ => "(not set)".to_string(),
    }
}

fn or_unset(value: Option<&str>) -> String {
    value.map_or_else(|| "(not set)".to_string(), str::to_string)
}

/// Settings as INI-like lines, one section after another.
fn render(config: &ConfigFile) -> Vec<String> {
    let mut lines = vec![
        "[registry]".to_string(),
        format!("  instance_url = {}", or_unset(config.registry.instance_url.as_deref())),
        format!("  access_token = {}", mask(config.registry.access_token.as_deref())),
        format!("  api_version = {}", config.registry.api_version),
        format!("  timeout_secs = {}", config.registry.timeout_secs),
        String::new(),
        "[build]".to_string(),
        format!("  version_type = {}", config.build.version_type),
        format!("  force_create = {}", config.build.force_create),
        format!(
            "  force_create_dependencies = {}",
            config.build.force_create_dependencies
        ),
        format!("  namespaced_org = {}", config.build.namespaced_org),
        format!("  poll_interval_secs = {}", config.build.poll_interval.as_secs()),
        format!(
            "  poll_timeout_secs = {}",
            or_unset(
                config
                    .build
                    .poll_timeout
                    .map(|t| t.as_secs().to_string())
                    .as_deref()
            )
        ),
        format!("  clean_meta_xml = {}", config.build.clean_meta_xml),
        String::new(),
        "[dependencies]".to_string(),
        format!("  org = {}", or_unset(config.dependencies.org.as_deref())),
        format!(
            "  github_token = {}",
            mask(config.dependencies.github_token.as_deref())
        ),
        format!(
            "  prepare_command = {}",
            or_unset(config.dependencies.prepare_command.as_deref())
        ),
    ];

    for (name, org) in &config.orgs {
        lines.push(String::new());
        lines.push(format!("[org.{}]", name));
        lines.push(format!("  instance_url = {}", org.instance_url));
        lines.push(format!("  access_token = {}", mask(Some(&org.access_token))));
        lines.push(format!(
            "  expires = {}",
            or_unset(org.expires.map(|e| e.to_rfc3339()).as_deref())
        ));
    }

    lines.push(String::new());
    lines.push("[logging]".to_string());
    lines.push(format!("  level = {}", config.logging.level));
    lines.push(format!(
        "  file = {}",
        or_unset(
            config
                .logging
                .file
                .as_ref()
                .map(|f| f.display().to_string())
                .as_deref()
        )
    ));
    lines
}
