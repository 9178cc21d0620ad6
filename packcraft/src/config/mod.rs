//! Tool configuration file.
//!
//! Settings live in an INI file, by default
//! `~/.config/packcraft/config.ini`:
//!
//! ```ini
//! [registry]
//! instance_url = https://example.my.salesforce.com
//! access_token = 00D...
//! api_version = 58.0
//!
//! [build]
//! version_type = minor
//! force_create = no
//! poll_interval_secs = 5
//!
//! [dependencies]
//! org = 2gp_dependencies
//!
//! [org.2gp_dependencies]
//! instance_url = https://deps.scratch.my.salesforce.com
//! access_token = 00D...
//! expires = 2026-11-01T00:00:00Z
//!
//! [logging]
//! level = info
//! ```
//!
//! Every key is optional; missing keys keep their defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ini::{Ini, Properties};
use thiserror::Error;

use crate::logging::LoggingConfig;
use crate::registry::{DEFAULT_API_VERSION, DEFAULT_TIMEOUT_SECS};
use crate::version::VersionBump;

/// Default seconds between creation-request polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Section prefix for org definitions (`[org.<name>]`).
const ORG_SECTION_PREFIX: &str = "org.";

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// `[registry]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    pub instance_url: Option<String>,
    pub access_token: Option<String>,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            instance_url: None,
            access_token: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// `[build]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub version_type: VersionBump,
    pub force_create: bool,
    pub force_create_dependencies: bool,
    pub namespaced_org: bool,
    pub poll_interval: Duration,
    pub poll_timeout: Option<Duration>,
    pub clean_meta_xml: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            version_type: VersionBump::default(),
            force_create: false,
            force_create_dependencies: false,
            namespaced_org: false,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_timeout: None,
            clean_meta_xml: true,
        }
    }
}

/// `[dependencies]` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySettings {
    /// Resolution org to use as-is instead of the managed one.
    pub org: Option<String>,
    pub github_token: Option<String>,
    /// Command run to prepare a fresh resolution org; `{org}` is replaced
    /// with the org name.
    pub prepare_command: Option<String>,
}

/// An `[org.<name>]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgSettings {
    pub instance_url: String,
    pub access_token: String,
    pub expires: Option<DateTime<Utc>>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub registry: RegistrySettings,
    pub build: BuildSettings,
    pub dependencies: DependencySettings,
    pub orgs: BTreeMap<String, OrgSettings>,
    pub logging: LoggingConfig,
}

/// Default configuration file location.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("packcraft")
        .join("config.ini")
}

impl ConfigFile {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> ConfigResult<Self> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse INI text.
    pub fn from_ini_str(content: &str) -> ConfigResult<Self> {
        let ini = Ini::load_from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> ConfigResult<Self> {
        let mut config = ConfigFile::default();

        if let Some(section) = ini.section(Some("registry")) {
            let s = Section::new("registry", section);
            config.registry.instance_url = s.string("instance_url");
            config.registry.access_token = s.string("access_token");
            if let Some(v) = s.string("api_version") {
                config.registry.api_version = v;
            }
            if let Some(v) = s.number("timeout_secs")? {
                config.registry.timeout_secs = v;
            }
        }

        if let Some(section) = ini.section(Some("build")) {
            let s = Section::new("build", section);
            if let Some(v) = s.raw("version_type") {
                config.build.version_type = v
                    .parse()
                    .map_err(|reason| s.invalid("version_type", v, reason))?;
            }
            if let Some(v) = s.bool("force_create")? {
                config.build.force_create = v;
            }
            if let Some(v) = s.bool("force_create_dependencies")? {
                config.build.force_create_dependencies = v;
            }
            if let Some(v) = s.bool("namespaced_org")? {
                config.build.namespaced_org = v;
            }
            if let Some(v) = s.number("poll_interval_secs")? {
                config.build.poll_interval = Duration::from_secs(v);
            }
            if let Some(v) = s.number("poll_timeout_secs")? {
                config.build.poll_timeout = Some(Duration::from_secs(v));
            }
            if let Some(v) = s.bool("clean_meta_xml")? {
                config.build.clean_meta_xml = v;
            }
        }

        if let Some(section) = ini.section(Some("dependencies")) {
            let s = Section::new("dependencies", section);
            config.dependencies.org = s.string("org");
            config.dependencies.github_token = s.string("github_token");
            config.dependencies.prepare_command = s.string("prepare_command");
        }

        if let Some(section) = ini.section(Some("logging")) {
            let s = Section::new("logging", section);
            if let Some(level) = s.string("level") {
                config.logging.level = level;
            }
            config.logging.file = s.string("file").map(PathBuf::from);
        }

        for (name, properties) in ini.iter() {
            let Some(org) = name.and_then(|n| n.strip_prefix(ORG_SECTION_PREFIX)) else {
                continue;
            };
            let section_name = format!("{}{}", ORG_SECTION_PREFIX, org);
            let s = Section::new(&section_name, properties);
            let settings = OrgSettings {
                instance_url: s.required("instance_url")?,
                access_token: s.required("access_token")?,
                expires: s.timestamp("expires")?,
            };
            config.orgs.insert(org.to_string(), settings);
        }

        Ok(config)
    }
}

/// Typed accessors over one INI section.
struct Section<'a> {
    name: &'a str,
    properties: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'a str, properties: &'a Properties) -> Self {
        Self { name, properties }
    }

    fn raw(&self, key: &str) -> Option<&'a str> {
        self.properties
            .get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str) -> Option<String> {
        self.raw(key).map(str::to_string)
    }

    fn required(&self, key: &str) -> ConfigResult<String> {
        self.string(key)
            .ok_or_else(|| self.invalid(key, "", "value is required".to_string()))
    }

    fn bool(&self, key: &str) -> ConfigResult<Option<bool>> {
        self.raw(key)
            .map(|v| {
                parse_bool(v)
                    .ok_or_else(|| self.invalid(key, v, "expected a boolean".to_string()))
            })
            .transpose()
    }

    fn number(&self, key: &str) -> ConfigResult<Option<u64>> {
        self.raw(key)
            .map(|v| v.parse::<u64>().map_err(|e| self.invalid(key, v, e.to_string())))
            .transpose()
    }

    fn timestamp(&self, key: &str) -> ConfigResult<Option<DateTime<Utc>>> {
        self.raw(key)
            .map(|v| {
                DateTime::parse_from_rfc3339(v)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| self.invalid(key, v, e.to_string()))
            })
            .transpose()
    }

    fn invalid(&self, key: &str, value: &str, reason: String) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason,
        }
    }
}

/// Parse `true/false/yes/no/1/0` (case-insensitive).
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}
