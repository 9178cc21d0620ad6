//! Org provider backed by the configuration file.
//!
//! Orgs are the `[org.<name>]` sections of the config. This provider never
//! creates orgs itself; a missing or expired resolution org must be set up
//! by an external session tool and written back into the config. The
//! preparatory workflow is the configured `prepare_command`.

use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info};

use super::{Org, OrgError, OrgProvider, OrgResult};
use crate::config::{ConfigFile, OrgSettings};
use crate::registry::{RegistryApi, ToolingClient};

/// Placeholder replaced with the org name in `prepare_command`.
const ORG_PLACEHOLDER: &str = "{org}";

/// Org provider reading credentials from [`ConfigFile`].
#[derive(Debug, Clone)]
pub struct ConfiguredOrgProvider {
    orgs: BTreeMap<String, OrgSettings>,
    api_version: String,
    timeout: Duration,
    prepare_command: Option<String>,
}

impl ConfiguredOrgProvider {
    /// Build from a loaded configuration file.
    pub fn from_config(config: &ConfigFile) -> Self {
        Self {
            orgs: config.orgs.clone(),
            api_version: config.registry.api_version.clone(),
            timeout: Duration::from_secs(config.registry.timeout_secs),
            prepare_command: config.dependencies.prepare_command.clone(),
        }
    }

    /// The preparatory command for an org, with the placeholder filled in.
    pub fn prepare_command_for(&self, org: &str) -> Option<String> {
        self.prepare_command
            .as_ref()
            .map(|cmd| cmd.replace(ORG_PLACEHOLDER, org))
    }

    fn unsupported(name: &str) -> OrgError {
        OrgError::CreationUnsupported {
            name: name.to_string(),
            reason: format!(
                "create it with your session tool and add an [org.{}] section to the config",
                name
            ),
        }
    }
}

impl OrgProvider for ConfiguredOrgProvider {
    fn get_org(&self, name: &str) -> OrgResult<Option<Org>> {
        Ok(self.orgs.get(name).map(|settings| Org {
            name: name.to_string(),
            expires_at: settings.expires,
        }))
    }

    fn create_scratch_org(&self, name: &str, _config_name: &str) -> OrgResult<Org> {
        Err(Self::unsupported(name))
    }

    fn recreate_org(&self, org: &Org) -> OrgResult<Org> {
        Err(Self::unsupported(&org.name))
    }

    fn run_flow(&self, flow: &str, org: &Org) -> OrgResult<()> {
        let command = self
            .prepare_command_for(&org.name)
            .ok_or_else(|| OrgError::FlowFailed {
                flow: flow.to_string(),
                org: org.name.clone(),
                reason: "no prepare_command configured in [dependencies]".to_string(),
            })?;

        info!(flow, org = %org.name, command = %command, "Running preparatory workflow");
        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .output()
            .map_err(|e| OrgError::FlowFailed {
                flow: flow.to_string(),
                org: org.name.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(OrgError::FlowFailed {
                flow: flow.to_string(),
                org: org.name.clone(),
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        debug!(stdout = %String::from_utf8_lossy(&output.stdout), "Workflow finished");
        Ok(())
    }

    fn connect(&self, org: &Org) -> OrgResult<Box<dyn RegistryApi>> {
        let settings = self
            .orgs
            .get(&org.name)
            .ok_or_else(|| OrgError::UnknownOrg(org.name.clone()))?;

        let client = ToolingClient::with_timeout(
            settings.instance_url.clone(),
            settings.access_token.clone(),
            self.api_version.clone(),
            self.timeout,
        )
        .map_err(|e| OrgError::Connect {
            org: org.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(client))
    }
}
