//! Shared fixtures for integration tests.
//!
//! [`FakeRegistry`] keeps packages, version requests and versions in memory
//! and answers the publisher's queries by inspecting the query text. Version
//! requests decode their `VersionInfo` container so the descriptor the
//! publisher wrote decides the version number the fake assigns.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use packcraft::archive::Archive;
use packcraft::org::{Org, OrgError, OrgProvider, OrgResult};
use packcraft::project::ProjectManifest;
use packcraft::registry::{QueryResult, RegistryApi, RegistryError, RegistryResult};
use packcraft::source::{SourceConverter, SourceError, SourceFetcher, SourceResult};

#[derive(Debug, Clone)]
pub struct StoredRequest {
    pub id: String,
    pub package_id: String,
    pub tag: String,
    pub status: String,
    pub version_id: Option<String>,
    pub descriptor: Value,
    pub package: Archive,
}

#[derive(Debug, Clone)]
pub struct StoredVersion {
    pub id: String,
    pub package_id: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
    pub released: bool,
    pub subscriber_id: String,
}

#[derive(Default)]
struct State {
    packages: Vec<(String, String, Option<String>)>,
    requests: Vec<StoredRequest>,
    versions: Vec<StoredVersion>,
    installed: Vec<Value>,
    errors: HashMap<String, Vec<String>>,
    /// Error messages for the next submitted request; it then fails.
    fail_next: Option<Vec<String>>,
    /// Polls answered with `InProgress` before a request settles.
    pending_polls: usize,
    polls: usize,
    creates: Vec<String>,
    counter: usize,
}

/// Stateful in-memory registry.
#[derive(Clone, Default)]
pub struct FakeRegistry {
    state: Rc<RefCell<State>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next version request fail with these error messages.
    pub fn fail_next_request(&self, messages: &[&str]) {
        self.state.borrow_mut().fail_next = Some(messages.iter().map(|m| m.to_string()).collect());
    }

    /// Answer this many polls with `InProgress` before settling a request.
    pub fn set_pending_polls(&self, polls: usize) {
        self.state.borrow_mut().pending_polls = polls;
    }

    /// Register an installed managed package for installed-package queries.
    pub fn install(&self, namespace: &str, major: u32, minor: u32, id: &str) {
        self.state.borrow_mut().installed.push(json!({
            "SubscriberPackage": {"Id": format!("033{}", id), "NamespacePrefix": namespace},
            "SubscriberPackageVersion": {
                "Id": id, "MajorVersion": major, "MinorVersion": minor,
                "PatchVersion": 0, "BuildNumber": 1, "IsBeta": false
            }
        }));
    }

    /// Mark every version of every package as released.
    pub fn release_all(&self) {
        for version in self.state.borrow_mut().versions.iter_mut() {
            version.released = true;
        }
    }

    pub fn requests(&self) -> Vec<StoredRequest> {
        self.state.borrow().requests.clone()
    }

    pub fn versions(&self) -> Vec<StoredVersion> {
        self.state.borrow().versions.clone()
    }

    /// Names of created objects, in order.
    pub fn creates(&self) -> Vec<String> {
        self.state.borrow().creates.clone()
    }

    pub fn package_names(&self) -> Vec<String> {
        self.state
            .borrow()
            .packages
            .iter()
            .map(|(_, name, _)| name.clone())
            .collect()
    }

    fn next_id(state: &mut State, prefix: &str) -> String {
        state.counter += 1;
        format!("{}{:04}", prefix, state.counter)
    }

    fn create_request(&self, fields: &Value) -> RegistryResult<String> {
        let encoded = fields["VersionInfo"].as_str().unwrap_or_default();
        let container_bytes = STANDARD
            .decode(encoded)
            .map_err(|e| RegistryError::Decode(e.to_string()))?;
        let container = Archive::from_zip_bytes(&container_bytes)
            .map_err(|e| RegistryError::Decode(e.to_string()))?;
        let descriptor: Value = serde_json::from_slice(
            container
                .get("package2-descriptor.json")
                .ok_or_else(|| RegistryError::Decode("missing descriptor".into()))?,
        )?;
        let package = Archive::from_zip_bytes(
            container
                .get("package.zip")
                .ok_or_else(|| RegistryError::Decode("missing package.zip".into()))?,
        )
        .map_err(|e| RegistryError::Decode(e.to_string()))?;

        let mut state = self.state.borrow_mut();
        let id = Self::next_id(&mut state, "08c");
        let package_id = fields["Package2Id"].as_str().unwrap_or_default().to_string();

        let (status, version_id) = match state.fail_next.take() {
            Some(messages) => {
                state.errors.insert(id.clone(), messages);
                ("Error".to_string(), None)
            }
            None => {
                let number = descriptor["versionNumber"].as_str().unwrap_or("0.0.0.NEXT");
                let parts: Vec<u32> = number
                    .split('.')
                    .take(3)
                    .map(|p| p.parse().unwrap_or(0))
                    .collect();
                let build = state
                    .versions
                    .iter()
                    .filter(|v| {
                        v.package_id == package_id
                            && [v.major, v.minor, v.patch] == [parts[0], parts[1], parts[2]]
                    })
                    .map(|v| v.build)
                    .max()
                    .unwrap_or(0)
                    + 1;
                let version_id = Self::next_id(&mut state, "05i");
                let subscriber_id = Self::next_id(&mut state, "04t");
                state.versions.push(StoredVersion {
                    id: version_id.clone(),
                    package_id: package_id.clone(),
                    major: parts[0],
                    minor: parts[1],
                    patch: parts[2],
                    build,
                    released: false,
                    subscriber_id,
                });
                ("Success".to_string(), Some(version_id))
            }
        };

        state.requests.push(StoredRequest {
            id: id.clone(),
            package_id,
            tag: fields["Tag"].as_str().unwrap_or_default().to_string(),
            status,
            version_id,
            descriptor,
            package,
        });
        state.creates.push("Package2VersionCreateRequest".to_string());
        Ok(id)
    }
}

/// Value of `Field = '...'` or `Field='...'` in a query.
pub fn quoted_value(soql: &str, field: &str) -> Option<String> {
    for pattern in [format!("{} = '", field), format!("{}='", field)] {
        if let Some(start) = soql.find(&pattern) {
            let rest = &soql[start + pattern.len()..];
            let mut value = String::new();
            let mut chars = rest.chars();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '\'' => return Some(value),
                    other => value.push(other),
                }
            }
        }
    }
    None
}

impl RegistryApi for FakeRegistry {
    fn query(&self, soql: &str) -> RegistryResult<QueryResult> {
        let mut state = self.state.borrow_mut();

        let records: Vec<Value> = if soql.contains("FROM Package2 ") {
            let name = quoted_value(soql, "Name");
            let namespace = quoted_value(soql, "NamespacePrefix");
            state
                .packages
                .iter()
                .filter(|(_, n, ns)| Some(n) == name.as_ref() && *ns == namespace)
                .map(|(id, _, _)| json!({"Id": id}))
                .collect()
        } else if soql.contains("FROM Package2VersionCreateRequestError") {
            let parent = quoted_value(soql, "ParentRequestId").unwrap_or_default();
            state
                .errors
                .get(&parent)
                .into_iter()
                .flatten()
                .map(|m| json!({"Message": m}))
                .collect()
        } else if soql.contains("FROM Package2VersionCreateRequest WHERE Id") {
            let id = quoted_value(soql, "Id").unwrap_or_default();
            state.polls += 1;
            let pending = state.pending_polls > 0;
            if pending {
                state.pending_polls -= 1;
            }
            state
                .requests
                .iter()
                .filter(|r| r.id == id)
                .map(|r| {
                    let status = if pending { "InProgress" } else { r.status.as_str() };
                    json!({"Id": r.id, "Status": status, "Package2VersionId": r.version_id})
                })
                .collect()
        } else if soql.contains("FROM Package2VersionCreateRequest") {
            let package_id = quoted_value(soql, "Package2Id").unwrap_or_default();
            let tag = quoted_value(soql, "Tag").unwrap_or_default();
            state
                .requests
                .iter()
                .filter(|r| r.package_id == package_id && r.tag == tag && r.status != "Error")
                .map(|r| json!({"Id": r.id}))
                .collect()
        } else if soql.contains("FROM Package2Version WHERE Package2Id") {
            let package_id = quoted_value(soql, "Package2Id").unwrap_or_default();
            let mut versions: Vec<&StoredVersion> = state
                .versions
                .iter()
                .filter(|v| v.package_id == package_id)
                .collect();
            versions.sort_by_key(|v| (v.major, v.minor, v.patch, v.build));
            versions
                .last()
                .map(|v| {
                    vec![json!({
                        "MajorVersion": v.major, "MinorVersion": v.minor,
                        "PatchVersion": v.patch, "BuildNumber": v.build,
                        "IsReleased": v.released
                    })]
                })
                .unwrap_or_default()
        } else if soql.contains("FROM Package2Version WHERE Id") {
            let id = quoted_value(soql, "Id").unwrap_or_default();
            state
                .versions
                .iter()
                .filter(|v| v.id == id)
                .map(|v| {
                    json!({
                        "MajorVersion": v.major, "MinorVersion": v.minor,
                        "PatchVersion": v.patch, "BuildNumber": v.build,
                        "SubscriberPackageVersionId": v.subscriber_id
                    })
                })
                .collect()
        } else if soql.contains("FROM SubscriberPackageVersion") {
            vec![json!({"Dependencies": null})]
        } else if soql.contains("FROM InstalledSubscriberPackage") {
            state.installed.clone()
        } else {
            Vec::new()
        };

        Ok(QueryResult::from_records(records))
    }

    fn create(&self, sobject: &str, fields: &Value) -> RegistryResult<String> {
        match sobject {
            "Package2" => {
                let mut state = self.state.borrow_mut();
                let id = Self::next_id(&mut state, "0Ho");
                let name = fields["Name"].as_str().unwrap_or_default().to_string();
                let namespace = fields["NamespacePrefix"].as_str().map(str::to_string);
                state.packages.push((id.clone(), name, namespace));
                state.creates.push("Package2".to_string());
                Ok(id)
            }
            "Package2VersionCreateRequest" => self.create_request(fields),
            other => Err(RegistryError::Rejected {
                sobject: other.to_string(),
                reason: "unsupported".to_string(),
            }),
        }
    }
}

/// Fetcher serving archives keyed by `owner/repo/subfolder`.
#[derive(Default)]
pub struct FakeFetcher {
    archives: HashMap<String, Archive>,
    pub fetched: RefCell<Vec<String>>,
}

impl FakeFetcher {
    pub fn with(mut self, owner: &str, repo: &str, subfolder: &str, archive: Archive) -> Self {
        self.archives
            .insert(format!("{}/{}/{}", owner, repo, subfolder), archive);
        self
    }
}

impl SourceFetcher for FakeFetcher {
    fn fetch(
        &self,
        owner: &str,
        repo: &str,
        subfolder: &str,
        _git_ref: Option<&str>,
    ) -> SourceResult<Archive> {
        let key = format!("{}/{}/{}", owner, repo, subfolder);
        self.fetched.borrow_mut().push(key.clone());
        self.archives
            .get(&key)
            .cloned()
            .ok_or_else(|| SourceError::SubfolderNotFound {
                owner: owner.to_string(),
                repo: repo.to_string(),
                subfolder: subfolder.to_string(),
            })
    }
}

/// Converter that is never expected to run.
pub struct NoConversion;

impl SourceConverter for NoConversion {
    fn convert(&self, source: &Path, _output: &Path, _name: &str) -> SourceResult<()> {
        Err(SourceError::Conversion {
            command: "none".to_string(),
            reason: format!("unexpected conversion of {}", source.display()),
        })
    }
}

/// Org provider with one live resolution org connected to `registry`.
pub struct FakeOrgs {
    pub registry: FakeRegistry,
    pub connects: RefCell<usize>,
}

impl FakeOrgs {
    pub fn new(registry: FakeRegistry) -> Self {
        Self {
            registry,
            connects: RefCell::new(0),
        }
    }
}

impl OrgProvider for FakeOrgs {
    fn get_org(&self, name: &str) -> OrgResult<Option<Org>> {
        Ok(Some(Org::new(name)))
    }

    fn create_scratch_org(&self, name: &str, _config_name: &str) -> OrgResult<Org> {
        Err(OrgError::CreationUnsupported {
            name: name.to_string(),
            reason: "fake".to_string(),
        })
    }

    fn recreate_org(&self, org: &Org) -> OrgResult<Org> {
        Ok(org.clone())
    }

    fn run_flow(&self, _flow: &str, _org: &Org) -> OrgResult<()> {
        Ok(())
    }

    fn connect(&self, _org: &Org) -> OrgResult<Box<dyn RegistryApi>> {
        *self.connects.borrow_mut() += 1;
        Ok(Box::new(self.registry.clone()))
    }
}

/// Write a project with a `main` package under `root` and load its manifest.
pub fn write_project(root: &Path, extra_manifest: &str) -> ProjectManifest {
    fs::create_dir_all(root.join("src/classes")).unwrap();
    fs::write(root.join("src/package.xml"), "<Package/>").unwrap();
    fs::write(root.join("src/classes/Widget.cls"), "public class Widget {}").unwrap();
    fs::write(
        root.join("src/classes/Widget.cls-meta.xml"),
        "<ApexClass>\n    <packageVersions>\n        <namespace>npsp</namespace>\n    </packageVersions>\n</ApexClass>\n",
    )
    .unwrap();

    let manifest = format!(
        r#"[project]
name = "Widgets"
namespace = "wdgt"
repo_owner = "acme"
repo_name = "widgets"
git_branch = "main"

[packages.main]
name = "Widgets"
package_type = "unlocked"
path = "src"
dependencies = "project"
{}"#,
        extra_manifest
    );
    let path = root.join("packcraft.toml");
    fs::write(&path, manifest).unwrap();
    ProjectManifest::load(&path).unwrap()
}
