//! Dependency resolution.
//!
//! Turns the declarative dependency tree into the flat, ordered list of
//! subscriber package version ids the registry expects:
//!
//! - managed nodes (`namespace@version`) are looked up in the packages
//!   installed in the resolution org ([`InstalledPackages`]);
//! - repository nodes are built as their own package versions through a
//!   [`DependencyBuilder`];
//! - children precede their parent, siblings keep their order;
//! - nodes under `unpackaged/post` are skipped with their children;
//! - lookups and cycle checks finish before the first build starts;
//! - local `unpackaged/pre/*` folders are built and appended last, in
//!   lexical order.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::project::{DependencySource, DependencySpec};
use crate::publisher::{PublishError, PublishResult};
use crate::registry::records::InstalledPackageRecord;
use crate::registry::{RegistryApi, RegistryResult};

/// Local folder whose subfolders are built before the package itself.
pub const UNPACKAGED_PRE_DIR: &str = "unpackaged/pre";

const INSTALLED_PACKAGES_QUERY: &str = "SELECT SubscriberPackage.Id, SubscriberPackage.Name, \
     SubscriberPackage.NamespacePrefix, SubscriberPackageVersion.Id, \
     SubscriberPackageVersion.Name, SubscriberPackageVersion.MajorVersion, \
     SubscriberPackageVersion.MinorVersion, SubscriberPackageVersion.PatchVersion, \
     SubscriberPackageVersion.BuildNumber, SubscriberPackageVersion.IsBeta, \
     SubscriberPackageVersion.IsManaged \
     FROM InstalledSubscriberPackage";

/// One entry of a version descriptor's dependency list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDependency {
    #[serde(rename = "subscriberPackageVersionId")]
    pub subscriber_package_version_id: String,
}

impl ResolvedDependency {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            subscriber_package_version_id: id.into(),
        }
    }
}

/// Managed packages installed in the resolution org, keyed by
/// `namespace@version`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledPackages {
    org: String,
    versions: BTreeMap<String, String>,
}

impl InstalledPackages {
    /// Build from explicit `(namespace, version, id)` entries.
    pub fn from_entries<'a>(
        org: impl Into<String>,
        entries: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    ) -> Self {
        let versions = entries
            .into_iter()
            .map(|(ns, version, id)| (key(ns, version), id.to_string()))
            .collect();
        Self {
            org: org.into(),
            versions,
        }
    }

    /// Query the installed packages of an org.
    ///
    /// Packages without a namespace cannot be referenced and are skipped.
    pub fn query(org: impl Into<String>, registry: &dyn RegistryApi) -> RegistryResult<Self> {
        let org = org.into();
        let records: Vec<InstalledPackageRecord> =
            registry.query(INSTALLED_PACKAGES_QUERY)?.decode()?;

        let mut versions = BTreeMap::new();
        for record in records {
            let Some(namespace) = record.subscriber_package.namespace_prefix.as_deref() else {
                continue;
            };
            let version = record.subscriber_package_version.version_string();
            versions.insert(
                key(namespace, &version),
                record.subscriber_package_version.id.clone(),
            );
        }

        debug!(org = %org, count = versions.len(), "Loaded installed packages");
        Ok(Self { org, versions })
    }

    /// Name of the org the packages were read from.
    pub fn org(&self) -> &str {
        &self.org
    }

    /// Subscriber version id of `namespace@version`.
    pub fn lookup(&self, namespace: &str, version: &str) -> Option<&str> {
        self.versions.get(&key(namespace, version)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

fn key(namespace: &str, version: &str) -> String {
    format!("{}@{}", namespace, version)
}

/// Builds dependency packages and returns their subscriber version ids.
///
/// Implemented by the publisher; dependency builds never resolve
/// dependencies of their own.
pub trait DependencyBuilder {
    /// Build a repository-hosted metadata node as an unlocked package.
    fn build_from_repository(&self, spec: &DependencySpec) -> PublishResult<String>;

    /// Build a local metadata folder as an unlocked package named `name`.
    fn build_from_local(&self, path: &Path, name: &str) -> PublishResult<String>;
}

/// Walks a dependency tree in post-order.
pub struct DependencyResolver<'a> {
    builder: &'a dyn DependencyBuilder,
    installed: Option<&'a InstalledPackages>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(builder: &'a dyn DependencyBuilder) -> Self {
        Self {
            builder,
            installed: None,
        }
    }

    /// Provide the installed packages used for managed lookups.
    pub fn with_installed(mut self, installed: &'a InstalledPackages) -> Self {
        self.installed = Some(installed);
        self
    }

    /// Resolve a dependency tree.
    ///
    /// Every managed lookup and the cycle check run before the first
    /// dependency package is built, so a tree that cannot resolve submits
    /// nothing.
    pub fn resolve(&self, tree: &[DependencySpec]) -> PublishResult<Vec<ResolvedDependency>> {
        self.check_level(tree, &mut Vec::new())?;

        let mut resolved = Vec::new();
        self.resolve_level(tree, &mut resolved)?;
        Ok(resolved)
    }

    /// Build every `unpackaged/pre/*` folder below `project_root`.
    ///
    /// Packages are named `"{repo_label} unpackaged/pre/{folder}"`. A
    /// missing folder resolves to nothing.
    pub fn resolve_unpackaged_pre(
        &self,
        project_root: &Path,
        repo_label: &str,
    ) -> PublishResult<Vec<ResolvedDependency>> {
        let pre_dir = project_root.join(UNPACKAGED_PRE_DIR);
        if !pre_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut folders: Vec<PathBuf> = fs::read_dir(&pre_dir)
            .map_err(|e| {
                PublishError::Configuration(format!(
                    "failed to list {}: {}",
                    pre_dir.display(),
                    e
                ))
            })?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        folders.sort();

        let mut resolved = Vec::with_capacity(folders.len());
        for folder in folders {
            let Some(dir_name) = folder.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let name = format!("{} {}/{}", repo_label, UNPACKAGED_PRE_DIR, dir_name);
            info!(package = %name, "Building unpackaged dependency");
            let id = self.builder.build_from_local(&folder, &name)?;
            resolved.push(ResolvedDependency::new(id));
        }
        Ok(resolved)
    }

    /// Walk the tree without building: detect cycles on the current path
    /// and look up every managed node.
    fn check_level(&self, level: &[DependencySpec], path: &mut Vec<String>) -> PublishResult<()> {
        for node in level.iter().filter(|node| !node.is_post_install()) {
            let identity = node.identity();
            if path.contains(&identity) {
                let mut chain = path.clone();
                chain.push(identity);
                return Err(PublishError::CyclicDependency { chain });
            }

            if let Some(DependencySource::Managed { namespace, version }) = node.source() {
                self.lookup_managed(namespace, version)?;
            }

            path.push(identity);
            self.check_level(&node.dependencies, path)?;
            path.pop();
        }
        Ok(())
    }

    fn resolve_level(
        &self,
        level: &[DependencySpec],
        resolved: &mut Vec<ResolvedDependency>,
    ) -> PublishResult<()> {
        for node in level {
            if node.is_post_install() {
                debug!(dependency = %node.identity(), "Skipping post-install metadata");
                continue;
            }

            self.resolve_level(&node.dependencies, resolved)?;
            let id = self.resolve_node(node)?;
            resolved.push(ResolvedDependency::new(id));
        }
        Ok(())
    }

    fn resolve_node(&self, node: &DependencySpec) -> PublishResult<String> {
        match node.source() {
            Some(DependencySource::Managed { namespace, version }) => {
                let id = self.lookup_managed(namespace, version)?;
                debug!(dependency = %key(namespace, version), id, "Resolved managed dependency");
                Ok(id.to_string())
            }
            Some(DependencySource::Repository { .. }) => self.builder.build_from_repository(node),
            None => Err(PublishError::Configuration(format!(
                "invalid dependency {:?}",
                node
            ))),
        }
    }

    fn lookup_managed(&self, namespace: &str, version: &str) -> PublishResult<&'a str> {
        let installed = self.installed.ok_or_else(|| {
            PublishError::Configuration(format!(
                "managed dependency {}@{} needs a resolution org",
                namespace, version
            ))
        })?;
        installed
            .lookup(namespace, version)
            .ok_or_else(|| PublishError::DependencyLookup {
                org: installed.org().to_string(),
                namespace: namespace.to_string(),
                version: version.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::MockRegistry;
    use serde_json::json;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Builder returning the node's subfolder (or local name) as the id.
    #[derive(Default)]
    struct RecordingBuilder {
        built: RefCell<Vec<String>>,
    }

    impl DependencyBuilder for RecordingBuilder {
        fn build_from_repository(&self, spec: &DependencySpec) -> PublishResult<String> {
            let id = spec.subfolder.clone().unwrap_or_default();
            self.built.borrow_mut().push(id.clone());
            Ok(id)
        }

        fn build_from_local(&self, _path: &Path, name: &str) -> PublishResult<String> {
            self.built.borrow_mut().push(name.to_string());
            Ok(name.to_string())
        }
    }

    fn repo(subfolder: &str) -> DependencySpec {
        DependencySpec::repository("acme", "base", subfolder)
    }

    fn ids(resolved: &[ResolvedDependency]) -> Vec<&str> {
        resolved
            .iter()
            .map(|r| r.subscriber_package_version_id.as_str())
            .collect()
    }

    #[test]
    fn test_children_precede_parent() {
        let tree = vec![repo("A").with_dependencies(vec![
            repo("B"),
            repo("C").with_dependencies(vec![repo("D")]),
        ])];
        let builder = RecordingBuilder::default();

        let resolved = DependencyResolver::new(&builder).resolve(&tree).unwrap();
        assert_eq!(ids(&resolved), vec!["B", "D", "C", "A"]);
    }

    #[test]
    fn test_post_install_skipped_with_children() {
        let tree = vec![
            repo("unpackaged/pre/a"),
            repo("unpackaged/post/b").with_dependencies(vec![repo("unpackaged/pre/c")]),
        ];
        let builder = RecordingBuilder::default();

        let resolved = DependencyResolver::new(&builder).resolve(&tree).unwrap();
        assert_eq!(ids(&resolved), vec!["unpackaged/pre/a"]);
        assert_eq!(builder.built.borrow().len(), 1);
    }

    #[test]
    fn test_managed_lookup() {
        let installed = InstalledPackages::from_entries("deps", [("npsp", "3.1", "04t_npsp")]);
        let tree = vec![repo("X").with_dependencies(vec![DependencySpec::managed("npsp", "3.1")])];
        let builder = RecordingBuilder::default();

        let resolved = DependencyResolver::new(&builder)
            .with_installed(&installed)
            .resolve(&tree)
            .unwrap();
        assert_eq!(ids(&resolved), vec!["04t_npsp", "X"]);
    }

    #[test]
    fn test_missing_managed_dependency() {
        let installed = InstalledPackages::from_entries("deps", [("npsp", "3.0", "04t_old")]);
        let tree = vec![DependencySpec::managed("npsp", "3.1")];
        let builder = RecordingBuilder::default();

        let err = DependencyResolver::new(&builder)
            .with_installed(&installed)
            .resolve(&tree)
            .unwrap_err();
        match err {
            PublishError::DependencyLookup {
                org,
                namespace,
                version,
            } => {
                assert_eq!(org, "deps");
                assert_eq!(namespace, "npsp");
                assert_eq!(version, "3.1");
            }
            other => panic!("Expected DependencyLookup, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_failure_stops_before_parent_build() {
        let installed = InstalledPackages::default();
        let tree = vec![repo("X").with_dependencies(vec![DependencySpec::managed("hed", "1.0")])];
        let builder = RecordingBuilder::default();

        let result = DependencyResolver::new(&builder)
            .with_installed(&installed)
            .resolve(&tree);
        assert!(result.is_err());
        assert!(builder.built.borrow().is_empty());
    }

    #[test]
    fn test_lookup_failure_builds_no_earlier_sibling() {
        let installed = InstalledPackages::from_entries("deps", [("npsp", "3.1", "04t_npsp")]);
        let tree = vec![
            repo("unpackaged/pre/config"),
            DependencySpec::managed("npsp", "3.14"),
        ];
        let builder = RecordingBuilder::default();

        let err = DependencyResolver::new(&builder)
            .with_installed(&installed)
            .resolve(&tree)
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::DependencyLookup { ref version, .. } if version == "3.14"
        ));
        assert!(builder.built.borrow().is_empty());
    }

    #[test]
    fn test_cycle_detected_before_any_build() {
        let tree = vec![repo("Z"), repo("A").with_dependencies(vec![repo("A")])];
        let builder = RecordingBuilder::default();

        let err = DependencyResolver::new(&builder).resolve(&tree).unwrap_err();
        assert!(matches!(err, PublishError::CyclicDependency { .. }));
        assert!(builder.built.borrow().is_empty());
    }

    #[test]
    fn test_managed_under_post_install_not_looked_up() {
        let tree = vec![repo("unpackaged/post/late")
            .with_dependencies(vec![DependencySpec::managed("npsp", "3.1")])];
        let builder = RecordingBuilder::default();

        let resolved = DependencyResolver::new(&builder).resolve(&tree).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_managed_without_installed_is_configuration_error() {
        let builder = RecordingBuilder::default();
        let err = DependencyResolver::new(&builder)
            .resolve(&[DependencySpec::managed("npsp", "3.1")])
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_cycle_detected() {
        let tree = vec![repo("A").with_dependencies(vec![repo("B").with_dependencies(vec![repo("A")])])];
        let builder = RecordingBuilder::default();

        let err = DependencyResolver::new(&builder).resolve(&tree).unwrap_err();
        match err {
            PublishError::CyclicDependency { chain } => {
                assert_eq!(chain.len(), 3);
                assert_eq!(chain.first(), chain.last());
            }
            other => panic!("Expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_repeated_sibling_is_not_a_cycle() {
        let tree = vec![repo("A"), repo("A")];
        let builder = RecordingBuilder::default();
        let resolved = DependencyResolver::new(&builder).resolve(&tree).unwrap();
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_unpackaged_pre_in_lexical_order() {
        let temp = TempDir::new().unwrap();
        for dir in ["second", "first", "third"] {
            fs::create_dir_all(temp.path().join(UNPACKAGED_PRE_DIR).join(dir)).unwrap();
        }
        fs::write(temp.path().join(UNPACKAGED_PRE_DIR).join("README.md"), "x").unwrap();
        let builder = RecordingBuilder::default();

        let resolved = DependencyResolver::new(&builder)
            .resolve_unpackaged_pre(temp.path(), "acme/widgets")
            .unwrap();
        assert_eq!(
            ids(&resolved),
            vec![
                "acme/widgets unpackaged/pre/first",
                "acme/widgets unpackaged/pre/second",
                "acme/widgets unpackaged/pre/third"
            ]
        );
    }

    #[test]
    fn test_unpackaged_pre_missing_dir() {
        let temp = TempDir::new().unwrap();
        let builder = RecordingBuilder::default();
        let resolved = DependencyResolver::new(&builder)
            .resolve_unpackaged_pre(temp.path(), "acme/widgets")
            .unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_installed_packages_query() {
        let registry = MockRegistry::new().respond(
            "FROM InstalledSubscriberPackage",
            vec![
                json!({
                    "SubscriberPackage": {"Id": "033a", "Name": "NPSP", "NamespacePrefix": "npsp"},
                    "SubscriberPackageVersion": {
                        "Id": "04ta", "MajorVersion": 3, "MinorVersion": 1,
                        "PatchVersion": 0, "BuildNumber": 4, "IsBeta": false
                    }
                }),
                json!({
                    "SubscriberPackage": {"Id": "033b", "Name": "HEDA", "NamespacePrefix": "hed"},
                    "SubscriberPackageVersion": {
                        "Id": "04tb", "MajorVersion": 1, "MinorVersion": 2,
                        "PatchVersion": 1, "BuildNumber": 7, "IsBeta": true
                    }
                }),
                json!({
                    "SubscriberPackage": {"Id": "033c", "Name": "Unmanaged"},
                    "SubscriberPackageVersion": {
                        "Id": "04tc", "MajorVersion": 1, "MinorVersion": 0
                    }
                }),
            ],
        );

        let installed = InstalledPackages::query("deps", &registry).unwrap();
        assert_eq!(installed.len(), 2);
        assert_eq!(installed.lookup("npsp", "3.1"), Some("04ta"));
        assert_eq!(installed.lookup("hed", "1.2.1 (Beta 7)"), Some("04tb"));
        assert_eq!(installed.org(), "deps");
    }

    #[test]
    fn test_resolved_dependency_wire_name() {
        let value = serde_json::to_value(ResolvedDependency::new("04t1")).unwrap();
        assert_eq!(value, json!({"subscriberPackageVersionId": "04t1"}));
    }
}
