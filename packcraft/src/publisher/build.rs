//! Build orchestration.
//!
//! A build turns a [`PackageSpec`] into a package version:
//!
//! 1. find or create the package
//! 2. package the source directory (converting it first if needed)
//! 3. run the post-processing pipeline
//! 4. submit a version request (dedup, version planning, dependencies)
//! 5. poll the request to a terminal state
//! 6. read back the created version
//!
//! Dependency packages go through the same steps with
//! [`BuildRole::Dependency`], which never resolves dependencies of its own.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tempfile::TempDir;
use tracing::info;

use super::package::get_or_create_package;
use super::poller::{CreationPoller, PollOptions};
use super::request::{VersionRequest, VersionRequestBuilder};
use super::{PublishError, PublishResult};
use crate::archive::{package_directory, Archive, ArchiveError, DirectoryWalker};
use crate::config::ConfigFile;
use crate::dependency::{
    DependencyBuilder, DependencyResolver, InstalledPackages, ResolvedDependency,
};
use crate::org::{acquire_dependency_org, OrgProvider};
use crate::project::{
    has_managed_dependency, DependencyMode, DependencySource, DependencySpec, NamespaceTransforms,
    PackageSpec, ProjectManifest, SourceFormat,
};
use crate::registry::records::{PackageVersionRecord, SubscriberVersionRecord};
use crate::registry::{query_one, quote, RegistryApi};
use crate::source::{SourceConverter, SourceFetcher};
use crate::version::VersionBump;

/// Which kind of build is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildRole {
    /// The package named on the command line.
    Primary,
    /// A package built to satisfy a dependency.
    Dependency,
}

/// Settings shared by every build of one invocation.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub bump: VersionBump,
    /// Skip dedup for the primary package.
    pub force_create: bool,
    /// Skip dedup for dependency packages.
    pub force_create_dependencies: bool,
    pub namespaced_org: bool,
    pub clean_meta_xml: bool,
    pub poll: PollOptions,
    /// Resolution org to use instead of the managed one.
    pub dependency_org: Option<String>,
}

impl BuildOptions {
    /// Options from the `[build]` and `[dependencies]` config sections.
    pub fn from_config(config: &ConfigFile) -> Self {
        Self {
            bump: config.build.version_type,
            force_create: config.build.force_create,
            force_create_dependencies: config.build.force_create_dependencies,
            namespaced_org: config.build.namespaced_org,
            clean_meta_xml: config.build.clean_meta_xml,
            poll: PollOptions::default()
                .with_interval(config.build.poll_interval)
                .with_timeout(config.build.poll_timeout),
            dependency_org: config.dependencies.org.clone(),
        }
    }

    pub fn with_bump(mut self, bump: VersionBump) -> Self {
        self.bump = bump;
        self
    }

    pub fn with_poll(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    fn force_for(&self, role: BuildRole) -> bool {
        match role {
            BuildRole::Primary => self.force_create,
            BuildRole::Dependency => self.force_create_dependencies,
        }
    }
}

/// Identifiers and metadata of a finished build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildResult {
    pub package_id: String,
    pub request_id: String,
    pub version_number: String,
    pub package2_version_id: String,
    pub subscriber_package_version_id: String,
    /// Dependencies as reported by the registry; primary builds only.
    pub dependencies: Option<Value>,
}

/// Builds and publishes package versions.
pub struct Publisher<'a> {
    registry: &'a dyn RegistryApi,
    fetcher: &'a dyn SourceFetcher,
    converter: &'a dyn SourceConverter,
    orgs: &'a dyn OrgProvider,
    manifest: &'a ProjectManifest,
    options: BuildOptions,
}

impl<'a> Publisher<'a> {
    pub fn new(
        registry: &'a dyn RegistryApi,
        fetcher: &'a dyn SourceFetcher,
        converter: &'a dyn SourceConverter,
        orgs: &'a dyn OrgProvider,
        manifest: &'a ProjectManifest,
    ) -> Self {
        Self {
            registry,
            fetcher,
            converter,
            orgs,
            manifest,
            options: BuildOptions {
                clean_meta_xml: true,
                ..BuildOptions::default()
            },
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Build the manifest package `key`.
    pub fn build_package(&self, key: &str) -> PublishResult<BuildResult> {
        let spec = self.manifest.package(key)?;
        self.build(&spec, BuildRole::Primary)
    }

    /// Build one package version and wait for it.
    pub fn build(&self, spec: &PackageSpec, role: BuildRole) -> PublishResult<BuildResult> {
        info!(package = %spec.name, role = ?role, "Building package version");
        let package_id = get_or_create_package(self.registry, spec)?;

        let archive = self.package_source(spec)?;
        let archive = spec
            .pipeline(self.options.namespaced_org, self.options.clean_meta_xml)
            .apply(archive);

        let include_dependencies =
            role == BuildRole::Primary && spec.dependency_mode == Some(DependencyMode::Project);
        let request = VersionRequest {
            package_id: &package_id,
            spec,
            archive,
            branch: spec
                .branch
                .clone()
                .or_else(|| self.manifest.project.git_branch.clone()),
            bump: self.options.bump,
            force: self.options.force_for(role),
            include_dependencies,
        };
        let submitted = VersionRequestBuilder::new(self.registry)
            .submit(request, || self.resolve_dependencies(spec))?;

        let package2_version_id = CreationPoller::new(self.registry, self.options.poll.clone())
            .wait(&submitted.request_id)?;

        let version: PackageVersionRecord = query_one(
            self.registry,
            &format!(
                "SELECT MajorVersion, MinorVersion, PatchVersion, BuildNumber, \
                 SubscriberPackageVersionId FROM Package2Version WHERE Id = {}",
                quote(&package2_version_id)
            ),
            "Package2Version",
            &package2_version_id,
        )?;

        let dependencies = match role {
            BuildRole::Primary => {
                let record: SubscriberVersionRecord = query_one(
                    self.registry,
                    &format!(
                        "SELECT Dependencies FROM SubscriberPackageVersion WHERE Id = {}",
                        quote(&version.subscriber_package_version_id)
                    ),
                    "SubscriberPackageVersion",
                    &version.subscriber_package_version_id,
                )?;
                record.dependencies
            }
            BuildRole::Dependency => None,
        };

        info!(
            package = %spec.name,
            version = %version.version_number(),
            subscriber_package_version_id = %version.subscriber_package_version_id,
            "Package version ready"
        );

        Ok(BuildResult {
            package_id,
            request_id: submitted.request_id,
            version_number: version.version_number(),
            package2_version_id,
            subscriber_package_version_id: version.subscriber_package_version_id,
            dependencies,
        })
    }

    /// Package the spec's source directory, converting it first if it is
    /// not in metadata layout. The conversion directory is removed on every
    /// exit path.
    fn package_source(&self, spec: &PackageSpec) -> PublishResult<Archive> {
        match spec.source_format {
            SourceFormat::Metadata => Ok(package_directory(&spec.path, &DirectoryWalker::new())?),
            SourceFormat::Sfdx => {
                let converted = temp_dir()?;
                self.converter
                    .convert(&spec.path, converted.path(), &spec.name)?;
                Ok(package_directory(converted.path(), &DirectoryWalker::new())?)
            }
        }
    }

    /// Resolve the project dependency tree plus local unpackaged-pre
    /// folders. The resolution org is only acquired when a managed
    /// dependency is present.
    fn resolve_dependencies(
        &self,
        primary: &PackageSpec,
    ) -> PublishResult<Vec<ResolvedDependency>> {
        let tree = &self.manifest.dependencies;

        let installed = if has_managed_dependency(tree) {
            let org = acquire_dependency_org(
                self.orgs,
                self.options.dependency_org.as_deref(),
                Utc::now(),
            )?;
            let connection = self.orgs.connect(&org)?;
            Some(InstalledPackages::query(org.name.clone(), connection.as_ref())?)
        } else {
            None
        };

        let builder = DependencyPackager {
            publisher: self,
            namespace: primary.namespace.clone(),
        };
        let mut resolver = DependencyResolver::new(&builder);
        if let Some(installed) = &installed {
            resolver = resolver.with_installed(installed);
        }

        let mut dependencies = resolver.resolve(tree)?;
        dependencies.extend(
            resolver.resolve_unpackaged_pre(&self.manifest.root, &self.manifest.repo_label())?,
        );
        Ok(dependencies)
    }
}

/// Builds dependency packages under the primary package's namespace.
struct DependencyPackager<'p, 'a> {
    publisher: &'p Publisher<'a>,
    namespace: Option<String>,
}

impl DependencyBuilder for DependencyPackager<'_, '_> {
    fn build_from_repository(&self, spec: &DependencySpec) -> PublishResult<String> {
        let Some(DependencySource::Repository {
            owner,
            repo,
            subfolder,
            git_ref,
        }) = spec.source()
        else {
            return Err(PublishError::Configuration(format!(
                "{} is not a repository dependency",
                spec.identity()
            )));
        };

        let archive = self.publisher.fetcher.fetch(owner, repo, subfolder, git_ref)?;
        let extracted = temp_dir()?;
        archive.extract_to(extracted.path())?;

        let mut package =
            PackageSpec::unlocked(format!("{}/{} {}", owner, repo, subfolder), extracted.path())
                .with_namespace(self.namespace.clone());
        package.transforms = NamespaceTransforms::from_dependency(spec);

        let result = self.publisher.build(&package, BuildRole::Dependency)?;
        Ok(result.subscriber_package_version_id)
    }

    fn build_from_local(&self, path: &Path, name: &str) -> PublishResult<String> {
        let package = PackageSpec::unlocked(name, path).with_namespace(self.namespace.clone());
        let result = self.publisher.build(&package, BuildRole::Dependency)?;
        Ok(result.subscriber_package_version_id)
    }
}

fn temp_dir() -> PublishResult<TempDir> {
    TempDir::new().map_err(|e| {
        PublishError::Archive(ArchiveError::WriteFailed {
            path: std::env::temp_dir(),
            source: e,
        })
    })
}
