//! Project manifest: package definitions and the dependency tree.
//!
//! The manifest is a TOML file (default `packcraft.toml`):
//!
//! ```toml
//! [project]
//! name = "Widgets"
//! namespace = "wdgt"
//! repo_owner = "acme"
//! repo_name = "widgets"
//! git_branch = "main"
//!
//! [packages.main]
//! name = "Widgets"
//! package_type = "unlocked"
//! path = "src"
//! version_name = "Widgets {{ version }}"
//! dependencies = "project"
//!
//! [[dependencies]]
//! namespace = "npsp"
//! version = "3.1"
//!
//! [[dependencies]]
//! repo_owner = "acme"
//! repo_name = "base"
//! subfolder = "unpackaged/pre/config"
//! ```

mod dependency;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::archive::{ArchivePipeline, CleanMetaXml, InjectOptions, NamespaceStage};

pub use dependency::{
    has_managed_dependency, validate_tree, DependencySource, DependencySpec, POST_INSTALL_PREFIX,
};

/// Default manifest file name.
pub const MANIFEST_FILENAME: &str = "packcraft.toml";

/// Result type for project operations.
pub type ProjectResult<T> = Result<T, ProjectError>;

/// Errors raised while loading or validating the project manifest.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse project manifest: {0}")]
    Parse(String),

    #[error("The package {0} could not be found in the project manifest")]
    UnknownPackage(String),

    #[error("Cannot upload package of type {0}")]
    UnsupportedPackageType(String),

    #[error("invalid dependency at {path}: {reason}")]
    InvalidDependency { path: String, reason: String },
}

/// Container type of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageType {
    Unlocked,
    Managed,
}

impl PackageType {
    /// Wire value for `ContainerOptions`.
    pub fn container_options(&self) -> &'static str {
        match self {
            PackageType::Unlocked => "Unlocked",
            PackageType::Managed => "Managed",
        }
    }
}

impl FromStr for PackageType {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unlocked" => Ok(PackageType::Unlocked),
            "managed" => Ok(PackageType::Managed),
            _ => Err(ProjectError::UnsupportedPackageType(s.to_string())),
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageType::Unlocked => write!(f, "unlocked"),
            PackageType::Managed => write!(f, "managed"),
        }
    }
}

/// Layout of a package's source directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Already in metadata layout.
    #[default]
    #[serde(alias = "mdapi")]
    Metadata,
    /// Source layout that must be converted first.
    Sfdx,
}

/// How a package's dependency list is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyMode {
    /// Derive from the project dependency tree.
    Project,
}

/// `[project]` table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub repo_owner: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub git_branch: Option<String>,
}

/// A `[packages.<key>]` table as written in the manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PackageConfig {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub package_type: String,
    #[serde(default = "default_package_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub version_name: Option<String>,
    #[serde(default)]
    pub source_format: SourceFormat,
    #[serde(default)]
    pub dependencies: Option<DependencyMode>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub namespace_tokenize: Option<String>,
    #[serde(default)]
    pub namespace_inject: Option<String>,
    #[serde(default)]
    pub namespace_strip: Option<String>,
    #[serde(default)]
    pub unmanaged: bool,
}

fn default_package_path() -> PathBuf {
    PathBuf::from("src")
}

/// Namespace transforms requested for one package or dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceTransforms {
    pub tokenize: Option<String>,
    pub inject: Option<String>,
    pub strip: Option<String>,
    pub unmanaged: bool,
}

impl NamespaceTransforms {
    /// Transforms declared on a dependency node.
    pub fn from_dependency(spec: &DependencySpec) -> Self {
        Self {
            tokenize: spec.namespace_tokenize.clone(),
            inject: spec.namespace_inject.clone(),
            strip: spec.namespace_strip.clone(),
            unmanaged: spec.unmanaged,
        }
    }

    /// Whether no transform is requested.
    pub fn is_empty(&self) -> bool {
        self.tokenize.is_none() && self.inject.is_none() && self.strip.is_none()
    }

    /// Append the requested stages (tokenize, inject, strip) to a pipeline.
    pub fn append_to(&self, pipeline: &mut ArchivePipeline, namespaced_org: bool) {
        if let Some(ns) = &self.tokenize {
            pipeline.push(NamespaceStage::Tokenize(ns.clone()));
        }
        if let Some(ns) = &self.inject {
            let options = if self.unmanaged {
                InjectOptions::unmanaged()
            } else {
                InjectOptions::managed()
            };
            pipeline.push(NamespaceStage::Inject {
                namespace: ns.clone(),
                options: options.with_namespaced_org(namespaced_org),
            });
        }
        if let Some(ns) = &self.strip {
            pipeline.push(NamespaceStage::Strip(ns.clone()));
        }
    }
}

/// A validated package definition, ready to build.
///
/// Built from the manifest for the top-level package and synthesized by
/// the publisher for dependency packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub namespace: Option<String>,
    pub package_type: PackageType,
    pub path: PathBuf,
    pub version_name: String,
    pub source_format: SourceFormat,
    pub dependency_mode: Option<DependencyMode>,
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub transforms: NamespaceTransforms,
}

impl PackageSpec {
    /// An unlocked package built from a directory, as used for
    /// unpackaged-metadata dependencies.
    pub fn unlocked(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            version_name: format!("{} - {{{{ version }}}}", name),
            name,
            namespace: None,
            package_type: PackageType::Unlocked,
            path: path.into(),
            source_format: SourceFormat::Metadata,
            dependency_mode: None,
            branch: None,
            tag: None,
            transforms: NamespaceTransforms::default(),
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Build the post-processing pipeline for this package's archive.
    pub fn pipeline(&self, namespaced_org: bool, clean_meta_xml: bool) -> ArchivePipeline {
        let mut pipeline = ArchivePipeline::new();
        self.transforms.append_to(&mut pipeline, namespaced_org);
        if clean_meta_xml {
            pipeline.push(CleanMetaXml);
        }
        pipeline
    }
}

/// The parsed project manifest.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProjectManifest {
    #[serde(default)]
    pub project: ProjectInfo,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageConfig>,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,

    /// Directory the manifest was loaded from; relative paths resolve
    /// against it.
    #[serde(skip)]
    pub root: PathBuf,
}

impl ProjectManifest {
    /// Load and validate a manifest file.
    pub fn load(path: &Path) -> ProjectResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ProjectError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut manifest = Self::from_toml_str(&content)?;
        manifest.root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(manifest)
    }

    /// Parse and validate manifest text.
    pub fn from_toml_str(content: &str) -> ProjectResult<Self> {
        let manifest: ProjectManifest =
            toml::from_str(content).map_err(|e| ProjectError::Parse(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate package types and the dependency tree.
    pub fn validate(&self) -> ProjectResult<()> {
        for package in self.packages.values() {
            package.package_type.parse::<PackageType>()?;
        }
        validate_tree(&self.dependencies)
            .map_err(|(path, reason)| ProjectError::InvalidDependency { path, reason })
    }

    /// Resolve a package key into a buildable spec.
    ///
    /// A package without a namespace inherits the project namespace, and
    /// relative package paths resolve against the manifest directory.
    pub fn package(&self, key: &str) -> ProjectResult<PackageSpec> {
        let config = self
            .packages
            .get(key)
            .ok_or_else(|| ProjectError::UnknownPackage(key.to_string()))?;
        let package_type = config.package_type.parse::<PackageType>()?;

        Ok(PackageSpec {
            name: config.name.clone(),
            namespace: config
                .namespace
                .clone()
                .or_else(|| self.project.namespace.clone()),
            package_type,
            path: self.resolve_path(&config.path),
            version_name: config
                .version_name
                .clone()
                .unwrap_or_else(|| format!("{} - {{{{ version }}}}", config.name)),
            source_format: config.source_format,
            dependency_mode: config.dependencies,
            branch: config.branch.clone(),
            tag: config.tag.clone(),
            transforms: NamespaceTransforms {
                tokenize: config.namespace_tokenize.clone(),
                inject: config.namespace_inject.clone(),
                strip: config.namespace_strip.clone(),
                unmanaged: config.unmanaged,
            },
        })
    }

    /// Resolve a path relative to the manifest directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// `owner/repo` label used to name local dependency packages.
    pub fn repo_label(&self) -> String {
        format!(
            "{}/{}",
            self.project.repo_owner.as_deref().unwrap_or("local"),
            self.project.repo_name.as_deref().unwrap_or("project")
        )
    }
}
