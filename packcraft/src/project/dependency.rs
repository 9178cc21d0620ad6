//! Declarative dependency tree.

use serde::{Deserialize, Serialize};

/// Subfolder prefix of metadata deployed after install; never a build
/// dependency.
pub const POST_INSTALL_PREFIX: &str = "unpackaged/post";

/// One node of the declared dependency tree.
///
/// A node is identified either by a managed package (`namespace` +
/// `version`) or by repository-hosted unpackaged metadata (`repo_owner` +
/// `repo_name` + `subfolder`). `dependencies` nests to arbitrary depth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfolder: Option<String>,

    /// Git ref to fetch; the repository's default branch when absent.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_tokenize: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_inject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_strip: Option<String>,

    /// Inject namespace tokens in unmanaged mode.
    #[serde(default)]
    pub unmanaged: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencySpec>,
}

/// Where a validated dependency comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencySource<'a> {
    /// A managed package installed in the resolution org.
    Managed { namespace: &'a str, version: &'a str },
    /// Unpackaged metadata in a hosted repository.
    Repository {
        owner: &'a str,
        repo: &'a str,
        subfolder: &'a str,
        git_ref: Option<&'a str>,
    },
}

impl DependencySpec {
    /// A managed package dependency.
    pub fn managed(namespace: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            version: Some(version.into()),
            ..Default::default()
        }
    }

    /// A repository-hosted metadata dependency.
    pub fn repository(
        owner: impl Into<String>,
        repo: impl Into<String>,
        subfolder: impl Into<String>,
    ) -> Self {
        Self {
            repo_owner: Some(owner.into()),
            repo_name: Some(repo.into()),
            subfolder: Some(subfolder.into()),
            ..Default::default()
        }
    }

    /// Set the git ref.
    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    /// Set nested dependencies.
    pub fn with_dependencies(mut self, dependencies: Vec<DependencySpec>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// The node's source, or `None` if the node is not well formed.
    pub fn source(&self) -> Option<DependencySource<'_>> {
        if self.has_managed_fields() && self.has_repository_fields() {
            return None;
        }
        let managed = match (&self.namespace, &self.version) {
            (Some(namespace), Some(version)) => Some(DependencySource::Managed {
                namespace,
                version,
            }),
            _ => None,
        };
        let repository = match (&self.repo_owner, &self.repo_name, &self.subfolder) {
            (Some(owner), Some(repo), Some(subfolder)) => Some(DependencySource::Repository {
                owner,
                repo,
                subfolder,
                git_ref: self.git_ref.as_deref(),
            }),
            _ => None,
        };
        match (managed, repository) {
            (Some(source), None) | (None, Some(source)) => Some(source),
            _ => None,
        }
    }

    /// Check that exactly one source identifies this node.
    pub fn validate(&self) -> Result<(), String> {
        let has_managed = self.has_managed_fields();
        let has_repo = self.has_repository_fields();

        if has_managed && has_repo {
            return Err("specifies both a namespace and a repository".to_string());
        }
        if !has_managed && !has_repo {
            return Err("needs either namespace+version or repo_owner+repo_name".to_string());
        }
        if has_managed && (self.namespace.is_none() || self.version.is_none()) {
            return Err("managed dependency needs both namespace and version".to_string());
        }
        if has_repo && self.source().is_none() {
            return Err(
                "repository dependency needs repo_owner, repo_name and subfolder".to_string(),
            );
        }
        Ok(())
    }

    fn has_managed_fields(&self) -> bool {
        self.namespace.is_some() || self.version.is_some()
    }

    fn has_repository_fields(&self) -> bool {
        self.repo_owner.is_some() || self.repo_name.is_some()
    }

    /// Whether this node is metadata deployed after install.
    pub fn is_post_install(&self) -> bool {
        self.subfolder
            .as_deref()
            .is_some_and(|s| s.starts_with(POST_INSTALL_PREFIX))
    }

    /// Identity used to detect cycles along a resolution path.
    pub fn identity(&self) -> String {
        match self.source() {
            Some(DependencySource::Managed { namespace, version }) => {
                format!("{}@{}", namespace, version)
            }
            Some(DependencySource::Repository {
                owner,
                repo,
                subfolder,
                git_ref,
            }) => format!(
                "{}/{}/{}@{}",
                owner,
                repo,
                subfolder,
                git_ref.unwrap_or("HEAD")
            ),
            None => "<invalid>".to_string(),
        }
    }
}

/// Whether any node in the tree needs managed-package resolution.
///
/// Post-install nodes and everything below them are never resolved.
pub fn has_managed_dependency(dependencies: &[DependencySpec]) -> bool {
    dependencies
        .iter()
        .filter(|d| !d.is_post_install())
        .any(|d| d.namespace.is_some() || has_managed_dependency(&d.dependencies))
}

/// Validate every node of a tree, reporting the first failure with its
/// position (e.g. `dependencies[1].dependencies[0]`).
pub fn validate_tree(dependencies: &[DependencySpec]) -> Result<(), (String, String)> {
    validate_level(dependencies, "dependencies")
}

fn validate_level(dependencies: &[DependencySpec], path: &str) -> Result<(), (String, String)> {
    for (i, dependency) in dependencies.iter().enumerate() {
        let here = format!("{}[{}]", path, i);
        dependency
            .validate()
            .map_err(|reason| (here.clone(), reason))?;
        validate_level(&dependency.dependencies, &format!("{}.dependencies", here))?;
    }
    Ok(())
}
