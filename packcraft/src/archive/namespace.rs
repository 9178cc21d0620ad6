//! Namespace prefix rewriting for archive entries.
//!
//! Metadata that lives under a namespace references its components as
//! `ns__Component` (and `ns:component` in Lightning markup). To store such
//! metadata independent of any namespace it is *tokenized*; tokens are later
//! *injected* with the namespace of the target package, or the namespace is
//! *stripped* entirely.
//!
//! | Token                         | Where     | Injected as                       |
//! |-------------------------------|-----------|-----------------------------------|
//! | `%%%NAMESPACE%%%`             | content   | `ns__` (managed) or empty         |
//! | `%%%NAMESPACE_OR_C%%%`        | content   | `ns` (managed) or `c`             |
//! | `%%%NAMESPACED_ORG%%%`        | content   | `ns__` (namespaced org) or empty  |
//! | `%%%NAMESPACED_ORG_OR_C%%%`   | content   | `ns` (namespaced org) or `c`      |
//! | `___NAMESPACE___`             | file name | `ns__` (managed) or empty         |
//!
//! Entry contents are only rewritten when they are valid UTF-8; binary
//! entries pass through untouched. All operations are pure.

use tracing::debug;

use super::packager::ArchiveProcessor;
use super::Archive;

const NAMESPACE_TOKEN: &str = "%%%NAMESPACE%%%";
const NAMESPACE_OR_C_TOKEN: &str = "%%%NAMESPACE_OR_C%%%";
const NAMESPACED_ORG_TOKEN: &str = "%%%NAMESPACED_ORG%%%";
const NAMESPACED_ORG_OR_C_TOKEN: &str = "%%%NAMESPACED_ORG_OR_C%%%";
const FILENAME_TOKEN: &str = "___NAMESPACE___";

/// Mode switches for [`inject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectOptions {
    /// Inject the namespace (managed) or remove the tokens (unmanaged).
    pub managed: bool,

    /// Whether the target org itself carries the namespace.
    pub namespaced_org: bool,
}

impl Default for InjectOptions {
    fn default() -> Self {
        Self {
            managed: true,
            namespaced_org: false,
        }
    }
}

impl InjectOptions {
    /// Managed injection into an org without a namespace.
    pub fn managed() -> Self {
        Self::default()
    }

    /// Unmanaged injection: tokens resolve to the default `c` namespace.
    pub fn unmanaged() -> Self {
        Self {
            managed: false,
            namespaced_org: false,
        }
    }

    /// Set the namespaced-org compatibility mode.
    pub fn with_namespaced_org(mut self, namespaced_org: bool) -> Self {
        self.namespaced_org = namespaced_org;
        self
    }
}

/// Replace a live namespace prefix with placeholder tokens.
pub fn tokenize(archive: &Archive, namespace: &str) -> Archive {
    if namespace.is_empty() {
        return archive.clone();
    }
    let prefix = format!("{}__", namespace);
    let lightning = format!("{}:", namespace);
    let lightning_token = format!("{}:", NAMESPACE_OR_C_TOKEN);

    debug!(namespace, "Tokenizing namespace prefix");
    archive.map_entries(|name, content| {
        let name = name.replace(&prefix, FILENAME_TOKEN);
        let content = rewrite_text(content, |text| {
            text.replace(&prefix, NAMESPACE_TOKEN)
                .replace(&lightning, &lightning_token)
        });
        (name, content)
    })
}

/// Replace placeholder tokens with a target namespace.
pub fn inject(archive: &Archive, namespace: &str, options: InjectOptions) -> Archive {
    let has_namespace = !namespace.is_empty();
    let full_prefix = if has_namespace {
        format!("{}__", namespace)
    } else {
        String::new()
    };
    let managed = options.managed && has_namespace;
    let namespaced_org = options.namespaced_org && has_namespace;

    let prefix = if managed { full_prefix.as_str() } else { "" };
    let namespace_or_c = if managed { namespace } else { "c" };
    let org_prefix = if namespaced_org { full_prefix.as_str() } else { "" };
    let org_namespace_or_c = if namespaced_org { namespace } else { "c" };

    debug!(
        namespace,
        managed = options.managed,
        namespaced_org = options.namespaced_org,
        "Injecting namespace tokens"
    );
    archive.map_entries(|name, content| {
        let name = name.replace(FILENAME_TOKEN, prefix);
        let content = rewrite_text(content, |text| {
            text.replace(NAMESPACED_ORG_OR_C_TOKEN, org_namespace_or_c)
                .replace(NAMESPACED_ORG_TOKEN, org_prefix)
                .replace(NAMESPACE_OR_C_TOKEN, namespace_or_c)
                .replace(NAMESPACE_TOKEN, prefix)
        });
        (name, content)
    })
}

/// Remove a namespace prefix from names and contents.
pub fn strip(archive: &Archive, namespace: &str) -> Archive {
    if namespace.is_empty() {
        return archive.clone();
    }
    let prefix = format!("{}__", namespace);
    let lightning = format!("{}:", namespace);

    debug!(namespace, "Stripping namespace prefix");
    archive.map_entries(|name, content| {
        let name = name.replace(&prefix, "");
        let content = rewrite_text(content, |text| {
            text.replace(&prefix, "").replace(&lightning, "c:")
        });
        (name, content)
    })
}

fn rewrite_text<F>(content: &[u8], f: F) -> Vec<u8>
where
    F: FnOnce(&str) -> String,
{
    match std::str::from_utf8(content) {
        Ok(text) => f(text).into_bytes(),
        Err(_) => content.to_vec(),
    }
}

/// A namespace transform usable as an [`ArchiveProcessor`] stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceStage {
    /// See [`tokenize`].
    Tokenize(String),
    /// See [`inject`].
    Inject {
        namespace: String,
        options: InjectOptions,
    },
    /// See [`strip`].
    Strip(String),
}

impl ArchiveProcessor for NamespaceStage {
    fn name(&self) -> &str {
        match self {
            NamespaceStage::Tokenize(_) => "namespace_tokenize",
            NamespaceStage::Inject { .. } => "namespace_inject",
            NamespaceStage::Strip(_) => "namespace_strip",
        }
    }

    fn process(&self, archive: Archive) -> Archive {
        match self {
            NamespaceStage::Tokenize(ns) => tokenize(&archive, ns),
            NamespaceStage::Inject { namespace, options } => inject(&archive, namespace, *options),
            NamespaceStage::Strip(ns) => strip(&archive, ns),
        }
    }
}
