//! Packcraft - build and publish versioned packages to a package registry.
//!
//! This library packages a project directory, resolves its dependency tree
//! (managed packages installed in a resolution org, plus repository-hosted
//! and local unpackaged metadata built as packages of their own), plans the
//! next version number, and drives the registry's asynchronous version
//! creation request to completion.

pub mod archive;
pub mod config;
pub mod dependency;
pub mod logging;
pub mod org;
pub mod project;
pub mod publisher;
pub mod registry;
pub mod source;
pub mod version;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
