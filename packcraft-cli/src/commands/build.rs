//! The `build` command: build one manifest package and print the result.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use packcraft::logging::init_logging;
use packcraft::org::ConfiguredOrgProvider;
use packcraft::project::{ProjectManifest, MANIFEST_FILENAME};
use packcraft::publisher::{BuildOptions, PublishError, Publisher};
use packcraft::source::{CommandConverter, GitHubFetcher};
use tracing::{info, warn};

use super::common::{connect_registry, BumpArg, GlobalArgs};
use crate::error::CliError;

/// Arguments for `packcraft build`.
#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
    /// Package key from the manifest's [packages] table
    #[arg(short, long)]
    pub package: String,

    /// Project manifest
    #[arg(long, default_value = MANIFEST_FILENAME)]
    pub manifest: PathBuf,

    /// Version component to bump after a released version
    #[arg(long, value_enum)]
    pub version_type: Option<BumpArg>,

    /// Submit even if identical content was already requested
    #[arg(long)]
    pub force: bool,

    /// Same as --force, for dependency packages
    #[arg(long)]
    pub force_dependencies: bool,

    /// Inject namespaced-org tokens with the namespace
    #[arg(long)]
    pub namespaced_org: bool,

    /// Org to look up installed managed packages in
    #[arg(long)]
    pub dependency_org: Option<String>,

    /// Give up waiting for the version after this many seconds
    #[arg(long)]
    pub poll_timeout: Option<u64>,

    /// Keep <packageVersions> blocks in -meta.xml files
    #[arg(long)]
    pub keep_meta_xml: bool,
}

impl BuildArgs {
    /// Layer command-line overrides over config-derived options.
    pub fn apply(&self, mut options: BuildOptions) -> BuildOptions {
        if let Some(bump) = self.version_type {
            options = options.with_bump(bump.into());
        }
        options.force_create |= self.force;
        options.force_create_dependencies |= self.force_dependencies;
        options.namespaced_org |= self.namespaced_org;
        if self.keep_meta_xml {
            options.clean_meta_xml = false;
        }
        if self.dependency_org.is_some() {
            options.dependency_org = self.dependency_org.clone();
        }
        if let Some(secs) = self.poll_timeout {
            options.poll = options.poll.with_timeout(Some(Duration::from_secs(secs)));
        }
        options
    }
}

/// Run the build command.
pub fn run(args: BuildArgs, global: &GlobalArgs) -> Result<(), CliError> {
    let config = global.load_config()?;
    let _log_guard = init_logging(&global.logging(&config));

    let manifest = ProjectManifest::load(&args.manifest)?;
    let registry = connect_registry(&config)?;
    let fetcher = GitHubFetcher::new(config.dependencies.github_token.clone())
        .map_err(PublishError::from)?;
    let converter = CommandConverter::new();
    let orgs = ConfiguredOrgProvider::from_config(&config);

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "Could not install interrupt handler");
    }

    let mut options = args.apply(BuildOptions::from_config(&config));
    options.poll = options.poll.with_cancel_flag(cancel);

    info!(
        package = %args.package,
        manifest = %args.manifest.display(),
        bump = %options.bump,
        "Starting build"
    );
    let result = Publisher::new(&registry, &fetcher, &converter, &orgs, &manifest)
        .with_options(options)
        .build_package(&args.package)?;

    let json =
        serde_json::to_string_pretty(&result).map_err(|e| CliError::Output(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use packcraft::version::VersionBump;

    fn args() -> BuildArgs {
        BuildArgs {
            package: "main".to_string(),
            manifest: PathBuf::from(MANIFEST_FILENAME),
            version_type: None,
            force: false,
            force_dependencies: false,
            namespaced_org: false,
            dependency_org: None,
            poll_timeout: None,
            keep_meta_xml: false,
        }
    }

    #[test]
    fn test_no_overrides_keeps_config_options() {
        let base = BuildOptions {
            force_create: true,
            clean_meta_xml: true,
            dependency_org: Some("from_config".to_string()),
            ..BuildOptions::default()
        };
        let options = args().apply(base);
        assert!(options.force_create);
        assert!(options.clean_meta_xml);
        assert_eq!(options.dependency_org.as_deref(), Some("from_config"));
        assert_eq!(options.bump, VersionBump::Minor);
    }

    #[test]
    fn test_overrides_win() {
        let overrides = BuildArgs {
            version_type: Some(BumpArg::Major),
            force_dependencies: true,
            dependency_org: Some("cli_org".to_string()),
            poll_timeout: Some(90),
            keep_meta_xml: true,
            ..args()
        };
        let options = overrides.apply(BuildOptions {
            clean_meta_xml: true,
            ..BuildOptions::default()
        });
        assert_eq!(options.bump, VersionBump::Major);
        assert!(options.force_create_dependencies);
        assert!(!options.force_create);
        assert!(!options.clean_meta_xml);
        assert_eq!(options.dependency_org.as_deref(), Some("cli_org"));
        assert_eq!(options.poll.timeout, Some(Duration::from_secs(90)));
    }
}
