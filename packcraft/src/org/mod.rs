//! Resolution org acquisition.
//!
//! Managed-package dependencies are resolved against the packages installed
//! in a *resolution org*. Unless the caller names one explicitly, a
//! long-lived org called [`DEPENDENCY_ORG_NAME`] is reused across builds:
//!
//! ```text
//!   explicit name? ──yes──► use as-is
//!        │no
//!        ▼
//!   known org? ──no──► create scratch org ──► run prepare flow
//!        │yes
//!        ▼
//!   expired? ──yes──► recreate ──────────────► run prepare flow
//!        │no
//!        ▼
//!      reuse
//! ```
//!
//! Expiry is checked lazily, only when the org is acquired.

mod configured;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::registry::RegistryApi;

pub use configured::ConfiguredOrgProvider;

/// Name of the reusable resolution org.
pub const DEPENDENCY_ORG_NAME: &str = "2gp_dependencies";

/// Scratch org definition used when creating the resolution org.
pub const DEPENDENCY_ORG_CONFIG: &str = "dev";

/// Workflow that installs the project's managed dependencies.
pub const PREPARE_FLOW: &str = "dependencies";

/// Result type for org operations.
pub type OrgResult<T> = Result<T, OrgError>;

/// Errors raised by org providers.
#[derive(Debug, Error)]
pub enum OrgError {
    #[error("Org named {0} was not found")]
    UnknownOrg(String),

    #[error("cannot create org {name}: {reason}")]
    CreationUnsupported { name: String, reason: String },

    #[error("flow '{flow}' failed against org {org}: {reason}")]
    FlowFailed {
        flow: String,
        org: String,
        reason: String,
    },

    #[error("failed to connect to org {org}: {reason}")]
    Connect { org: String, reason: String },
}

/// A known org.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Org {
    pub name: String,
    /// When the org stops accepting sessions; `None` for persistent orgs.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Org {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the org has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// Credentials, lifecycle and connections for orgs.
pub trait OrgProvider {
    /// Look up an org by name.
    fn get_org(&self, name: &str) -> OrgResult<Option<Org>>;

    /// Create a scratch org from a named definition.
    fn create_scratch_org(&self, name: &str, config_name: &str) -> OrgResult<Org>;

    /// Replace an expired org with a fresh one of the same name.
    fn recreate_org(&self, org: &Org) -> OrgResult<Org>;

    /// Run a named workflow against an org.
    fn run_flow(&self, flow: &str, org: &Org) -> OrgResult<()>;

    /// Open a registry connection to an org.
    fn connect(&self, org: &Org) -> OrgResult<Box<dyn RegistryApi>>;
}

/// Get the org used for installed-package lookups.
pub fn acquire_dependency_org(
    provider: &dyn OrgProvider,
    explicit: Option<&str>,
    now: DateTime<Utc>,
) -> OrgResult<Org> {
    if let Some(name) = explicit {
        return provider
            .get_org(name)?
            .ok_or_else(|| OrgError::UnknownOrg(name.to_string()));
    }

    match provider.get_org(DEPENDENCY_ORG_NAME)? {
        Some(org) if !org.is_expired(now) => {
            info!(org = %org.name, "Reusing dependency resolution org");
            Ok(org)
        }
        Some(org) => {
            info!(org = %org.name, "Recreating expired dependency resolution org");
            let org = provider.recreate_org(&org)?;
            provider.run_flow(PREPARE_FLOW, &org)?;
            Ok(org)
        }
        None => {
            info!(
                org = DEPENDENCY_ORG_NAME,
                "Creating a new scratch org for dependency resolution"
            );
            let org = provider.create_scratch_org(DEPENDENCY_ORG_NAME, DEPENDENCY_ORG_CONFIG)?;
            provider.run_flow(PREPARE_FLOW, &org)?;
            Ok(org)
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::registry::tests::MockRegistry;
    use crate::registry::{QueryResult, RegistryResult};
    use chrono::Duration;
    use serde_json::Value;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// In-memory org provider recording lifecycle calls.
    #[derive(Default)]
    pub struct MockOrgProvider {
        orgs: RefCell<HashMap<String, Org>>,
        registry: Option<Rc<MockRegistry>>,
        pub calls: RefCell<Vec<String>>,
    }

    impl MockOrgProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_org(self, org: Org) -> Self {
            self.orgs.borrow_mut().insert(org.name.clone(), org);
            self
        }

        /// Registry handed out by `connect`.
        pub fn with_registry(mut self, registry: Rc<MockRegistry>) -> Self {
            self.registry = Some(registry);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    /// Forwards to a shared mock so tests can inspect it afterwards.
    struct SharedRegistry(Rc<MockRegistry>);

    impl RegistryApi for SharedRegistry {
        fn query(&self, soql: &str) -> RegistryResult<QueryResult> {
            self.0.query(soql)
        }

        fn create(&self, sobject: &str, fields: &Value) -> RegistryResult<String> {
            self.0.create(sobject, fields)
        }
    }

    impl OrgProvider for MockOrgProvider {
        fn get_org(&self, name: &str) -> OrgResult<Option<Org>> {
            self.calls.borrow_mut().push(format!("get:{}", name));
            Ok(self.orgs.borrow().get(name).cloned())
        }

        fn create_scratch_org(&self, name: &str, config_name: &str) -> OrgResult<Org> {
            self.calls
                .borrow_mut()
                .push(format!("create:{}:{}", name, config_name));
            let org = Org::new(name);
            self.orgs.borrow_mut().insert(name.to_string(), org.clone());
            Ok(org)
        }

        fn recreate_org(&self, org: &Org) -> OrgResult<Org> {
            self.calls.borrow_mut().push(format!("recreate:{}", org.name));
            let fresh = Org::new(org.name.clone());
            self.orgs.borrow_mut().insert(org.name.clone(), fresh.clone());
            Ok(fresh)
        }

        fn run_flow(&self, flow: &str, org: &Org) -> OrgResult<()> {
            self.calls
                .borrow_mut()
                .push(format!("flow:{}:{}", flow, org.name));
            Ok(())
        }

        fn connect(&self, org: &Org) -> OrgResult<Box<dyn RegistryApi>> {
            self.calls.borrow_mut().push(format!("connect:{}", org.name));
            let registry = self
                .registry
                .clone()
                .unwrap_or_else(|| Rc::new(MockRegistry::new()));
            Ok(Box::new(SharedRegistry(registry)))
        }
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        assert!(!Org::new("a").is_expired(now));
        assert!(Org::new("a")
            .with_expiry(now - Duration::hours(1))
            .is_expired(now));
        assert!(!Org::new("a")
            .with_expiry(now + Duration::hours(1))
            .is_expired(now));
    }

    #[test]
    fn test_explicit_org_used_as_is() {
        let expired = Org::new("mine").with_expiry(Utc::now() - Duration::days(1));
        let provider = MockOrgProvider::new().with_org(expired.clone());

        let org = acquire_dependency_org(&provider, Some("mine"), Utc::now()).unwrap();
        assert_eq!(org, expired);
        assert_eq!(provider.calls(), vec!["get:mine"]);
    }

    #[test]
    fn test_explicit_org_missing() {
        let provider = MockOrgProvider::new();
        let err = acquire_dependency_org(&provider, Some("ghost"), Utc::now()).unwrap_err();
        assert!(matches!(err, OrgError::UnknownOrg(ref n) if n == "ghost"));
    }

    #[test]
    fn test_reuses_live_org() {
        let live = Org::new(DEPENDENCY_ORG_NAME).with_expiry(Utc::now() + Duration::days(3));
        let provider = MockOrgProvider::new().with_org(live);

        acquire_dependency_org(&provider, None, Utc::now()).unwrap();
        assert_eq!(provider.calls(), vec!["get:2gp_dependencies"]);
    }

    #[test]
    fn test_creates_missing_org_and_prepares() {
        let provider = MockOrgProvider::new();

        acquire_dependency_org(&provider, None, Utc::now()).unwrap();
        assert_eq!(
            provider.calls(),
            vec![
                "get:2gp_dependencies",
                "create:2gp_dependencies:dev",
                "flow:dependencies:2gp_dependencies"
            ]
        );
    }

    #[test]
    fn test_recreates_expired_org_and_prepares() {
        let expired = Org::new(DEPENDENCY_ORG_NAME).with_expiry(Utc::now() - Duration::days(1));
        let provider = MockOrgProvider::new().with_org(expired);

        let org = acquire_dependency_org(&provider, None, Utc::now()).unwrap();
        assert!(org.expires_at.is_none());
        assert_eq!(
            provider.calls(),
            vec![
                "get:2gp_dependencies",
                "recreate:2gp_dependencies",
                "flow:dependencies:2gp_dependencies"
            ]
        );
    }
}
