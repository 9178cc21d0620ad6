//! Next version number planning.
//!
//! The registry assigns build numbers itself, so a planned version carries
//! an explicit [`BuildNumber::Next`] instead of a concrete build.
//!
//! | Latest version            | Bump  | Planned        |
//! |---------------------------|-------|----------------|
//! | none                      | minor | `0.1.0.NEXT`   |
//! | `1.2.0.5` released        | patch | `1.2.1.NEXT`   |
//! | `1.2.0.5` released        | major | `2.0.0.NEXT`   |
//! | `1.2.3.5` unreleased      | any   | `1.2.3.NEXT`   |

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::registry::records::VersionLineageRecord;
use crate::registry::{quote, RegistryApi, RegistryResult};

/// Version component to increment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionBump {
    Major,
    #[default]
    Minor,
    Patch,
}

impl FromStr for VersionBump {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "major" => Ok(VersionBump::Major),
            "minor" => Ok(VersionBump::Minor),
            "patch" => Ok(VersionBump::Patch),
            _ => Err(format!(
                "Invalid version type: {}. Expected major, minor or patch",
                s
            )),
        }
    }
}

impl fmt::Display for VersionBump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionBump::Major => write!(f, "major"),
            VersionBump::Minor => write!(f, "minor"),
            VersionBump::Patch => write!(f, "patch"),
        }
    }
}

/// Build component of a version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildNumber {
    /// Assigned by the registry when the version is created.
    Next,
    /// A known build number.
    Number(u32),
}

impl fmt::Display for BuildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildNumber::Next => write!(f, "NEXT"),
            BuildNumber::Number(n) => write!(f, "{}", n),
        }
    }
}

/// A four-part package version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionNumber {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: BuildNumber,
}

impl VersionNumber {
    /// A version whose build number the registry will assign.
    pub fn next(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build: BuildNumber::Next,
        }
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}

/// Plan the next version from the latest version in the lineage.
pub fn plan_next_version(latest: Option<&VersionLineageRecord>, bump: VersionBump) -> VersionNumber {
    let Some(latest) = latest else {
        return match bump {
            VersionBump::Major => VersionNumber::next(1, 0, 0),
            VersionBump::Minor => VersionNumber::next(0, 1, 0),
            VersionBump::Patch => VersionNumber::next(0, 0, 1),
        };
    };

    let (major, minor, patch) = (
        latest.major_version,
        latest.minor_version,
        latest.patch_version,
    );

    if !latest.is_released {
        return VersionNumber::next(major, minor, patch);
    }

    match bump {
        VersionBump::Major => VersionNumber::next(major + 1, 0, 0),
        VersionBump::Minor => VersionNumber::next(major, minor + 1, 0),
        VersionBump::Patch => VersionNumber::next(major, minor, patch + 1),
    }
}

/// Query the latest version of a package and plan the next one.
pub fn next_version_number(
    registry: &dyn RegistryApi,
    package_id: &str,
    bump: VersionBump,
) -> RegistryResult<VersionNumber> {
    let soql = format!(
        "SELECT MajorVersion, MinorVersion, PatchVersion, BuildNumber, IsReleased \
         FROM Package2Version WHERE Package2Id={} \
         ORDER BY MajorVersion DESC, MinorVersion DESC, PatchVersion DESC, BuildNumber DESC \
         LIMIT 1",
        quote(package_id)
    );
    let latest: Option<VersionLineageRecord> = registry.query(&soql)?.first()?;
    let planned = plan_next_version(latest.as_ref(), bump);

    debug!(
        package_id,
        bump = %bump,
        latest = ?latest.as_ref().map(|l| (l.major_version, l.minor_version, l.patch_version, l.build_number)),
        planned = %planned,
        "Planned next version"
    );
    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::MockRegistry;
    use serde_json::json;

    fn lineage(major: u32, minor: u32, patch: u32, build: u32, released: bool) -> VersionLineageRecord {
        VersionLineageRecord {
            major_version: major,
            minor_version: minor,
            patch_version: patch,
            build_number: build,
            is_released: released,
        }
    }

    #[test]
    fn test_first_version_seeds_requested_component() {
        assert_eq!(plan_next_version(None, VersionBump::Minor).to_string(), "0.1.0.NEXT");
        assert_eq!(plan_next_version(None, VersionBump::Major).to_string(), "1.0.0.NEXT");
        assert_eq!(plan_next_version(None, VersionBump::Patch).to_string(), "0.0.1.NEXT");
    }

    #[test]
    fn test_released_patch_bump() {
        let latest = lineage(1, 2, 0, 5, true);
        assert_eq!(
            plan_next_version(Some(&latest), VersionBump::Patch).to_string(),
            "1.2.1.NEXT"
        );
    }

    #[test]
    fn test_released_major_bump_resets_lower() {
        let latest = lineage(1, 2, 0, 5, true);
        assert_eq!(
            plan_next_version(Some(&latest), VersionBump::Major).to_string(),
            "2.0.0.NEXT"
        );
    }

    #[test]
    fn test_released_minor_bump_resets_patch() {
        let latest = lineage(1, 2, 3, 5, true);
        assert_eq!(
            plan_next_version(Some(&latest), VersionBump::Minor).to_string(),
            "1.3.0.NEXT"
        );
    }

    #[test]
    fn test_unreleased_keeps_components() {
        let latest = lineage(1, 2, 3, 5, false);
        for bump in [VersionBump::Major, VersionBump::Minor, VersionBump::Patch] {
            assert_eq!(plan_next_version(Some(&latest), bump).to_string(), "1.2.3.NEXT");
        }
    }

    #[test]
    fn test_build_number_display() {
        let version = VersionNumber {
            major: 1,
            minor: 0,
            patch: 0,
            build: BuildNumber::Number(4),
        };
        assert_eq!(version.to_string(), "1.0.0.4");
    }

    #[test]
    fn test_bump_from_str() {
        assert_eq!("MAJOR".parse::<VersionBump>().unwrap(), VersionBump::Major);
        assert_eq!("patch".parse::<VersionBump>().unwrap(), VersionBump::Patch);
        assert!("build".parse::<VersionBump>().is_err());
        assert_eq!(VersionBump::default(), VersionBump::Minor);
    }

    #[test]
    fn test_next_version_number_queries_lineage() {
        let registry = MockRegistry::new().respond(
            "FROM Package2Version",
            vec![json!({
                "MajorVersion": 1,
                "MinorVersion": 2,
                "PatchVersion": 0,
                "BuildNumber": 5,
                "IsReleased": true
            })],
        );

        let version = next_version_number(&registry, "0Ho000000000001", VersionBump::Patch).unwrap();
        assert_eq!(version.to_string(), "1.2.1.NEXT");

        let query = &registry.queries.borrow()[0];
        assert!(query.contains("Package2Id='0Ho000000000001'"));
        assert!(query.contains("LIMIT 1"));
    }

    #[test]
    fn test_next_version_number_empty_lineage() {
        let registry = MockRegistry::new();
        let version = next_version_number(&registry, "0Ho1", VersionBump::Minor).unwrap();
        assert_eq!(version, VersionNumber::next(0, 1, 0));
    }
}
