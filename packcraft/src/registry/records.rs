//! Typed views of the registry records the publisher reads.

use serde::Deserialize;
use serde_json::Value;

/// `Package2` lookup row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageRecord {
    pub id: String,
}

/// Latest version in a package's lineage.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionLineageRecord {
    pub major_version: u32,
    pub minor_version: u32,
    pub patch_version: u32,
    pub build_number: u32,
    #[serde(default)]
    pub is_released: bool,
}

/// `Package2Version` read back after a successful build.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageVersionRecord {
    pub major_version: u32,
    pub minor_version: u32,
    pub patch_version: u32,
    pub build_number: u32,
    pub subscriber_package_version_id: String,
}

impl PackageVersionRecord {
    /// Dotted four-part version number.
    pub fn version_number(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.major_version, self.minor_version, self.patch_version, self.build_number
        )
    }
}

/// `Package2VersionCreateRequest` status row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRequestRecord {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub package2_version_id: Option<String>,
}

/// `Package2VersionCreateRequestError` detail row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestErrorRecord {
    pub message: String,
}

/// `SubscriberPackageVersion.Dependencies` row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriberVersionRecord {
    #[serde(default)]
    pub dependencies: Option<Value>,
}

/// `InstalledSubscriberPackage` row with its related records.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstalledPackageRecord {
    pub subscriber_package: SubscriberPackage,
    pub subscriber_package_version: SubscriberPackageVersion,
}

/// The package half of an installed-package row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriberPackage {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace_prefix: Option<String>,
}

/// The version half of an installed-package row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriberPackageVersion {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub major_version: u32,
    pub minor_version: u32,
    #[serde(default)]
    pub patch_version: u32,
    #[serde(default)]
    pub build_number: u32,
    #[serde(default)]
    pub is_beta: bool,
    #[serde(default)]
    pub is_managed: bool,
}

impl SubscriberPackageVersion {
    /// Human-readable version string: `major.minor[.patch][ (Beta build)]`.
    ///
    /// The patch component is only shown when non-zero.
    pub fn version_string(&self) -> String {
        let mut version = format!("{}.{}", self.major_version, self.minor_version);
        if self.patch_version != 0 {
            version.push_str(&format!(".{}", self.patch_version));
        }
        if self.is_beta {
            version.push_str(&format!(" (Beta {})", self.build_number));
        }
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn installed(patch: u32, beta: bool) -> SubscriberPackageVersion {
        serde_json::from_value(json!({
            "Id": "04t000000000001",
            "Name": "Spring",
            "MajorVersion": 3,
            "MinorVersion": 1,
            "PatchVersion": patch,
            "BuildNumber": 7,
            "IsBeta": beta,
            "IsManaged": true
        }))
        .unwrap()
    }

    #[test]
    fn test_version_string_release() {
        assert_eq!(installed(0, false).version_string(), "3.1");
    }

    #[test]
    fn test_version_string_with_patch() {
        assert_eq!(installed(2, false).version_string(), "3.1.2");
    }

    #[test]
    fn test_version_string_beta() {
        assert_eq!(installed(0, true).version_string(), "3.1 (Beta 7)");
        assert_eq!(installed(4, true).version_string(), "3.1.4 (Beta 7)");
    }

    #[test]
    fn test_create_request_record_decodes() {
        let record: CreateRequestRecord = serde_json::from_value(json!({
            "Id": "08c000000000001",
            "Status": "Success",
            "Package2VersionId": "05i000000000001"
        }))
        .unwrap();
        assert_eq!(record.status, "Success");
        assert_eq!(record.package2_version_id.as_deref(), Some("05i000000000001"));
    }

    #[test]
    fn test_package_version_number_format() {
        let record: PackageVersionRecord = serde_json::from_value(json!({
            "MajorVersion": 1,
            "MinorVersion": 2,
            "PatchVersion": 0,
            "BuildNumber": 5,
            "SubscriberPackageVersionId": "04t000000000009"
        }))
        .unwrap();
        assert_eq!(record.version_number(), "1.2.0.5");
    }
}
