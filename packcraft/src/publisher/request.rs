//! Version creation request assembly and submission.
//!
//! The request payload is a base64-encoded zip container holding:
//!
//! - `package.zip`: the processed package archive
//! - `package2-descriptor.json`: the version descriptor
//!
//! The content fingerprint of `package.zip` is the request tag, which makes
//! resubmitting identical content a lookup instead of a new build.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use super::{PublishError, PublishResult};
use crate::archive::{Archive, Fingerprint};
use crate::dependency::ResolvedDependency;
use crate::project::PackageSpec;
use crate::registry::records::PackageRecord;
use crate::registry::{quote, RegistryApi};
use crate::version::{next_version_number, VersionBump, VersionNumber};

/// Container entry holding the package archive.
pub const PACKAGE_ENTRY: &str = "package.zip";

/// Container entry holding the version descriptor.
pub const DESCRIPTOR_ENTRY: &str = "package2-descriptor.json";

/// The `package2-descriptor.json` document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub ancestor_id: String,
    pub id: String,
    pub path: String,
    pub version_name: String,
    pub version_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<ResolvedDependency>>,
}

/// Everything needed to request one package version.
#[derive(Debug, Clone)]
pub struct VersionRequest<'a> {
    pub package_id: &'a str,
    pub spec: &'a PackageSpec,
    /// Archive after the post-processing pipeline ran.
    pub archive: Archive,
    pub branch: Option<String>,
    pub bump: VersionBump,
    /// Submit even if identical content was already requested.
    pub force: bool,
    /// Whether the descriptor carries a dependency list.
    pub include_dependencies: bool,
}

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedRequest {
    pub request_id: String,
    pub fingerprint: Fingerprint,
    /// `None` when an earlier request was reused.
    pub version_number: Option<VersionNumber>,
    pub deduplicated: bool,
}

/// Builds and submits `Package2VersionCreateRequest` objects.
pub struct VersionRequestBuilder<'a> {
    registry: &'a dyn RegistryApi,
}

impl<'a> VersionRequestBuilder<'a> {
    pub fn new(registry: &'a dyn RegistryApi) -> Self {
        Self { registry }
    }

    /// Submit a version request.
    ///
    /// `dependencies` is only called when the request includes a
    /// dependency list and no earlier request is reused; it runs before
    /// anything is created, so a resolution failure submits nothing.
    pub fn submit<F>(
        &self,
        request: VersionRequest<'_>,
        dependencies: F,
    ) -> PublishResult<SubmittedRequest>
    where
        F: FnOnce() -> PublishResult<Vec<ResolvedDependency>>,
    {
        let package_bytes = request.archive.to_zip_bytes()?;
        let fingerprint = Fingerprint::of(&package_bytes);
        debug!(
            package_id = request.package_id,
            fingerprint = %fingerprint,
            entries = request.archive.len(),
            "Fingerprinted package archive"
        );

        if !request.force {
            if let Some(existing) = self.find_existing(request.package_id, &fingerprint)? {
                info!(
                    request_id = %existing,
                    "Found existing request for package with the same metadata. Using existing package."
                );
                return Ok(SubmittedRequest {
                    request_id: existing,
                    fingerprint,
                    version_number: None,
                    deduplicated: true,
                });
            }
        }

        let version_number = next_version_number(self.registry, request.package_id, request.bump)?;

        let dependencies = if request.include_dependencies {
            info!("Determining dependencies for package");
            Some(dependencies()?).filter(|deps| !deps.is_empty())
        } else {
            None
        };

        let descriptor = VersionDescriptor {
            ancestor_id: String::new(),
            id: request.package_id.to_string(),
            path: request.spec.path.display().to_string(),
            version_name: request.spec.version_name.clone(),
            version_number: version_number.to_string(),
            dependencies,
        };
        let version_info = encode_version_info(package_bytes, &descriptor)?;

        let tag = request
            .spec
            .tag
            .clone()
            .unwrap_or_else(|| fingerprint.tag());
        let fields = json!({
            "Branch": request.branch,
            "Package2Id": request.package_id,
            "Tag": tag,
            "VersionInfo": version_info,
        });
        let request_id = self.registry.create("Package2VersionCreateRequest", &fields)?;
        info!(
            request_id = %request_id,
            package = %request.spec.name,
            version = %version_number,
            "Submitted package version request"
        );

        Ok(SubmittedRequest {
            request_id,
            fingerprint,
            version_number: Some(version_number),
            deduplicated: false,
        })
    }

    /// A non-failed request for the same package and content, if any.
    fn find_existing(
        &self,
        package_id: &str,
        fingerprint: &Fingerprint,
    ) -> PublishResult<Option<String>> {
        let soql = format!(
            "SELECT Id FROM Package2VersionCreateRequest \
             WHERE Package2Id = {} AND Status != 'Error' AND Tag = {}",
            quote(package_id),
            quote(&fingerprint.tag())
        );
        let existing: Option<PackageRecord> = self.registry.query(&soql)?.first()?;
        Ok(existing.map(|record| record.id))
    }
}

/// Zip the package archive and descriptor together and base64 the result.
pub fn encode_version_info(
    package_bytes: Vec<u8>,
    descriptor: &VersionDescriptor,
) -> PublishResult<String> {
    let descriptor_json = serde_json::to_vec(descriptor).map_err(|e| {
        PublishError::Configuration(format!("failed to encode version descriptor: {}", e))
    })?;
    let container = Archive::new()
        .with_entry(PACKAGE_ENTRY, package_bytes)
        .with_entry(DESCRIPTOR_ENTRY, descriptor_json);
    Ok(STANDARD.encode(container.to_zip_bytes()?))
}
