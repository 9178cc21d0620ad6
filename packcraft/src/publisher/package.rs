//! Package lookup and lazy creation.

use serde_json::json;
use tracing::info;

use super::{PublishError, PublishResult};
use crate::project::PackageSpec;
use crate::registry::records::PackageRecord;
use crate::registry::{quote, RegistryApi};

/// Find the non-deprecated package for `(name, namespace)`, creating it on
/// first build.
///
/// More than one match is a configuration error.
pub fn get_or_create_package(
    registry: &dyn RegistryApi,
    spec: &PackageSpec,
) -> PublishResult<String> {
    let namespace_clause = match &spec.namespace {
        Some(ns) => format!("NamespacePrefix={}", quote(ns)),
        None => "NamespacePrefix=null".to_string(),
    };
    let soql = format!(
        "SELECT Id FROM Package2 WHERE IsDeprecated = FALSE AND Name={} AND {}",
        quote(&spec.name),
        namespace_clause
    );

    let result = registry.query(&soql)?;
    if result.size > 1 {
        return Err(PublishError::Configuration(format!(
            "Found {} packages with the same name, namespace, and package_type",
            result.size
        )));
    }
    if let Some(package) = result.first::<PackageRecord>()? {
        return Ok(package.id);
    }

    let fields = json!({
        "ContainerOptions": spec.package_type.container_options(),
        "Name": spec.name,
        "NamespacePrefix": spec.namespace,
    });
    let id = registry.create("Package2", &fields)?;
    info!(package = %spec.name, package_id = %id, "Created package");
    Ok(id)
}
