//! Registry query/execute API.
//!
//! The package registry is reached through two primitive operations:
//! parameterized record queries and object creation. Everything the
//! publisher needs (package lookup, version lineage, creation requests,
//! error details, installed packages) is expressed on top of them.
//!
//! The [`RegistryApi`] trait is the seam that lets the publisher run
//! against the HTTP [`ToolingClient`] in production and scripted fakes in
//! tests.

mod error;
mod http;
pub mod records;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

pub use error::{RegistryError, RegistryResult};
pub use http::{ToolingClient, DEFAULT_API_VERSION, DEFAULT_TIMEOUT_SECS};

/// Result of a record query.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResult {
    /// Number of records matched.
    #[serde(default)]
    pub size: usize,

    /// The matched records as raw JSON objects.
    #[serde(default)]
    pub records: Vec<Value>,
}

impl QueryResult {
    /// A result with no records.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a result from records, setting `size` accordingly.
    pub fn from_records(records: Vec<Value>) -> Self {
        Self {
            size: records.len(),
            records,
        }
    }

    /// Whether no records matched.
    pub fn is_empty(&self) -> bool {
        self.size == 0 || self.records.is_empty()
    }

    /// Decode every record.
    pub fn decode<T: DeserializeOwned>(&self) -> RegistryResult<Vec<T>> {
        self.records
            .iter()
            .map(|record| T::deserialize(record).map_err(RegistryError::from))
            .collect()
    }

    /// Decode the first record, if any.
    pub fn first<T: DeserializeOwned>(&self) -> RegistryResult<Option<T>> {
        self.records
            .first()
            .map(|record| T::deserialize(record).map_err(RegistryError::from))
            .transpose()
    }
}

/// Record query and object creation against a package registry.
pub trait RegistryApi {
    /// Run a record query.
    fn query(&self, soql: &str) -> RegistryResult<QueryResult>;

    /// Create an object and return its id.
    fn create(&self, sobject: &str, fields: &Value) -> RegistryResult<String>;
}

/// Quote a value as a single-quoted query string literal.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\'' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            _ => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Query for exactly one record, failing with
/// [`RegistryError::MissingRecord`] when none matches.
pub fn query_one<T: DeserializeOwned>(
    registry: &dyn RegistryApi,
    soql: &str,
    sobject: &str,
    id: &str,
) -> RegistryResult<T> {
    registry
        .query(soql)?
        .first()?
        .ok_or_else(|| RegistryError::MissingRecord {
            sobject: sobject.to_string(),
            id: id.to_string(),
        })
}
