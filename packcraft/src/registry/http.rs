//! HTTP implementation of the registry API on top of the tooling REST
//! endpoints.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use super::{QueryResult, RegistryApi, RegistryError, RegistryResult};

/// Default API version used in endpoint paths.
pub const DEFAULT_API_VERSION: &str = "58.0";

/// Default timeout for registry requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// One page of a query response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryPage {
    #[serde(default)]
    size: Option<usize>,
    #[serde(default)]
    total_size: Option<usize>,
    #[serde(default)]
    records: Vec<Value>,
    #[serde(default)]
    next_records_url: Option<String>,
}

/// Response to an object creation.
#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: Option<String>,
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    errors: Vec<Value>,
}

fn default_success() -> bool {
    true
}

/// Registry client speaking the tooling REST API.
#[derive(Debug)]
pub struct ToolingClient {
    client: Client,
    instance_url: String,
    access_token: String,
    api_version: String,
}

impl ToolingClient {
    /// Create a client with the default timeout.
    pub fn new(
        instance_url: impl Into<String>,
        access_token: impl Into<String>,
        api_version: impl Into<String>,
    ) -> RegistryResult<Self> {
        Self::with_timeout(
            instance_url,
            access_token,
            api_version,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(
        instance_url: impl Into<String>,
        access_token: impl Into<String>,
        api_version: impl Into<String>,
        timeout: Duration,
    ) -> RegistryResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("packcraft/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            instance_url: instance_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            api_version: api_version.into(),
        })
    }

    /// Base URL of the tooling endpoints.
    pub fn tooling_url(&self) -> String {
        format!(
            "{}/services/data/v{}/tooling",
            self.instance_url, self.api_version
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .header(ACCEPT, "application/json")
    }

    fn send(&self, request: RequestBuilder) -> RegistryResult<String> {
        let response: Response = self
            .authorized(request)
            .send()
            .map_err(|e| RegistryError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| RegistryError::Http(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

impl RegistryApi for ToolingClient {
    fn query(&self, soql: &str) -> RegistryResult<QueryResult> {
        debug!(query = soql, "Running registry query");
        let url = format!("{}/query/", self.tooling_url());
        let body = self.send(self.client.get(&url).query(&[("q", soql)]))?;
        let mut page: QueryPage = serde_json::from_str(&body)?;

        let mut records = std::mem::take(&mut page.records);
        let size = page.total_size.or(page.size);

        while let Some(next) = page.next_records_url.take() {
            trace!(next = %next, "Fetching next query page");
            let body = self.send(self.client.get(format!("{}{}", self.instance_url, next)))?;
            page = serde_json::from_str(&body)?;
            records.append(&mut page.records);
        }

        Ok(QueryResult {
            size: size.unwrap_or(records.len()),
            records,
        })
    }

    fn create(&self, sobject: &str, fields: &Value) -> RegistryResult<String> {
        debug!(sobject, "Creating registry object");
        let url = format!("{}/sobjects/{}/", self.tooling_url(), sobject);
        let payload = serde_json::to_vec(fields)?;
        let body = self.send(
            self.client
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .body(payload),
        )?;

        let response: CreateResponse = serde_json::from_str(&body)?;
        match response.id {
            Some(id) if response.success => Ok(id),
            _ => Err(RegistryError::Rejected {
                sobject: sobject.to_string(),
                reason: Value::Array(response.errors).to_string(),
            }),
        }
    }
}
