//! Creation request polling.
//!
//! A submitted creation request moves through server-driven states:
//!
//! ```text
//! Queued ──► InProgress ──► Success   (terminal: version id captured)
//!                      └──► Error     (terminal: error details joined)
//! ```
//!
//! The poller observes the request on a fixed interval until it reaches a
//! terminal state. Transport errors are not retried. An optional timeout
//! and a cancellation flag bound the wait; both are checked between
//! observations, never in the middle of one.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::{PublishError, PublishResult};
use crate::registry::records::{CreateRequestRecord, RequestErrorRecord};
use crate::registry::{query_one, quote, RegistryApi, RegistryError};

/// Status of a creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Queued,
    InProgress,
    Success,
    Error,
    /// A status this client does not know; treated as non-terminal.
    Other(String),
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Success | RequestStatus::Error)
    }
}

impl From<&str> for RequestStatus {
    fn from(s: &str) -> Self {
        match s {
            "Queued" => RequestStatus::Queued,
            "InProgress" => RequestStatus::InProgress,
            "Success" => RequestStatus::Success,
            "Error" => RequestStatus::Error,
            other => RequestStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Queued => write!(f, "Queued"),
            RequestStatus::InProgress => write!(f, "InProgress"),
            RequestStatus::Success => write!(f, "Success"),
            RequestStatus::Error => write!(f, "Error"),
            RequestStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Polling limits.
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Option<Duration>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(crate::config::DEFAULT_POLL_INTERVAL_SECS),
            timeout: None,
            cancel: None,
        }
    }
}

impl PollOptions {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stop polling once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// Polls a creation request until it finishes.
pub struct CreationPoller<'a> {
    registry: &'a dyn RegistryApi,
    options: PollOptions,
}

impl<'a> CreationPoller<'a> {
    pub fn new(registry: &'a dyn RegistryApi, options: PollOptions) -> Self {
        Self { registry, options }
    }

    /// Wait for the request to succeed and return the package version id.
    pub fn wait(&self, request_id: &str) -> PublishResult<String> {
        let started = Instant::now();
        let soql = format!(
            "SELECT Id, Status, Package2VersionId FROM Package2VersionCreateRequest WHERE Id = {}",
            quote(request_id)
        );

        loop {
            if self.options.is_cancelled() {
                return Err(PublishError::Cancelled {
                    request_id: request_id.to_string(),
                });
            }

            let request: CreateRequestRecord = query_one(
                self.registry,
                &soql,
                "Package2VersionCreateRequest",
                request_id,
            )?;
            let status = RequestStatus::from(request.status.as_str());

            match status {
                RequestStatus::Success => {
                    info!(request_id, "Package version created");
                    return request.package2_version_id.ok_or_else(|| {
                        PublishError::Registry(RegistryError::MissingRecord {
                            sobject: "Package2Version".to_string(),
                            id: request_id.to_string(),
                        })
                    });
                }
                RequestStatus::Error => {
                    let message = self.error_details(request_id)?;
                    return Err(PublishError::PackageUploadFailure(message));
                }
                RequestStatus::Queued | RequestStatus::InProgress => {
                    info!(request_id, status = %status, "Waiting for package version");
                }
                RequestStatus::Other(ref other) => {
                    warn!(request_id, status = %other, "Unknown request status, still waiting");
                }
            }

            if let Some(timeout) = self.options.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Err(PublishError::PollTimeout {
                        request_id: request_id.to_string(),
                        elapsed,
                    });
                }
            }

            thread::sleep(self.options.interval);
        }
    }

    /// All error detail messages of a failed request, newline-joined.
    fn error_details(&self, request_id: &str) -> PublishResult<String> {
        let soql = format!(
            "SELECT Message FROM Package2VersionCreateRequestError WHERE ParentRequestId = {}",
            quote(request_id)
        );
        let errors: Vec<RequestErrorRecord> = self.registry.query(&soql)?.decode()?;
        Ok(errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
