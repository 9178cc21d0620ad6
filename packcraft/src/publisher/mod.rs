//! Package version publishing.
//!
//! # Overview
//!
//! [`Publisher`] drives one build:
//!
//! 1. Look up or create the package (`package`)
//! 2. Package and post-process the source into an [`Archive`](crate::archive::Archive)
//! 3. Submit a version request (`request`): fingerprint dedup, next
//!    version number, dependency list, base64 container payload
//! 4. Poll the request to a terminal state (`poller`)
//! 5. Read back the created version
//!
//! Dependencies declared in the project manifest are resolved by
//! [`crate::dependency`], which calls back into the publisher to build
//! repository-hosted and local unpackaged metadata as packages of their own.
//!
//! # Example
//!
//! ```ignore
//! use packcraft::publisher::{BuildOptions, Publisher};
//!
//! let publisher = Publisher::new(&registry, &fetcher, &converter, &orgs, &manifest)
//!     .with_options(BuildOptions::from_config(&config));
//! let result = publisher.build_package("main")?;
//! println!("{}", result.subscriber_package_version_id);
//! ```

mod build;
mod error;
mod package;
mod poller;
mod request;

pub use build::{BuildOptions, BuildResult, BuildRole, Publisher};
pub use error::{PublishError, PublishResult};
pub use package::get_or_create_package;
pub use poller::{CreationPoller, PollOptions, RequestStatus};
pub use request::{
    encode_version_info, SubmittedRequest, VersionDescriptor, VersionRequest,
    VersionRequestBuilder, DESCRIPTOR_ENTRY, PACKAGE_ENTRY,
};
