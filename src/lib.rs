//! Hemmer provider for SentinelOne Singularity
//!
//! This crate exposes the Singularity management API to Hemmer as one
//! resource and six data sources.
//!
//! # Overview
//!
//! - **API client**: authenticated REST calls, envelope decoding, cursor
//!   pagination and entity lookups for packages, sites and groups
//! - **Package downloads**: agent packages streamed to local disk and
//!   verified against the size and SHA-1 reported by the console
//! - **ProviderService**: the lifecycle interface the host drives
//! - **Error types**: one error type that expands into user-facing diagnostics
//! - **Logging**: `tracing` integration that never prints the API token
//!
//! # Resources
//!
//! - `singularity_package_download`: a downloaded agent package. Moving or
//!   re-permissioning the file is done in place; a different package, site
//!   or an upstream change to the package forces a fresh download.
//!
//! # Data Sources
//!
//! - `singularity_packages`, `singularity_package`
//! - `singularity_sites`, `singularity_site`
//! - `singularity_groups`, `singularity_group`
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_provider_singularity::{ProviderService, SingularityProvider};
//! use serde_json::json;
//!
//! let provider = SingularityProvider::new();
//! provider
//!     .configure(json!({
//!         "api_token": "...",
//!         "api_endpoint": "usea1.sentinelone.net",
//!     }))
//!     .await?;
//!
//! let packages = provider
//!     .read_data_source(
//!         "singularity_packages",
//!         json!({"filter": {"os_types": ["linux"], "status": ["ga"]}}),
//!     )
//!     .await?;
//! ```
//!
//! The token and endpoint may also come from the `SINGULARITY_API_TOKEN` and
//! `SINGULARITY_API_ENDPOINT` environment variables, which take precedence.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod data_sources;
pub mod diagnostics;
pub mod download;
pub mod error;
pub mod files;
pub mod fingerprint;
pub mod logging;
pub mod provider;
pub mod resources;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use api::{ApiClient, ClientOptions};
pub use config::{ApiToken, ProviderConfig};
pub use diagnostics::{Diagnostic, DiagnosticSeverity, Diagnostics};
pub use error::ProviderError;
pub use fingerprint::{Fingerprint, HashAlgorithm};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::SingularityProvider;
pub use service::ProviderService;
pub use types::{AttributeChange, PlanResult, ProviderMetadata};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
