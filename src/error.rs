//! Error types for the Singularity provider.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::api::ApiErrorDetail;
use crate::diagnostics::Diagnostic;

/// Errors that can occur while talking to the API or managing local artifacts.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request could not be sent or the response could not be read.
    #[error("Transport error: {method} {url}: {message}")]
    Transport {
        /// HTTP method of the failed request.
        method: String,
        /// Fully qualified request URL.
        url: String,
        /// Underlying client error, rendered as text.
        message: String,
    },

    /// The server rejected the request with one or more structured errors.
    #[error("API error: {method} {url} returned HTTP {status} with {} error(s)", .errors.len())]
    Api {
        /// HTTP method of the failed request.
        method: String,
        /// Fully qualified request URL.
        url: String,
        /// HTTP status code (always >= 400).
        status: u16,
        /// Every structured error the server reported, in order.
        errors: Vec<ApiErrorDetail>,
    },

    /// The server returned an error status without a usable error envelope.
    #[error("HTTP error: {method} {url} returned HTTP {status}: {body}")]
    Http {
        /// HTTP method of the failed request.
        method: String,
        /// Fully qualified request URL.
        url: String,
        /// HTTP status code (always >= 400).
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// A successful response did not match the expected shape.
    #[error("Decode error: {context}: {source}")]
    Decode {
        /// What was being decoded.
        context: String,
        /// The parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// The requested entity was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// An id lookup matched more than one entity.
    #[error("Ambiguous result: expected 1 {kind} but {count} were found")]
    Ambiguous {
        /// Entity kind (package, site, group).
        kind: &'static str,
        /// Number of matches returned.
        count: usize,
    },

    /// A local filesystem operation failed.
    #[error("Filesystem error: failed to {operation} {}: {source}", .path.display())]
    Filesystem {
        /// Short verb phrase describing the operation.
        operation: &'static str,
        /// Path the operation was applied to.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: io::Error,
    },

    /// The destination file exists and overwriting it is disabled.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// A downloaded artifact does not match the server-reported fingerprint.
    #[error(
        "Fingerprint mismatch: {field} of the downloaded file is {actual} but the server reported \
         {expected}; the package may have changed during the download, try again later"
    )]
    FingerprintMismatch {
        /// Attribute that differed (`file_size`, `sha1` or `sha256`).
        field: &'static str,
        /// Server-reported value.
        expected: String,
        /// Locally computed value.
        actual: String,
    },

    /// Pagination did not terminate within the configured page limit.
    #[error("Pagination limit exceeded: {endpoint} returned more than {max_pages} page(s)")]
    PaginationLimit {
        /// Endpoint that was being drained.
        endpoint: String,
        /// Configured page limit.
        max_pages: u32,
    },

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),
}

impl ProviderError {
    /// Build a [`ProviderError::Filesystem`] error.
    pub fn filesystem(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Build a [`ProviderError::Decode`] error.
    pub fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            context: context.into(),
            source,
        }
    }

    /// Short, user-facing title used as the diagnostic summary.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "API Request Error",
            Self::Api { .. } | Self::Http { .. } | Self::Decode { .. } => "API Response Error",
            Self::NotFound(_) => "Not Found",
            Self::Ambiguous { .. } => "Multiple Results Found",
            Self::Filesystem { .. } => "Filesystem Error",
            Self::AlreadyExists(_) => "File Exists",
            Self::FingerprintMismatch { .. } => "Package Verification Error",
            Self::PaginationLimit { .. } => "Pagination Limit Exceeded",
            Self::Configuration(_) => "Configuration Error",
            Self::Validation(_) => "Validation Error",
            Self::UnknownResource(_) => "Unknown Resource Type",
            Self::Serialization(_) => "Serialization Error",
            Self::FailedPrecondition(_) => "Failed Precondition",
        }
    }

    /// Expand this error into user-facing diagnostics.
    ///
    /// An [`ProviderError::Api`] error yields one diagnostic per structured
    /// server error, each keeping its code, title and detail. Every other
    /// variant yields exactly one diagnostic.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Self::Api {
                method,
                url,
                status,
                errors,
            } => errors
                .iter()
                .map(|e| {
                    Diagnostic::error(self.summary()).with_detail(format!(
                        "The request to the API server returned a non-successful error code.\n\n\
                         URL: {url}\nMethod: {method}\nHTTP Status Code: {status}\n\
                         API Code: {}\nSummary: {}\nDetails: {}",
                        e.code, e.title, e.detail
                    ))
                })
                .collect(),
            other => vec![Diagnostic::error(other.summary()).with_detail(other.to_string())],
        }
    }
}

impl From<ProviderError> for Vec<Diagnostic> {
    fn from(err: ProviderError) -> Self {
        err.diagnostics()
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = ProviderError> = std::result::Result<T, E>;
