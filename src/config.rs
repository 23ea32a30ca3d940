//! Provider configuration.
//!
//! The provider block accepts an API token and endpoint plus two optional
//! tuning knobs. The `SINGULARITY_API_TOKEN` and `SINGULARITY_API_ENDPOINT`
//! environment variables take precedence over values from the block.

use std::time::Duration;

use serde::Deserialize;

use crate::api::ClientOptions;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::logging::Masked;

/// Environment variable holding the API token.
pub const ENV_API_TOKEN: &str = "SINGULARITY_API_TOKEN";

/// Environment variable holding the API endpoint hostname.
pub const ENV_API_ENDPOINT: &str = "SINGULARITY_API_ENDPOINT";

/// Secret API token; never printed.
pub type ApiToken = Masked<String>;

/// Raw provider block as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// API token used to authenticate every request.
    pub api_token: Option<Masked<String>>,
    /// API hostname, with or without an `https://` prefix.
    pub api_endpoint: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Upper bound on the number of pages a single query may drain.
    pub max_pages: Option<u32>,
}

/// Configuration after environment overrides have been applied.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// API token.
    pub api_token: ApiToken,
    /// API hostname without scheme.
    pub api_endpoint: String,
    /// Transport and pagination options.
    pub options: ClientOptions,
}

impl ProviderConfig {
    /// Parse the provider block from its JSON form.
    ///
    /// A `null` block is treated as empty so that configuration can come
    /// entirely from the environment.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<ResolvedConfig, Diagnostics> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve using the given environment lookup.
    ///
    /// Missing values are all reported together.
    pub fn resolve_with<F>(&self, env: F) -> Result<ResolvedConfig, Diagnostics>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut diags = Diagnostics::new();

        let api_token = non_empty(env(ENV_API_TOKEN))
            .or_else(|| {
                self.api_token
                    .as_ref()
                    .and_then(|t| non_empty(Some(t.expose().clone())))
            })
            .map(Masked::new);
        if api_token.is_none() {
            diags.push(
                Diagnostic::error("Missing API Token Configuration")
                    .with_detail(format!(
                        "While configuring the provider, the API token was not found in the \
                         {ENV_API_TOKEN} environment variable nor was it defined in the provider \
                         configuration block's 'api_token' attribute."
                    ))
                    .with_attribute("api_token"),
            );
        }

        let api_endpoint = non_empty(env(ENV_API_ENDPOINT))
            .or_else(|| non_empty(self.api_endpoint.clone()))
            .map(|e| normalize_endpoint(&e));
        if api_endpoint.is_none() {
            diags.push(
                Diagnostic::error("Missing API Endpoint Configuration")
                    .with_detail(format!(
                        "While configuring the provider, the API endpoint was not found in the \
                         {ENV_API_ENDPOINT} environment variable nor was it defined in the provider \
                         configuration block's 'api_endpoint' attribute."
                    ))
                    .with_attribute("api_endpoint"),
            );
        }

        if self.max_pages == Some(0) {
            diags.push(
                Diagnostic::error("Invalid Pagination Limit")
                    .with_detail("max_pages must be at least 1 when set")
                    .with_attribute("max_pages"),
            );
        }

        match (api_token, api_endpoint) {
            (Some(api_token), Some(api_endpoint)) if !diags.has_errors() => {
                let mut options = ClientOptions::default();
                if let Some(secs) = self.request_timeout_secs {
                    options.request_timeout = Duration::from_secs(secs);
                }
                options.max_pages = self.max_pages;
                Ok(ResolvedConfig {
                    api_token,
                    api_endpoint,
                    options,
                })
            }
            _ => Err(diags),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Strip an optional scheme and trailing slashes from an endpoint hostname.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    trimmed
        .strip_prefix("https://")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}
