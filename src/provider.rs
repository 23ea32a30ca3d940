//! The Singularity provider.

use std::sync::OnceLock;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::api::ApiClient;
use crate::config::ProviderConfig;
use crate::data_sources;
use crate::diagnostics::Diagnostic;
use crate::error::{ProviderError, Result};
use crate::resources::{self, package_download, PackageDownload, PackageDownloadState};
use crate::service::ProviderService;
use crate::types::{PlanResult, ProviderMetadata};
use crate::validation::Validate;

/// Provider for the SentinelOne Singularity API.
///
/// The API client is built once by [`ProviderService::configure`] and shared
/// by every resource and data source for the lifetime of the provider.
#[derive(Debug, Default)]
pub struct SingularityProvider {
    client: OnceLock<ApiClient>,
}

impl SingularityProvider {
    /// Create an unconfigured provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider that is already configured with `client`.
    pub fn with_client(client: ApiClient) -> Self {
        Self {
            client: OnceLock::from(client),
        }
    }

    /// The configured API client.
    pub fn client(&self) -> Result<&ApiClient> {
        self.client.get().ok_or_else(|| {
            ProviderError::Configuration(
                "the provider has not been configured; call configure first".to_string(),
            )
        })
    }

    fn package_download(&self, resource_type: &str) -> Result<PackageDownload> {
        if resource_type != package_download::TYPE_NAME {
            return Err(ProviderError::UnknownResource(resource_type.to_string()));
        }
        Ok(PackageDownload::new(self.client()?.clone()))
    }
}

fn already_configured() -> Diagnostic {
    Diagnostic::warning("Provider Already Configured")
        .with_detail("The provider was configured more than once; the first configuration is kept.")
}

#[async_trait::async_trait]
impl ProviderService for SingularityProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: resources::names().into_iter().map(String::from).collect(),
            data_sources: data_sources::names()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>> {
        let config = match ProviderConfig::from_value(config) {
            Ok(config) => config,
            Err(e) => return Ok(ProviderError::Configuration(e.to_string()).diagnostics()),
        };
        Ok(match config.resolve() {
            Ok(_) => Vec::new(),
            Err(diags) => diags.into_vec(),
        })
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>> {
        if self.client.get().is_some() {
            warn!("provider configured more than once");
            return Ok(vec![already_configured()]);
        }

        let config = ProviderConfig::from_value(config)
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;
        let resolved = match config.resolve() {
            Ok(resolved) => resolved,
            Err(diags) => return Ok(diags.into_vec()),
        };
        let client = ApiClient::from_config(&resolved)?;
        info!(base_url = client.base_url(), "provider configured");

        if self.client.set(client).is_err() {
            return Ok(vec![already_configured()]);
        }
        Ok(Vec::new())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>> {
        if resource_type != package_download::TYPE_NAME {
            return Err(ProviderError::UnknownResource(resource_type.to_string()));
        }
        Ok(match PackageDownloadState::from_value(config) {
            Ok(state) => state.validation_diagnostics().into_vec(),
            Err(e) => e.diagnostics(),
        })
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult> {
        let resource = self.package_download(resource_type)?;
        if proposed_state.is_null() {
            return Ok(PlanResult::no_change(Value::Null));
        }
        let prior = prior_state
            .filter(|v| !v.is_null())
            .map(PackageDownloadState::from_value)
            .transpose()?;
        let proposed = PackageDownloadState::from_value(proposed_state)?;
        resource.plan(prior.as_ref(), proposed).await
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value> {
        let resource = self.package_download(resource_type)?;
        let state = resource
            .create(PackageDownloadState::from_value(planned_state)?)
            .await?;
        state.to_value()
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Option<Value>> {
        let resource = self.package_download(resource_type)?;
        match resource
            .read(PackageDownloadState::from_value(current_state)?)
            .await?
        {
            Some(state) => Ok(Some(state.to_value()?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value> {
        let resource = self.package_download(resource_type)?;
        let state = resource
            .update(
                PackageDownloadState::from_value(prior_state)?,
                PackageDownloadState::from_value(planned_state)?,
            )
            .await?;
        state.to_value()
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<()> {
        let resource = self.package_download(resource_type)?;
        resource
            .delete(&PackageDownloadState::from_value(current_state)?)
            .await
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>> {
        data_sources::validate(data_source_type, config)
    }

    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value> {
        data_sources::read(self.client()?, data_source_type, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{Fingerprint, HashAlgorithm};
    use crate::testing::{
        assert_error_contains, assert_has_errors, assert_no_errors, assert_plan_no_changes,
        assert_plan_replaces, assert_plan_replaces_attribute, assert_plan_updates_in_place,
        ProviderTester, ScriptedTransport, TestError,
    };
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    const BODY: &[u8] = b"MZ fake agent installer";

    fn package_page(transport: &ScriptedTransport, sha1: &str) {
        transport.push_page(
            json!([{
                "id": "p-1",
                "fileSize": BODY.len(),
                "sha1": sha1,
                "version": "24.1.4.257"
            }]),
            None,
        );
    }

    fn body_sha1() -> String {
        Fingerprint::of_bytes(BODY, HashAlgorithm::Sha1).hash
    }

    #[test]
    fn test_metadata_lists_everything() {
        let tester = ProviderTester::new(SingularityProvider::new());
        assert_eq!(tester.resource_types(), vec!["singularity_package_download"]);
        assert_eq!(tester.data_source_types().len(), 6);
        assert!(tester
            .data_source_types()
            .contains(&"singularity_groups".to_string()));
    }

    #[tokio::test]
    async fn test_unconfigured_provider_refuses_work() {
        let tester = ProviderTester::new(SingularityProvider::new());
        let err = tester
            .read_data_source("singularity_sites", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_configure_once() {
        let tester = ProviderTester::new(SingularityProvider::new());
        let config = json!({
            "api_token": "secret-token",
            "api_endpoint": "https://usea1.sentinelone.net/",
        });

        let diags = tester.configure(config.clone()).await.unwrap();
        assert_no_errors(&diags);
        let client = tester.provider().client().unwrap();
        assert!(client.base_url().ends_with("/web/api/v2.1"));

        let diags = tester.configure(config).await.unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Provider Already Configured");
    }

    #[tokio::test]
    async fn test_configure_rejects_unknown_attributes() {
        let tester = ProviderTester::new(SingularityProvider::new());
        let err = tester
            .configure(json!({"api_key": "nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Provider(ProviderError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_validate_provider_config_flags_zero_page_limit() {
        let provider = SingularityProvider::new();
        let diags = provider
            .validate_provider_config(json!({
                "api_token": "t",
                "api_endpoint": "console.example.test",
                "max_pages": 0,
            }))
            .await
            .unwrap();
        assert_has_errors(&diags);
        assert_error_contains(&diags, "Pagination");
    }

    #[tokio::test]
    async fn test_validate_resource_config() {
        let provider = SingularityProvider::new();
        let diags = provider
            .validate_resource_config(
                "singularity_package_download",
                json!({
                    "package_id": "p-1",
                    "site_id": "s-1",
                    "local_folder": "/tmp",
                    "local_filename": "agent.msi",
                    "file_mode": "0999",
                }),
            )
            .await
            .unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute.as_deref(), Some("file_mode"));

        let err = provider
            .validate_resource_config("singularity_widget", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_package_download_lifecycle() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let tester = ProviderTester::new(SingularityProvider::with_client(transport.client()));
        let config = json!({
            "package_id": "p-1",
            "site_id": "s-1",
            "local_folder": dir.path().join("downloads").to_string_lossy(),
            "local_filename": "agent.exe",
        });

        // expected metadata, body, version lookup, read refresh
        package_page(&transport, &body_sha1());
        transport.push_bytes(200, BODY);
        package_page(&transport, &body_sha1());
        package_page(&transport, &body_sha1());
        let state = tester
            .lifecycle_create("singularity_package_download", config.clone())
            .await
            .unwrap();
        assert_eq!(state["sha1"], body_sha1());
        assert_eq!(state["file_size"], BODY.len());
        assert_eq!(state["version"], "24.1.4.257");

        package_page(&transport, &body_sha1());
        let plan = tester
            .plan_update("singularity_package_download", state.clone(), config.clone())
            .await
            .unwrap();
        assert_plan_no_changes(&plan);

        let mut moved = config.clone();
        moved["local_filename"] = json!("renamed.exe");
        package_page(&transport, &body_sha1());
        package_page(&transport, &body_sha1());
        let state = tester
            .lifecycle_update("singularity_package_download", state, moved)
            .await
            .unwrap();
        let output_file = state["output_file"].as_str().unwrap().to_string();
        assert!(output_file.ends_with("renamed.exe"));
        assert_eq!(tokio::fs::read(&output_file).await.unwrap(), BODY);

        tester
            .delete("singularity_package_download", state.clone())
            .await
            .unwrap();
        assert!(!std::path::Path::new(&output_file).exists());

        package_page(&transport, &body_sha1());
        let gone = tester
            .read("singularity_package_download", state)
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_plan_replaces_when_package_changes_upstream() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let tester = ProviderTester::new(SingularityProvider::with_client(transport.client()));
        let path = dir.path().join("agent.exe");
        let prior = json!({
            "package_id": "p-1",
            "site_id": "s-1",
            "local_folder": dir.path().to_string_lossy(),
            "local_filename": "agent.exe",
            "output_file": path.to_string_lossy(),
            "file_size": BODY.len(),
            "sha1": body_sha1(),
        });

        package_page(&transport, "ffffffffffffffffffffffffffffffffffffffff");
        let plan = tester
            .plan_update("singularity_package_download", prior.clone(), prior)
            .await
            .unwrap();
        assert_plan_replaces(&plan);
        assert_plan_replaces_attribute(&plan, "sha1");
        assert!(!plan.replaces("file_size"));
    }

    #[tokio::test]
    async fn test_plan_delete_makes_no_requests() {
        let transport = Arc::new(ScriptedTransport::new());
        let tester = ProviderTester::new(SingularityProvider::with_client(transport.client()));
        let plan = tester
            .plan_delete(
                "singularity_package_download",
                json!({"package_id": "p-1", "site_id": "s-1", "local_folder": "/tmp", "local_filename": "a"}),
            )
            .await
            .unwrap();
        assert!(plan.planned_state.is_null());
        assert_plan_updates_in_place(&plan);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let transport = Arc::new(ScriptedTransport::new());
        let tester = ProviderTester::new(SingularityProvider::with_client(transport.client()));
        let err = tester
            .create("singularity_widget", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_read_data_source_through_provider() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(json!([{"id": "g-1", "type": "dynamic"}]), None);
        let tester = ProviderTester::new(SingularityProvider::with_client(transport.client()));

        let out = tester
            .read_data_source("singularity_groups", json!({"filter": {"types": ["dynamic"]}}))
            .await
            .unwrap();
        assert_eq!(out["groups"][0]["id"], "g-1");
        assert_eq!(transport.requests()[0].query["types"], "dynamic");
    }
}
