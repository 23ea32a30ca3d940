//! The `singularity_package_download` resource.
//!
//! Downloads an agent package to a local file and tracks its fingerprint.
//! Changing where the file lives or its permissions is handled in place;
//! changing which package it is, or the package changing upstream, forces
//! a fresh download.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::api::ApiClient;
use crate::diagnostics::Diagnostics;
use crate::download::DownloadRequest;
use crate::error::{ProviderError, Result};
use crate::files::{self, PathKind};
use crate::fingerprint::{Fingerprint, HashAlgorithm};
use crate::types::{AttributeChange, PlanResult};
use crate::validation::{self, Validate};

/// Resource type name.
pub const TYPE_NAME: &str = "singularity_package_download";

/// Default mode for directories created for the download.
pub const DEFAULT_DIRECTORY_MODE: &str = "0755";

/// Default mode for the downloaded file.
pub const DEFAULT_FILE_MODE: &str = "0644";

fn default_directory_mode() -> String {
    DEFAULT_DIRECTORY_MODE.to_string()
}

fn default_file_mode() -> String {
    DEFAULT_FILE_MODE.to_string()
}

fn default_overwrite() -> bool {
    true
}

/// Tracked state of one downloaded package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDownloadState {
    /// Package to download. Changing it forces replacement.
    pub package_id: String,
    /// Site to download through. Changing it forces replacement.
    pub site_id: String,
    /// Folder to save the package in.
    pub local_folder: String,
    /// File name to save the package as.
    pub local_filename: String,
    /// Octal mode for directories created for the download.
    #[serde(default = "default_directory_mode")]
    pub directory_mode: String,
    /// Octal mode of the downloaded file.
    #[serde(default = "default_file_mode")]
    pub file_mode: String,
    /// Replace a file already present at the destination.
    #[serde(default = "default_overwrite")]
    pub overwrite_existing_file: bool,
    /// Absolute path of the downloaded file.
    #[serde(default)]
    pub output_file: Option<String>,
    /// Size of the file on disk.
    #[serde(default)]
    pub file_size: Option<u64>,
    /// SHA-1 of the file on disk.
    #[serde(default)]
    pub sha1: Option<String>,
    /// Package version reported by the API.
    #[serde(default)]
    pub version: Option<String>,
}

impl PackageDownloadState {
    /// Parse state or configuration from its JSON form.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| ProviderError::Validation(format!("invalid {TYPE_NAME} configuration: {e}")))
    }

    /// Render as JSON.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Destination as configured, before resolution to an absolute path.
    pub fn destination(&self) -> PathBuf {
        Path::new(&self.local_folder).join(&self.local_filename)
    }

    fn normalized(mut self) -> Result<Self> {
        self.directory_mode = files::normalize_mode(&self.directory_mode)?;
        self.file_mode = files::normalize_mode(&self.file_mode)?;
        Ok(self)
    }
}

impl Validate for PackageDownloadState {
    fn validate(&self, path: &str, diags: &mut Diagnostics) {
        validation::not_empty(diags, path, "package_id", &self.package_id);
        validation::not_empty(diags, path, "site_id", &self.site_id);
        validation::not_empty(diags, path, "local_folder", &self.local_folder);
        validation::not_empty(diags, path, "local_filename", &self.local_filename);
        validation::file_mode(diags, path, "directory_mode", &self.directory_mode);
        validation::file_mode(diags, path, "file_mode", &self.file_mode);
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Lifecycle operations for [`PackageDownloadState`].
#[derive(Debug, Clone)]
pub struct PackageDownload {
    client: ApiClient,
    algorithm: HashAlgorithm,
}

impl PackageDownload {
    /// Create the resource handler over a configured client.
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            algorithm: HashAlgorithm::Sha1,
        }
    }

    /// Plan a change from `prior` to `proposed`.
    ///
    /// For an existing download the package metadata is fetched again; if
    /// the server now reports a different size or SHA-1 than is tracked,
    /// those attributes force replacement.
    #[instrument(skip_all, fields(package_id = %proposed.package_id))]
    pub async fn plan(
        &self,
        prior: Option<&PackageDownloadState>,
        proposed: PackageDownloadState,
    ) -> Result<PlanResult> {
        let mut planned = proposed.normalized()?;
        let output_file = path_string(&files::to_absolute_path(planned.destination())?);

        let Some(prior) = prior else {
            planned.output_file = Some(output_file);
            planned.file_size = None;
            planned.sha1 = None;
            planned.version = None;
            let changes = vec![
                AttributeChange::added("package_id", json!(planned.package_id)),
                AttributeChange::added("site_id", json!(planned.site_id)),
                AttributeChange::added("output_file", json!(planned.output_file)),
            ];
            return Ok(PlanResult::with_changes(planned.to_value()?, changes, false));
        };

        planned.output_file = Some(output_file);
        planned.file_size = prior.file_size;
        planned.sha1 = prior.sha1.clone();
        planned.version = prior.version.clone();

        let mut plan = PlanResult::no_change(serde_json::Value::Null);
        for (path, before, after) in [
            ("package_id", &prior.package_id, &planned.package_id),
            ("site_id", &prior.site_id, &planned.site_id),
        ] {
            if before != after {
                plan.replace_on(AttributeChange::modified(path, json!(before), json!(after)));
            }
        }
        for (path, before, after) in [
            ("local_folder", &prior.local_folder, &planned.local_folder),
            ("local_filename", &prior.local_filename, &planned.local_filename),
            ("directory_mode", &prior.directory_mode, &planned.directory_mode),
            ("file_mode", &prior.file_mode, &planned.file_mode),
        ] {
            if before != after {
                plan.changes
                    .push(AttributeChange::modified(path, json!(before), json!(after)));
            }
        }
        if prior.overwrite_existing_file != planned.overwrite_existing_file {
            plan.changes.push(AttributeChange::modified(
                "overwrite_existing_file",
                json!(prior.overwrite_existing_file),
                json!(planned.overwrite_existing_file),
            ));
        }
        if prior.output_file != planned.output_file {
            plan.changes.push(AttributeChange::modified(
                "output_file",
                json!(prior.output_file),
                json!(planned.output_file),
            ));
        }

        if let (Some(size), Some(sha1)) = (prior.file_size, prior.sha1.as_deref()) {
            if !prior.package_id.is_empty() {
                let package = self.client.get_package(&prior.package_id).await?;
                if package.file_size != size {
                    debug!(tracked = size, server = package.file_size, "package size changed upstream");
                    plan.replace_on(AttributeChange::modified(
                        "file_size",
                        json!(size),
                        json!(package.file_size),
                    ));
                    planned.file_size = Some(package.file_size);
                }
                if !package.sha1.eq_ignore_ascii_case(sha1) {
                    debug!(tracked = sha1, server = %package.sha1, "package hash changed upstream");
                    plan.replace_on(AttributeChange::modified(
                        "sha1",
                        json!(sha1),
                        json!(package.sha1),
                    ));
                    planned.sha1 = Some(package.sha1);
                }
            }
        }

        plan.planned_state = planned.to_value()?;
        Ok(plan)
    }

    /// Download the package and record its fingerprint.
    ///
    /// The download must match the size and SHA-1 the server reports for the
    /// package; on mismatch the file is removed and creation fails.
    #[instrument(skip_all, fields(package_id = %planned.package_id, site_id = %planned.site_id))]
    pub async fn create(&self, planned: PackageDownloadState) -> Result<PackageDownloadState> {
        let mut state = planned.normalized()?;
        let expected = self.client.get_package(&state.package_id).await?;

        let downloaded = self
            .client
            .download_package(&DownloadRequest {
                package_id: state.package_id.clone(),
                site_id: state.site_id.clone(),
                destination: state.destination(),
                directory_mode: state.directory_mode.clone(),
                file_mode: state.file_mode.clone(),
                overwrite: state.overwrite_existing_file,
                algorithm: self.algorithm,
            })
            .await?;

        if let Err(e) = downloaded
            .fingerprint
            .verify(expected.file_size, &expected.sha1)
        {
            warn!(path = %downloaded.path.display(), error = %e, "downloaded package failed verification");
            files::remove_quietly(&downloaded.path).await;
            return Err(e);
        }

        state.output_file = Some(path_string(&downloaded.path));
        state.file_size = Some(downloaded.fingerprint.size);
        state.sha1 = Some(downloaded.fingerprint.hash);
        state.version = Some(downloaded.version);
        Ok(state)
    }

    /// Refresh tracked values from the file on disk.
    ///
    /// Returns `None` when the file has been removed outside of the provider.
    #[instrument(skip_all, fields(output_file = ?current.output_file))]
    pub async fn read(&self, current: PackageDownloadState) -> Result<Option<PackageDownloadState>> {
        let Some(output_file) = current.output_file.clone() else {
            return Ok(None);
        };
        let package = self.client.get_package(&current.package_id).await?;

        let path = PathBuf::from(output_file);
        match files::inspect(&path).await? {
            PathKind::Missing => {
                info!(path = %path.display(), "package file no longer exists");
                return Ok(None);
            }
            PathKind::Directory => {
                return Err(ProviderError::FailedPrecondition(format!(
                    "{} is a directory, not a package file",
                    path.display()
                )))
            }
            PathKind::File => {}
        }

        let fingerprint = Fingerprint::of_file(&path, self.algorithm).await?;
        let mut state = current;
        state.version = Some(package.version);
        state.file_size = Some(fingerprint.size);
        state.sha1 = Some(fingerprint.hash);
        if let Some(mode) = files::current_mode(&path).await? {
            state.file_mode = mode;
        }
        Ok(Some(state))
    }

    /// Move or re-permission the downloaded file without downloading again.
    #[instrument(skip_all, fields(output_file = ?prior.output_file))]
    pub async fn update(
        &self,
        prior: PackageDownloadState,
        planned: PackageDownloadState,
    ) -> Result<PackageDownloadState> {
        let planned = planned.normalized()?;
        if prior.package_id != planned.package_id || prior.site_id != planned.site_id {
            return Err(ProviderError::FailedPrecondition(
                "package_id and site_id cannot change in place; the resource must be replaced"
                    .to_string(),
            ));
        }
        let source = prior
            .output_file
            .as_deref()
            .map(PathBuf::from)
            .ok_or_else(|| {
                ProviderError::FailedPrecondition("no downloaded file is tracked".to_string())
            })?;
        let destination = files::to_absolute_path(planned.destination())?;

        if source != destination {
            if !planned.overwrite_existing_file && files::path_exists(&destination).await? {
                return Err(files::already_exists(&destination));
            }
            if let Some(parent) = destination.parent() {
                files::create_directory(parent, files::parse_mode(&planned.directory_mode)?)
                    .await?;
            }
            files::move_file(&source, &destination).await?;
            debug!(src = %source.display(), dest = %destination.display(), "moved package file");
        }
        if files::normalize_mode(&prior.file_mode)? != planned.file_mode {
            files::set_mode(&destination, files::parse_mode(&planned.file_mode)?).await?;
        }

        Ok(PackageDownloadState {
            output_file: Some(path_string(&destination)),
            file_size: prior.file_size,
            sha1: prior.sha1,
            version: prior.version,
            ..planned
        })
    }

    /// Remove the downloaded file. A file that is already gone is not an
    /// error; a directory at the tracked path is never removed.
    #[instrument(skip_all, fields(output_file = ?current.output_file))]
    pub async fn delete(&self, current: &PackageDownloadState) -> Result<()> {
        let Some(output_file) = current.output_file.as_deref() else {
            return Ok(());
        };
        let path = Path::new(output_file);
        match files::inspect(path).await? {
            PathKind::Missing => {
                debug!(path = %path.display(), "package file already removed");
                Ok(())
            }
            PathKind::Directory => Err(ProviderError::FailedPrecondition(format!(
                "{} is a directory, not a package file",
                path.display()
            ))),
            PathKind::File => {
                files::remove_file(path).await?;
                debug!(path = %path.display(), "removed package file");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use std::sync::Arc;
    use tempfile::tempdir;

    const BODY: &[u8] = b"installer payload";

    fn package_json(size: u64, sha1: &str) -> serde_json::Value {
        json!([{
            "id": "p-1",
            "fileSize": size,
            "sha1": sha1,
            "version": "23.1.2.400"
        }])
    }

    fn body_sha1() -> String {
        Fingerprint::of_bytes(BODY, HashAlgorithm::Sha1).hash
    }

    fn config(folder: &Path, filename: &str) -> PackageDownloadState {
        PackageDownloadState::from_value(json!({
            "package_id": "p-1",
            "site_id": "s-1",
            "local_folder": folder.to_string_lossy(),
            "local_filename": filename,
        }))
        .unwrap()
    }

    fn tracked(path: &Path, size: u64, sha1: &str) -> PackageDownloadState {
        let mut state = config(path.parent().unwrap(), &path.file_name().unwrap().to_string_lossy());
        state.output_file = Some(path.to_string_lossy().into_owned());
        state.file_size = Some(size);
        state.sha1 = Some(sha1.to_string());
        state.version = Some("23.1.2.400".to_string());
        state
    }

    #[test]
    fn test_defaults_applied() {
        let state = config(Path::new("/opt/pkgs"), "agent.msi");
        assert_eq!(state.directory_mode, "0755");
        assert_eq!(state.file_mode, "0644");
        assert!(state.overwrite_existing_file);
        assert!(state.output_file.is_none());
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let mut state = config(Path::new("/opt/pkgs"), "");
        state.file_mode = "abc".to_string();
        state.site_id = String::new();
        let diags = state.validation_diagnostics().into_vec();
        let attrs: Vec<_> = diags.iter().filter_map(|d| d.attribute.as_deref()).collect();
        assert_eq!(attrs, vec!["site_id", "local_filename", "file_mode"]);
    }

    #[tokio::test]
    async fn test_create_downloads_and_verifies() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(package_json(BODY.len() as u64, &body_sha1()), None);
        transport.push_bytes(200, BODY.to_vec());
        transport.push_page(package_json(BODY.len() as u64, &body_sha1()), None);
        let resource = PackageDownload::new(transport.client());

        let state = resource
            .create(config(&dir.path().join("pkgs"), "agent.msi"))
            .await
            .unwrap();

        let expected_path = dir.path().join("pkgs/agent.msi");
        assert_eq!(state.output_file.as_deref(), Some(&*expected_path.to_string_lossy()));
        assert_eq!(state.file_size, Some(BODY.len() as u64));
        assert_eq!(state.sha1, Some(body_sha1()));
        assert_eq!(state.version.as_deref(), Some("23.1.2.400"));
        assert_eq!(tokio::fs::read(&expected_path).await.unwrap(), BODY);
    }

    #[tokio::test]
    async fn test_create_rejects_mismatched_download() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(
            package_json(BODY.len() as u64, "0000000000000000000000000000000000000000"),
            None,
        );
        transport.push_bytes(200, BODY.to_vec());
        transport.push_page(package_json(BODY.len() as u64, &body_sha1()), None);
        let resource = PackageDownload::new(transport.client());

        let err = resource
            .create(config(dir.path(), "agent.msi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::FingerprintMismatch { field: "sha1", .. }));
        assert!(err.to_string().contains("try again"));
        assert!(!files::path_exists(&dir.path().join("agent.msi")).await.unwrap());
    }

    #[tokio::test]
    async fn test_plan_detects_upstream_hash_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.msi");
        let prior = tracked(&path, 100, "AAA");

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(package_json(100, "BBB"), None);
        let resource = PackageDownload::new(transport.client());

        let proposed = config(dir.path(), "agent.msi");
        let plan = resource.plan(Some(&prior), proposed).await.unwrap();

        assert!(plan.requires_replace);
        assert_eq!(plan.replace_paths, vec!["sha1".to_string()]);
        assert!(!plan.replaces("file_size"));
        assert_eq!(plan.planned_state["sha1"], "BBB");
    }

    #[tokio::test]
    async fn test_plan_without_drift_is_quiet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.msi");
        let prior = tracked(&path, 100, "aaa");

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(package_json(100, "AAA"), None);
        let resource = PackageDownload::new(transport.client());

        let plan = resource
            .plan(Some(&prior), config(dir.path(), "agent.msi"))
            .await
            .unwrap();
        assert!(!plan.requires_replace);
        assert!(plan.changes.is_empty());
    }

    #[tokio::test]
    async fn test_plan_site_change_forces_replacement() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.msi");
        let prior = tracked(&path, 100, "aaa");

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(package_json(100, "aaa"), None);
        let resource = PackageDownload::new(transport.client());

        let mut proposed = config(dir.path(), "agent.msi");
        proposed.site_id = "s-2".to_string();
        let plan = resource.plan(Some(&prior), proposed).await.unwrap();
        assert_eq!(plan.replace_paths, vec!["site_id".to_string()]);
    }

    #[tokio::test]
    async fn test_plan_rename_is_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.msi");
        let prior = tracked(&path, 100, "aaa");

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(package_json(100, "aaa"), None);
        let resource = PackageDownload::new(transport.client());

        let mut proposed = config(dir.path(), "renamed.msi");
        proposed.file_mode = "600".to_string();
        let plan = resource.plan(Some(&prior), proposed).await.unwrap();

        assert!(!plan.requires_replace);
        let paths: Vec<_> = plan.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["local_filename", "file_mode", "output_file"]);
        assert_eq!(plan.planned_state["file_mode"], "0600");
    }

    #[tokio::test]
    async fn test_plan_create_makes_no_requests() {
        let dir = tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let resource = PackageDownload::new(transport.client());

        let plan = resource
            .plan(None, config(dir.path(), "agent.msi"))
            .await
            .unwrap();
        assert!(!plan.requires_replace);
        assert!(!plan.changes.is_empty());
        assert!(plan.planned_state["sha1"].is_null());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_read_refreshes_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.msi");
        tokio::fs::write(&path, BODY).await.unwrap();
        let prior = tracked(&path, 1, "stale");

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(package_json(1, "stale"), None);
        let resource = PackageDownload::new(transport.client());

        let state = resource.read(prior).await.unwrap().unwrap();
        assert_eq!(state.file_size, Some(BODY.len() as u64));
        assert_eq!(state.sha1, Some(body_sha1()));
        assert_eq!(state.version.as_deref(), Some("23.1.2.400"));
    }

    #[tokio::test]
    async fn test_read_missing_file_drops_resource() {
        let dir = tempdir().unwrap();
        let prior = tracked(&dir.path().join("gone.msi"), 1, "aaa");

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(package_json(1, "aaa"), None);
        let resource = PackageDownload::new(transport.client());

        assert!(resource.read(prior).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let prior = tracked(dir.path(), 1, "aaa");

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(package_json(1, "aaa"), None);
        let resource = PackageDownload::new(transport.client());

        let err = resource.read(prior).await.unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_update_moves_file_without_downloading() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.msi");
        tokio::fs::write(&path, BODY).await.unwrap();
        let prior = tracked(&path, BODY.len() as u64, &body_sha1());

        let transport = Arc::new(ScriptedTransport::new());
        let resource = PackageDownload::new(transport.client());

        let mut planned = config(&dir.path().join("moved"), "agent.msi");
        planned.file_mode = "0600".to_string();
        let state = resource.update(prior, planned).await.unwrap();

        let dest = dir.path().join("moved/agent.msi");
        assert_eq!(state.output_file.as_deref(), Some(&*dest.to_string_lossy()));
        assert_eq!(state.sha1, Some(body_sha1()));
        assert_eq!(state.file_mode, "0600");
        assert!(!files::path_exists(&path).await.unwrap());
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), BODY);
        assert_eq!(transport.request_count(), 0);

        #[cfg(unix)]
        assert_eq!(files::current_mode(&dest).await.unwrap().as_deref(), Some("0600"));
    }

    #[tokio::test]
    async fn test_update_refuses_identity_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.msi");
        let prior = tracked(&path, 1, "aaa");
        let transport = Arc::new(ScriptedTransport::new());
        let resource = PackageDownload::new(transport.client());

        let mut planned = config(dir.path(), "agent.msi");
        planned.package_id = "p-2".to_string();
        let err = resource.update(prior, planned).await.unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_noop() {
        let dir = tempdir().unwrap();
        let prior = tracked(&dir.path().join("gone.msi"), 1, "aaa");
        let transport = Arc::new(ScriptedTransport::new());
        let resource = PackageDownload::new(transport.client());

        resource.delete(&prior).await.unwrap();
        assert_eq!(files::inspect(dir.path()).await.unwrap(), PathKind::Directory);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_file_but_never_a_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.msi");
        tokio::fs::write(&path, BODY).await.unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let resource = PackageDownload::new(transport.client());

        resource.delete(&tracked(&path, 1, "aaa")).await.unwrap();
        assert!(!files::path_exists(&path).await.unwrap());

        let err = resource
            .delete(&tracked(dir.path(), 1, "aaa"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
        assert!(files::path_exists(dir.path()).await.unwrap());
    }
}
