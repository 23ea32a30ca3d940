//! Streaming package downloads.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::api::{ApiClient, QueryMap};
use crate::error::Result;
use crate::files;
use crate::fingerprint::{Fingerprint, HashAlgorithm};

/// Parameters for a single package download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Package to fetch.
    pub package_id: String,
    /// Site the package is downloaded through.
    pub site_id: String,
    /// Destination file; relative paths resolve against the current directory.
    pub destination: PathBuf,
    /// Octal mode for directories created along the way.
    pub directory_mode: String,
    /// Octal mode for the downloaded file.
    pub file_mode: String,
    /// Replace an existing destination file.
    pub overwrite: bool,
    /// Digest computed over the downloaded bytes.
    pub algorithm: HashAlgorithm,
}

/// A package written to local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedPackage {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Size and digest of what was written.
    pub fingerprint: Fingerprint,
    /// Package version reported by the API.
    pub version: String,
}

/// URI serving the package binary.
pub fn download_uri(site_id: &str, package_id: &str) -> String {
    format!("/update/agent/download/{site_id}/{package_id}")
}

impl ApiClient {
    /// Stream a package to disk and fingerprint the result.
    ///
    /// With `overwrite` unset, an existing destination fails before any
    /// request is made. If anything fails after the file was created, the
    /// partial file is removed.
    #[instrument(skip(self, request), fields(
        package_id = %request.package_id,
        site_id = %request.site_id,
    ))]
    pub async fn download_package(&self, request: &DownloadRequest) -> Result<DownloadedPackage> {
        let path = files::to_absolute_path(&request.destination)?;
        let directory_mode = files::parse_mode(&request.directory_mode)?;
        let file_mode = files::parse_mode(&request.file_mode)?;

        if !request.overwrite && files::path_exists(&path).await? {
            return Err(files::already_exists(&path));
        }

        let file = files::create_file(&path, directory_mode, file_mode, request.overwrite).await?;
        let result = self.fill_package_file(request, &path, file).await;
        files::remove_on_error(&path, result).await
    }

    async fn fill_package_file(
        &self,
        request: &DownloadRequest,
        path: &Path,
        mut file: tokio::fs::File,
    ) -> Result<DownloadedPackage> {
        let uri = download_uri(&request.site_id, &request.package_id);
        let stream = self.get_stream(&uri, &QueryMap::new()).await?;
        let written = stream.write_to(&mut file, path).await?;
        drop(file);
        debug!(path = %path.display(), bytes = written, "package body written");

        let fingerprint = Fingerprint::of_file(path, request.algorithm).await?;
        let package = self.get_package(&request.package_id).await?;

        info!(
            path = %path.display(),
            size = fingerprint.size,
            version = %package.version,
            "package downloaded"
        );
        Ok(DownloadedPackage {
            path: path.to_path_buf(),
            fingerprint,
            version: package.version,
        })
    }
}
