//! Managed resources.

pub mod package_download;

pub use package_download::{PackageDownload, PackageDownloadState};

/// Every resource type name this provider manages.
pub fn names() -> Vec<&'static str> {
    vec![package_download::TYPE_NAME]
}
