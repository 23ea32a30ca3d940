//! Agent packages.

use serde::{Deserialize, Serialize};

use super::client::ApiClient;
use super::envelope::null_as_default;
use super::pager::Finder;
use super::query::{QueryBuilder, QueryMap, QueryParams};
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::validation::{self, Validate};

/// Accepted `file_extension` filter values.
pub const FILE_EXTENSIONS: &[&str] = &[
    ".bsx", ".deb", ".exe", ".gz", ".img", ".msi", ".pkg", ".rpm", ".tar", ".xz", ".zip",
    "unknown",
];
/// Accepted `os_arches` filter values.
pub const OS_ARCHES: &[&str] = &["32 bit", "32/64 bit", "64 bit", "N/A"];
/// Accepted `os_types` and `platform_types` filter values.
pub const OS_TYPES: &[&str] = &["linux", "linux_k8s", "macos", "sdk", "windows", "windows_legacy"];
/// Accepted `package_types` filter values.
pub const PACKAGE_TYPES: &[&str] = &["Agent", "AgentAndRanger", "Ranger"];
/// Accepted `status` filter values.
pub const STATUSES: &[&str] = &["beta", "ea", "ga", "other"];
/// Accepted `sort_by` filter values.
pub const SORT_FIELDS: &[&str] = &[
    "createdAt", "fileExtension", "fileName", "fileSize", "id", "link", "majorVersion",
    "minorVersion", "osType", "packageType", "platformType", "rangerVersion", "scopeLevel",
    "sha1", "status", "updatedAt", "version",
];

/// An installable agent package.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all(deserialize = "camelCase"))]
pub struct Package {
    #[serde(deserialize_with = "null_as_default")]
    pub accounts: Vec<PackageScope>,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(deserialize_with = "null_as_default")]
    pub file_extension: String,
    #[serde(deserialize_with = "null_as_default")]
    pub file_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub file_size: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    pub link: Option<String>,
    pub major_version: Option<String>,
    pub minor_version: Option<String>,
    pub os_arch: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub os_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub package_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub platform_type: String,
    pub ranger_version: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub scope_level: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sha1: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sites: Vec<PackageScope>,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub updated_at: String,
    #[serde(deserialize_with = "null_as_default")]
    pub version: String,
}

/// Account or site a package is scoped to.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageScope {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

impl Finder for Package {
    const KIND: &'static str = "package";
    const ENDPOINT: &'static str = "/update/agent/packages";
}

/// Filters for listing packages. Field names are the snake_case form of
/// the API's query keys.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageQuery {
    pub account_ids: Vec<String>,
    pub file_extension: Option<String>,
    pub ids: Vec<String>,
    pub minor_version: Option<String>,
    pub os_arches: Vec<String>,
    pub os_types: Vec<String>,
    pub package_types: Vec<String>,
    pub platform_types: Vec<String>,
    pub query: Option<String>,
    pub ranger_version: Option<String>,
    pub sha1: Option<String>,
    pub site_ids: Vec<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub status: Vec<String>,
    pub version: Option<String>,
}

impl QueryParams for PackageQuery {
    fn to_query(&self) -> QueryMap {
        QueryBuilder::new()
            .list("accountIds", &self.account_ids)
            .string("fileExtension", &self.file_extension)
            .list("ids", &self.ids)
            .string("minorVersion", &self.minor_version)
            .list("osArches", &self.os_arches)
            .list("osTypes", &self.os_types)
            .list("packageTypes", &self.package_types)
            .list("platformTypes", &self.platform_types)
            .string("query", &self.query)
            .string("rangerVersion", &self.ranger_version)
            .string("sha1", &self.sha1)
            .list("siteIds", &self.site_ids)
            .string("sortBy", &self.sort_by)
            .string("sortOrder", &self.sort_order)
            .list("status", &self.status)
            .string("version", &self.version)
            .build()
    }
}

impl Validate for PackageQuery {
    fn validate(&self, path: &str, diags: &mut Diagnostics) {
        validation::one_of(diags, path, "file_extension", &self.file_extension, FILE_EXTENSIONS);
        validation::all_of(diags, path, "os_arches", &self.os_arches, OS_ARCHES);
        validation::all_of(diags, path, "os_types", &self.os_types, OS_TYPES);
        validation::all_of(diags, path, "package_types", &self.package_types, PACKAGE_TYPES);
        validation::all_of(diags, path, "platform_types", &self.platform_types, OS_TYPES);
        validation::one_of(diags, path, "sort_by", &self.sort_by, SORT_FIELDS);
        validation::one_of(diags, path, "sort_order", &self.sort_order, validation::SORT_ORDERS);
        validation::all_of(diags, path, "status", &self.status, STATUSES);
    }
}

impl ApiClient {
    /// List every package matching `query`.
    pub async fn find_packages(&self, query: &PackageQuery) -> Result<Vec<Package>> {
        self.find(query.to_query()).await
    }

    /// Fetch exactly one package by id.
    pub async fn get_package(&self, id: &str) -> Result<Package> {
        self.get_one(id).await
    }
}
