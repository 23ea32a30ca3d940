//! Sites.
//!
//! Unlike other listings, a sites page is an object holding license totals
//! and the site array, so [`Site`] overrides the page decoder.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use super::client::ApiClient;
use super::envelope::null_as_default;
use super::pager::Finder;
use super::query::{QueryBuilder, QueryMap, QueryParams};
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::validation::{self, Validate};

/// A site within an account.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all(deserialize = "camelCase"))]
pub struct Site {
    #[serde(deserialize_with = "null_as_default")]
    pub account_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub account_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub active_licenses: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
    pub creator: Option<String>,
    pub creator_id: Option<String>,
    pub description: Option<String>,
    pub expiration: Option<String>,
    pub external_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub is_default: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub licenses: SiteLicenses,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub registration_token: String,
    #[serde(deserialize_with = "null_as_default")]
    pub site_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total_licenses: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub unlimited_expiration: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub unlimited_licenses: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub updated_at: String,
}

/// Licenses attached to a site.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteLicenses {
    #[serde(deserialize_with = "null_as_default")]
    pub bundles: Vec<LicenseBundle>,
    #[serde(deserialize_with = "null_as_default")]
    pub modules: Vec<LicenseModule>,
    #[serde(deserialize_with = "null_as_default")]
    pub settings: Vec<LicenseSetting>,
}

/// A licensed product bundle.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all(deserialize = "camelCase"))]
pub struct LicenseBundle {
    #[serde(deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub major_version: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub minor_version: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub surfaces: Vec<LicenseSurface>,
    #[serde(deserialize_with = "null_as_default")]
    pub total_surfaces: i64,
}

/// Seat count for one surface of a bundle.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseSurface {
    #[serde(deserialize_with = "null_as_default")]
    pub count: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

/// A licensed add-on module.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all(deserialize = "camelCase"))]
pub struct LicenseModule {
    #[serde(deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub major_version: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

/// A license setting.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all(deserialize = "camelCase"))]
pub struct LicenseSetting {
    #[serde(deserialize_with = "null_as_default")]
    pub group_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub setting: String,
    #[serde(deserialize_with = "null_as_default")]
    pub setting_group_display_name: String,
}

/// One page of the sites listing. The license totals beside the array are
/// not needed.
#[derive(Debug, Deserialize)]
struct SitesPage {
    sites: Vec<Site>,
}

impl Finder for Site {
    const KIND: &'static str = "site";
    const ENDPOINT: &'static str = "/sites";
    const ID_KEY: &'static str = "siteIds";

    fn decode_page(data: &RawValue) -> serde_json::Result<Vec<Self>> {
        let page: SitesPage = serde_json::from_str(data.get())?;
        Ok(page.sites)
    }
}

/// Filters for listing sites. Field names are the snake_case form of the
/// API's query keys, with `__contains` written as `_contains`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteQuery {
    pub account_ids: Vec<String>,
    pub account_name_contains: Vec<String>,
    pub active_licenses: Option<i64>,
    pub admin_only: Option<bool>,
    pub available_move_sites: Option<bool>,
    pub created_at: Option<String>,
    pub description: Option<String>,
    pub description_contains: Vec<String>,
    pub expiration: Option<String>,
    pub external_id: Option<String>,
    pub features: Vec<String>,
    pub is_default: Option<bool>,
    pub modules: Vec<String>,
    pub name: Option<String>,
    pub name_contains: Vec<String>,
    pub query: Option<String>,
    pub registration_token: Option<String>,
    pub site_ids: Vec<String>,
    pub site_type: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub states: Vec<String>,
    pub total_licenses: Option<i64>,
    pub updated_at: Option<String>,
}

impl QueryParams for SiteQuery {
    fn to_query(&self) -> QueryMap {
        QueryBuilder::new()
            .list("accountIds", &self.account_ids)
            .list("accountName__contains", &self.account_name_contains)
            .int("activeLicenses", self.active_licenses)
            .flag("adminOnly", self.admin_only)
            .flag("availableMoveSites", self.available_move_sites)
            .string("createdAt", &self.created_at)
            .string("description", &self.description)
            .list("description__contains", &self.description_contains)
            .string("expiration", &self.expiration)
            .string("externalId", &self.external_id)
            .list("features", &self.features)
            .flag("isDefault", self.is_default)
            .list("modules", &self.modules)
            .string("name", &self.name)
            .list("name__contains", &self.name_contains)
            .string("query", &self.query)
            .string("registrationToken", &self.registration_token)
            .list("siteIds", &self.site_ids)
            .string("siteType", &self.site_type)
            .string("sortBy", &self.sort_by)
            .string("sortOrder", &self.sort_order)
            .list("states", &self.states)
            .int("totalLicenses", self.total_licenses)
            .string("updatedAt", &self.updated_at)
            .build()
    }
}

impl Validate for SiteQuery {
    fn validate(&self, path: &str, diags: &mut Diagnostics) {
        validation::one_of(diags, path, "sort_order", &self.sort_order, validation::SORT_ORDERS);
    }
}

impl ApiClient {
    /// List every site matching `query`.
    pub async fn find_sites(&self, query: &SiteQuery) -> Result<Vec<Site>> {
        self.find(query.to_query()).await
    }

    /// Fetch exactly one site by id.
    pub async fn get_site(&self, id: &str) -> Result<Site> {
        self.get_one(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn site_json(id: &str) -> serde_json::Value {
        json!({
            "accountId": "acc-1",
            "accountName": "Acme",
            "activeLicenses": 12,
            "createdAt": "2023-01-01T00:00:00Z",
            "creator": "admin",
            "creatorId": "u-1",
            "description": null,
            "expiration": null,
            "externalId": null,
            "id": id,
            "isDefault": false,
            "licenses": {
                "bundles": [{
                    "displayName": "Complete",
                    "majorVersion": 1,
                    "minorVersion": 0,
                    "name": "complete",
                    "surfaces": [{"count": 100, "name": "Total Agents"}],
                    "totalSurfaces": 100
                }],
                "modules": [{"displayName": "STAR", "majorVersion": 1, "name": "star"}],
                "settings": [{
                    "groupName": "dv",
                    "setting": "14 Days",
                    "settingGroupDisplayName": "Deep Visibility"
                }]
            },
            "name": "Production",
            "registrationToken": "tok",
            "siteType": "Paid",
            "state": "active",
            "totalLicenses": 100,
            "unlimitedExpiration": true,
            "unlimitedLicenses": false,
            "updatedAt": "2023-01-02T00:00:00Z"
        })
    }

    fn sites_page(ids: &[&str]) -> serde_json::Value {
        json!({
            "allSites": {"activeLicenses": 12, "totalLicenses": 100},
            "sites": ids.iter().map(|id| site_json(id)).collect::<Vec<_>>()
        })
    }

    #[test]
    fn test_decode_object_shaped_page() {
        let raw = RawValue::from_string(sites_page(&["s-1", "s-2"]).to_string()).unwrap();
        let sites = Site::decode_page(&raw).unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].licenses.bundles[0].surfaces[0].count, 100);
        assert_eq!(sites[1].id, "s-2");
    }

    #[test]
    fn test_null_fields_decode_as_empty() {
        let mut site = site_json("s-1");
        site["siteType"] = json!(null);
        site["activeLicenses"] = json!(null);
        site["licenses"] = json!(null);
        let page = json!({"allSites": {}, "sites": [site]});
        let raw = RawValue::from_string(page.to_string()).unwrap();

        let sites = Site::decode_page(&raw).unwrap();
        assert_eq!(sites[0].site_type, "");
        assert_eq!(sites[0].active_licenses, 0);
        assert!(sites[0].licenses.bundles.is_empty());
    }

    #[test]
    fn test_array_page_is_rejected() {
        let raw = RawValue::from_string("[]".to_string()).unwrap();
        assert!(Site::decode_page(&raw).is_err());
    }

    #[test]
    fn test_query_keys() {
        let query = SiteQuery {
            name_contains: vec!["prod".into(), "stage".into()],
            admin_only: Some(false),
            total_licenses: Some(100),
            ..Default::default()
        }
        .to_query();
        assert_eq!(query.len(), 3);
        assert_eq!(query["name__contains"], "prod,stage");
        assert_eq!(query["adminOnly"], "false");
        assert_eq!(query["totalLicenses"], "100");
    }

    #[tokio::test]
    async fn test_get_site_uses_site_ids_key() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(sites_page(&["s-1"]), None);
        let client = transport.client();

        let site = client.get_site("s-1").await.unwrap();
        assert_eq!(site.name, "Production");
        assert!(site.unlimited_expiration);

        let request = &transport.requests()[0];
        assert!(request.url.ends_with("/web/api/v2.1/sites"));
        assert_eq!(request.query["siteIds"], "s-1");
    }

    #[tokio::test]
    async fn test_find_sites_concatenates_pages() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(sites_page(&["s-1", "s-2"]), Some("c1"));
        transport.push_page(sites_page(&["s-3"]), None);
        let client = transport.client();

        let sites = client.find_sites(&SiteQuery::default()).await.unwrap();
        let ids: Vec<_> = sites.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s-1", "s-2", "s-3"]);
    }
}
