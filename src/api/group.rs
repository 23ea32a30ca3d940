//! Endpoint groups.

use serde::{Deserialize, Serialize};

use super::client::ApiClient;
use super::envelope::null_as_default;
use super::pager::Finder;
use super::query::{QueryBuilder, QueryMap, QueryParams};
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::validation::{self, Validate};

/// Accepted `types` filter values.
pub const GROUP_TYPES: &[&str] = &["dynamic", "pinned", "static"];
/// Accepted `sort_by` filter values.
pub const SORT_FIELDS: &[&str] = &[
    "createdAt", "description", "id", "inherits", "name", "rank", "type", "updatedAt",
];

/// A group of endpoints within a site.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all(deserialize = "camelCase"))]
pub struct Group {
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
    pub creator: Option<String>,
    pub creator_id: Option<String>,
    pub description: Option<String>,
    pub filter_id: Option<String>,
    pub filter_name: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub inherits: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub is_default: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    pub rank: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub registration_token: String,
    #[serde(deserialize_with = "null_as_default")]
    pub site_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total_agents: i64,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub group_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub updated_at: String,
}

impl Finder for Group {
    const KIND: &'static str = "group";
    const ENDPOINT: &'static str = "/groups";
}

/// Filters for listing groups.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupQuery {
    pub account_ids: Vec<String>,
    pub description: Option<String>,
    pub group_ids: Vec<String>,
    pub is_default: Option<bool>,
    pub name: Option<String>,
    pub query: Option<String>,
    pub rank: Option<i64>,
    pub registration_token: Option<String>,
    pub site_ids: Vec<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub types: Vec<String>,
    /// Updated strictly after this timestamp.
    pub updated_after: Option<String>,
    /// Updated at or after this timestamp.
    pub updated_at_or_after: Option<String>,
    /// Updated at or before this timestamp.
    pub updated_at_or_before: Option<String>,
    /// Updated strictly before this timestamp.
    pub updated_before: Option<String>,
}

impl QueryParams for GroupQuery {
    fn to_query(&self) -> QueryMap {
        QueryBuilder::new()
            .list("accountIds", &self.account_ids)
            .string("description", &self.description)
            .list("ids", &self.group_ids)
            .flag("isDefault", self.is_default)
            .string("name", &self.name)
            .string("query", &self.query)
            .int("rank", self.rank)
            .string("registrationToken", &self.registration_token)
            .list("siteIds", &self.site_ids)
            .string("sortBy", &self.sort_by)
            .string("sortOrder", &self.sort_order)
            .list("types", &self.types)
            .string("updatedAt__gt", &self.updated_after)
            .string("updatedAt__gte", &self.updated_at_or_after)
            .string("updatedAt__lte", &self.updated_at_or_before)
            .string("updatedAt__lt", &self.updated_before)
            .build()
    }
}

impl Validate for GroupQuery {
    fn validate(&self, path: &str, diags: &mut Diagnostics) {
        validation::one_of(diags, path, "sort_by", &self.sort_by, SORT_FIELDS);
        validation::one_of(diags, path, "sort_order", &self.sort_order, validation::SORT_ORDERS);
        validation::all_of(diags, path, "types", &self.types, GROUP_TYPES);
    }
}

impl ApiClient {
    /// List every group matching `query`.
    pub async fn find_groups(&self, query: &GroupQuery) -> Result<Vec<Group>> {
        self.find(query.to_query()).await
    }

    /// Fetch exactly one group by id.
    pub async fn get_group(&self, id: &str) -> Result<Group> {
        self.get_one(id).await
    }
}
