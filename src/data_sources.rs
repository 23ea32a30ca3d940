//! Read-only data sources.
//!
//! Plural sources take an optional `filter` object and return it alongside
//! every matching entity. Singular sources take an `id` and return exactly
//! one entity, failing when the id matches nothing or more than one entity.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::api::{ApiClient, Finder, Group, GroupQuery, Package, PackageQuery, QueryParams, Site, SiteQuery};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{ProviderError, Result};
use crate::validation::{self, Validate};

/// Packages matching a filter.
pub const PACKAGES: &str = "singularity_packages";
/// One package by id.
pub const PACKAGE: &str = "singularity_package";
/// Sites matching a filter.
pub const SITES: &str = "singularity_sites";
/// One site by id.
pub const SITE: &str = "singularity_site";
/// Groups matching a filter.
pub const GROUPS: &str = "singularity_groups";
/// One group by id.
pub const GROUP: &str = "singularity_group";

/// Every data source type name.
pub fn names() -> Vec<&'static str> {
    vec![PACKAGES, PACKAGE, SITES, SITE, GROUPS, GROUP]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterConfig<Q> {
    #[serde(default)]
    filter: Option<Q>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IdConfig {
    id: String,
}

impl Validate for IdConfig {
    fn validate(&self, path: &str, diags: &mut Diagnostics) {
        validation::not_empty(diags, path, "id", &self.id);
    }
}

fn parse<T: DeserializeOwned>(type_name: &str, config: Value) -> Result<T> {
    serde_json::from_value(config)
        .map_err(|e| ProviderError::Validation(format!("invalid {type_name} configuration: {e}")))
}

fn filter_diagnostics<Q>(type_name: &str, config: Value) -> Result<Diagnostics>
where
    Q: DeserializeOwned + Default + Validate,
{
    let config: FilterConfig<Q> = parse(type_name, config)?;
    let mut diags = Diagnostics::new();
    if let Some(filter) = &config.filter {
        filter.validate("filter", &mut diags);
    }
    Ok(diags)
}

fn id_diagnostics(type_name: &str, config: Value) -> Result<Diagnostics> {
    let config: IdConfig = parse(type_name, config)?;
    Ok(config.validation_diagnostics())
}

/// Check a data source configuration without calling the API.
///
/// Every invalid attribute is reported. A configuration that does not parse
/// at all yields a single diagnostic.
pub fn validate(data_source_type: &str, config: Value) -> Result<Vec<Diagnostic>> {
    let result = match data_source_type {
        PACKAGES => filter_diagnostics::<PackageQuery>(data_source_type, config),
        SITES => filter_diagnostics::<SiteQuery>(data_source_type, config),
        GROUPS => filter_diagnostics::<GroupQuery>(data_source_type, config),
        PACKAGE | SITE | GROUP => id_diagnostics(data_source_type, config),
        other => return Err(unknown(other)),
    };
    match result {
        Ok(diags) => Ok(diags.into_vec()),
        Err(e) => Ok(e.diagnostics()),
    }
}

fn unknown(data_source_type: &str) -> ProviderError {
    ProviderError::UnknownResource(format!("Unknown data source type: {data_source_type}"))
}

fn reject_invalid(type_name: &str, diags: Diagnostics) -> Result<()> {
    if !diags.has_errors() {
        return Ok(());
    }
    let details: Vec<String> = diags
        .into_vec()
        .into_iter()
        .filter(Diagnostic::is_error)
        .map(|d| match (d.attribute, d.detail) {
            (Some(attr), Some(detail)) => format!("{attr}: {detail}"),
            (_, detail) => detail.unwrap_or(d.summary),
        })
        .collect();
    Err(ProviderError::Validation(format!(
        "invalid {type_name} configuration: {}",
        details.join("; ")
    )))
}

/// Read a data source.
#[instrument(skip(client, config))]
pub async fn read(client: &ApiClient, data_source_type: &str, config: Value) -> Result<Value> {
    match data_source_type {
        PACKAGES => read_list::<PackageQuery, Package>(client, PACKAGES, "packages", config).await,
        SITES => read_list::<SiteQuery, Site>(client, SITES, "sites", config).await,
        GROUPS => read_list::<GroupQuery, Group>(client, GROUPS, "groups", config).await,
        PACKAGE => read_one::<Package>(client, PACKAGE, config).await,
        SITE => read_one::<Site>(client, SITE, config).await,
        GROUP => read_one::<Group>(client, GROUP, config).await,
        other => Err(unknown(other)),
    }
}

async fn read_list<Q, E>(
    client: &ApiClient,
    type_name: &str,
    list_key: &str,
    config: Value,
) -> Result<Value>
where
    Q: DeserializeOwned + Default + QueryParams + Validate,
    E: Finder + Serialize,
{
    let filter = config.get("filter").cloned().unwrap_or(Value::Null);
    let config: FilterConfig<Q> = parse(type_name, config)?;
    let query = config.filter.unwrap_or_default();

    let mut diags = Diagnostics::new();
    query.validate("filter", &mut diags);
    reject_invalid(type_name, diags)?;

    let entities = client.find::<E>(query.to_query()).await?;
    info!(kind = E::KIND, count = entities.len(), "data source read");

    let mut out = serde_json::Map::new();
    out.insert("filter".to_string(), filter);
    out.insert(list_key.to_string(), serde_json::to_value(entities)?);
    Ok(Value::Object(out))
}

async fn read_one<E>(client: &ApiClient, type_name: &str, config: Value) -> Result<Value>
where
    E: Finder + Serialize,
{
    let config: IdConfig = parse(type_name, config)?;
    reject_invalid(type_name, config.validation_diagnostics())?;

    let entity = client.get_one::<E>(&config.id).await?;
    Ok(serde_json::to_value(entity)?)
}
