//! Query-string construction.
//!
//! Unset filters are omitted entirely. A list filter becomes a single
//! comma-joined key; an explicit `false` is sent as `false`.

use std::collections::BTreeMap;

/// Serialized query parameters, ordered by key.
pub type QueryMap = BTreeMap<String, String>;

/// Key carrying the pagination cursor.
pub const CURSOR_KEY: &str = "cursor";

/// Filters that know how to render themselves as query parameters.
pub trait QueryParams {
    /// Render the set fields.
    fn to_query(&self) -> QueryMap;
}

/// Builder that skips unset values.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    params: QueryMap,
}

impl QueryBuilder {
    /// Start an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string filter.
    pub fn string(mut self, key: &str, value: &Option<String>) -> Self {
        if let Some(value) = value {
            self.params.insert(key.to_string(), value.clone());
        }
        self
    }

    /// Add a list filter as a comma-joined value. Empty lists are omitted.
    pub fn list(mut self, key: &str, values: &[String]) -> Self {
        if !values.is_empty() {
            self.params.insert(key.to_string(), values.join(","));
        }
        self
    }

    /// Add a boolean filter.
    pub fn flag(mut self, key: &str, value: Option<bool>) -> Self {
        if let Some(value) = value {
            self.params.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// Add an integer filter.
    pub fn int(mut self, key: &str, value: Option<i64>) -> Self {
        if let Some(value) = value {
            self.params.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// Finish the query.
    pub fn build(self) -> QueryMap {
        self.params
    }
}
