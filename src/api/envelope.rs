//! The response envelope shared by every endpoint.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

/// A single structured error reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiErrorDetail {
    /// API-specific error code.
    pub code: i64,
    /// Short summary.
    pub title: String,
    /// Longer explanation.
    pub detail: String,
}

/// Paging metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pagination {
    /// Total number of items matching the query.
    pub total_items: u64,
    /// Cursor for the next page; absent, `null` and `""` all mean "no more pages".
    pub next_cursor: Option<String>,
}

/// Generic response body: pagination, raw data and errors.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    /// Paging metadata.
    #[serde(default, deserialize_with = "null_as_default")]
    pub pagination: Pagination,
    /// Undecoded payload; each finder applies its own shape.
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
    /// Structured errors, if any.
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<ApiErrorDetail>,
}

impl Envelope {
    /// Parse a response body in one pass. Malformed input is an error, never
    /// an empty envelope.
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// The cursor to request next, or `None` when draining is complete.
    pub fn next_cursor(&self) -> Option<&str> {
        self.pagination
            .next_cursor
            .as_deref()
            .filter(|cursor| !cursor.is_empty())
    }

    /// The raw payload text; `null` when the server sent none.
    pub fn data_json(&self) -> &str {
        self.data.as_deref().map(RawValue::get).unwrap_or("null")
    }
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
