//! Cursor pagination and id lookups.

use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use tracing::{debug, instrument};

use super::client::ApiClient;
use super::query::{QueryMap, CURSOR_KEY};
use crate::error::{ProviderError, Result};

/// An entity type that can be listed from a paged endpoint.
pub trait Finder: DeserializeOwned + Send {
    /// Human-readable kind used in error messages.
    const KIND: &'static str;
    /// Listing endpoint.
    const ENDPOINT: &'static str;
    /// Query key used to look an entity up by id.
    const ID_KEY: &'static str = "ids";

    /// Decode one page's `data` payload.
    fn decode_page(data: &RawValue) -> serde_json::Result<Vec<Self>> {
        serde_json::from_str(data.get())
    }
}

/// Fetch every page of `endpoint`, following cursors until none is returned.
///
/// `decode_page` is applied to each page's payload; its items are
/// concatenated in page order. Any failure aborts the whole drain.
#[instrument(skip(client, query, decode_page))]
pub async fn drain<T, F>(
    client: &ApiClient,
    endpoint: &str,
    mut query: QueryMap,
    mut decode_page: F,
) -> Result<Vec<T>>
where
    F: FnMut(&RawValue) -> serde_json::Result<Vec<T>>,
{
    let mut items = Vec::new();
    let mut pages: u32 = 0;

    loop {
        let envelope = client.get(endpoint, &query).await?;
        pages += 1;

        let cursor = envelope.next_cursor().map(str::to_string);
        let raw = match envelope.data {
            Some(raw) => raw,
            None => RawValue::from_string("null".to_string())?,
        };
        let page = decode_page(&*raw)
            .map_err(|e| ProviderError::decode(format!("page {pages} of {endpoint}"), e))?;
        debug!(page = pages, count = page.len(), "decoded page");
        items.extend(page);

        let Some(cursor) = cursor else {
            break;
        };
        if let Some(max_pages) = client.options().max_pages {
            if pages >= max_pages {
                return Err(ProviderError::PaginationLimit {
                    endpoint: endpoint.to_string(),
                    max_pages,
                });
            }
        }
        query.insert(CURSOR_KEY.to_string(), cursor);
    }

    debug!(pages, total = items.len(), "drained endpoint");
    Ok(items)
}

impl ApiClient {
    /// List every `E` matching `query`.
    pub async fn find<E: Finder>(&self, query: QueryMap) -> Result<Vec<E>> {
        drain(self, E::ENDPOINT, query, E::decode_page).await
    }

    /// Fetch the single `E` with the given id.
    ///
    /// Zero matches is [`ProviderError::NotFound`]; more than one is
    /// [`ProviderError::Ambiguous`].
    pub async fn get_one<E: Finder>(&self, id: &str) -> Result<E> {
        let mut query = QueryMap::new();
        query.insert(E::ID_KEY.to_string(), id.to_string());

        let mut found = self.find::<E>(query).await?;
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(ProviderError::NotFound(format!(
                "no {kind} was found with id {id}; check that the {kind} id is valid",
                kind = E::KIND
            ))),
            count => Err(ProviderError::Ambiguous {
                kind: E::KIND,
                count,
            }),
        }
    }
}
