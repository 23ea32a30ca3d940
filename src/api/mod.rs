//! Client for the Singularity management REST API.
//!
//! Every call goes through [`ApiClient`], which owns a [`Transport`] and
//! classifies responses. List endpoints are drained page by page through
//! [`drain`]; [`Finder`] ties an entity type to its endpoint and page shape.

pub mod client;
pub mod envelope;
pub mod group;
pub mod package;
pub mod pager;
pub mod query;
pub mod site;
pub mod transport;

pub use client::{ApiClient, ClientOptions, DownloadStream, API_BASE_URI, USER_AGENT};
pub use envelope::{ApiErrorDetail, Envelope, Pagination};
pub use group::{Group, GroupQuery};
pub use package::{Package, PackageQuery};
pub use pager::{drain, Finder};
pub use query::{QueryBuilder, QueryMap, QueryParams};
pub use site::{Site, SiteQuery};
pub use transport::{ApiRequest, Method, ReqwestTransport, Transport, TransportError, TransportResponse};
