//! Search translation and pagination for STAC APIs in front of OpenSearch
//! granule feeds and Elasticsearch catalogs.
//!
//! A [`request::SearchRequest`] goes through a [`dialect::Dialect`], which
//! builds temporal and spatial filters, produces the backend-native query and
//! reads the backend answer back into a [`dialect::SearchPage`]. The page's
//! paging state then yields the navigation links in [`pagination`].

pub mod backend;
pub mod catalog;
pub mod config;
pub mod cursor;
pub mod dialect;
pub mod error;
pub mod pagination;
pub mod query;
pub mod request;
pub mod spatial;
pub mod temporal;

pub use error::{Result, SearchError};
