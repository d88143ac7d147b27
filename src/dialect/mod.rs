//! Backend dialects. Each known backend flavour is one variant of
//! [`Dialect`]; adding a backend means adding a variant.

pub mod elastic;
pub mod opensearch;

use std::str::FromStr;

use serde_json::Value;

use crate::catalog::StacCollection;
use crate::error::{Result, SearchError};
use crate::pagination::Pager;
use crate::request::{Paging, SearchRequest};

pub use elastic::{ElasticDialect, ElasticQuery, IndexSelector, PagingMode, SearchPage};
pub use opensearch::{OpensearchDialect, OpensearchParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Opensearch,
    Elasticsearch,
}

impl FromStr for BackendKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "opensearch" => Ok(BackendKind::Opensearch),
            "elasticsearch" => Ok(BackendKind::Elasticsearch),
            other => Err(SearchError::invalid(format!("unknown backend: {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialect {
    Opensearch(OpensearchDialect),
    Elasticsearch(ElasticDialect),
}

/// Backend-native form of a search.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeQuery {
    /// Flat URL query parameters for a granule feed.
    Params(OpensearchParams),
    /// Index selector plus structured query body.
    Elastic(ElasticQuery),
}

impl Dialect {
    /// Look a dialect up by backend kind and name. `paging` only matters for
    /// structured backends; feed backends always page by number.
    pub fn from_name(kind: BackendKind, name: &str, paging: PagingMode) -> Result<Self> {
        match kind {
            BackendKind::Opensearch => OpensearchDialect::from_name(name).map(Dialect::Opensearch),
            BackendKind::Elasticsearch => {
                ElasticDialect::from_name(name, paging).map(Dialect::Elasticsearch)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Opensearch(d) => d.name(),
            Dialect::Elasticsearch(d) => d.name,
        }
    }

    /// The paging context this dialect reads from a request.
    pub fn paging(&self, request: &SearchRequest) -> Paging {
        match self {
            Dialect::Elasticsearch(d) if d.paging == PagingMode::Cursor => {
                Paging::Cursor(request.token.clone())
            }
            _ => Paging::Page(request.page),
        }
    }

    pub fn translate_search(
        &self,
        request: &SearchRequest,
        paging: &Paging,
    ) -> Result<NativeQuery> {
        match self {
            Dialect::Opensearch(d) => match paging {
                Paging::Page(page) => d.translate(request, *page).map(NativeQuery::Params),
                Paging::Cursor(_) => Err(SearchError::invalid(
                    "opensearch feeds page by page number, not token",
                )),
            },
            Dialect::Elasticsearch(d) => d.translate(request, paging).map(NativeQuery::Elastic),
        }
    }

    /// Collections from the backend's raw collection listing.
    pub fn list_collections(&self, raw: &Value) -> Result<Vec<StacCollection>> {
        match self {
            Dialect::Opensearch(d) => d.read_collections(raw),
            Dialect::Elasticsearch(d) => d.read_collections(raw),
        }
    }

    pub fn get_collection(&self, raw: &Value, id: &str) -> Result<StacCollection> {
        self.list_collections(raw)?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| SearchError::NotFound(format!("could not find collection {:?}", id)))
    }

    pub fn read_search_page(&self, raw: &Value, request: &SearchRequest) -> Result<SearchPage> {
        match self {
            Dialect::Opensearch(d) => {
                let (total, items) = d.read_page(raw, request)?;
                Ok(SearchPage {
                    items,
                    total: Some(total),
                    next_token: None,
                })
            }
            Dialect::Elasticsearch(d) => d.read_page(raw, request.limit),
        }
    }

    /// Paging state for link generation after a page came back.
    pub fn pager(&self, request: &SearchRequest, page: &SearchPage) -> Pager {
        match self.paging(request) {
            Paging::Page(current) => Pager::Pages {
                page: current,
                n_results: page.total.unwrap_or(0),
                limit: request.limit.unwrap_or(0),
            },
            Paging::Cursor(_) => Pager::Cursor {
                next: page.next_token.clone(),
            },
        }
    }
}
