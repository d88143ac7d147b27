//! HTTP client for the catalog backend. Every call translates first and only
//! then issues exactly one request.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::StacCollection;
use crate::dialect::{Dialect, NativeQuery, SearchPage};
use crate::error::{Result, SearchError};
use crate::request::SearchRequest;

/// Basic-auth credentials for the backend.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    /// Parse `user:password` (password optional).
    pub fn parse(s: &str) -> Self {
        match s.split_once(':') {
            Some((user, password)) => Credentials {
                username: user.to_string(),
                password: Some(password.to_string()),
            },
            None => Credentials {
                username: s.to_string(),
                password: None,
            },
        }
    }
}

pub struct Backend {
    http: reqwest::Client,
    base_url: String,
    dialect: Dialect,
    credentials: Option<Credentials>,
}

impl Backend {
    pub fn new(
        base_url: &str,
        dialect: Dialect,
        timeout: Duration,
        credentials: Option<Credentials>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Backend {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            dialect,
            credentials,
        })
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(c) => builder.basic_auth(&c.username, c.password.as_ref()),
            None => builder,
        }
    }

    /// Issue one request. A 400 on a request that resumed from a token means
    /// the token was rejected, which is the client's to fix.
    async fn send(&self, builder: reqwest::RequestBuilder, resumes_token: bool) -> Result<Value> {
        let response = self.authorize(builder).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(SearchError::NotFound(format!(
                "backend resource not found: {}",
                response.url()
            ))),
            StatusCode::BAD_REQUEST => {
                let body = response.json::<Value>().await.unwrap_or(Value::Null);
                let reason = error_reason(&body).unwrap_or("no reason given");
                warn!("Backend rejected query: {}", reason);
                if resumes_token {
                    Err(SearchError::invalid(format!("token rejected by backend: {}", reason)))
                } else {
                    Err(SearchError::backend(format!("backend rejected query: {}", reason)))
                }
            }
            _ => Ok(response.error_for_status()?.json::<Value>().await?),
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        let paging = self.dialect.paging(request);
        let native = self.dialect.translate_search(request, &paging)?;

        let raw = match &native {
            NativeQuery::Params(params) => {
                let Dialect::Opensearch(feed) = &self.dialect else {
                    return Err(SearchError::invalid("query parameters need a feed backend"));
                };
                let url = self.url(feed.granules_path());
                debug!("Querying {} with {:?}", url, params);
                self.send(self.http.get(&url).query(&params.to_pairs()), false)
                    .await?
            }
            NativeQuery::Elastic(query) => {
                let url = self.url(&format!("/{}/_search", query.index.to_path()));
                let body = query.body();
                debug!("Querying {} with {}", url, body);
                let resumes_token = query.search_after.is_some();
                self.send(self.http.post(&url).json(&body), resumes_token)
                    .await?
            }
        };

        let page = self.dialect.read_search_page(&raw, request)?;
        info!(
            "Search returned {} items (total {:?}, more: {})",
            page.items.len(),
            page.total,
            page.next_token.is_some()
        );
        Ok(page)
    }

    async fn raw_collections(&self) -> Result<Value> {
        let url = match &self.dialect {
            Dialect::Opensearch(feed) => self.url(feed.collections_path()),
            Dialect::Elasticsearch(_) => self.url("/_cat/indices?format=json"),
        };
        debug!("Listing collections from {}", url);
        self.send(self.http.get(&url), false).await
    }

    pub async fn collections(&self) -> Result<Vec<StacCollection>> {
        let raw = self.raw_collections().await?;
        self.dialect.list_collections(&raw)
    }

    pub async fn collection(&self, id: &str) -> Result<StacCollection> {
        let raw = self.raw_collections().await?;
        self.dialect.get_collection(&raw, id)
    }
}

/// `error.reason` of an Elasticsearch error body, falling back to the first
/// root cause.
fn error_reason(body: &Value) -> Option<&str> {
    let error = body.get("error")?;
    error
        .get("reason")
        .or_else(|| error.pointer("/root_cause/0/reason"))
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
}
