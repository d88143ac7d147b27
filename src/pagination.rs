//! Navigation links (prev/self/next) for page-number and cursor result sets,
//! for both GET (query string) and POST (merge body) callers.

use serde::Serialize;
use serde_json::{json, Map, Value};
use url::{form_urlencoded, Url};

const GEOJSON_MEDIA_TYPE: &str = "application/geo+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Relation {
    #[serde(rename = "prev")]
    Prev,
    #[serde(rename = "self")]
    Current,
    #[serde(rename = "next")]
    Next,
}

/// Output order of page links.
const RELATIONS: [Relation; 3] = [Relation::Prev, Relation::Current, Relation::Next];

impl Relation {
    fn target_page(self, page: u32) -> Option<u32> {
        match self {
            Relation::Prev => page.checked_sub(1),
            Relation::Current => Some(page),
            Relation::Next => page.checked_add(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub rel: Relation,
    pub href: String,
    #[serde(rename = "type")]
    pub media_type: &'static str,
    pub method: LinkMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Map<String, Value>>,
    /// The body is to be shallow-merged into the original POST body.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub merge: bool,
}

impl Link {
    fn get(rel: Relation, href: &Url) -> Self {
        Link {
            rel,
            href: href.to_string(),
            media_type: GEOJSON_MEDIA_TYPE,
            method: LinkMethod::Get,
            body: None,
            merge: false,
        }
    }

    fn post(rel: Relation, href: &Url, body: Value) -> Self {
        Link {
            rel,
            href: href.to_string(),
            media_type: GEOJSON_MEDIA_TYPE,
            method: LinkMethod::Post,
            body: match body {
                Value::Object(map) => Some(map),
                _ => None,
            },
            merge: true,
        }
    }
}

/// How the search was called.
#[derive(Debug, Clone)]
pub enum RequestShape {
    /// Full original URL, query string included.
    Get(Url),
    /// Endpoint URL; any query string is dropped from the links.
    Post(Url),
}

/// Paging state of one result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pager {
    Pages {
        page: u32,
        n_results: u64,
        limit: usize,
    },
    Cursor {
        next: Option<String>,
    },
}

impl Pager {
    pub fn links(&self, shape: &RequestShape) -> Vec<Link> {
        match (self, shape) {
            (Pager::Pages { page, n_results, limit }, RequestShape::Get(url)) => {
                page_links_get(url, *page, *n_results, *limit)
            }
            (Pager::Pages { page, n_results, limit }, RequestShape::Post(url)) => {
                page_links_post(url, *page, *n_results, *limit)
            }
            (Pager::Cursor { next }, RequestShape::Get(url)) => {
                cursor_links_get(url, next.as_deref())
            }
            (Pager::Cursor { next }, RequestShape::Post(url)) => {
                cursor_links_post(url, next.as_deref())
            }
        }
    }
}

/// `ceil(n_results / limit)`; a zero limit means one page holding everything.
pub fn total_pages(n_results: u64, limit: usize) -> u64 {
    if limit == 0 {
        return 1;
    }
    n_results.div_ceil(limit as u64)
}

fn in_range(page: u32, total_pages: u64) -> bool {
    page >= 1 && u64::from(page) <= total_pages
}

fn page_candidates(
    page: u32,
    n_results: u64,
    limit: usize,
) -> impl Iterator<Item = (Relation, u32)> {
    let total = total_pages(n_results, limit);
    RELATIONS.into_iter().filter_map(move |rel| {
        rel.target_page(page)
            .filter(|candidate| in_range(*candidate, total))
            .map(|candidate| (rel, candidate))
    })
}

pub fn page_links_get(url: &Url, page: u32, n_results: u64, limit: usize) -> Vec<Link> {
    page_candidates(page, n_results, limit)
        .map(|(rel, target)| Link::get(rel, &with_query_param(url, "page", &target.to_string())))
        .collect()
}

pub fn page_links_post(url: &Url, page: u32, n_results: u64, limit: usize) -> Vec<Link> {
    let endpoint = post_url(url);
    page_candidates(page, n_results, limit)
        .map(|(rel, target)| {
            Link::post(rel, &endpoint, json!({ "page": target, "limit": limit }))
        })
        .collect()
}

/// Cursors only move forward: at most one `next` link.
pub fn cursor_links_get(url: &Url, token: Option<&str>) -> Vec<Link> {
    match token {
        Some(token) => vec![Link::get(Relation::Next, &with_query_param(url, "token", token))],
        None => Vec::new(),
    }
}

pub fn cursor_links_post(url: &Url, token: Option<&str>) -> Vec<Link> {
    match token {
        Some(token) => vec![Link::post(
            Relation::Next,
            &post_url(url),
            json!({ "token": token }),
        )],
        None => Vec::new(),
    }
}

/// Scheme, host and path only.
pub fn post_url(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Replace (or append) `key` in the query string. Every other segment,
/// repeated keys included, is kept byte for byte.
pub fn with_query_param(url: &Url, key: &str, value: &str) -> Url {
    let encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
    let replacement = format!("{}={}", key, encoded);

    let mut replaced = false;
    let mut segments = Vec::new();
    for segment in url.query().unwrap_or("").split('&') {
        if segment.is_empty() {
            continue;
        }
        let segment_key = segment.split_once('=').map_or(segment, |(k, _)| k);
        if segment_key == key {
            if !replaced {
                segments.push(replacement.clone());
                replaced = true;
            }
        } else {
            segments.push(segment.to_string());
        }
    }
    if !replaced {
        segments.push(replacement);
    }

    let mut url = url.clone();
    url.set_query(Some(&segments.join("&")));
    url
}
