//! Page-number dialects for OpenSearch granule feeds.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::catalog::{Asset, StacCollection, StacItem};
use crate::error::{Result, SearchError};
use crate::request::SearchRequest;
use crate::temporal::{format_instant, DatetimeInterval};

/// Lower bound sent when the request leaves the start open.
pub const DEFAULT_TIME_START: &str = "1000-01-01T00:00:00Z";
/// Upper bound sent when the request leaves the end open.
pub const DEFAULT_TIME_END: &str = "2200-01-01T23:59:59Z";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpensearchDialect {
    Ifremer,
}

/// Native query parameters of a granule search, usable directly as a URL
/// query string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpensearchParams {
    #[serde(rename = "datasetId")]
    pub dataset_id: String,
    #[serde(rename = "startPage")]
    pub start_page: u32,
    #[serde(rename = "count", skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(rename = "timeStart")]
    pub time_start: String,
    #[serde(rename = "timeEnd")]
    pub time_end: String,
    #[serde(rename = "geoBox", skip_serializing_if = "Option::is_none")]
    pub geo_box: Option<String>,
}

impl OpensearchParams {
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("datasetId", self.dataset_id.clone()),
            ("startPage", self.start_page.to_string()),
        ];
        if let Some(count) = self.count {
            pairs.push(("count", count.to_string()));
        }
        pairs.push(("timeStart", self.time_start.clone()));
        pairs.push(("timeEnd", self.time_end.clone()));
        if let Some(geo_box) = &self.geo_box {
            pairs.push(("geoBox", geo_box.clone()));
        }
        pairs
    }
}

impl OpensearchDialect {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "ifremer" => Ok(OpensearchDialect::Ifremer),
            other => Err(SearchError::invalid(format!(
                "unknown opensearch dialect: {:?}",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpensearchDialect::Ifremer => "ifremer",
        }
    }

    pub fn granules_path(&self) -> &'static str {
        "/granules.json"
    }

    pub fn collections_path(&self) -> &'static str {
        "/collections.json"
    }

    /// Translate a search into granule query parameters. `page` is one-based.
    pub fn translate(&self, request: &SearchRequest, page: u32) -> Result<OpensearchParams> {
        let dataset_id = match request.collections.as_deref() {
            None | Some([]) => {
                return Err(SearchError::invalid("need at least one collection"));
            }
            Some([collection]) => collection.clone(),
            Some(_) => {
                return Err(SearchError::invalid("cannot search more than one collection"));
            }
        };

        if request.intersects.is_some() {
            return Err(SearchError::invalid(
                "opensearch endpoints don't support intersects searches",
            ));
        }

        let geo_box = request.bbox.map(|b| {
            b.to_vec()
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        });

        let (time_start, time_end) = time_bounds(request.datetime.as_deref())?;

        let start_page = page
            .checked_sub(1)
            .ok_or_else(|| SearchError::invalid("page numbers start at 1"))?;

        Ok(OpensearchParams {
            dataset_id,
            start_page,
            count: request.limit,
            time_start,
            time_end,
            geo_box,
        })
    }

    /// Collections from a `collections.json` feed.
    pub fn read_collections(&self, feed: &Value) -> Result<Vec<StacCollection>> {
        let entries = feed_entries(feed)?;
        Ok(entries
            .iter()
            .filter_map(|entry| {
                let id = entry.get("id").and_then(Value::as_str)?;
                let title = entry.get("title").and_then(Value::as_str).map(str::to_string);
                Some(StacCollection::placeholder(id, title))
            })
            .collect())
    }

    /// Total result count and items from a `granules.json` feed. The feed
    /// cannot filter on ids, so that happens here.
    pub fn read_page(&self, feed: &Value, request: &SearchRequest) -> Result<(u64, Vec<StacItem>)> {
        let header = feed
            .get("feed")
            .ok_or_else(|| SearchError::backend("backend server returned invalid feed"))?;

        let total = match header.get("opensearch_totalresults") {
            Some(Value::String(s)) => s.trim().parse::<u64>().map_err(|_| {
                SearchError::backend(format!("invalid opensearch_totalresults: {:?}", s))
            })?,
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| SearchError::backend("invalid opensearch_totalresults"))?,
            _ => 0,
        };

        let mut items: Vec<StacItem> = feed_entries(feed)?
            .iter()
            .filter_map(|entry| match entry_to_item(entry) {
                Some(item) => Some(item),
                None => {
                    warn!("Skipping malformed feed entry: {}", entry);
                    None
                }
            })
            .collect();

        if let Some(ids) = request.id_filter() {
            items.retain(|item| ids.contains(&item.id));
        }

        if let Some(collection) = request.collections.as_ref().and_then(|c| c.first()) {
            for item in &mut items {
                item.collection = Some(collection.clone());
            }
        }

        Ok((total, items))
    }
}

fn time_bounds(datetime: Option<&str>) -> Result<(String, String)> {
    let Some(datetime) = datetime else {
        return Ok((DEFAULT_TIME_START.to_string(), DEFAULT_TIME_END.to_string()));
    };

    // The feed needs both bounds, so open sides take the defaults
    let interval = DatetimeInterval::parse(datetime)?;
    let start = interval
        .start
        .map(|dt| format_instant(&dt))
        .unwrap_or_else(|| DEFAULT_TIME_START.to_string());
    let end = interval
        .end
        .map(|dt| format_instant(&dt))
        .unwrap_or_else(|| DEFAULT_TIME_END.to_string());
    Ok((start, end))
}

fn feed_entries(feed: &Value) -> Result<&[Value]> {
    match feed.get("entries") {
        None | Some(Value::Null) => Ok(&[][..]),
        Some(Value::Array(entries)) => Ok(entries.as_slice()),
        Some(_) => Err(SearchError::backend("feed entries must be a list")),
    }
}

/// Granule ids are urls carrying one or more `uid` parameters.
fn extract_uid(id: &str) -> String {
    let Ok(url) = Url::parse(id) else {
        return id.to_string();
    };

    let uids: Vec<String> = url
        .query_pairs()
        .filter(|(k, _)| k == "uid")
        .map(|(_, v)| v.strip_suffix(".nc").unwrap_or(v.as_ref()).to_string())
        .collect();

    if uids.is_empty() {
        id.to_string()
    } else {
        uids.join("-")
    }
}

fn entry_to_item(entry: &Value) -> Option<StacItem> {
    let id = extract_uid(entry.get("id")?.as_str()?);
    let geometry = entry.get("where").filter(|w| !w.is_null()).cloned();

    let (start, end) = match entry.get("updated").and_then(Value::as_str) {
        Some(updated) => match updated.split_once('/') {
            Some((start, end)) => (Some(start.to_string()), Some(end.to_string())),
            None => (Some(updated.to_string()), Some(updated.to_string())),
        },
        None => (None, None),
    };

    let mut item = StacItem::with_interval(id, geometry, start, end);

    if let Some(links) = entry.get("links").and_then(Value::as_array) {
        for link in links {
            let (Some(rel), Some(href)) = (
                link.get("rel").and_then(Value::as_str),
                link.get("href").and_then(Value::as_str),
            ) else {
                continue;
            };
            item.assets.insert(
                rel.to_string(),
                Asset {
                    href: href.to_string(),
                    type_: link.get("type").and_then(Value::as_str).map(str::to_string),
                    title: link.get("title").and_then(Value::as_str).map(str::to_string),
                    roles: Vec::new(),
                },
            );
        }
    }

    Some(item)
}
