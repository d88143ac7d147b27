//! Structured-query dialects for Elasticsearch-backed catalogs, paging either
//! by offset (`from`/`size`) or by search-after cursor.

use serde_json::{json, Value};
use tracing::warn;

use crate::catalog::{StacCollection, StacItem};
use crate::cursor;
use crate::error::{Result, SearchError};
use crate::query::{self, Clause};
use crate::request::{Paging, SearchRequest};
use crate::spatial;
use crate::temporal::{self, TemporalFields};

/// Largest `from + size` an index serves by default (`index.max_result_window`).
pub const MAX_RESULT_WINDOW: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    Page,
    Cursor,
}

impl std::str::FromStr for PagingMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "page" => Ok(PagingMode::Page),
            "cursor" => Ok(PagingMode::Cursor),
            other => Err(SearchError::invalid(format!(
                "unknown paging mode {:?}, expected \"page\" or \"cursor\"",
                other
            ))),
        }
    }
}

/// Document layout of one catalog flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElasticDialect {
    pub name: &'static str,
    pub index_prefix: &'static str,
    pub temporal: TemporalFields,
    pub geometry_field: &'static str,
    pub id_field: &'static str,
    pub paging: PagingMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSelector {
    All,
    Named(Vec<String>),
}

impl IndexSelector {
    /// Path segment for `/{index}/_search`.
    pub fn to_path(&self) -> String {
        match self {
            IndexSelector::All => "_all".to_string(),
            IndexSelector::Named(names) => names.join(","),
        }
    }
}

/// A fully assembled search, ready to be posted to `/{index}/_search`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticQuery {
    pub index: IndexSelector,
    pub clauses: Vec<Clause>,
    pub from: Option<usize>,
    pub size: Option<usize>,
    /// Fields of the total sort order, ascending. Empty for offset paging.
    pub sort: Vec<&'static str>,
    pub search_after: Option<Vec<String>>,
}

impl ElasticQuery {
    pub fn body(&self) -> Value {
        let mut body = json!({
            "query": query::compose(&self.clauses),
            "track_total_hits": true,
        });

        if let Some(from) = self.from {
            body["from"] = json!(from);
        }
        if let Some(size) = self.size {
            body["size"] = json!(size);
        }
        if !self.sort.is_empty() {
            let sort: Vec<Value> = self.sort.iter().map(|f| json!({ *f: "asc" })).collect();
            body["sort"] = Value::Array(sort);
        }
        if let Some(after) = &self.search_after {
            body["search_after"] = json!(after);
        }
        body
    }
}

/// One page read back from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub items: Vec<StacItem>,
    pub total: Option<u64>,
    pub next_token: Option<String>,
}

impl ElasticDialect {
    pub fn ifremer(paging: PagingMode) -> Self {
        ElasticDialect {
            name: "ifremer",
            index_prefix: "isi_cersat_naiad_",
            temporal: TemporalFields {
                start: "time_coverage_start",
                end: "time_coverage_end",
            },
            geometry_field: "geometry",
            id_field: "_id",
            paging,
        }
    }

    pub fn from_name(name: &str, paging: PagingMode) -> Result<Self> {
        match name {
            "ifremer" => Ok(Self::ifremer(paging)),
            other => Err(SearchError::invalid(format!(
                "unknown elasticsearch dialect: {:?}",
                other
            ))),
        }
    }

    pub fn index_name(&self, collection: &str) -> String {
        format!("{}{}", self.index_prefix, collection)
    }

    fn sort_fields(&self) -> Vec<&'static str> {
        vec![self.temporal.start, self.temporal.end, self.id_field]
    }

    pub fn translate(&self, request: &SearchRequest, paging: &Paging) -> Result<ElasticQuery> {
        let index = match &request.collections {
            Some(names) if !names.is_empty() => {
                IndexSelector::Named(names.iter().map(|n| self.index_name(n)).collect())
            }
            _ => IndexSelector::All,
        };

        let mut clauses = Vec::new();
        if let Some(ids) = request.id_filter() {
            clauses.push(Clause::Terms {
                field: self.id_field.to_string(),
                values: ids.to_vec(),
            });
        }
        clauses.extend(temporal::clauses(request.datetime.as_deref(), self.temporal)?);
        clauses.extend(spatial::clause(request, self.geometry_field)?);

        let mut query = ElasticQuery {
            index,
            clauses,
            from: None,
            size: None,
            sort: Vec::new(),
            search_after: None,
        };

        match (self.paging, paging) {
            (PagingMode::Page, Paging::Page(page)) => {
                let page = page
                    .checked_sub(1)
                    .ok_or_else(|| SearchError::invalid("page numbers start at 1"))?;
                // Without a limit every match comes back in one go
                match request.limit {
                    Some(limit) => {
                        query.from = Some(page as usize * limit);
                        query.size = Some(limit);
                    }
                    None => query.size = Some(MAX_RESULT_WINDOW),
                }
            }
            (PagingMode::Cursor, Paging::Cursor(token)) => {
                query.sort = self.sort_fields();
                query.size = Some(request.limit.unwrap_or(MAX_RESULT_WINDOW));
                query.search_after = cursor::decode(token.as_deref())?;
                if let Some(after) = &query.search_after {
                    if after.len() != query.sort.len() {
                        return Err(SearchError::invalid(format!(
                            "token holds {} sort values, expected {}",
                            after.len(),
                            query.sort.len()
                        )));
                    }
                }
            }
            (PagingMode::Page, Paging::Cursor(_)) => {
                return Err(SearchError::invalid("this catalog pages by page number, not token"));
            }
            (PagingMode::Cursor, Paging::Page(_)) => {
                return Err(SearchError::invalid("this catalog pages by token, not page number"));
            }
        }

        Ok(query)
    }

    /// Collections from a `_cat/indices?format=json` listing. Only indices
    /// carrying this dialect's prefix are catalog collections.
    pub fn read_collections(&self, indices: &Value) -> Result<Vec<StacCollection>> {
        let indices = indices
            .as_array()
            .ok_or_else(|| SearchError::backend("index listing must be a list"))?;

        let mut collections: Vec<StacCollection> = indices
            .iter()
            .filter_map(|index| index.get("index").and_then(Value::as_str))
            .filter_map(|name| name.strip_prefix(self.index_prefix))
            .map(|id| StacCollection::placeholder(id, None))
            .collect();
        collections.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(collections)
    }

    /// Items, total and (cursor mode) the next token from a `_search` response.
    pub fn read_page(&self, response: &Value, limit: Option<usize>) -> Result<SearchPage> {
        let hits = response
            .get("hits")
            .ok_or_else(|| SearchError::backend("search response has no hits envelope"))?;

        let total = hits
            .get("total")
            .and_then(|t| t.get("value").or(Some(t)))
            .and_then(Value::as_u64);

        let rows = hits
            .get("hits")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let items: Vec<StacItem> = rows
            .iter()
            .filter_map(|hit| match self.hit_to_item(hit) {
                Some(item) => Some(item),
                None => {
                    warn!("Skipping hit without id: {}", hit);
                    None
                }
            })
            .collect();

        let next_token = match (self.paging, limit, rows.last()) {
            (PagingMode::Cursor, Some(limit), Some(last)) if rows.len() >= limit => {
                let values = sort_values(last)?;
                if values.iter().any(|v| v.contains(cursor::DELIMITER)) {
                    warn!(
                        "Sort key {:?} cannot be carried in a token, ending pagination",
                        values
                    );
                    None
                } else {
                    Some(cursor::encode(&values))
                }
            }
            _ => None,
        };

        Ok(SearchPage {
            items,
            total,
            next_token,
        })
    }

    fn hit_to_item(&self, hit: &Value) -> Option<StacItem> {
        let id = hit.get("_id").and_then(Value::as_str)?;
        let source = hit.get("_source");
        let field = |name: &str| {
            source
                .and_then(|s| s.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let geometry = source
            .and_then(|s| s.get(self.geometry_field))
            .filter(|g| !g.is_null())
            .cloned();

        let mut item = StacItem::with_interval(
            id,
            geometry,
            field(self.temporal.start),
            field(self.temporal.end),
        );
        item.collection = hit
            .get("_index")
            .and_then(Value::as_str)
            .map(|index| index.strip_prefix(self.index_prefix).unwrap_or(index).to_string());
        Some(item)
    }
}

/// Sort key of a hit as strings; dates come back as epoch millis.
fn sort_values(hit: &Value) -> Result<Vec<String>> {
    let sort = hit
        .get("sort")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::backend("sorted search hit has no sort values"))?;

    Ok(sort
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Bbox;

    fn request() -> SearchRequest {
        SearchRequest {
            collections: Some(vec!["avhrr".into()]),
            limit: Some(10),
            page: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_match_all_without_filters() {
        let dialect = ElasticDialect::ifremer(PagingMode::Page);
        let query = dialect
            .translate(&SearchRequest::default(), &Paging::Page(1))
            .unwrap();
        assert_eq!(query.index, IndexSelector::All);
        assert_eq!(query.index.to_path(), "_all");
        assert!(query.clauses.is_empty());
        assert_eq!(query.body()["query"], json!({"match_all": {}}));
        assert!(query.body().get("from").is_none());
    }

    #[test]
    fn test_page_offsets() {
        let dialect = ElasticDialect::ifremer(PagingMode::Page);
        let query = dialect.translate(&request(), &Paging::Page(3)).unwrap();
        assert_eq!(query.index.to_path(), "isi_cersat_naiad_avhrr");
        assert_eq!(query.from, Some(20));
        assert_eq!(query.size, Some(10));
        assert!(query.sort.is_empty());
    }

    #[test]
    fn test_each_collection_maps_to_its_index() {
        let dialect = ElasticDialect::ifremer(PagingMode::Page);
        let mut req = request();
        req.collections = Some(vec!["avhrr".into(), "sst".into()]);
        let query = dialect.translate(&req, &Paging::Page(1)).unwrap();
        assert_eq!(
            query.index,
            IndexSelector::Named(vec![
                "isi_cersat_naiad_avhrr".to_string(),
                "isi_cersat_naiad_sst".to_string()
            ])
        );
        assert_eq!(query.index.to_path(), "isi_cersat_naiad_avhrr,isi_cersat_naiad_sst");
    }

    #[test]
    fn test_page_without_limit_returns_whole_window() {
        let dialect = ElasticDialect::ifremer(PagingMode::Page);
        let mut req = request();
        req.limit = None;
        let body = dialect.translate(&req, &Paging::Page(1)).unwrap().body();
        assert!(body.get("from").is_none());
        assert_eq!(body["size"], MAX_RESULT_WINDOW);
        assert_eq!(body["track_total_hits"], true);
    }

    #[test]
    fn test_clause_order_ids_temporal_spatial() {
        let dialect = ElasticDialect::ifremer(PagingMode::Page);
        let mut req = request();
        req.ids = Some(vec!["g1".into(), "g2".into()]);
        req.datetime = Some("2020-01-01T00:00:00Z/2020-02-01T00:00:00Z".into());
        req.bbox = Some(Bbox::parse("0,0,10,10").unwrap());

        let query = dialect.translate(&req, &Paging::Page(1)).unwrap();
        let filter = query.body()["query"]["bool"]["filter"].clone();
        assert_eq!(filter[0], json!({"ids": {"values": ["g1", "g2"]}}));
        assert_eq!(filter[1]["range"]["time_coverage_start"]["gte"], "2020-01-01T00:00:00Z");
        assert_eq!(filter[2]["range"]["time_coverage_end"]["lte"], "2020-02-01T00:00:00Z");
        assert_eq!(filter[3]["geo_shape"]["geometry"]["relation"], "within");
        assert_eq!(filter.as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_cursor_query() {
        let dialect = ElasticDialect::ifremer(PagingMode::Cursor);
        let token = cursor::encode(&["1577836800000", "1577923200000", "g1"]);
        let query = dialect
            .translate(&request(), &Paging::Cursor(Some(token)))
            .unwrap();

        let body = query.body();
        assert_eq!(
            body["sort"],
            json!([
                {"time_coverage_start": "asc"},
                {"time_coverage_end": "asc"},
                {"_id": "asc"}
            ])
        );
        assert_eq!(body["search_after"], json!(["1577836800000", "1577923200000", "g1"]));
        assert_eq!(body["size"], 10);
        assert!(body.get("from").is_none());
    }

    #[test]
    fn test_first_cursor_page_has_no_search_after() {
        let dialect = ElasticDialect::ifremer(PagingMode::Cursor);
        let query = dialect.translate(&request(), &Paging::Cursor(None)).unwrap();
        assert!(query.body().get("search_after").is_none());
    }

    #[test]
    fn test_malformed_token() {
        let dialect = ElasticDialect::ifremer(PagingMode::Cursor);
        let short = cursor::encode(&["only-one"]);
        for token in [short, "%%%".to_string()] {
            assert!(matches!(
                dialect.translate(&request(), &Paging::Cursor(Some(token))),
                Err(SearchError::InvalidQueryParameter(_))
            ));
        }
    }

    #[test]
    fn test_paging_mismatch() {
        let dialect = ElasticDialect::ifremer(PagingMode::Page);
        assert!(dialect.translate(&request(), &Paging::Cursor(None)).is_err());
        let dialect = ElasticDialect::ifremer(PagingMode::Cursor);
        assert!(dialect.translate(&request(), &Paging::Page(1)).is_err());
    }

    #[test]
    fn test_read_page_full_page_yields_token() {
        let dialect = ElasticDialect::ifremer(PagingMode::Cursor);
        let response = json!({
            "hits": {
                "total": {"value": 42, "relation": "eq"},
                "hits": [
                    {
                        "_index": "isi_cersat_naiad_avhrr",
                        "_id": "g1",
                        "_source": {
                            "time_coverage_start": "2020-01-01T00:00:00Z",
                            "time_coverage_end": "2020-01-02T00:00:00Z",
                            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}
                        },
                        "sort": [1577836800000u64, 1577923200000u64, "g1"]
                    },
                    {
                        "_index": "isi_cersat_naiad_avhrr",
                        "_id": "g2",
                        "_source": {},
                        "sort": [1577923200000u64, 1578009600000u64, "g2"]
                    }
                ]
            }
        });

        let page = dialect.read_page(&response, Some(2)).unwrap();
        assert_eq!(page.total, Some(42));
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].collection.as_deref(), Some("avhrr"));
        assert_eq!(page.items[0].bbox, Some(vec![1.0, 2.0, 1.0, 2.0]));
        let token = page.next_token.unwrap();
        assert_eq!(
            cursor::decode(Some(&token)).unwrap(),
            Some(vec![
                "1577923200000".to_string(),
                "1578009600000".to_string(),
                "g2".to_string()
            ])
        );
    }

    #[test]
    fn test_read_page_short_page_ends_cursor() {
        let dialect = ElasticDialect::ifremer(PagingMode::Cursor);
        let response = json!({"hits": {"total": {"value": 1}, "hits": [
            {"_id": "g1", "_source": {}, "sort": [1, 2, "g1"]}
        ]}});
        let page = dialect.read_page(&response, Some(10)).unwrap();
        assert_eq!(page.next_token, None);
    }

    #[test]
    fn test_read_page_full_page_without_sort_values() {
        let dialect = ElasticDialect::ifremer(PagingMode::Cursor);
        let response = json!({"hits": {"total": {"value": 5}, "hits": [
            {"_id": "g1", "_source": {}}
        ]}});
        assert!(matches!(
            dialect.read_page(&response, Some(1)),
            Err(SearchError::Backend(_))
        ));
    }

    #[test]
    fn test_read_page_delimiter_in_sort_key_ends_cursor() {
        let dialect = ElasticDialect::ifremer(PagingMode::Cursor);
        let response = json!({"hits": {"total": {"value": 5}, "hits": [
            {"_id": "g,1", "_source": {}, "sort": [1, 2, "g,1"]}
        ]}});
        let page = dialect.read_page(&response, Some(1)).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_token, None);
    }

    #[test]
    fn test_read_page_page_mode_never_yields_token() {
        let dialect = ElasticDialect::ifremer(PagingMode::Page);
        let response = json!({"hits": {"total": {"value": 1}, "hits": [{"_id": "g1"}]}});
        let page = dialect.read_page(&response, Some(1)).unwrap();
        assert_eq!(page.next_token, None);
        assert_eq!(page.total, Some(1));
    }

    #[test]
    fn test_read_page_without_hits() {
        let dialect = ElasticDialect::ifremer(PagingMode::Page);
        assert!(matches!(
            dialect.read_page(&json!({"took": 3}), Some(10)),
            Err(SearchError::Backend(_))
        ));
    }

    #[test]
    fn test_read_collections() {
        let dialect = ElasticDialect::ifremer(PagingMode::Page);
        let indices = json!([
            {"index": "isi_cersat_naiad_sst"},
            {"index": ".kibana"},
            {"index": "isi_cersat_naiad_avhrr"}
        ]);
        let ids: Vec<String> = dialect
            .read_collections(&indices)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["avhrr", "sst"]);
    }
}
