//! Search request model: GET query parameters and POST bodies normalised into
//! one validated [`SearchRequest`].

use std::str::FromStr;

use geojson::Geometry;
use serde::Deserialize;
use url::form_urlencoded;

use crate::error::{Result, SearchError};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 10_000;

/// Query parameters for item search (GET)
#[derive(Debug, Default, PartialEq)]
pub struct SearchParams {
    /// Collection identifiers (comma-separated, or the key repeated)
    pub collections: Option<String>,
    /// Item identifiers (comma-separated, or the key repeated)
    pub ids: Option<String>,
    /// Bounding box filter: minLon,minLat,maxLon,maxLat
    pub bbox: Option<String>,
    /// GeoJSON geometry, JSON encoded
    pub intersects: Option<String>,
    /// RFC 3339 instant or `start/end` interval, `..` for an open side
    pub datetime: Option<String>,
    pub limit: Option<usize>,
    /// One-based page number
    pub page: Option<u32>,
    /// Opaque cursor from a previous `next` link
    pub token: Option<String>,
}

impl SearchParams {
    /// Parse a raw query string. `collections` and `ids` may be repeated and
    /// accumulate; any other key given twice is rejected. Unknown keys are
    /// ignored.
    pub fn from_query(query: Option<&str>) -> Result<Self> {
        let mut params = SearchParams::default();
        for (key, value) in form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            let value = value.into_owned();
            match key.as_ref() {
                "collections" => append_list(&mut params.collections, value),
                "ids" => append_list(&mut params.ids, value),
                "bbox" => set_once(&mut params.bbox, "bbox", value)?,
                "intersects" => set_once(&mut params.intersects, "intersects", value)?,
                "datetime" => set_once(&mut params.datetime, "datetime", value)?,
                "token" => set_once(&mut params.token, "token", value)?,
                "limit" => set_once(&mut params.limit, "limit", parse_number("limit", &value)?)?,
                "page" => set_once(&mut params.page, "page", parse_number("page", &value)?)?,
                _ => {}
            }
        }
        Ok(params)
    }
}

fn append_list(slot: &mut Option<String>, value: String) {
    match slot {
        Some(existing) => {
            existing.push(',');
            existing.push_str(&value);
        }
        None => *slot = Some(value),
    }
}

fn set_once<T>(slot: &mut Option<T>, key: &str, value: T) -> Result<()> {
    if slot.is_some() {
        return Err(SearchError::invalid(format!("{} given more than once", key)));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        SearchError::invalid(format!("{} must be a non-negative integer, got {:?}", key, value))
    })
}

/// POST body for search (same fields as GET params)
#[derive(Debug, Deserialize, Default)]
pub struct SearchBody {
    pub collections: Option<Vec<String>>,
    pub ids: Option<Vec<String>>,
    pub bbox: Option<Vec<f64>>,
    pub intersects: Option<Geometry>,
    pub datetime: Option<String>,
    pub limit: Option<usize>,
    pub page: Option<u32>,
    pub token: Option<String>,
}

/// Page size policy applied while validating requests.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub default: usize,
    pub max: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            default: DEFAULT_LIMIT,
            max: MAX_LIMIT,
        }
    }
}

impl Limits {
    fn apply(&self, limit: Option<usize>) -> Result<usize> {
        match limit {
            Some(0) => Err(SearchError::invalid("limit must be a positive integer")),
            Some(limit) => Ok(limit.min(self.max)),
            None => Ok(self.default),
        }
    }
}

/// Parsed and validated bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Bbox {
    /// Parse bbox from comma-separated string
    pub fn parse(s: &str) -> Result<Self> {
        let coords: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| SearchError::invalid("bbox must contain valid numbers"))?;

        Self::from_slice(&coords)
    }

    /// Build from the four-element array form used in POST bodies
    pub fn from_slice(v: &[f64]) -> Result<Self> {
        if v.len() != 4 {
            return Err(SearchError::invalid(format!(
                "bbox must have exactly 4 values [minLon,minLat,maxLon,maxLat], got {}",
                v.len()
            )));
        }

        let bbox = Bbox {
            min_lon: v[0],
            min_lat: v[1],
            max_lon: v[2],
            max_lat: v[3],
        };
        bbox.validate()?;
        Ok(bbox)
    }

    fn validate(&self) -> Result<()> {
        let lon_ok = |v: f64| (-180.0..=180.0).contains(&v);
        let lat_ok = |v: f64| (-90.0..=90.0).contains(&v);

        if !lon_ok(self.min_lon) || !lon_ok(self.max_lon) {
            return Err(SearchError::invalid("bbox longitudes must be between -180 and 180"));
        }
        if !lat_ok(self.min_lat) || !lat_ok(self.max_lat) {
            return Err(SearchError::invalid("bbox latitudes must be between -90 and 90"));
        }
        if self.min_lon >= self.max_lon {
            return Err(SearchError::invalid("bbox minLon must be < maxLon"));
        }
        if self.min_lat >= self.max_lat {
            return Err(SearchError::invalid("bbox minLat must be < maxLat"));
        }
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

/// Generic, backend-neutral search request.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// `None` means every collection.
    pub collections: Option<Vec<String>>,
    pub ids: Option<Vec<String>>,
    pub bbox: Option<Bbox>,
    pub intersects: Option<Geometry>,
    pub datetime: Option<String>,
    pub limit: Option<usize>,
    pub page: u32,
    pub token: Option<String>,
}

/// Paging context handed to a dialect. Page dialects only ever see `Page`,
/// cursor dialects only ever see `Cursor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paging {
    Page(u32),
    Cursor(Option<String>),
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn validate_page(page: Option<u32>) -> Result<u32> {
    match page {
        Some(0) => Err(SearchError::invalid("page numbers start at 1")),
        Some(page) => Ok(page),
        None => Ok(1),
    }
}

impl SearchRequest {
    pub fn from_params(params: SearchParams, limits: &Limits) -> Result<Self> {
        let bbox = params.bbox.as_deref().map(Bbox::parse).transpose()?;

        let intersects = params
            .intersects
            .as_deref()
            .map(|raw| {
                serde_json::from_str::<Geometry>(raw).map_err(|e| {
                    SearchError::invalid(format!("intersects is not a GeoJSON geometry: {}", e))
                })
            })
            .transpose()?;

        Ok(SearchRequest {
            collections: params.collections.as_deref().map(split_list),
            ids: params.ids.as_deref().map(split_list),
            bbox,
            intersects,
            datetime: params.datetime,
            limit: Some(limits.apply(params.limit)?),
            page: validate_page(params.page)?,
            token: params.token,
        })
    }

    pub fn from_body(body: SearchBody, limits: &Limits) -> Result<Self> {
        let bbox = body.bbox.as_deref().map(Bbox::from_slice).transpose()?;

        Ok(SearchRequest {
            collections: body.collections,
            ids: body.ids,
            bbox,
            intersects: body.intersects,
            datetime: body.datetime,
            limit: Some(limits.apply(body.limit)?),
            page: validate_page(body.page)?,
            token: body.token,
        })
    }

    /// Non-empty id restriction, if any.
    pub fn id_filter(&self) -> Option<&[String]> {
        self.ids.as_deref().filter(|ids| !ids.is_empty())
    }
}
