//! STAC output structures built from backend records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::pagination::Link as PageLink;

pub const STAC_VERSION: &str = "1.0.0";

/// Spatial extent advertised for collections whose real extent is unknown.
pub const WORLD_BBOX: [f64; 4] = [-180.0, -90.0, 180.0, 90.0];
/// Temporal extent advertised for collections whose real extent is unknown.
pub const PLACEHOLDER_INTERVAL: [&str; 2] = ["1900-01-01T00:00:00Z", "2100-01-01T00:00:00Z"];

/// STAC Collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StacCollection {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: String,
    pub stac_version: String,
    #[serde(default)]
    pub stac_extensions: Vec<String>,
    pub title: Option<String>,
    pub description: String,
    pub license: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub extent: Extent,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl StacCollection {
    /// Collection with only an id known; everything else is filled with
    /// wide-open placeholders.
    pub fn placeholder(id: &str, title: Option<String>) -> Self {
        StacCollection {
            type_: "Collection".into(),
            id: id.to_string(),
            stac_version: STAC_VERSION.into(),
            stac_extensions: Vec::new(),
            title: title.or_else(|| Some(id.to_string())),
            description: id.to_string(),
            license: "proprietary".into(),
            keywords: Vec::new(),
            extent: Extent {
                spatial: SpatialExtent {
                    bbox: vec![WORLD_BBOX.iter().map(|v| Some(*v)).collect()],
                },
                temporal: TemporalExtent {
                    interval: vec![PLACEHOLDER_INTERVAL
                        .iter()
                        .map(|v| Some(v.to_string()))
                        .collect()],
                },
            },
            links: Vec::new(),
        }
    }
}

/// STAC Item (Feature)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StacItem {
    #[serde(rename = "type")]
    pub type_: String,
    pub stac_version: String,
    #[serde(default)]
    pub stac_extensions: Vec<String>,
    pub id: String,
    pub geometry: Option<Value>,
    pub bbox: Option<Vec<f64>>,
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub assets: HashMap<String, Asset>,
    pub collection: Option<String>,
}

impl StacItem {
    /// Item covering `[start, end]`; the bbox is derived from the geometry.
    pub fn with_interval(
        id: impl Into<String>,
        geometry: Option<Value>,
        start: Option<String>,
        end: Option<String>,
    ) -> Self {
        let bbox = geometry.as_ref().and_then(geometry_bounds).map(|b| b.to_vec());

        let mut properties = Map::new();
        properties.insert("datetime".into(), Value::Null);
        if let Some(start) = start {
            properties.insert("start_datetime".into(), Value::String(start));
        }
        if let Some(end) = end {
            properties.insert("end_datetime".into(), Value::String(end));
        }

        StacItem {
            type_: "Feature".into(),
            stac_version: STAC_VERSION.into(),
            stac_extensions: Vec::new(),
            id: id.into(),
            geometry,
            bbox,
            properties,
            links: Vec::new(),
            assets: HashMap::new(),
            collection: None,
        }
    }
}

/// STAC Extent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Extent {
    pub spatial: SpatialExtent,
    pub temporal: TemporalExtent,
}

/// Spatial Extent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpatialExtent {
    pub bbox: Vec<Vec<Option<f64>>>,
}

/// Temporal Extent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemporalExtent {
    pub interval: Vec<Vec<Option<String>>>,
}

/// STAC Link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// STAC Asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// One page of search results
#[derive(Debug, Clone, Serialize)]
pub struct ItemCollection {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub features: Vec<StacItem>,
    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,
    #[serde(rename = "numberReturned")]
    pub number_returned: usize,
    pub links: Vec<PageLink>,
}

impl ItemCollection {
    pub fn new(features: Vec<StacItem>, number_matched: Option<u64>, links: Vec<PageLink>) -> Self {
        ItemCollection {
            type_: "FeatureCollection",
            number_returned: features.len(),
            features,
            number_matched,
            links,
        }
    }
}

/// `[minX, minY, maxX, maxY]` over every position of a GeoJSON geometry.
pub fn geometry_bounds(geometry: &Value) -> Option<[f64; 4]> {
    fn walk(coords: &Value, bounds: &mut Option<[f64; 4]>) {
        let Some(array) = coords.as_array() else {
            return;
        };

        if let (Some(x), Some(y)) = (
            array.first().and_then(Value::as_f64),
            array.get(1).and_then(Value::as_f64),
        ) {
            let b = bounds.get_or_insert([x, y, x, y]);
            b[0] = b[0].min(x);
            b[1] = b[1].min(y);
            b[2] = b[2].max(x);
            b[3] = b[3].max(y);
            return;
        }

        for child in array {
            walk(child, bounds);
        }
    }

    let mut bounds = None;
    if let Some(members) = geometry.get("geometries").and_then(Value::as_array) {
        for member in members {
            if let Some(coords) = member.get("coordinates") {
                walk(coords, &mut bounds);
            }
        }
    } else if let Some(coords) = geometry.get("coordinates") {
        walk(coords, &mut bounds);
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_item() {
        let json = r#"{
            "type": "Feature",
            "stac_version": "1.0.0",
            "id": "test-item",
            "geometry": null,
            "bbox": null,
            "properties": {
                "start_datetime": "2020-05-28T00:00:00Z"
            },
            "links": [],
            "assets": {},
            "collection": "test-collection"
        }"#;

        let item: StacItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "test-item");
        assert_eq!(item.collection, Some("test-collection".to_string()));
    }

    #[test]
    fn test_polygon_bounds() {
        let geometry = json!({
            "type": "Polygon",
            "coordinates": [[[-10.0, 40.0], [5.0, 40.0], [5.0, 52.0], [-10.0, 52.0], [-10.0, 40.0]]]
        });
        assert_eq!(geometry_bounds(&geometry), Some([-10.0, 40.0, 5.0, 52.0]));
    }

    #[test]
    fn test_point_and_collection_bounds() {
        assert_eq!(
            geometry_bounds(&json!({"type": "Point", "coordinates": [3.0, 4.0]})),
            Some([3.0, 4.0, 3.0, 4.0])
        );
        let collection = json!({
            "type": "GeometryCollection",
            "geometries": [
                {"type": "Point", "coordinates": [0.0, 0.0]},
                {"type": "LineString", "coordinates": [[1.0, -1.0], [2.0, 3.0]]}
            ]
        });
        assert_eq!(geometry_bounds(&collection), Some([0.0, -1.0, 2.0, 3.0]));
        assert_eq!(geometry_bounds(&json!({"type": "Point"})), None);
    }

    #[test]
    fn test_item_with_interval() {
        let item = StacItem::with_interval(
            "granule-1",
            Some(json!({"type": "Point", "coordinates": [1.0, 2.0]})),
            Some("2020-01-01T00:00:00Z".into()),
            Some("2020-01-02T00:00:00Z".into()),
        );
        assert_eq!(item.bbox, Some(vec![1.0, 2.0, 1.0, 2.0]));
        assert_eq!(item.properties["start_datetime"], "2020-01-01T00:00:00Z");
        assert_eq!(item.properties["datetime"], Value::Null);
    }

    #[test]
    fn test_placeholder_collection() {
        let collection = StacCollection::placeholder("sst", None);
        let value = serde_json::to_value(&collection).unwrap();
        assert_eq!(value["extent"]["spatial"]["bbox"], json!([[-180.0, -90.0, 180.0, 90.0]]));
        assert_eq!(value["title"], "sst");
    }
}
