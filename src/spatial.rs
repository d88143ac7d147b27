//! Spatial filter clauses from `bbox` or `intersects`.

use crate::error::{Result, SearchError};
use crate::query::{Clause, Shape, SpatialRelation};
use crate::request::{Bbox, SearchRequest};

/// Envelope with top-left `[minLon, maxLat]` and bottom-right `[maxLon, minLat]`.
pub fn envelope(bbox: &Bbox) -> Shape {
    Shape::Envelope {
        top_left: [bbox.min_lon, bbox.max_lat],
        bottom_right: [bbox.max_lon, bbox.min_lat],
    }
}

/// Build the spatial clause for `field`, if the request asks for one.
/// Supplying both `bbox` and `intersects` is rejected.
pub fn clause(request: &SearchRequest, field: &str) -> Result<Option<Clause>> {
    match (&request.bbox, &request.intersects) {
        (Some(_), Some(_)) => Err(SearchError::invalid(
            "bbox and intersects cannot be used in the same search",
        )),
        (Some(bbox), None) => Ok(Some(Clause::GeoShape {
            field: field.to_string(),
            shape: envelope(bbox),
            relation: SpatialRelation::Within,
        })),
        (None, Some(geometry)) => Ok(Some(Clause::GeoShape {
            field: field.to_string(),
            shape: Shape::Geometry(geometry.clone()),
            relation: SpatialRelation::Intersects,
        })),
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::{Geometry, Value};

    fn bbox() -> Bbox {
        Bbox::parse("-10,40,5,52").unwrap()
    }

    #[test]
    fn test_no_spatial_filter() {
        assert!(clause(&SearchRequest::default(), "geometry").unwrap().is_none());
    }

    #[test]
    fn test_bbox_envelope_corners() {
        let request = SearchRequest {
            bbox: Some(bbox()),
            ..Default::default()
        };
        let Some(Clause::GeoShape { shape, relation, .. }) = clause(&request, "geometry").unwrap()
        else {
            panic!("expected geo_shape clause");
        };
        assert_eq!(relation, SpatialRelation::Within);
        assert_eq!(
            shape,
            Shape::Envelope {
                top_left: [-10.0, 52.0],
                bottom_right: [5.0, 40.0],
            }
        );
    }

    #[test]
    fn test_intersects_geometry_verbatim() {
        let geometry = Geometry::new(Value::Point(vec![1.5, 2.5]));
        let request = SearchRequest {
            intersects: Some(geometry.clone()),
            ..Default::default()
        };
        let got = clause(&request, "geometry").unwrap();
        assert_eq!(
            got,
            Some(Clause::GeoShape {
                field: "geometry".into(),
                shape: Shape::Geometry(geometry),
                relation: SpatialRelation::Intersects,
            })
        );
    }

    #[test]
    fn test_bbox_with_intersects_rejected() {
        let request = SearchRequest {
            bbox: Some(bbox()),
            intersects: Some(Geometry::new(Value::Point(vec![0.0, 0.0]))),
            ..Default::default()
        };
        assert!(matches!(
            clause(&request, "geometry"),
            Err(SearchError::InvalidQueryParameter(_))
        ));
    }
}
