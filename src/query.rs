//! Backend-native filter clauses. Clauses compose under logical AND; an empty
//! clause list means "match all".

use geojson::Geometry;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Gte,
    Lte,
}

impl RangeOp {
    fn as_str(self) -> &'static str {
        match self {
            RangeOp::Gte => "gte",
            RangeOp::Lte => "lte",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialRelation {
    Within,
    Intersects,
}

impl SpatialRelation {
    fn as_str(self) -> &'static str {
        match self {
            SpatialRelation::Within => "within",
            SpatialRelation::Intersects => "intersects",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Axis-aligned rectangle as `[lon, lat]` corner points.
    Envelope {
        top_left: [f64; 2],
        bottom_right: [f64; 2],
    },
    Geometry(Geometry),
}

impl Shape {
    fn to_dsl(&self) -> Value {
        match self {
            Shape::Envelope {
                top_left,
                bottom_right,
            } => json!({
                "type": "envelope",
                "coordinates": [top_left, bottom_right],
            }),
            Shape::Geometry(geometry) => Value::Object(Map::from(geometry)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Range {
        field: String,
        op: RangeOp,
        value: String,
    },
    Terms {
        field: String,
        values: Vec<String>,
    },
    GeoShape {
        field: String,
        shape: Shape,
        relation: SpatialRelation,
    },
}

impl Clause {
    pub fn range(field: &str, op: RangeOp, value: impl Into<String>) -> Self {
        Clause::Range {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    /// Render as Elasticsearch query DSL.
    pub fn to_dsl(&self) -> Value {
        match self {
            Clause::Range { field, op, value } => json!({
                "range": { field: { op.as_str(): value } }
            }),
            Clause::Terms { field, values } if field == "_id" => json!({
                "ids": { "values": values }
            }),
            Clause::Terms { field, values } => json!({
                "terms": { field: values }
            }),
            Clause::GeoShape {
                field,
                shape,
                relation,
            } => json!({
                "geo_shape": {
                    field: {
                        "shape": shape.to_dsl(),
                        "relation": relation.as_str(),
                    }
                }
            }),
        }
    }
}

/// Compose clauses under AND. No clauses is an explicit `match_all`, never an
/// empty boolean query.
pub fn compose(clauses: &[Clause]) -> Value {
    if clauses.is_empty() {
        return json!({ "match_all": {} });
    }

    let filter: Vec<Value> = clauses.iter().map(Clause::to_dsl).collect();
    json!({ "bool": { "filter": filter } })
}
