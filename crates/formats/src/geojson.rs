use foundation::math::GeoPoint;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(GeoPoint),
    MultiPoint(Vec<GeoPoint>),
    LineString(Vec<GeoPoint>),
    MultiLineString(Vec<Vec<GeoPoint>>),
    Polygon(Vec<Vec<GeoPoint>>),
    MultiPolygon(Vec<Vec<Vec<GeoPoint>>>),
}

impl Geometry {
    /// Every polyline in the geometry: line strings as-is, polygon rings
    /// (outer and holes) as closed lines. Points contribute nothing.
    pub fn polylines(&self) -> Vec<&[GeoPoint]> {
        match self {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Vec::new(),
            Geometry::LineString(line) => vec![line.as_slice()],
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().map(Vec::as_slice).collect()
            }
            Geometry::MultiPolygon(polys) => polys
                .iter()
                .flat_map(|rings| rings.iter().map(Vec::as_slice))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<String>,
    pub properties: Map<String, Value>,
    /// `None` for features whose geometry is JSON `null`.
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug, thiserror::Error)]
pub enum GeoJsonError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a GeoJSON FeatureCollection or Feature")]
    NotAFeatureCollection,
    #[error("invalid feature at index {index}: {reason}")]
    InvalidFeature { index: usize, reason: String },
}

impl FeatureCollection {
    pub fn from_geojson_str(payload: &str) -> Result<Self, GeoJsonError> {
        let value: Value = serde_json::from_str(payload)?;
        Self::from_geojson_value(&value)
    }

    /// Accepts a `FeatureCollection` or a lone `Feature`.
    pub fn from_geojson_value(value: &Value) -> Result<Self, GeoJsonError> {
        let obj = value
            .as_object()
            .ok_or(GeoJsonError::NotAFeatureCollection)?;
        let ty = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or(GeoJsonError::NotAFeatureCollection)?;

        match ty {
            "FeatureCollection" => {
                let items = obj
                    .get("features")
                    .and_then(Value::as_array)
                    .ok_or(GeoJsonError::NotAFeatureCollection)?;
                let features = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        parse_feature(item)
                            .map_err(|reason| GeoJsonError::InvalidFeature { index, reason })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self { features })
            }
            "Feature" => {
                let feature = parse_feature(value)
                    .map_err(|reason| GeoJsonError::InvalidFeature { index: 0, reason })?;
                Ok(Self {
                    features: vec![feature],
                })
            }
            _ => Err(GeoJsonError::NotAFeatureCollection),
        }
    }

    /// Emits a `FeatureCollection`; property order may differ from the input.
    pub fn to_geojson_value(&self) -> Value {
        let features = self
            .features
            .iter()
            .map(|feat| {
                let mut obj = Map::new();
                obj.insert("type".into(), Value::from("Feature"));
                if let Some(id) = &feat.id {
                    obj.insert("id".into(), Value::from(id.as_str()));
                }
                obj.insert("properties".into(), Value::Object(feat.properties.clone()));
                obj.insert(
                    "geometry".into(),
                    feat.geometry.as_ref().map_or(Value::Null, geometry_to_value),
                );
                Value::Object(obj)
            })
            .collect();

        let mut root = Map::new();
        root.insert("type".into(), Value::from("FeatureCollection"));
        root.insert("features".into(), Value::Array(features));
        Value::Object(root)
    }

    pub fn to_geojson_string(&self) -> Result<String, GeoJsonError> {
        Ok(serde_json::to_string(&self.to_geojson_value())?)
    }

    pub fn to_geojson_string_pretty(&self) -> Result<String, GeoJsonError> {
        Ok(serde_json::to_string_pretty(&self.to_geojson_value())?)
    }
}

fn parse_feature(value: &Value) -> Result<Feature, String> {
    let obj = value.as_object().ok_or("feature must be an object")?;
    match obj.get("type").and_then(Value::as_str) {
        Some("Feature") => {}
        Some(other) => return Err(format!("unexpected feature type: {other}")),
        None => return Err("feature missing type".into()),
    }

    let id = match obj.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let properties = obj
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let geometry = match obj.get("geometry") {
        None => return Err("feature missing geometry".into()),
        Some(Value::Null) => None,
        Some(g) => Some(parse_geometry(g)?),
    };

    Ok(Feature {
        id,
        properties,
        geometry,
    })
}

fn parse_geometry(value: &Value) -> Result<Geometry, String> {
    let obj = value.as_object().ok_or("geometry must be an object")?;
    let ty = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or("geometry missing type")?;
    let coords = obj
        .get("coordinates")
        .ok_or("geometry missing coordinates")?;

    match ty {
        "Point" => Ok(Geometry::Point(parse_position(coords)?)),
        "MultiPoint" => Ok(Geometry::MultiPoint(parse_positions(coords)?)),
        "LineString" => Ok(Geometry::LineString(parse_positions(coords)?)),
        "MultiLineString" => Ok(Geometry::MultiLineString(parse_nested(coords, parse_positions)?)),
        "Polygon" => Ok(Geometry::Polygon(parse_nested(coords, parse_positions)?)),
        "MultiPolygon" => Ok(Geometry::MultiPolygon(parse_nested(coords, |p| {
            parse_nested(p, parse_positions)
        })?)),
        other => Err(format!("unsupported geometry type: {other}")),
    }
}

/// `[lng, lat, ...]`; extra components such as altitude are ignored.
fn parse_position(coords: &Value) -> Result<GeoPoint, String> {
    let arr = coords.as_array().ok_or("position must be an array")?;
    let (Some(lng), Some(lat)) = (
        arr.first().and_then(Value::as_f64),
        arr.get(1).and_then(Value::as_f64),
    ) else {
        return Err("position must start with numeric [lng, lat]".into());
    };
    Ok(GeoPoint::new(lat, lng))
}

fn parse_positions(coords: &Value) -> Result<Vec<GeoPoint>, String> {
    parse_nested(coords, parse_position)
}

fn parse_nested<T>(
    coords: &Value,
    item: impl Fn(&Value) -> Result<T, String>,
) -> Result<Vec<T>, String> {
    coords
        .as_array()
        .ok_or("coordinates must be an array")?
        .iter()
        .map(item)
        .collect()
}

fn geometry_to_value(geom: &Geometry) -> Value {
    let (ty, coords) = match geom {
        Geometry::Point(p) => ("Point", position_value(p)),
        Geometry::MultiPoint(ps) => ("MultiPoint", positions_value(ps)),
        Geometry::LineString(ps) => ("LineString", positions_value(ps)),
        Geometry::MultiLineString(lines) => (
            "MultiLineString",
            Value::Array(lines.iter().map(|l| positions_value(l)).collect()),
        ),
        Geometry::Polygon(rings) => (
            "Polygon",
            Value::Array(rings.iter().map(|r| positions_value(r)).collect()),
        ),
        Geometry::MultiPolygon(polys) => (
            "MultiPolygon",
            Value::Array(
                polys
                    .iter()
                    .map(|rings| Value::Array(rings.iter().map(|r| positions_value(r)).collect()))
                    .collect(),
            ),
        ),
    };
    let mut obj = Map::new();
    obj.insert("type".into(), Value::from(ty));
    obj.insert("coordinates".into(), coords);
    Value::Object(obj)
}

fn position_value(p: &GeoPoint) -> Value {
    Value::Array(vec![Value::from(p.lng_deg), Value::from(p.lat_deg)])
}

fn positions_value(ps: &[GeoPoint]) -> Value {
    Value::Array(ps.iter().map(position_value).collect())
}
