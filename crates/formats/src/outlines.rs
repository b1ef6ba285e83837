//! Country outline polylines for the flat overlay.

use foundation::math::{GeoPoint, slerp_unit, unit_normal};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::geojson::{Feature, FeatureCollection, GeoJsonError, Geometry};

/// Where an [`Outlines`] set came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutlineSource {
    Loaded,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outlines {
    lines: Vec<Vec<GeoPoint>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct OutlineStats {
    pub lines: usize,
    pub vertices: usize,
}

impl Outlines {
    /// Collects every polyline and polygon ring. Lines with fewer than two
    /// vertices are dropped.
    pub fn from_features(collection: &FeatureCollection) -> Self {
        let lines = collection
            .features
            .iter()
            .filter_map(|f| f.geometry.as_ref())
            .flat_map(Geometry::polylines)
            .filter(|line| line.len() >= 2)
            .map(<[GeoPoint]>::to_vec)
            .collect();
        Self { lines }
    }

    pub fn from_geojson_str(payload: &str) -> Result<Self, GeoJsonError> {
        Ok(Self::from_features(&FeatureCollection::from_geojson_str(payload)?))
    }

    /// Parses `payload`, degrading to [`Outlines::fallback`] when it is
    /// malformed or holds no drawable lines.
    pub fn from_geojson_or_fallback(payload: &str) -> (Self, OutlineSource) {
        match Self::from_geojson_str(payload) {
            Ok(outlines) if !outlines.is_empty() => {
                debug!(lines = outlines.lines.len(), "outlines parsed");
                (outlines, OutlineSource::Loaded)
            }
            Ok(_) => {
                warn!("outline payload has no drawable lines; using fallback");
                (Self::fallback(), OutlineSource::Fallback)
            }
            Err(err) => {
                warn!(%err, "outline payload unusable; using fallback");
                (Self::fallback(), OutlineSource::Fallback)
            }
        }
    }

    /// Built-in simplified continents.
    pub fn fallback() -> Self {
        Self {
            lines: FALLBACK_OUTLINES
                .iter()
                .map(|(_, coords)| {
                    coords
                        .iter()
                        .map(|&(lng, lat)| GeoPoint::new(lat, lng))
                        .collect()
                })
                .collect(),
        }
    }

    pub fn fallback_feature_collection() -> FeatureCollection {
        let features = FALLBACK_OUTLINES
            .iter()
            .map(|(name, coords)| {
                let mut properties = Map::new();
                properties.insert("name".into(), Value::from(*name));
                let line: Vec<GeoPoint> = coords
                    .iter()
                    .map(|&(lng, lat)| GeoPoint::new(lat, lng))
                    .collect();
                let closed = line.first() == line.last();
                Feature {
                    id: None,
                    properties,
                    geometry: Some(if closed {
                        Geometry::Polygon(vec![line])
                    } else {
                        Geometry::LineString(line)
                    }),
                }
            })
            .collect();
        FeatureCollection { features }
    }

    pub fn lines(&self) -> &[Vec<GeoPoint>] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn stats(&self) -> OutlineStats {
        OutlineStats {
            lines: self.lines.len(),
            vertices: self.lines.iter().map(Vec::len).sum(),
        }
    }

    /// Line-list vertex positions on a sphere of `radius`, with every edge
    /// split along its great circle into steps of at most `max_step_deg`.
    pub fn line_list_positions(&self, radius: f64, max_step_deg: f64) -> Vec<[f32; 3]> {
        let step = max_step_deg.max(0.01);
        let mut out = Vec::new();
        for line in &self.lines {
            for pair in line.windows(2) {
                let a = unit_normal(pair[0].lat_deg, pair[0].lng_deg);
                let b = unit_normal(pair[1].lat_deg, pair[1].lng_deg);
                let angle_deg = a.dot(b).clamp(-1.0, 1.0).acos().to_degrees();
                let n = ((angle_deg / step).ceil() as usize).max(1);
                let mut prev = a;
                for i in 1..=n {
                    let next = slerp_unit(a, b, i as f64 / n as f64);
                    out.push((prev * radius).to_f32());
                    out.push((next * radius).to_f32());
                    prev = next;
                }
            }
        }
        out
    }
}

type Ring = &'static [(f64, f64)];

/// `(name, [(lng, lat)])`, closed rings repeat their first vertex.
const FALLBACK_OUTLINES: &[(&str, Ring)] = &[
    (
        "North America",
        &[
            (-168.0, 66.0), (-162.0, 70.0), (-140.0, 70.0), (-125.0, 70.0), (-95.0, 72.0),
            (-80.0, 73.0), (-62.0, 66.0), (-56.0, 52.0), (-66.0, 45.0), (-70.0, 41.0),
            (-76.0, 35.0), (-81.0, 31.0), (-80.0, 25.0), (-82.0, 27.0), (-84.0, 30.0),
            (-90.0, 29.0), (-97.0, 27.0), (-97.0, 22.0), (-87.0, 21.0), (-88.0, 15.0),
            (-83.0, 10.0), (-78.0, 8.0), (-80.0, 7.0), (-86.0, 11.0), (-92.0, 14.0),
            (-105.0, 20.0), (-110.0, 23.0), (-115.0, 30.0), (-118.0, 34.0), (-124.0, 40.0),
            (-124.0, 48.0), (-133.0, 55.0), (-146.0, 60.0), (-155.0, 58.0), (-165.0, 60.0),
            (-168.0, 66.0),
        ],
    ),
    (
        "South America",
        &[
            (-78.0, 8.0), (-72.0, 12.0), (-62.0, 10.0), (-52.0, 5.0), (-35.0, -5.0),
            (-39.0, -14.0), (-48.0, -26.0), (-58.0, -35.0), (-65.0, -42.0), (-68.0, -52.0),
            (-75.0, -50.0), (-73.0, -38.0), (-71.0, -18.0), (-81.0, -5.0), (-80.0, 1.0),
            (-78.0, 8.0),
        ],
    ),
    (
        "Eurasia",
        &[
            (-10.0, 36.0), (-9.0, 43.0), (-2.0, 44.0), (-5.0, 48.0), (2.0, 51.0),
            (8.0, 54.0), (5.0, 62.0), (15.0, 69.0), (28.0, 71.0), (45.0, 68.0),
            (70.0, 73.0), (100.0, 78.0), (140.0, 73.0), (170.0, 70.0), (178.0, 64.0),
            (160.0, 60.0), (156.0, 51.0), (142.0, 47.0), (135.0, 43.0), (129.0, 35.0),
            (122.0, 40.0), (121.0, 31.0), (110.0, 21.0), (106.0, 10.0), (100.0, 13.0),
            (98.0, 8.0), (103.0, 1.0), (100.0, 6.0), (98.0, 16.0), (92.0, 22.0),
            (80.0, 15.0), (77.0, 8.0), (72.0, 20.0), (62.0, 25.0), (57.0, 24.0),
            (52.0, 17.0), (44.0, 12.0), (39.0, 21.0), (35.0, 28.0), (35.0, 32.0),
            (36.0, 36.0), (28.0, 37.0), (26.0, 40.0), (24.0, 38.0), (22.0, 37.0),
            (20.0, 40.0), (13.0, 45.0), (17.0, 40.0), (12.0, 38.0), (8.0, 44.0),
            (3.0, 43.0), (-1.0, 37.0), (-5.0, 36.0), (-10.0, 36.0),
        ],
    ),
    (
        "Africa",
        &[
            (-17.0, 21.0), (-10.0, 30.0), (-6.0, 36.0), (10.0, 37.0), (20.0, 31.0),
            (32.0, 31.0), (35.0, 28.0), (43.0, 12.0), (51.0, 12.0), (40.0, -2.0),
            (40.0, -15.0), (35.0, -24.0), (20.0, -35.0), (17.0, -29.0), (12.0, -13.0),
            (9.0, -1.0), (9.0, 4.0), (-8.0, 4.0), (-17.0, 14.0), (-17.0, 21.0),
        ],
    ),
    (
        "Australia",
        &[
            (114.0, -22.0), (122.0, -18.0), (130.0, -12.0), (137.0, -12.0), (142.0, -11.0),
            (146.0, -19.0), (153.0, -26.0), (150.0, -37.0), (140.0, -38.0), (135.0, -34.0),
            (115.0, -34.0), (114.0, -22.0),
        ],
    ),
    (
        "Greenland",
        &[
            (-73.0, 78.0), (-60.0, 82.0), (-30.0, 83.0), (-20.0, 76.0), (-22.0, 70.0),
            (-42.0, 60.0), (-52.0, 64.0), (-58.0, 76.0), (-73.0, 78.0),
        ],
    ),
    (
        "Great Britain",
        &[
            (-5.0, 50.0), (1.0, 51.0), (0.0, 54.0), (-2.0, 57.0), (-5.0, 58.0),
            (-6.0, 56.0), (-3.0, 54.0), (-5.0, 50.0),
        ],
    ),
    (
        "Japan",
        &[
            (130.0, 31.0), (135.0, 34.0), (140.0, 35.0), (142.0, 40.0), (140.0, 45.0),
            (140.0, 41.0), (136.0, 36.0), (130.0, 31.0),
        ],
    ),
    (
        "Madagascar",
        &[(44.0, -25.0), (47.0, -25.0), (50.0, -15.0), (49.0, -12.0), (44.0, -17.0), (44.0, -25.0)],
    ),
    (
        "New Zealand",
        &[(172.0, -34.0), (178.0, -38.0), (175.0, -41.0), (167.0, -46.0), (172.0, -41.0), (172.0, -34.0)],
    ),
    (
        "Antarctic coast",
        &[
            (-180.0, -78.0), (-150.0, -76.0), (-120.0, -73.0), (-90.0, -72.0), (-60.0, -64.0),
            (-30.0, -76.0), (0.0, -70.0), (30.0, -69.0), (60.0, -67.0), (90.0, -66.0),
            (120.0, -66.0), (150.0, -68.0), (180.0, -78.0),
        ],
    ),
];

#[cfg(test)]
mod tests {
    use super::{OutlineSource, Outlines};
    use pretty_assertions::assert_eq;

    #[test]
    fn fallback_covers_every_continent() {
        let fb = Outlines::fallback();
        let stats = fb.stats();
        assert_eq!(stats.lines, 11);
        assert!(stats.vertices > 150);
        for line in fb.lines() {
            for p in line {
                assert!((-90.0..=90.0).contains(&p.lat_deg));
                assert!((-180.0..=180.0).contains(&p.lng_deg));
            }
        }
    }

    #[test]
    fn malformed_or_empty_payload_degrades_to_fallback() {
        let (o, src) = Outlines::from_geojson_or_fallback("{ nope");
        assert_eq!(src, OutlineSource::Fallback);
        assert_eq!(o, Outlines::fallback());

        let (_, src) =
            Outlines::from_geojson_or_fallback(r#"{"type":"FeatureCollection","features":[]}"#);
        assert_eq!(src, OutlineSource::Fallback);
    }

    #[test]
    fn valid_payload_is_loaded() {
        let payload = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{},"geometry":{"type":"LineString","coordinates":[[0,0],[10,0]]}},
            {"type":"Feature","properties":{},"geometry":{"type":"LineString","coordinates":[[5,5]]}}
        ]}"#;
        let (o, src) = Outlines::from_geojson_or_fallback(payload);
        assert_eq!(src, OutlineSource::Loaded);
        assert_eq!(o.stats().lines, 1);
    }

    #[test]
    fn edges_are_densified_on_the_sphere() {
        let o = Outlines::from_geojson_str(
            r#"{"type":"Feature","properties":{},"geometry":{"type":"LineString","coordinates":[[0,0],[10,0]]}}"#,
        )
        .unwrap();
        let positions = o.line_list_positions(1.001, 2.0);
        assert_eq!(positions.len(), 2 * 5);
        for p in &positions {
            let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            assert!((r - 1.001).abs() < 1e-5);
        }
    }

    #[test]
    fn fallback_exports_as_geojson() {
        let fc = Outlines::fallback_feature_collection();
        let text = fc.to_geojson_string().unwrap();
        let reparsed = Outlines::from_geojson_str(&text).unwrap();
        assert_eq!(reparsed.stats(), Outlines::fallback().stats());
    }
}
