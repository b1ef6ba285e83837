pub mod geojson;
pub mod outlines;

pub use geojson::{Feature, FeatureCollection, GeoJsonError, Geometry};
pub use outlines::{OutlineSource, OutlineStats, Outlines};
