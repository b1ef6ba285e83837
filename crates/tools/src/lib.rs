//! Offline helpers behind `flightctl`: synthetic feeds, outline checks and
//! motion simulation without a browser.

use std::path::{Path, PathBuf};

use foundation::math::METERS_PER_DEGREE;
use formats::{GeoJsonError, OutlineSource, OutlineStats, Outlines};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use scene::{Entity, EntitySnapshot, MotionConfig, MotionModel};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    GeoJson(#[from] GeoJsonError),
    #[error("{0}")]
    Invalid(String),
}

pub fn read_file(path: &Path) -> Result<String, ToolError> {
    std::fs::read_to_string(path).map_err(|source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_file(path: &Path, contents: &str) -> Result<(), ToolError> {
    std::fs::write(path, contents).map_err(|source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// Category codes cycled by the synthetic feed; covers every size class.
const SYNTH_CATEGORIES: [u32; 7] = [1, 2, 3, 4, 5, 6, 8];

/// Deterministic feed of `count` cruising aircraft spread evenly by area.
pub fn synth_feed(count: usize, seed: u64) -> Vec<EntitySnapshot> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let lat = (rng.gen_range(-1.0f64..1.0)).asin().to_degrees().clamp(-85.0, 85.0);
            let lng = rng.gen_range(-180.0..180.0);
            let category_code = SYNTH_CATEGORIES[rng.gen_range(0..SYNTH_CATEGORIES.len())];
            EntitySnapshot {
                id: format!("{:06x}", 0xa0_0000 + i),
                lat,
                lng,
                altitude_meters: rng.gen_range(0.0..12_500.0),
                ground_speed_ms: rng.gen_range(60.0..280.0),
                heading_deg: rng.gen_range(0.0..360.0),
                vertical_rate_ms: rng.gen_range(-15.0..15.0),
                callsign: Some(format!("SYN{i:04}")),
                squawk: Some(format!("{:04o}", rng.gen_range(0..0o7777))),
                category_code,
                last_contact_epoch: None,
                barometric_altitude_meters: None,
                special_purpose_flag: rng.gen_bool(0.002),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineReport {
    pub source: &'static str,
    pub lines: usize,
    pub vertices: usize,
}

impl OutlineReport {
    fn new(source: OutlineSource, stats: OutlineStats) -> Self {
        Self {
            source: match source {
                OutlineSource::Loaded => "loaded",
                OutlineSource::Fallback => "fallback",
            },
            lines: stats.lines,
            vertices: stats.vertices,
        }
    }
}

/// Reports what the engine would install for `payload`.
pub fn check_outlines(payload: &str) -> OutlineReport {
    if let Err(err) = Outlines::from_geojson_str(payload) {
        warn!(%err, "boundary file rejected");
    }
    let (outlines, source) = Outlines::from_geojson_or_fallback(payload);
    OutlineReport::new(source, outlines.stats())
}

pub fn fallback_outlines_geojson() -> Result<String, ToolError> {
    Ok(Outlines::fallback_feature_collection().to_geojson_string_pretty()?)
}

/// Integrates `snapshot` for `seconds` in steps of at most `dt_s`, returning
/// the final state as snapshot records.
pub fn simulate(
    snapshot: Vec<EntitySnapshot>,
    seconds: f64,
    dt_s: f64,
) -> Result<Vec<EntitySnapshot>, ToolError> {
    if !(dt_s > 0.0 && dt_s.is_finite()) {
        return Err(ToolError::Invalid(format!("dt must be positive, got {dt_s}")));
    }
    if !(seconds >= 0.0 && seconds.is_finite()) {
        return Err(ToolError::Invalid(format!(
            "seconds must be non-negative, got {seconds}"
        )));
    }

    let mut motion = MotionModel::new(MotionConfig::default());
    let stats = motion.apply_snapshot(snapshot);
    debug!(?stats, "snapshot loaded");

    let mut remaining = seconds;
    let mut steps = 0u64;
    while remaining > 0.0 {
        let dt = remaining.min(dt_s);
        motion.integrate(dt);
        remaining -= dt;
        steps += 1;
    }
    info!(
        entities = motion.len(),
        steps,
        seconds,
        max_drift_deg = max_drift_deg(&motion, seconds),
        "simulation finished"
    );
    Ok(motion.iter().map(to_snapshot).collect())
}

/// Upper bound on how far any entity could have moved, in degrees.
fn max_drift_deg(motion: &MotionModel, seconds: f64) -> f64 {
    motion
        .iter()
        .map(|e| e.kinematics.ground_speed_ms * seconds / METERS_PER_DEGREE)
        .fold(0.0, f64::max)
}

fn to_snapshot(entity: &Entity) -> EntitySnapshot {
    EntitySnapshot {
        id: entity.id.clone(),
        lat: entity.position.lat_deg,
        lng: entity.position.lng_deg,
        altitude_meters: entity.altitude_m,
        ground_speed_ms: entity.kinematics.ground_speed_ms,
        heading_deg: entity.kinematics.heading_deg,
        vertical_rate_ms: entity.kinematics.vertical_rate_ms,
        callsign: entity.display.callsign.clone(),
        squawk: entity.display.squawk.clone(),
        category_code: entity.category_code,
        last_contact_epoch: entity.display.last_contact_epoch,
        barometric_altitude_meters: entity.display.barometric_altitude_m,
        special_purpose_flag: entity.display.special_purpose,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn assert_close(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() <= eps, "{a} vs {b}");
    }

    #[test]
    fn synth_feed_is_deterministic_per_seed() {
        assert_eq!(synth_feed(50, 7), synth_feed(50, 7));
        assert_ne!(synth_feed(50, 7), synth_feed(50, 8));
    }

    #[test]
    fn synth_feed_ids_are_unique_and_positions_valid() {
        let feed = synth_feed(6001, 1);
        assert_eq!(feed.len(), 6001);
        let ids: HashSet<&str> = feed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), 6001);
        for s in &feed {
            assert!((-85.0..=85.0).contains(&s.lat));
            assert!((-180.0..180.0).contains(&s.lng));
            assert!(SYNTH_CATEGORIES.contains(&s.category_code));
        }
    }

    #[test]
    fn simulate_moves_an_eastbound_entity_along_the_equator() {
        let mut feed = synth_feed(1, 3);
        feed[0].lat = 0.0;
        feed[0].lng = 10.0;
        feed[0].heading_deg = 90.0;
        feed[0].ground_speed_ms = 200.0;
        feed[0].vertical_rate_ms = 0.0;

        let out = simulate(feed, 10.0, 0.25).unwrap();
        assert_eq!(out.len(), 1);
        assert_close(out[0].lat, 0.0, 1e-6);
        assert_close(out[0].lng, 10.0 + 2000.0 / METERS_PER_DEGREE, 1e-6);
        assert_eq!(out[0].callsign.as_deref(), Some("SYN0000"));
    }

    #[test]
    fn simulate_with_zero_seconds_returns_the_input_positions() {
        let feed = synth_feed(5, 9);
        let out = simulate(feed.clone(), 0.0, 0.1).unwrap();
        for (a, b) in feed.iter().zip(&out) {
            assert_eq!(a.id, b.id);
            assert_close(a.lat, b.lat, 1e-12);
            assert_close(a.lng, b.lng, 1e-12);
        }
    }

    #[test]
    fn simulate_rejects_non_positive_dt() {
        assert!(matches!(simulate(Vec::new(), 1.0, 0.0), Err(ToolError::Invalid(_))));
        assert!(matches!(simulate(Vec::new(), -1.0, 0.1), Err(ToolError::Invalid(_))));
    }

    #[test]
    fn unusable_boundary_files_report_the_fallback() {
        let report = check_outlines("{ not geojson");
        assert_eq!(report.source, "fallback");
        assert!(report.lines > 0);
    }

    #[test]
    fn fallback_dataset_loads_as_real_outlines() {
        let payload = fallback_outlines_geojson().unwrap();
        let report = check_outlines(&payload);
        assert_eq!(report.source, "loaded");
        assert_eq!(report.lines, Outlines::fallback().stats().lines);
    }
}
