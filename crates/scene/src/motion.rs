//! Live entity set: snapshot merging and dead-reckoning between snapshots.

use std::collections::HashMap;

use foundation::math::{METERS_PER_DEGREE, shortest_lng_delta, wrap_lng_deg};
use serde::Deserialize;
use tracing::debug;

use crate::entity::{Entity, EntitySnapshot};

/// Below this `|cos(lat)|` the longitude step is suppressed.
const POLE_COS_EPSILON: f64 = 1e-6;

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MotionConfig {
    /// Fraction of the lat/lng gap closed per snapshot for known entities.
    pub snapshot_blend: f64,
    pub meters_per_degree: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            snapshot_blend: 0.3,
            meters_per_degree: METERS_PER_DEGREE,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub duplicates: usize,
}

/// Owns every live entity, in the order of the latest snapshot.
#[derive(Debug, Clone, Default)]
pub struct MotionModel {
    config: MotionConfig,
    entities: Vec<Entity>,
    index: HashMap<String, usize>,
}

impl MotionModel {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            entities: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Merges a full-replacement snapshot.
    ///
    /// Known ids keep their identity: attributes are replaced outright while
    /// lat/lng move `snapshot_blend` of the way to the reported position.
    /// Unknown ids are inserted at their reported position; ids absent from
    /// `snapshot` are dropped. For duplicate ids the first record wins.
    pub fn apply_snapshot(&mut self, snapshot: Vec<EntitySnapshot>) -> SnapshotStats {
        let blend = self.config.snapshot_blend.clamp(0.0, 1.0);
        let old_index = std::mem::take(&mut self.index);
        let mut previous: Vec<Option<Entity>> = std::mem::take(&mut self.entities)
            .into_iter()
            .map(Some)
            .collect();

        let mut stats = SnapshotStats::default();
        let mut entities = Vec::with_capacity(snapshot.len());
        let mut index = HashMap::with_capacity(snapshot.len());

        for record in snapshot {
            if index.contains_key(&record.id) {
                stats.duplicates += 1;
                continue;
            }

            let existing = old_index
                .get(&record.id)
                .and_then(|&i| previous.get_mut(i))
                .and_then(Option::take);

            let entity = match existing {
                Some(mut entity) => {
                    let target_lng = wrap_lng_deg(record.lng);
                    let lat = entity.position.lat_deg;
                    let lng = entity.position.lng_deg;
                    entity.position.lat_deg = lat + (record.lat - lat) * blend;
                    entity.position.lng_deg =
                        wrap_lng_deg(lng + shortest_lng_delta(lng, target_lng) * blend);
                    entity.replace_attributes(record);
                    stats.updated += 1;
                    entity
                }
                None => {
                    stats.inserted += 1;
                    Entity::from(record)
                }
            };

            index.insert(entity.id.clone(), entities.len());
            entities.push(entity);
        }

        stats.removed = previous.iter().filter(|e| e.is_some()).count();
        self.entities = entities;
        self.index = index;

        debug!(
            inserted = stats.inserted,
            updated = stats.updated,
            removed = stats.removed,
            duplicates = stats.duplicates,
            "applied entity snapshot"
        );
        stats
    }

    /// Dead-reckons every entity forward by `dt_s` seconds.
    pub fn integrate(&mut self, dt_s: f64) {
        let dt = dt_s.max(0.0);
        if dt == 0.0 {
            return;
        }
        let mpd = self.config.meters_per_degree;

        for e in &mut self.entities {
            let v = e.kinematics.ground_speed_ms;
            let (sin_h, cos_h) = e.kinematics.heading_deg.to_radians().sin_cos();
            let cos_lat = e.position.lat_deg.to_radians().cos();

            let d_lat = v * cos_h * dt / mpd;
            let d_lng = if cos_lat.abs() < POLE_COS_EPSILON {
                0.0
            } else {
                v * sin_h * dt / (mpd * cos_lat)
            };

            e.position.lat_deg = (e.position.lat_deg + d_lat).clamp(-90.0, 90.0);
            e.position.lng_deg = wrap_lng_deg(e.position.lng_deg + d_lng);
        }
    }

    /// Closest entity within `max_deg`, measured as squared degrees with the
    /// longitude delta corrected for the antimeridian. The threshold is
    /// inclusive; ties keep the earlier entity.
    pub fn find_nearest(&self, lat_deg: f64, lng_deg: f64, max_deg: f64) -> Option<&str> {
        let lng_deg = wrap_lng_deg(lng_deg);
        let max_sq = max_deg * max_deg;
        let mut best: Option<(f64, usize)> = None;

        for (i, e) in self.entities.iter().enumerate() {
            let d_lat = e.position.lat_deg - lat_deg;
            let d_lng = shortest_lng_delta(lng_deg, e.position.lng_deg);
            let d2 = d_lat * d_lat + d_lng * d_lng;
            if d2 > max_sq {
                continue;
            }
            if best.is_none_or(|(best_d2, _)| d2 < best_d2) {
                best = Some((d2, i));
            }
        }

        best.map(|(_, i)| self.entities[i].id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.index.get(id).map(|&i| &self.entities[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Entities in snapshot order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{MotionConfig, MotionModel};
    use crate::entity::EntitySnapshot;
    use pretty_assertions::assert_eq;

    fn snap(id: &str, lat: f64, lng: f64) -> EntitySnapshot {
        EntitySnapshot {
            id: id.to_string(),
            lat,
            lng,
            altitude_meters: 10_000.0,
            ground_speed_ms: 250.0,
            heading_deg: 45.0,
            vertical_rate_ms: 0.0,
            callsign: None,
            squawk: None,
            category_code: 3,
            last_contact_epoch: None,
            barometric_altitude_meters: None,
            special_purpose_flag: false,
        }
    }

    fn model_with(records: Vec<EntitySnapshot>) -> MotionModel {
        let mut m = MotionModel::new(MotionConfig::default());
        m.apply_snapshot(records);
        m
    }

    fn ids(m: &MotionModel) -> Vec<&str> {
        m.entities().iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn known_entities_blend_and_replace_kinematics() {
        let mut m = model_with(vec![snap("a", 10.0, 10.0)]);
        let mut update = snap("a", 20.0, 20.0);
        update.heading_deg = 270.0;
        update.altitude_meters = 3_000.0;
        m.apply_snapshot(vec![update]);

        let a = m.get("a").unwrap();
        assert!((a.position.lat_deg - 13.0).abs() < 1e-12);
        assert!((a.position.lng_deg - 13.0).abs() < 1e-12);
        assert_eq!(a.kinematics.heading_deg, 270.0);
        assert_eq!(a.altitude_m, 3_000.0);
    }

    #[test]
    fn blend_takes_the_short_way_across_the_antimeridian() {
        let mut m = model_with(vec![snap("a", 0.0, 179.0)]);
        m.apply_snapshot(vec![snap("a", 0.0, -179.0)]);
        let lng = m.get("a").unwrap().position.lng_deg;
        assert!((lng - 179.6).abs() < 1e-9, "lng = {lng}");

        m.apply_snapshot(vec![snap("a", 0.0, -179.0)]);
        m.apply_snapshot(vec![snap("a", 0.0, -179.0)]);
        let lng = m.get("a").unwrap().position.lng_deg;
        assert!((-180.0..=180.0).contains(&lng));
    }

    #[test]
    fn repeated_identical_snapshots_converge_monotonically() {
        let mut m = model_with(vec![snap("a", 0.0, 0.0)]);
        let target = snap("a", 4.0, -8.0);
        let mut last_gap = f64::INFINITY;
        for _ in 0..10 {
            m.apply_snapshot(vec![target.clone()]);
            let p = m.get("a").unwrap().position;
            let gap = ((p.lat_deg - 4.0).powi(2) + (p.lng_deg + 8.0).powi(2)).sqrt();
            assert!(gap < last_gap);
            // Never overshoots the target.
            assert!(p.lat_deg <= 4.0 && p.lng_deg >= -8.0);
            last_gap = gap;
        }
    }

    #[test]
    fn snapshot_inserts_drops_and_keeps_first_duplicate() {
        let mut m = model_with(vec![snap("a", 1.0, 1.0), snap("b", 2.0, 2.0)]);
        let stats = m.apply_snapshot(vec![
            snap("c", 3.0, 3.0),
            snap("a", 1.0, 1.0),
            snap("c", 50.0, 50.0),
        ]);

        assert_eq!(ids(&m), vec!["c", "a"]);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(m.get("c").unwrap().position.lat_deg, 3.0);
        assert!(m.get("b").is_none());
    }

    #[test]
    fn integrate_moves_at_most_speed_times_dt() {
        let mut records = Vec::new();
        for (i, (lat, lng, heading)) in [
            (0.0, 0.0, 0.0),
            (45.0, 179.99, 90.0),
            (-60.0, -179.99, 250.0),
            (89.9999, 20.0, 10.0),
            (30.0, 100.0, 135.0),
        ]
        .into_iter()
        .enumerate()
        {
            let mut r = snap(&format!("e{i}"), lat, lng);
            r.heading_deg = heading;
            records.push(r);
        }
        let mut m = model_with(records);

        for dt in [0.0, 0.016, 0.1, 5.0] {
            let before: Vec<_> = m.entities().iter().map(|e| e.position).collect();
            m.integrate(dt);
            for (e, old) in m.entities().iter().zip(before) {
                let bound = e.kinematics.ground_speed_ms * dt / 111_320.0;
                let d_lat = e.position.lat_deg - old.lat_deg;
                let d_lng = foundation::math::shortest_lng_delta(old.lng_deg, e.position.lng_deg)
                    * old.lat_deg.to_radians().cos();
                let moved = (d_lat * d_lat + d_lng * d_lng).sqrt();
                assert!(moved <= bound + 1e-9, "{}: moved {moved} > {bound}", e.id);
                assert!((-180.0..=180.0).contains(&e.position.lng_deg));
                assert!((-90.0..=90.0).contains(&e.position.lat_deg));
            }
        }
    }

    #[test]
    fn integrate_ignores_negative_dt() {
        let mut m = model_with(vec![snap("a", 10.0, 10.0)]);
        m.integrate(-1.0);
        assert_eq!(m.get("a").unwrap().position.lat_deg, 10.0);
    }

    #[test]
    fn integrate_wraps_across_antimeridian() {
        let mut r = snap("a", 0.0, 179.999);
        r.heading_deg = 90.0;
        let mut m = model_with(vec![r]);
        m.integrate(1.0);
        let lng = m.get("a").unwrap().position.lng_deg;
        assert!(lng < -179.0, "lng = {lng}");
    }

    #[test]
    fn find_nearest_uses_wraparound_distance() {
        let m = model_with(vec![
            snap("west", 0.0, 177.0),
            snap("east", 0.0, -179.8),
            snap("far", 40.0, 0.0),
        ]);
        assert_eq!(m.find_nearest(0.0, 179.5, 5.0), Some("east"));
        assert_eq!(m.find_nearest(0.0, 177.2, 5.0), Some("west"));
        assert_eq!(m.find_nearest(-40.0, 0.0, 5.0), None);
    }

    #[test]
    fn find_nearest_threshold_is_inclusive() {
        let m = model_with(vec![snap("a", 3.0, 4.0)]);
        assert_eq!(m.find_nearest(0.0, 0.0, 5.0), Some("a"));
        assert_eq!(m.find_nearest(0.0, 0.0, 4.999), None);
    }
}
