//! Per-frame instance buffers for the aircraft icons.
//!
//! Buffers are rebuilt from the motion model every frame, never diffed. Each
//! size class owns one bucket which the renderer draws with a single
//! instanced call.

use foundation::math::{GLOBE_RADIUS, Mat4, Vec3, mat4_from_cols, to_cartesian, unit_normal};
use serde::Deserialize;

use crate::entity::Entity;
use crate::motion::MotionModel;

/// Upper bound on simultaneously rendered entities.
///
/// Feed layers that trim their own lists before handing them to the engine
/// must use this same value.
pub const MAX_RENDERED_ENTITIES: usize = 6000;

/// Visual size bucket derived from the ADS-B emitter category.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SizeClass {
    Light,
    Medium,
    Heavy,
}

impl SizeClass {
    pub const ALL: [SizeClass; 3] = [SizeClass::Light, SizeClass::Medium, SizeClass::Heavy];

    pub fn classify(category_code: u32) -> Self {
        match category_code {
            5..=6 => SizeClass::Heavy,
            2 | 8..=u32::MAX => SizeClass::Light,
            _ => SizeClass::Medium,
        }
    }

    pub fn index(self) -> usize {
        match self {
            SizeClass::Light => 0,
            SizeClass::Medium => 1,
            SizeClass::Heavy => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstanceConfig {
    pub render_cap: usize,
    /// Icon half-span per class, in globe radii.
    pub light_size: f64,
    pub medium_size: f64,
    pub heavy_size: f64,
    /// Extra scale applied to the selected entity's mesh.
    pub selected_scale: f64,
    /// Constant lift above the surface, in globe radii.
    pub base_lift: f64,
    /// Additional lift reached at `reference_altitude_m`.
    pub max_lift: f64,
    pub reference_altitude_m: f64,
    /// Lift of the stem's surface anchor.
    pub stem_anchor_lift: f64,
    /// Latitude offset of the point used to find local north.
    pub north_reference_deg: f64,
    pub light_color: [f32; 4],
    pub medium_color: [f32; 4],
    pub heavy_color: [f32; 4],
    pub special_color: [f32; 4],
    pub selected_color: [f32; 4],
    pub stem_alpha: f32,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            render_cap: MAX_RENDERED_ENTITIES,
            light_size: 0.007,
            medium_size: 0.010,
            heavy_size: 0.014,
            selected_scale: 1.8,
            base_lift: 0.006,
            max_lift: 0.03,
            reference_altitude_m: 12_000.0,
            stem_anchor_lift: 0.001,
            north_reference_deg: 0.5,
            light_color: [0.55, 0.85, 1.0, 1.0],
            medium_color: [1.0, 0.82, 0.35, 1.0],
            heavy_color: [1.0, 0.55, 0.25, 1.0],
            special_color: [1.0, 0.2, 0.25, 1.0],
            selected_color: [0.3, 1.0, 0.55, 1.0],
            stem_alpha: 0.35,
        }
    }
}

impl InstanceConfig {
    pub fn size_of(&self, class: SizeClass) -> f64 {
        match class {
            SizeClass::Light => self.light_size,
            SizeClass::Medium => self.medium_size,
            SizeClass::Heavy => self.heavy_size,
        }
    }

    fn color_of(&self, class: SizeClass) -> [f32; 4] {
        match class {
            SizeClass::Light => self.light_color,
            SizeClass::Medium => self.medium_color,
            SizeClass::Heavy => self.heavy_color,
        }
    }

    /// Radius of an icon flying at `altitude_m`.
    pub fn elevated_radius(&self, altitude_m: f64) -> f64 {
        let t = if self.reference_altitude_m > 0.0 {
            (altitude_m.max(0.0) / self.reference_altitude_m).min(1.0)
        } else {
            0.0
        };
        GLOBE_RADIUS * (1.0 + self.base_lift + t * self.max_lift)
    }
}

/// One instance slot: a model transform and a color.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Instance {
    pub model: Mat4,
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StemVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

/// Orthonormal frame of an icon on the sphere.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IconBasis {
    pub normal: Vec3,
    pub north: Vec3,
    pub east: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
}

/// Local frame at (`lat_deg`, `lng_deg`) with `forward` along `heading_deg`.
///
/// North is found by projecting a point `north_ref_deg` further north onto the
/// tangent plane; at the north pole a point further south is used with the
/// sign flipped.
pub fn icon_basis(lat_deg: f64, lng_deg: f64, heading_deg: f64, north_ref_deg: f64) -> IconBasis {
    let normal = unit_normal(lat_deg, lng_deg);
    let step = north_ref_deg.abs().max(1e-3);
    let (ref_lat, sign) = if lat_deg + step <= 90.0 {
        (lat_deg + step, 1.0)
    } else {
        (lat_deg - step, -1.0)
    };
    let reference = unit_normal(ref_lat, lng_deg);
    let tangent = reference - normal * reference.dot(normal);
    let north = match tangent.try_normalize() {
        Some(t) => t * sign,
        None => fallback_tangent(normal),
    };
    let east = north.cross(normal);

    let (sin_h, cos_h) = heading_deg.to_radians().sin_cos();
    IconBasis {
        normal,
        north,
        east,
        forward: north * cos_h + east * sin_h,
        right: east * cos_h - north * sin_h,
    }
}

fn fallback_tangent(normal: Vec3) -> Vec3 {
    let axis = if normal.y.abs() < 0.9 { Vec3::Y } else { Vec3::Z };
    (axis - normal * axis.dot(normal)).normalize_or(Vec3::X)
}

/// The selected entity, drawn with its own mesh.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SelectedInstance {
    pub class: SizeClass,
    pub entity_index: usize,
    pub instance: Instance,
}

#[derive(Debug, Clone, Default)]
pub struct Bucket {
    instances: Vec<Instance>,
    entity_indices: Vec<usize>,
}

impl Bucket {
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Index into [`MotionModel::entities`] for each slot.
    pub fn entity_indices(&self) -> &[usize] {
        &self.entity_indices
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn clear(&mut self) {
        self.instances.clear();
        self.entity_indices.clear();
    }

    fn push(&mut self, instance: Instance, entity_index: usize) {
        self.instances.push(instance);
        self.entity_indices.push(entity_index);
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstancedRenderSet {
    config: InstanceConfig,
    buckets: [Bucket; 3],
    stems: Vec<StemVertex>,
    selected: Option<SelectedInstance>,
}

impl InstancedRenderSet {
    pub fn new(config: InstanceConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn render_cap(&self) -> usize {
        self.config.render_cap
    }

    /// Refills every bucket from the first `render_cap` entities. Entities past
    /// the cap are left out of this frame.
    pub fn rebuild(&mut self, motion: &MotionModel, selected: Option<&str>) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.stems.clear();
        self.selected = None;

        for (i, entity) in motion
            .entities()
            .iter()
            .take(self.config.render_cap)
            .enumerate()
        {
            let is_selected = selected == Some(entity.id.as_str());
            self.push_entity(i, entity, is_selected);
        }
    }

    fn push_entity(&mut self, entity_index: usize, entity: &Entity, is_selected: bool) {
        let cfg = &self.config;
        let class = SizeClass::classify(entity.category_code);
        let lat = entity.position.lat_deg;
        let lng = entity.position.lng_deg;
        let basis = icon_basis(lat, lng, entity.kinematics.heading_deg, cfg.north_reference_deg);
        let position = basis.normal * cfg.elevated_radius(entity.altitude_m);
        let size = cfg.size_of(class);

        let color = if is_selected {
            cfg.selected_color
        } else if entity.display.special_purpose {
            cfg.special_color
        } else {
            cfg.color_of(class)
        };

        let scaled = |s: f64| {
            mat4_from_cols(basis.right * s, basis.forward * s, basis.normal * s, position)
        };

        let slot_model = if is_selected {
            // The selected mesh draws this entity; keep the slot but collapse it.
            scaled(0.0)
        } else {
            scaled(size)
        };
        if is_selected {
            self.selected = Some(SelectedInstance {
                class,
                entity_index,
                instance: Instance {
                    model: scaled(size * cfg.selected_scale),
                    color,
                },
            });
        }

        let anchor = to_cartesian(lat, lng, GLOBE_RADIUS * (1.0 + cfg.stem_anchor_lift));
        let stem_color = [color[0], color[1], color[2], color[3] * cfg.stem_alpha];
        self.stems.push(StemVertex {
            position: anchor.to_f32(),
            color: stem_color,
        });
        self.stems.push(StemVertex {
            position: position.to_f32(),
            color: stem_color,
        });

        self.buckets[class.index()].push(
            Instance {
                model: slot_model,
                color,
            },
            entity_index,
        );
    }

    pub fn bucket(&self, class: SizeClass) -> &Bucket {
        &self.buckets[class.index()]
    }

    /// Stem line list: two vertices per rendered entity.
    pub fn stems(&self) -> &[StemVertex] {
        &self.stems
    }

    pub fn selected(&self) -> Option<&SelectedInstance> {
        self.selected.as_ref()
    }

    pub fn rendered_count(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntitySnapshot;
    use crate::motion::{MotionConfig, MotionModel};

    fn snap(id: String, lat: f64, lng: f64, category_code: u32) -> EntitySnapshot {
        EntitySnapshot {
            id,
            lat,
            lng,
            altitude_meters: 9_000.0,
            ground_speed_ms: 200.0,
            heading_deg: 30.0,
            vertical_rate_ms: 0.0,
            callsign: None,
            squawk: None,
            category_code,
            last_contact_epoch: None,
            barometric_altitude_meters: None,
            special_purpose_flag: false,
        }
    }

    fn motion_with(count: usize) -> MotionModel {
        let mut m = MotionModel::new(MotionConfig::default());
        let records = (0..count)
            .map(|i| {
                let lat = (i % 160) as f64 - 80.0;
                let lng = ((i * 7) % 360) as f64 - 180.0;
                snap(format!("ac{i}"), lat, lng, (i % 8) as u32)
            })
            .collect();
        m.apply_snapshot(records);
        m
    }

    fn assert_close(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() <= eps, "expected {a} ~= {b}");
    }

    #[test]
    fn classification_ranges() {
        assert_eq!(SizeClass::classify(0), SizeClass::Medium);
        assert_eq!(SizeClass::classify(1), SizeClass::Medium);
        assert_eq!(SizeClass::classify(2), SizeClass::Light);
        assert_eq!(SizeClass::classify(3), SizeClass::Medium);
        assert_eq!(SizeClass::classify(4), SizeClass::Medium);
        assert_eq!(SizeClass::classify(5), SizeClass::Heavy);
        assert_eq!(SizeClass::classify(6), SizeClass::Heavy);
        assert_eq!(SizeClass::classify(7), SizeClass::Medium);
        assert_eq!(SizeClass::classify(8), SizeClass::Light);
        assert_eq!(SizeClass::classify(14), SizeClass::Light);
        assert_eq!(SizeClass::classify(20), SizeClass::Light);
    }

    #[test]
    fn basis_is_orthonormal_and_right_handed() {
        for (lat, lng, heading) in [
            (0.0, 0.0, 0.0),
            (51.5, -0.1, 73.0),
            (-33.9, 151.2, 200.0),
            (90.0, 0.0, 45.0),
            (-90.0, 12.0, 300.0),
            (89.9, 179.0, 10.0),
        ] {
            let b = icon_basis(lat, lng, heading, 0.5);
            for v in [b.normal, b.north, b.east, b.forward, b.right] {
                assert_close(v.length(), 1.0, 1e-9);
            }
            assert_close(b.forward.dot(b.normal), 0.0, 1e-9);
            assert_close(b.right.dot(b.forward), 0.0, 1e-9);
            let n = b.right.cross(b.forward);
            assert_close((n - b.normal).length(), 0.0, 1e-9);
        }
    }

    #[test]
    fn heading_rotates_forward_from_north_to_east() {
        let b0 = icon_basis(0.0, 0.0, 0.0, 0.5);
        assert_close((b0.forward - Vec3::Y).length(), 0.0, 1e-9);
        assert_close((b0.east - Vec3::X).length(), 0.0, 1e-9);

        let b90 = icon_basis(0.0, 0.0, 90.0, 0.5);
        assert_close((b90.forward - Vec3::X).length(), 0.0, 1e-9);
        assert_close((b90.right + Vec3::Y).length(), 0.0, 1e-9);
    }

    #[test]
    fn elevated_radius_saturates() {
        let cfg = InstanceConfig::default();
        assert_close(cfg.elevated_radius(-50.0), 1.0 + cfg.base_lift, 1e-12);
        assert_close(
            cfg.elevated_radius(6_000.0),
            1.0 + cfg.base_lift + 0.5 * cfg.max_lift,
            1e-12,
        );
        assert_eq!(cfg.elevated_radius(12_000.0), cfg.elevated_radius(40_000.0));
    }

    #[test]
    fn render_cap_excludes_overflow_entities() {
        let motion = motion_with(MAX_RENDERED_ENTITIES + 1);
        let mut set = InstancedRenderSet::new(InstanceConfig::default());
        set.rebuild(&motion, None);

        assert_eq!(set.rendered_count(), MAX_RENDERED_ENTITIES);
        assert_eq!(set.stems().len(), 2 * MAX_RENDERED_ENTITIES);
        let last = MAX_RENDERED_ENTITIES;
        assert_eq!(motion.entities()[last].id, format!("ac{last}"));
        for class in SizeClass::ALL {
            assert!(!set.bucket(class).entity_indices().contains(&last));
        }
    }

    #[test]
    fn buckets_follow_classification() {
        let motion = motion_with(16);
        let mut set = InstancedRenderSet::new(InstanceConfig::default());
        set.rebuild(&motion, None);
        for class in SizeClass::ALL {
            for &i in set.bucket(class).entity_indices() {
                assert_eq!(SizeClass::classify(motion.entities()[i].category_code), class);
            }
        }
        assert_eq!(set.rendered_count(), 16);
    }

    #[test]
    fn selected_entity_is_drawn_once_at_larger_scale() {
        let motion = motion_with(10);
        let cfg = InstanceConfig::default();
        let mut set = InstancedRenderSet::new(cfg.clone());
        set.rebuild(&motion, Some("ac5"));

        let selected = set.selected().copied().unwrap();
        assert_eq!(selected.entity_index, 5);
        assert_eq!(selected.class, SizeClass::Heavy);
        assert_eq!(selected.instance.color, cfg.selected_color);

        let bucket = set.bucket(SizeClass::Heavy);
        let slot = bucket.entity_indices().iter().position(|&i| i == 5).unwrap();
        let collapsed = bucket.instances()[slot].model;
        assert_eq!(collapsed[0], [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(collapsed[1], [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(collapsed[2], [0.0, 0.0, 0.0, 0.0]);

        let sel_right = selected.instance.model[0];
        let span = (sel_right[0].powi(2) + sel_right[1].powi(2) + sel_right[2].powi(2)).sqrt();
        assert!((span as f64 - cfg.heavy_size * cfg.selected_scale).abs() < 1e-6);
        // Translation is kept so the stem and the selected mesh line up.
        assert_eq!(collapsed[3], selected.instance.model[3]);
    }

    #[test]
    fn selection_beyond_cap_is_not_drawn() {
        let motion = motion_with(12);
        let mut set = InstancedRenderSet::new(InstanceConfig {
            render_cap: 10,
            ..InstanceConfig::default()
        });
        set.rebuild(&motion, Some("ac11"));
        assert!(set.selected().is_none());
        assert_eq!(set.rendered_count(), 10);

        set.rebuild(&motion, None);
        assert_eq!(set.rendered_count(), 10);
    }

    #[test]
    fn special_purpose_entities_use_alert_color() {
        let mut motion = MotionModel::new(MotionConfig::default());
        let mut s = snap("sq7700".to_string(), 10.0, 10.0, 3);
        s.special_purpose_flag = true;
        motion.apply_snapshot(vec![s]);
        let cfg = InstanceConfig::default();
        let mut set = InstancedRenderSet::new(cfg.clone());
        set.rebuild(&motion, None);
        assert_eq!(set.bucket(SizeClass::Medium).instances()[0].color, cfg.special_color);
    }
}
