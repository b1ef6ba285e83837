use foundation::math::{GLOBE_RADIUS, GeoPoint, Quat, Vec3, from_cartesian};
use serde::Deserialize;

use crate::motion::MotionModel;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    /// `dir` is normalized; a zero direction yields `None`.
    pub fn new(origin: Vec3, dir: Vec3) -> Option<Self> {
        Some(Self {
            origin,
            dir: dir.try_normalize()?,
        })
    }

    pub fn at(&self, t: f64) -> Vec3 {
        self.origin + self.dir * t
    }

    /// Distance to the first intersection with a sphere at the origin, or
    /// `None` when the ray misses or the sphere lies behind it.
    pub fn intersect_sphere(&self, radius: f64) -> Option<f64> {
        let b = self.origin.dot(self.dir);
        let c = self.origin.length_squared() - radius * radius;
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let s = disc.sqrt();
        let t0 = -b - s;
        let t1 = -b + s;
        if t0 >= 0.0 {
            Some(t0)
        } else if t1 >= 0.0 {
            Some(t1)
        } else {
            None
        }
    }
}

/// Camera parameters needed to turn a screen coordinate into a world ray.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraView {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_rad: f64,
    pub width_px: f64,
    pub height_px: f64,
}

impl CameraView {
    pub fn aspect(&self) -> f64 {
        self.width_px / self.height_px.max(1.0)
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.eye).normalize_or(-Vec3::Z)
    }

    /// Ray from the eye through pixel (`x_px`, `y_px`), origin top-left.
    pub fn ray_through(&self, x_px: f64, y_px: f64) -> Option<Ray> {
        if self.width_px < 1.0 || self.height_px < 1.0 {
            return None;
        }
        let ndc_x = 2.0 * x_px / self.width_px - 1.0;
        let ndc_y = 1.0 - 2.0 * y_px / self.height_px;

        let forward = self.forward();
        let right = forward.cross(self.up).try_normalize()?;
        let up = right.cross(forward);
        let tan_half = (0.5 * self.fov_y_rad).tan();

        let dir = forward
            + right * (ndc_x * tan_half * self.aspect())
            + up * (ndc_y * tan_half);
        Ray::new(self.eye, dir)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PickConfig {
    /// Pick sphere radius relative to the globe.
    pub sphere_scale: f64,
    /// Maximum angular distance between the hit and an entity, in degrees.
    pub threshold_deg: f64,
}

impl Default for PickConfig {
    fn default() -> Self {
        Self {
            sphere_scale: 1.02,
            threshold_deg: 5.0,
        }
    }
}

/// Screen coordinate to entity id.
///
/// A ray that misses the pick sphere is an ordinary outcome and resolves to
/// `None`, which callers treat as a deselect.
#[derive(Debug, Copy, Clone, Default)]
pub struct PickingService {
    config: PickConfig,
}

impl PickingService {
    pub fn new(config: PickConfig) -> Self {
        Self { config }
    }

    /// Geographic point under the pointer on the (rotated) pick sphere.
    pub fn pick_geo(
        &self,
        view: &CameraView,
        orientation: Quat,
        x_px: f64,
        y_px: f64,
    ) -> Option<GeoPoint> {
        let ray = view.ray_through(x_px, y_px)?;
        let t = ray.intersect_sphere(GLOBE_RADIUS * self.config.sphere_scale)?;
        Some(from_cartesian(ray.at(t), orientation))
    }

    pub fn resolve<'m>(
        &self,
        motion: &'m MotionModel,
        view: &CameraView,
        orientation: Quat,
        x_px: f64,
        y_px: f64,
    ) -> Option<&'m str> {
        let geo = self.pick_geo(view, orientation, x_px, y_px)?;
        motion.find_nearest(geo.lat_deg, geo.lng_deg, self.config.threshold_deg)
    }
}

#[cfg(test)]
mod tests {
    use super::{CameraView, PickConfig, PickingService, Ray};
    use crate::entity::EntitySnapshot;
    use crate::motion::{MotionConfig, MotionModel};
    use foundation::math::{Quat, Vec3};

    fn view() -> CameraView {
        CameraView {
            eye: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_rad: 45f64.to_radians(),
            width_px: 800.0,
            height_px: 600.0,
        }
    }

    fn motion(points: &[(&str, f64, f64)]) -> MotionModel {
        let mut m = MotionModel::new(MotionConfig::default());
        m.apply_snapshot(
            points
                .iter()
                .map(|&(id, lat, lng)| EntitySnapshot {
                    id: id.to_string(),
                    lat,
                    lng,
                    altitude_meters: 0.0,
                    ground_speed_ms: 0.0,
                    heading_deg: 0.0,
                    vertical_rate_ms: 0.0,
                    callsign: None,
                    squawk: None,
                    category_code: 0,
                    last_contact_epoch: None,
                    barometric_altitude_meters: None,
                    special_purpose_flag: false,
                })
                .collect(),
        );
        m
    }

    #[test]
    fn sphere_intersection_returns_front_face() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 3.0), -Vec3::Z).unwrap();
        let t = ray.intersect_sphere(1.0).unwrap();
        assert!((t - 2.0).abs() < 1e-12);
        let away = Ray::new(Vec3::new(0.0, 0.0, 3.0), Vec3::Z).unwrap();
        assert_eq!(away.intersect_sphere(1.0), None);
    }

    #[test]
    fn center_of_screen_picks_the_facing_entity() {
        let m = motion(&[("front", 1.0, 1.0), ("back", 0.0, 180.0)]);
        let picker = PickingService::new(PickConfig::default());
        let id = picker.resolve(&m, &view(), Quat::IDENTITY, 400.0, 300.0);
        assert_eq!(id, Some("front"));
    }

    #[test]
    fn globe_orientation_is_undone_before_lookup() {
        let m = motion(&[("front", 0.0, 0.0), ("west", 0.0, -90.0)]);
        let picker = PickingService::new(PickConfig::default());
        let orientation = Quat::from_axis_angle(Vec3::Y, std::f64::consts::FRAC_PI_2);
        let id = picker.resolve(&m, &view(), orientation, 400.0, 300.0);
        assert_eq!(id, Some("west"));
    }

    #[test]
    fn miss_and_out_of_threshold_resolve_to_none() {
        let m = motion(&[("front", 0.0, 0.0)]);
        let picker = PickingService::new(PickConfig::default());
        assert_eq!(picker.resolve(&m, &view(), Quat::IDENTITY, 0.0, 0.0), None);

        let far = motion(&[("far", 20.0, 20.0)]);
        assert_eq!(picker.resolve(&far, &view(), Quat::IDENTITY, 400.0, 300.0), None);
    }

    #[test]
    fn degenerate_viewport_yields_no_ray() {
        let mut v = view();
        v.width_px = 0.0;
        assert!(v.ray_through(0.0, 0.0).is_none());
    }
}
