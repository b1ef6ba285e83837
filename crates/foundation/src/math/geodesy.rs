use super::{Quat, Vec3};

/// Globe radius in world units.
pub const GLOBE_RADIUS: f64 = 1.0;
/// Flat-earth meters per degree of latitude.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Geographic coordinates in degrees.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct GeoPoint {
    pub lat_deg: f64,
    pub lng_deg: f64,
}

impl GeoPoint {
    pub fn new(lat_deg: f64, lng_deg: f64) -> Self {
        Self { lat_deg, lng_deg }
    }
}

/// Wraps any finite longitude into [-180, 180].
pub fn wrap_lng_deg(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        return lng;
    }
    (lng + 180.0).rem_euclid(360.0) - 180.0
}

/// Signed longitude difference `to - from` along the shorter way round.
pub fn shortest_lng_delta(from: f64, to: f64) -> f64 {
    let mut d = to - from;
    if d > 180.0 {
        d -= 360.0;
    } else if d < -180.0 {
        d += 360.0;
    }
    d
}

/// Spherical to Cartesian, Y up, lat/lng 0/0 on +Z and lng +90 on +X.
pub fn to_cartesian(lat_deg: f64, lng_deg: f64, radius: f64) -> Vec3 {
    let (sin_lat, cos_lat) = lat_deg.to_radians().sin_cos();
    let (sin_lng, cos_lng) = lng_deg.to_radians().sin_cos();
    Vec3::new(
        radius * cos_lat * sin_lng,
        radius * sin_lat,
        radius * cos_lat * cos_lng,
    )
}

pub fn unit_normal(lat_deg: f64, lng_deg: f64) -> Vec3 {
    to_cartesian(lat_deg, lng_deg, 1.0)
}

/// Some unit vector perpendicular to `n`.
pub fn any_perpendicular(n: Vec3) -> Vec3 {
    let axis = if n.y.abs() < 0.9 { Vec3::Y } else { Vec3::X };
    (axis - n * axis.dot(n)).normalize_or(Vec3::Z)
}

/// Great-circle interpolation between unit vectors `a` and `b`.
/// Antipodal endpoints swing through an arbitrary perpendicular.
pub fn slerp_unit(a: Vec3, b: Vec3, t: f64) -> Vec3 {
    let omega = a.dot(b).clamp(-1.0, 1.0).acos();
    if omega < 1e-6 {
        return a.lerp(b, t).normalize_or(a);
    }
    let sin_omega = omega.sin();
    if sin_omega < 1e-6 {
        let angle = std::f64::consts::PI * t;
        return a * angle.cos() + any_perpendicular(a) * angle.sin();
    }
    a * (((1.0 - t) * omega).sin() / sin_omega) + b * ((t * omega).sin() / sin_omega)
}

/// Inverse of [`to_cartesian`] for a point expressed in a frame rotated by
/// `orientation`. The zero vector maps to (0, 0).
pub fn from_cartesian(point: Vec3, orientation: Quat) -> GeoPoint {
    let local = orientation.conjugate().rotate(point);
    let r = local.length();
    if r <= 1e-12 {
        return GeoPoint::default();
    }
    let lat = (local.y / r).clamp(-1.0, 1.0).asin().to_degrees();
    let lng = local.x.atan2(local.z).to_degrees();
    GeoPoint::new(lat, wrap_lng_deg(lng))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn prime_meridian_equator_is_positive_z() {
        let p = to_cartesian(0.0, 0.0, 2.0);
        assert_close(p.x, 0.0, 1e-12);
        assert_close(p.y, 0.0, 1e-12);
        assert_close(p.z, 2.0, 1e-12);

        let east = to_cartesian(0.0, 90.0, 1.0);
        assert_close(east.x, 1.0, 1e-12);
        let north = to_cartesian(90.0, 0.0, 1.0);
        assert_close(north.y, 1.0, 1e-12);
    }

    #[test]
    fn from_cartesian_inverts_rotated_frame() {
        let orientation = Quat::from_axis_angle(Vec3::new(0.0, 0.6, 0.8), 1.3);
        for (lat, lng) in [(51.47, -0.45), (-33.94, 151.18), (0.0, 179.9), (89.0, 10.0)] {
            let world = orientation.rotate(to_cartesian(lat, lng, GLOBE_RADIUS * 1.02));
            let geo = from_cartesian(world, orientation);
            assert_close(geo.lat_deg, lat, 1e-9);
            assert_close(geo.lng_deg, lng, 1e-9);
        }
    }

    #[test]
    fn from_cartesian_of_origin_is_null_island() {
        assert_eq!(from_cartesian(Vec3::ZERO, Quat::IDENTITY), GeoPoint::new(0.0, 0.0));
    }

    #[test]
    fn wrap_lng_into_range() {
        assert_close(wrap_lng_deg(190.0), -170.0, 1e-12);
        assert_close(wrap_lng_deg(-190.0), 170.0, 1e-12);
        assert_close(wrap_lng_deg(540.0), -180.0, 1e-12);
        assert_eq!(wrap_lng_deg(180.0), 180.0);
        assert_eq!(wrap_lng_deg(-45.0), -45.0);
    }

    #[test]
    fn slerp_stays_on_the_unit_sphere() {
        let a = unit_normal(10.0, 20.0);
        let b = unit_normal(-40.0, 150.0);
        for i in 0..=10 {
            let p = slerp_unit(a, b, i as f64 / 10.0);
            assert_close(p.length(), 1.0, 1e-12);
        }
        assert_close((slerp_unit(a, b, 1.0) - b).length(), 0.0, 1e-12);

        let mid = slerp_unit(Vec3::Z, -Vec3::Z, 0.5);
        assert_close(mid.length(), 1.0, 1e-12);
        assert_close(mid.dot(Vec3::Z), 0.0, 1e-12);
    }

    #[test]
    fn shortest_delta_crosses_antimeridian() {
        assert_close(shortest_lng_delta(179.0, -179.0), 2.0, 1e-12);
        assert_close(shortest_lng_delta(-179.0, 179.0), -2.0, 1e-12);
        assert_close(shortest_lng_delta(10.0, 20.0), 10.0, 1e-12);
    }
}
