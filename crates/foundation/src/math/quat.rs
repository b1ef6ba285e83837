//! Unit quaternions for globe orientation.
//!
//! Convention: `q.rotate(v)` applies the rotation to `v`; `a * b` applies `b`
//! first, then `a`. Euler angles use the intrinsic XYZ order, i.e. the matrix
//! `Rx(pitch) · Ry(yaw) · Rz(roll)`.

use super::Vec3;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// Euler XYZ angles in radians.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct EulerXyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// `axis` must be unit length.
    pub fn from_axis_angle(axis: Vec3, angle_rad: f64) -> Self {
        let (s, c) = (angle_rad * 0.5).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    pub fn from_euler_xyz(e: EulerXyz) -> Self {
        let qx = Self::from_axis_angle(Vec3::X, e.x);
        let qy = Self::from_axis_angle(Vec3::Y, e.y);
        let qz = Self::from_axis_angle(Vec3::Z, e.z);
        (qx * qy * qz).normalize()
    }

    /// Decomposes into XYZ Euler angles; `y` lands in [-π/2, π/2].
    pub fn to_euler_xyz(self) -> EulerXyz {
        let q = self.normalize();
        let m11 = 1.0 - 2.0 * (q.y * q.y + q.z * q.z);
        let m12 = 2.0 * (q.x * q.y - q.z * q.w);
        let m13 = 2.0 * (q.x * q.z + q.y * q.w);
        let m22 = 1.0 - 2.0 * (q.x * q.x + q.z * q.z);
        let m23 = 2.0 * (q.y * q.z - q.x * q.w);
        let m32 = 2.0 * (q.y * q.z + q.x * q.w);
        let m33 = 1.0 - 2.0 * (q.x * q.x + q.y * q.y);

        let y = m13.clamp(-1.0, 1.0).asin();
        if m13.abs() < 0.999_999_9 {
            EulerXyz {
                x: (-m23).atan2(m33),
                y,
                z: (-m12).atan2(m11),
            }
        } else {
            // Gimbal lock: fold roll into pitch.
            EulerXyz {
                x: m32.atan2(m22),
                y,
                z: 0.0,
            }
        }
    }

    /// Minimal rotation taking unit vector `a` onto unit vector `b`.
    pub fn from_unit_vectors(a: Vec3, b: Vec3) -> Self {
        let dot = a.dot(b).clamp(-1.0, 1.0);

        // Nearly opposite: any orthogonal axis works.
        if dot < -0.999_999 {
            let mut axis = Vec3::X.cross(a);
            if axis.length_squared() < 1e-12 {
                axis = Vec3::Y.cross(a);
            }
            let axis = axis.normalize_or(Vec3::Y);
            return Self::new(axis.x, axis.y, axis.z, 0.0);
        }

        if dot > 0.999_999 {
            return Self::IDENTITY;
        }

        let axis = a.cross(b);
        Self::new(axis.x, axis.y, axis.z, 1.0 + dot).normalize()
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    pub fn normalize(self) -> Self {
        let n = self.dot(self).sqrt();
        if n > 1e-10 {
            Self::new(self.x / n, self.y / n, self.z / n, self.w / n)
        } else {
            Self::IDENTITY
        }
    }

    /// Inverse for unit quaternions.
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    pub fn rotate(self, v: Vec3) -> Vec3 {
        let qv = Vec3::new(self.x, self.y, self.z);
        let t = qv.cross(v) * 2.0;
        v + t * self.w + qv.cross(t)
    }

    /// Shortest-path spherical interpolation.
    pub fn slerp(self, other: Self, t: f64) -> Self {
        let mut dot = self.dot(other);
        let mut b = other;
        if dot < 0.0 {
            b = Self::new(-b.x, -b.y, -b.z, -b.w);
            dot = -dot;
        }

        if dot > 0.9995 {
            return Self::new(
                self.x + t * (b.x - self.x),
                self.y + t * (b.y - self.y),
                self.z + t * (b.z - self.z),
                self.w + t * (b.w - self.w),
            )
            .normalize();
        }

        let theta_0 = dot.clamp(-1.0, 1.0).acos();
        let theta = theta_0 * t;
        let sin_theta_0 = theta_0.sin();
        let s0 = theta.cos() - dot * theta.sin() / sin_theta_0;
        let s1 = theta.sin() / sin_theta_0;

        Self::new(
            s0 * self.x + s1 * b.x,
            s0 * self.y + s1 * b.y,
            s0 * self.z + s1 * b.z,
            s0 * self.w + s1 * b.w,
        )
        .normalize()
    }

    /// Rotation angle between two orientations, in [0, π].
    pub fn angle_to(self, other: Self) -> f64 {
        2.0 * self.dot(other).abs().clamp(-1.0, 1.0).acos()
    }
}

impl std::ops::Mul for Quat {
    type Output = Self;

    fn mul(self, b: Self) -> Self::Output {
        let a = self;
        Self::new(
            a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
            a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{EulerXyz, Quat};
    use crate::math::Vec3;

    fn assert_vec_close(a: Vec3, b: Vec3, eps: f64) {
        let d = (a - b).length();
        assert!(d <= eps, "expected {a:?} ~= {b:?} (diff {d})");
    }

    #[test]
    fn identity_leaves_vectors_alone() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_vec_close(Quat::IDENTITY.rotate(v), v, 1e-12);
    }

    #[test]
    fn from_unit_vectors_maps_a_onto_b() {
        let a = Vec3::X;
        let b = Vec3::Y;
        let q = Quat::from_unit_vectors(a, b);
        assert_vec_close(q.rotate(a), b, 1e-9);

        let opposite = Quat::from_unit_vectors(Vec3::Z, -Vec3::Z);
        assert_vec_close(opposite.rotate(Vec3::Z), -Vec3::Z, 1e-9);
    }

    #[test]
    fn multiplication_applies_right_operand_first() {
        let qx = Quat::from_axis_angle(Vec3::X, std::f64::consts::FRAC_PI_2);
        let qz = Quat::from_axis_angle(Vec3::Z, std::f64::consts::FRAC_PI_2);
        // Z first: X -> Y, then X: Y -> Z.
        assert_vec_close((qx * qz).rotate(Vec3::X), Vec3::Z, 1e-9);
    }

    #[test]
    fn euler_round_trip_preserves_rotation() {
        let cases = [
            EulerXyz { x: 0.3, y: -0.7, z: 0.2 },
            EulerXyz { x: -1.2, y: 1.1, z: -2.5 },
            EulerXyz { x: 2.9, y: 0.05, z: 0.0 },
        ];
        for e in cases {
            let q = Quat::from_euler_xyz(e);
            let back = q.to_euler_xyz();
            assert!((back.x - e.x).abs() < 1e-9, "{e:?} -> {back:?}");
            assert!((back.y - e.y).abs() < 1e-9, "{e:?} -> {back:?}");
            assert!((back.z - e.z).abs() < 1e-9, "{e:?} -> {back:?}");
        }
    }

    #[test]
    fn euler_decomposition_of_arbitrary_orientation_is_exact() {
        let q = Quat::from_unit_vectors(Vec3::new(0.6, 0.64, 0.48), Vec3::Z)
            * Quat::from_axis_angle(Vec3::Y, 0.4);
        let rebuilt = Quat::from_euler_xyz(q.to_euler_xyz());
        assert!(q.angle_to(rebuilt) < 1e-9);
    }

    #[test]
    fn slerp_endpoints_and_midpoint() {
        let a = Quat::IDENTITY;
        let b = Quat::from_axis_angle(Vec3::Y, 1.0);
        assert!(a.slerp(b, 0.0).angle_to(a) < 1e-9);
        assert!(a.slerp(b, 1.0).angle_to(b) < 1e-9);
        assert!((a.slerp(b, 0.5).angle_to(a) - 0.5).abs() < 1e-9);
    }
}
