//! Column-major `f32` matrices as consumed by the GPU (`m[col][row]`).

use super::{Quat, Vec3};

pub type Mat4 = [[f32; 4]; 4];

pub const MAT4_IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

pub fn mat4_mul(a: Mat4, b: Mat4) -> Mat4 {
    let mut c = [[0.0f32; 4]; 4];
    for col in 0..4 {
        for row in 0..4 {
            c[col][row] = a[0][row] * b[col][0]
                + a[1][row] * b[col][1]
                + a[2][row] * b[col][2]
                + a[3][row] * b[col][3];
        }
    }
    c
}

/// Affine transform from three basis columns and a translation.
pub fn mat4_from_cols(x: Vec3, y: Vec3, z: Vec3, t: Vec3) -> Mat4 {
    let [x0, x1, x2] = x.to_f32();
    let [y0, y1, y2] = y.to_f32();
    let [z0, z1, z2] = z.to_f32();
    let [t0, t1, t2] = t.to_f32();
    [
        [x0, x1, x2, 0.0],
        [y0, y1, y2, 0.0],
        [z0, z1, z2, 0.0],
        [t0, t1, t2, 1.0],
    ]
}

pub fn mat4_from_quat(q: Quat) -> Mat4 {
    mat4_from_cols(
        q.rotate(Vec3::X),
        q.rotate(Vec3::Y),
        q.rotate(Vec3::Z),
        Vec3::ZERO,
    )
}

/// Right-handed perspective with a 0..1 depth range.
pub fn mat4_perspective_rh_z0(fov_y_rad: f64, aspect: f64, near: f64, far: f64) -> Mat4 {
    let f = 1.0 / (0.5 * fov_y_rad).tan();
    let m00 = (f / aspect) as f32;
    let m11 = f as f32;
    let m22 = (far / (near - far)) as f32;
    let m23 = ((near * far) / (near - far)) as f32;

    [
        [m00, 0.0, 0.0, 0.0],
        [0.0, m11, 0.0, 0.0],
        [0.0, 0.0, m22, -1.0],
        [0.0, 0.0, m23, 0.0],
    ]
}

pub fn mat4_look_at_rh(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    let f = (target - eye).normalize_or(-Vec3::Z);
    let s = f.cross(up).normalize_or(Vec3::X);
    let u = s.cross(f);

    let ex = -s.dot(eye);
    let ey = -u.dot(eye);
    let ez = f.dot(eye);

    [
        [s.x as f32, u.x as f32, (-f.x) as f32, 0.0],
        [s.y as f32, u.y as f32, (-f.y) as f32, 0.0],
        [s.z as f32, u.z as f32, (-f.z) as f32, 0.0],
        [ex as f32, ey as f32, ez as f32, 1.0],
    ]
}

pub fn mat4_transform_point(m: Mat4, p: [f32; 3]) -> [f32; 4] {
    let mut out = [0.0f32; 4];
    for (row, o) in out.iter_mut().enumerate() {
        *o = m[0][row] * p[0] + m[1][row] * p[1] + m[2][row] * p[2] + m[3][row];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() <= eps, "expected {a} ~= {b}");
    }

    #[test]
    fn perspective_maps_near_and_far_to_unit_depth() {
        let p = mat4_perspective_rh_z0(1.0, 1.5, 0.1, 100.0);
        let near = mat4_transform_point(p, [0.0, 0.0, -0.1]);
        let far = mat4_transform_point(p, [0.0, 0.0, -100.0]);
        assert_close(near[2] / near[3], 0.0, 1e-5);
        assert_close(far[2] / far[3], 1.0, 1e-5);
    }

    #[test]
    fn look_at_puts_target_on_negative_z() {
        let v = mat4_look_at_rh(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y);
        let p = mat4_transform_point(v, [0.0, 0.0, 0.0]);
        assert_close(p[0], 0.0, 1e-6);
        assert_close(p[1], 0.0, 1e-6);
        assert_close(p[2], -3.0, 1e-6);
    }

    #[test]
    fn quat_matrix_matches_quat_rotation() {
        let q = Quat::from_axis_angle(Vec3::Y, 0.7);
        let m = mat4_from_quat(q);
        let v = q.rotate(Vec3::new(0.2, -0.4, 1.0));
        let p = mat4_transform_point(m, [0.2, -0.4, 1.0]);
        assert_close(p[0], v.x as f32, 1e-6);
        assert_close(p[1], v.y as f32, 1e-6);
        assert_close(p[2], v.z as f32, 1e-6);
        assert_eq!(mat4_mul(MAT4_IDENTITY, m), m);
    }
}
