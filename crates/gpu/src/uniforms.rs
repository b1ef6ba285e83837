use foundation::math::{Mat4, Quat, Vec3, mat4_from_quat};

/// Per-frame globals shared by every pipeline (group 0, binding 0).
///
/// Layout matches the WGSL `Globals` struct: two matrices followed by
/// `vec4` rows, so no implicit padding is needed.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub view_proj: Mat4,
    /// Globe orientation; every globe-anchored layer is authored unrotated.
    pub globe: Mat4,
    /// xyz = camera eye, w = globe radius.
    pub eye: [f32; 4],
    /// xyz = light direction, w = elapsed seconds.
    pub light: [f32; 4],
    /// width, height, 1/width, 1/height in pixels.
    pub viewport: [f32; 4],
    /// x = bloom threshold, y = bloom intensity, z = stars alpha, w = outline alpha.
    pub params: [f32; 4],
    pub globe_color: [f32; 4],
    pub atmosphere_color: [f32; 4],
    pub outline_color: [f32; 4],
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameInputs {
    pub view_proj: Mat4,
    pub orientation: Quat,
    pub eye: Vec3,
    pub width_px: u32,
    pub height_px: u32,
    pub elapsed_s: f64,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Palette {
    pub globe_color: [f32; 4],
    pub atmosphere_color: [f32; 4],
    pub outline_color: [f32; 4],
    pub light_dir: [f32; 3],
    pub stars_alpha: f32,
    pub bloom_threshold: f32,
    pub bloom_intensity: f32,
}

impl FrameUniforms {
    pub fn new(frame: &FrameInputs, palette: &Palette) -> Self {
        let w = frame.width_px.max(1) as f32;
        let h = frame.height_px.max(1) as f32;
        let [ex, ey, ez] = frame.eye.to_f32();
        let [lx, ly, lz] = palette.light_dir;
        Self {
            view_proj: frame.view_proj,
            globe: mat4_from_quat(frame.orientation),
            eye: [ex, ey, ez, foundation::math::GLOBE_RADIUS as f32],
            light: [lx, ly, lz, frame.elapsed_s as f32],
            viewport: [w, h, 1.0 / w, 1.0 / h],
            params: [
                palette.bloom_threshold,
                palette.bloom_intensity,
                palette.stars_alpha,
                palette.outline_color[3],
            ],
            globe_color: palette.globe_color,
            atmosphere_color: palette.atmosphere_color,
            outline_color: palette.outline_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameInputs, FrameUniforms, Palette};
    use foundation::math::{MAT4_IDENTITY, Quat, Vec3};

    fn palette() -> Palette {
        Palette {
            globe_color: [0.02, 0.05, 0.1, 1.0],
            atmosphere_color: [0.3, 0.6, 1.0, 1.0],
            outline_color: [0.5, 0.8, 1.0, 0.6],
            light_dir: [0.0, 0.0, 1.0],
            stars_alpha: 0.8,
            bloom_threshold: 0.6,
            bloom_intensity: 1.2,
        }
    }

    #[test]
    fn size_is_a_multiple_of_sixteen() {
        assert_eq!(std::mem::size_of::<FrameUniforms>() % 16, 0);
    }

    #[test]
    fn packs_viewport_and_params() {
        let u = FrameUniforms::new(
            &FrameInputs {
                view_proj: MAT4_IDENTITY,
                orientation: Quat::IDENTITY,
                eye: Vec3::new(0.0, 0.0, 3.0),
                width_px: 800,
                height_px: 0,
                elapsed_s: 2.5,
            },
            &palette(),
        );
        assert_eq!(u.viewport, [800.0, 1.0, 1.0 / 800.0, 1.0]);
        assert_eq!(u.eye, [0.0, 0.0, 3.0, 1.0]);
        assert_eq!(u.light[3], 2.5);
        assert_eq!(u.params, [0.6, 1.2, 0.8, 0.6]);
        assert_eq!(u.globe, MAT4_IDENTITY);
    }
}
