//! Static meshes uploaded once at init.

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u16>,
}

impl Mesh {
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// UV sphere around the origin, +Y north. The grid must fit u16 indices.
pub fn sphere_mesh(lat_segments: u32, lon_segments: u32, radius: f32) -> Mesh {
    let lat_segments = lat_segments.clamp(3, 180);
    let lon_segments = lon_segments.clamp(3, 360);

    let mut vertices = Vec::with_capacity(((lat_segments + 1) * (lon_segments + 1)) as usize);
    for lat in 0..=lat_segments {
        let theta = lat as f32 / lat_segments as f32 * std::f32::consts::PI;
        let (sin_t, cos_t) = theta.sin_cos();
        for lon in 0..=lon_segments {
            let phi = lon as f32 / lon_segments as f32 * std::f32::consts::TAU;
            let (sin_p, cos_p) = phi.sin_cos();
            let n = [sin_t * sin_p, cos_t, sin_t * cos_p];
            vertices.push(MeshVertex {
                position: [n[0] * radius, n[1] * radius, n[2] * radius],
                normal: n,
            });
        }
    }

    let stride = lon_segments + 1;
    let mut indices = Vec::with_capacity((lat_segments * lon_segments * 6) as usize);
    for lat in 0..lat_segments {
        for lon in 0..lon_segments {
            let i0 = lat * stride + lon;
            let i1 = i0 + 1;
            let i2 = i0 + stride;
            let i3 = i2 + 1;
            indices.extend([i0, i2, i1, i1, i2, i3].map(|i| i as u16));
        }
    }

    Mesh { vertices, indices }
}

/// Flat aircraft silhouette in the icon basis: +X right, +Y forward (nose),
/// +Z along the surface normal. Spans [-1, 1] on both planform axes.
pub fn aircraft_icon_mesh() -> Mesh {
    let mut mesh = Mesh::default();

    // Nose and fuselage.
    push_polygon(&mut mesh, &[[0.0, 1.0], [-0.12, 0.7], [0.12, 0.7]]);
    push_polygon(&mut mesh, &[[-0.12, 0.7], [-0.12, -0.8], [0.12, -0.8], [0.12, 0.7]]);

    for side in [-1.0f32, 1.0] {
        let wing = [[0.12, 0.35], [1.0, -0.2], [1.0, -0.35], [0.12, 0.05]];
        let tail = [[0.12, -0.55], [0.45, -0.85], [0.45, -0.95], [0.12, -0.78]];
        for shape in [wing, tail] {
            let mut pts = shape.map(|[x, y]| [x * side, y]);
            if side > 0.0 {
                pts.reverse();
            }
            push_polygon(&mut mesh, &pts);
        }
    }

    mesh
}

/// Fan-triangulates a convex polygon given counter-clockwise around +Z.
fn push_polygon(mesh: &mut Mesh, pts: &[[f32; 2]]) {
    let base = mesh.vertices.len() as u16;
    mesh.vertices.extend(pts.iter().map(|&[x, y]| MeshVertex {
        position: [x, y, 0.0],
        normal: [0.0, 0.0, 1.0],
    }));
    for i in 1..pts.len().saturating_sub(1) as u16 {
        mesh.indices.extend([base, base + i, base + i + 1]);
    }
}
