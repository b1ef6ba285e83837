pub mod compositor;
pub mod mesh;
pub mod uniforms;

pub use compositor::{ColorOp, DepthOp, DrawKind, FramePlan, PassSpec, PlanOptions, PostEffect, Target};
pub use mesh::{Mesh, MeshVertex, aircraft_icon_mesh, sphere_mesh};
pub use uniforms::{FrameInputs, FrameUniforms, Palette};
