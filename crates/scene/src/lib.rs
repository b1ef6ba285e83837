pub mod ambient;
pub mod entity;
pub mod instances;
pub mod motion;
pub mod picking;

pub use ambient::{AmbientFx, FxConfig, FxGeometry};
pub use entity::{Entity, EntitySnapshot};
pub use instances::{InstanceConfig, InstancedRenderSet, MAX_RENDERED_ENTITIES, SizeClass};
pub use motion::{MotionConfig, MotionModel};
pub use picking::{CameraView, PickConfig, PickingService};
