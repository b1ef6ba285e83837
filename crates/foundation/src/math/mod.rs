pub mod geodesy;
pub mod mat4;
pub mod quat;
pub mod vec;

pub use geodesy::*;
pub use mat4::*;
pub use quat::*;
pub use vec::*;
