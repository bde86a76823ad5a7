mod camera;
mod material_buffer;

pub use camera::*;
pub use material_buffer::*;
