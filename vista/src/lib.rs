//! Frame preparation core of a real-time renderer.
//!
//! [`culling::SceneCullingManager`] finds the visible scene items of a camera
//! with a two phase SIMD frustum test spread over a [`thread_pool::ThreadPool`]
//! and sorts their renderable managers into render queue index ranges.
//! [`managers::MaterialBufferManager`] packs per material shader constants into
//! pooled uniform buffers and only uploads what changed.

pub mod backend;
pub mod culling;
mod error;
pub mod managers;
pub mod options;
pub mod thread_pool;
pub mod util;

pub use error::*;

/// Reexport of [`vista_types`].
pub mod types {
    pub use vista_types::*;
}
