//! Type declarations for the vista culling and material buffer crate.
//!
//! This is reexported in the vista crate proper and includes all the plain
//! data the core consumes from its neighbours: cameras, renderable managers,
//! render queue ranges and material property descriptions.

use std::{fmt::Debug, hash::Hash, marker::PhantomData};

/// Reexport of the glam version vista is using.
pub use glam;
use glam::{Mat4, Vec3A};
use smallvec::SmallVec;

mod material;
pub use material::*;

/// Non-owning resource handle.
///
/// The value is an index into whatever store the owner of the resource keeps.
pub struct RawResourceHandle<T> {
    /// Underlying value of the handle.
    pub idx: usize,
    _phantom: PhantomData<T>,
}

impl<T> RawResourceHandle<T> {
    /// Creates a new handle with the given value
    pub const fn new(idx: usize) -> Self {
        Self {
            idx,
            _phantom: PhantomData,
        }
    }
}

// Need Debug/Copy/Clone impls that don't require T: Trait.
impl<T> Debug for RawResourceHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RawResourceHandle").field(&self.idx).finish()
    }
}

impl<T> Copy for RawResourceHandle<T> {}

impl<T> Clone for RawResourceHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for RawResourceHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.idx == other.idx
    }
}

impl<T> Eq for RawResourceHandle<T> {}

impl<T> PartialOrd for RawResourceHandle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for RawResourceHandle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.idx.cmp(&other.idx)
    }
}

impl<T> Hash for RawResourceHandle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.idx.hash(state);
    }
}

macro_rules! declare_handle {
    ($($name:ident => $tag:ident),* $(,)?) => {$(
        #[doc = concat!("Tag type for [`", stringify!($name), "`].")]
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub struct $tag;

        #[doc = concat!("Non-owning handle to a ", stringify!($tag), " resource.")]
        pub type $name = RawResourceHandle<$tag>;
    )*};
}

declare_handle!(
    MaterialHandle => MaterialTag,
    RenderableManagerHandle => RenderableManagerTag,
);

/// Handedness of the coordinate system the camera projects with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Handedness {
    Left,
    #[default]
    Right,
}

/// Describes how the world should be projected into the camera.
///
/// All generated projections use a 0..1 clip space depth range.
#[derive(Debug, Copy, Clone)]
pub enum CameraProjection {
    Orthographic {
        /// Size assumes the location is at the center of the camera area.
        size: Vec3A,
    },
    Perspective {
        /// Vertical field of view in degrees.
        vfov: f32,
        /// Near plane distance.
        near: f32,
        /// Far plane distance.
        far: f32,
    },
    Raw(Mat4),
}

impl Default for CameraProjection {
    fn default() -> Self {
        Self::Perspective {
            vfov: 60.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Describes how the camera should look at the scene.
#[derive(Debug, Default, Copy, Clone)]
pub struct Camera {
    pub projection: CameraProjection,
    /// World to view matrix
    pub view: Mat4,
}

/// Matrices a pass can use to temporarily take over the camera, e.g. while
/// rendering a shadow map.
#[derive(Debug, Copy, Clone)]
pub struct CustomCameraMatrices {
    pub world_to_view: Mat4,
    pub view_to_clip: Mat4,
}

/// Size of the surface a camera renders into.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderTargetInfo {
    pub width: u32,
    pub height: u32,
}

impl RenderTargetInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// A single drawable piece of a renderable manager.
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    pub mesh_index: u32,
    pub material: Option<MaterialHandle>,
    pub render_queue_index: u8,
    pub casts_shadows: bool,
}

/// A group of renderables sharing one transform and one visibility switch.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderableManager {
    pub renderables: Vec<Renderable>,
    pub visible: bool,
    min_render_queue_index: u8,
    max_render_queue_index: u8,
    /// Written by culling for sorting and level of detail.
    pub cached_distance_to_camera: f32,
}

impl RenderableManager {
    pub fn new(renderables: Vec<Renderable>) -> Self {
        let mut manager = Self {
            renderables,
            visible: true,
            min_render_queue_index: 0,
            max_render_queue_index: 0,
            cached_distance_to_camera: 0.0,
        };
        manager.update_cached_render_queue_data();
        manager
    }

    /// Recomputes the cached render queue index interval. Must be called after
    /// editing [`Self::renderables`].
    pub fn update_cached_render_queue_data(&mut self) {
        let mut indices = self.renderables.iter().map(|r| r.render_queue_index);
        match indices.next() {
            Some(first) => {
                let (min, max) = indices.fold((first, first), |(min, max), idx| (min.min(idx), max.max(idx)));
                self.min_render_queue_index = min;
                self.max_render_queue_index = max;
            }
            None => {
                self.min_render_queue_index = 0;
                self.max_render_queue_index = 0;
            }
        }
    }

    pub fn min_render_queue_index(&self) -> u8 {
        self.min_render_queue_index
    }

    pub fn max_render_queue_index(&self) -> u8 {
        self.max_render_queue_index
    }

    pub fn casts_shadows(&self) -> bool {
        self.renderables.iter().any(|r| r.casts_shadows)
    }
}

/// Storage the culler resolves renderable manager handles against.
pub trait RenderableManagerStore {
    fn renderable_manager_mut(&mut self, handle: RenderableManagerHandle) -> Option<&mut RenderableManager>;
}

impl RenderableManagerStore for [RenderableManager] {
    fn renderable_manager_mut(&mut self, handle: RenderableManagerHandle) -> Option<&mut RenderableManager> {
        self.get_mut(handle.idx)
    }
}

impl RenderableManagerStore for Vec<RenderableManager> {
    fn renderable_manager_mut(&mut self, handle: RenderableManagerHandle) -> Option<&mut RenderableManager> {
        self.get_mut(handle.idx)
    }
}

/// An inclusive interval of render queue indices plus the renderable managers
/// that have at least one renderable inside of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderQueueIndexRange {
    pub min_render_queue_index: u8,
    pub max_render_queue_index: u8,
    pub renderable_managers: Vec<RenderableManagerHandle>,
}

impl RenderQueueIndexRange {
    pub fn new(min_render_queue_index: u8, max_render_queue_index: u8) -> Self {
        Self {
            min_render_queue_index,
            max_render_queue_index,
            renderable_managers: Vec::new(),
        }
    }

    /// Determines if the given inclusive interval overlaps with this range.
    pub fn overlaps(&self, min: u8, max: u8) -> bool {
        self.min_render_queue_index <= max && self.max_render_queue_index >= min
    }
}

/// The ranges a compositor pass asks the culler to fill.
pub type RenderQueueIndexRanges = SmallVec<[RenderQueueIndexRange; 4]>;

#[cfg(test)]
mod test {
    use super::{Renderable, RenderableManager, RenderQueueIndexRange};

    fn renderable(render_queue_index: u8) -> Renderable {
        Renderable {
            mesh_index: 0,
            material: None,
            render_queue_index,
            casts_shadows: false,
        }
    }

    #[test]
    fn render_queue_interval() {
        let manager = RenderableManager::new(vec![renderable(40), renderable(12), renderable(200)]);
        assert_eq!(manager.min_render_queue_index(), 12);
        assert_eq!(manager.max_render_queue_index(), 200);

        let empty = RenderableManager::new(Vec::new());
        assert_eq!(empty.min_render_queue_index(), 0);
        assert_eq!(empty.max_render_queue_index(), 0);
    }

    #[test]
    fn range_overlap() {
        let range = RenderQueueIndexRange::new(0, 127);
        assert!(range.overlaps(127, 200));
        assert!(range.overlaps(0, 0));
        assert!(!range.overlaps(128, 255));
    }
}
