//! Two phase frustum culling and render queue assembly.
//!
//! A frame runs a sphere test over every cullable item, compacts the
//! survivors into an indirection buffer, runs the exact box test over the
//! survivors only, then hands the renderable managers of everything that
//! is left to the render queue index ranges they overlap.

use std::ops::Range;

use glam::{Mat4, Vec3};
use vista_types::{RenderQueueIndexRange, RenderTargetInfo, RenderableManagerHandle, RenderableManagerStore};

use crate::{
    error::CullingError,
    managers::CameraManager,
    options::CullingOptions,
    thread_pool::ThreadPool,
    util::{
        dense_list::DenseList,
        freelist::{FreelistIndex, FreelistVec},
        frustum::{LocalBounds, ShaderFrustum, SimdFrustum},
        lanes::LANE_COUNT,
        math::round_up_div,
        typedefs::FastHashSet,
    },
};

mod item_set;
mod kernels;

pub use item_set::{BoxLanes, ItemBounds, SceneItemSet, SphereLanes};
pub use kernels::{compact_survivors, compact_visible, cull_boxes, cull_spheres};

/// Handle to an item registered with a [`SceneCullingManager`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SceneItemHandle(FreelistIndex);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CullingMode {
    /// Tested against the frustum every frame.
    Cullable,
    /// Always considered visible.
    Uncullable,
}

/// Description of a new scene item.
#[derive(Debug, Copy, Clone)]
pub struct SceneItemDescriptor {
    pub renderable_manager: Option<RenderableManagerHandle>,
    pub bounds: LocalBounds,
    /// Object to world.
    pub transform: Mat4,
    pub culling: CullingMode,
    pub casts_shadows: bool,
}

struct SceneItem {
    renderable_manager: Option<RenderableManagerHandle>,
    bounds: LocalBounds,
    transform: Mat4,
    culling: CullingMode,
    casts_shadows: bool,
}

impl SceneItem {
    fn world_bounds(&self) -> ItemBounds {
        ItemBounds {
            sphere: self.bounds.sphere.apply_transform(self.transform),
            min: self.bounds.min,
            max: self.bounds.max,
            world: self.transform,
        }
    }

    fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }
}

/// Which set of items a culling pass looks at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CullingPass {
    Main,
    /// Only shadow casting items.
    ShadowCasters,
}

/// Per call inputs of [`SceneCullingManager::gather_render_queue_index_ranges_renderable_managers`].
#[derive(Debug, Copy, Clone)]
pub struct CullingContext<'a> {
    pub camera: &'a CameraManager,
    pub render_target: RenderTargetInfo,
    pub pass: CullingPass,
    /// Single pass stereo rendering through a head mounted display.
    pub single_pass_stereo: bool,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CullingStatistics {
    pub tested_items: usize,
    pub sphere_survivors: usize,
    pub box_survivors: usize,
    pub uncullable_items: usize,
    pub gathered_renderable_managers: usize,
    pub sphere_tasks: usize,
    pub box_tasks: usize,
    /// Culling was skipped and every item was treated as visible.
    pub bypassed: bool,
}

pub struct SceneCullingManager {
    thread_pool: ThreadPool,
    /// Per task item count, in lane groups.
    split_groups: usize,

    items: FreelistVec<SceneItem>,
    cullable: SceneItemSet,
    cullable_shadow_casters: SceneItemSet,
    uncullable: DenseList,
    attached_renderable_managers: FastHashSet<RenderableManagerHandle>,

    indirection: Vec<u32>,
    box_flags: Vec<u32>,
}

impl SceneCullingManager {
    pub fn new(options: &CullingOptions) -> Result<Self, CullingError> {
        profiling::scope!("SceneCullingManager::new");

        let thread_pool = ThreadPool::new(options.thread_count)?;
        if options.split_count == 0 {
            log::warn!("Culling split count of zero, using one lane group per task");
        }
        let split_groups = round_up_div(options.split_count.max(1), LANE_COUNT);

        Ok(Self {
            thread_pool,
            split_groups,
            items: FreelistVec::new(),
            cullable: SceneItemSet::new(),
            cullable_shadow_casters: SceneItemSet::new(),
            uncullable: DenseList::new(),
            attached_renderable_managers: FastHashSet::default(),
            indirection: Vec::new(),
            box_flags: Vec::new(),
        })
    }

    pub fn thread_pool(&self) -> &ThreadPool {
        &self.thread_pool
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn cullable_items(&self) -> &SceneItemSet {
        &self.cullable
    }

    pub fn cullable_shadow_casters(&self) -> &SceneItemSet {
        &self.cullable_shadow_casters
    }

    pub fn add_scene_item(&mut self, descriptor: SceneItemDescriptor) -> SceneItemHandle {
        if let Some(manager) = descriptor.renderable_manager {
            let inserted = self.attached_renderable_managers.insert(manager);
            assert!(inserted, "{manager:?} is already attached to a scene item");
        }

        let item = SceneItem {
            renderable_manager: descriptor.renderable_manager,
            bounds: descriptor.bounds,
            transform: descriptor.transform,
            culling: descriptor.culling,
            casts_shadows: descriptor.casts_shadows,
        };
        let bounds = item.world_bounds();
        let key = self.items.push(item);

        match descriptor.culling {
            CullingMode::Cullable => {
                self.cullable.insert(key, &bounds);
                if descriptor.casts_shadows {
                    self.cullable_shadow_casters.insert(key, &bounds);
                }
            }
            CullingMode::Uncullable => {
                self.uncullable.push(key);
            }
        }

        SceneItemHandle(key)
    }

    #[track_caller]
    pub fn set_transform(&mut self, handle: SceneItemHandle, transform: Mat4) {
        let item = &mut self.items[handle.0];
        item.transform = transform;
        let bounds = item.world_bounds();
        self.cullable.update(handle.0, &bounds);
        self.cullable_shadow_casters.update(handle.0, &bounds);
    }

    #[track_caller]
    pub fn set_bounds(&mut self, handle: SceneItemHandle, local: LocalBounds) {
        let item = &mut self.items[handle.0];
        item.bounds = local;
        let bounds = item.world_bounds();
        self.cullable.update(handle.0, &bounds);
        self.cullable_shadow_casters.update(handle.0, &bounds);
    }

    #[track_caller]
    pub fn remove_scene_item(&mut self, handle: SceneItemHandle) {
        let Some(item) = self.items.remove(handle.0) else {
            panic!("{handle:?} is stale or belongs to another culling manager");
        };
        if let Some(manager) = item.renderable_manager {
            self.attached_renderable_managers.remove(&manager);
        }
        self.cullable.remove(handle.0);
        self.cullable_shadow_casters.remove(handle.0);
        self.uncullable.swap_remove(handle.0);
    }

    /// Visibility computed by the last main pass.
    pub fn visibility(&self, handle: SceneItemHandle) -> Option<bool> {
        let item = self.items.get(handle.0)?;
        match item.culling {
            CullingMode::Uncullable => Some(true),
            CullingMode::Cullable => self.cullable.is_visible(handle.0),
        }
    }

    /// Culls the pass's item set against the camera and fills every range with
    /// the visible renderable managers that overlap it.
    ///
    /// The renderable manager lists of `ranges` are cleared first. A renderable
    /// manager can end up in any number of ranges, but at most once per range.
    /// The shadow caster pass skips managers without a shadow casting
    /// renderable.
    pub fn gather_render_queue_index_ranges_renderable_managers<S>(
        &mut self,
        context: &CullingContext<'_>,
        renderable_managers: &mut S,
        ranges: &mut [RenderQueueIndexRange],
    ) -> CullingStatistics
    where
        S: RenderableManagerStore + ?Sized,
    {
        profiling::scope!("SceneCullingManager::gather");

        for range in ranges.iter_mut() {
            assert!(
                range.min_render_queue_index <= range.max_render_queue_index,
                "render queue index range [{}, {}] is inverted",
                range.min_render_queue_index,
                range.max_render_queue_index
            );
            range.renderable_managers.clear();
        }

        let camera = context.camera;
        let mut statistics = CullingStatistics::default();

        let set = match context.pass {
            CullingPass::Main => &mut self.cullable,
            CullingPass::ShadowCasters => &mut self.cullable_shadow_casters,
        };
        let item_count = set.len();
        statistics.tested_items = item_count;

        set.prepare();

        // A single frustum can not describe both eyes.
        // TODO: cull against the union of both eye frustums once the stereo path
        // exposes per eye matrices.
        let visible_count = if context.single_pass_stereo && camera.custom_matrices().is_none() {
            statistics.bypassed = true;
            set.set_all_visible();
            self.indirection.clear();
            self.indirection.extend(0..item_count as u32);
            item_count
        } else {
            let view_proj = camera.proj_for_aspect(context.render_target.aspect_ratio()) * camera.view();
            let frustum = SimdFrustum::new(&ShaderFrustum::from_matrix(view_proj));
            let (spheres, boxes, item_flags) = set.culling_views();

            // Phase one: spheres of every item
            let group_count = round_up_div(item_count, LANE_COUNT);
            statistics.sphere_tasks = run_chunked(
                &self.thread_pool,
                group_count,
                self.split_groups,
                item_flags,
                |groups, out| cull_spheres(&frustum, spheres, groups.start, out),
            );

            let sphere_survivors = compact_visible(&item_flags[..item_count], &mut self.indirection);
            statistics.sphere_survivors = sphere_survivors;

            // Phase two: boxes of the sphere survivors
            let padded = self.indirection.len();
            self.box_flags.resize(padded.max(self.box_flags.len()), 0);
            let indirection = &self.indirection;
            statistics.box_tasks = run_chunked(
                &self.thread_pool,
                padded / LANE_COUNT,
                self.split_groups,
                &mut self.box_flags,
                |groups, out| {
                    let indices = &indirection[groups.start * LANE_COUNT..groups.end * LANE_COUNT];
                    cull_boxes(&view_proj, boxes, indices, out)
                },
            );

            compact_survivors(&mut self.indirection, sphere_survivors, &self.box_flags, item_flags)
        };
        statistics.box_survivors = visible_count;

        profiling::scope!("resolve renderable managers");

        let camera_location = camera.location();
        let set = match context.pass {
            CullingPass::Main => &self.cullable,
            CullingPass::ShadowCasters => &self.cullable_shadow_casters,
        };
        let cullable_keys = self.indirection[..visible_count]
            .iter()
            .map(|&position| set.scene_items()[position as usize]);
        let uncullable_keys = self.uncullable.items().iter().copied().filter(|key| match context.pass {
            CullingPass::Main => true,
            CullingPass::ShadowCasters => self.items[*key].casts_shadows,
        });

        for key in cullable_keys.chain(uncullable_keys) {
            let item = &self.items[key];
            if item.culling == CullingMode::Uncullable {
                statistics.uncullable_items += 1;
            }
            let Some(handle) = item.renderable_manager else {
                continue;
            };
            let Some(manager) = renderable_managers.renderable_manager_mut(handle) else {
                panic!("scene item refers to unknown renderable manager {handle:?}");
            };
            if manager.renderables.is_empty() || !manager.visible {
                continue;
            }
            if context.pass == CullingPass::ShadowCasters && !manager.casts_shadows() {
                continue;
            }

            manager.cached_distance_to_camera = camera_location.distance(item.position());

            let (min, max) = (manager.min_render_queue_index(), manager.max_render_queue_index());
            let mut gathered = false;
            for range in ranges.iter_mut().filter(|range| range.overlaps(min, max)) {
                range.renderable_managers.push(handle);
                gathered = true;
            }
            statistics.gathered_renderable_managers += usize::from(gathered);
        }

        log::trace!("Culling: {statistics:?}");

        statistics
    }
}

/// Splits `group_count` lane groups into tasks and runs `kernel` over each
/// with the matching slice of `out`. Returns the number of tasks used.
///
/// With zero or one task everything runs on the calling thread.
fn run_chunked<F>(pool: &ThreadPool, group_count: usize, split_groups: usize, out: &mut [u32], kernel: F) -> usize
where
    F: Fn(Range<usize>, &mut [u32]) + Sync,
{
    let mut split = split_groups;
    let task_count = pool.thread_count_and_split_count(group_count, &mut split);
    let out = &mut out[..group_count * LANE_COUNT];

    if task_count <= 1 {
        if group_count != 0 {
            kernel(0..group_count, out);
        }
        return task_count;
    }

    let kernel = &kernel;
    let mut batch = pool.batch();
    let mut rest = out;
    for task in 0..task_count {
        let start = task * split;
        let end = if task + 1 == task_count { group_count } else { start + split };
        let (chunk, tail) = std::mem::take(&mut rest).split_at_mut((end - start) * LANE_COUNT);
        rest = tail;
        batch.queue_task(move || kernel(start..end, chunk));
    }
    batch.process();

    debug_assert!(rest.is_empty());
    task_count
}
