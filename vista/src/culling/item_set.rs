use glam::{Mat4, Vec3};

use crate::util::{
    dense_list::DenseList,
    freelist::FreelistIndex,
    frustum::BoundingSphere,
    lanes::{align_to_lane_count, LaneArray, LANE_COUNT, VISIBLE},
};

/// World space culling inputs of one item.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ItemBounds {
    pub sphere: BoundingSphere,
    /// Object space box.
    pub min: Vec3,
    pub max: Vec3,
    /// Object to world.
    pub world: Mat4,
}

/// World space bounding spheres, radius stored negated.
#[derive(Debug, Default, Clone)]
pub struct SphereLanes {
    pub x: LaneArray,
    pub y: LaneArray,
    pub z: LaneArray,
    pub neg_radius: LaneArray,
}

impl SphereLanes {
    fn arrays_mut(&mut self) -> [&mut LaneArray; 4] {
        [&mut self.x, &mut self.y, &mut self.z, &mut self.neg_radius]
    }
}

/// Object space boxes plus their object to world matrices.
#[derive(Debug, Default, Clone)]
pub struct BoxLanes {
    pub min: [LaneArray; 3],
    pub max: [LaneArray; 3],
    /// Column major, element `column * 4 + row`.
    pub world: [LaneArray; 16],
}

impl BoxLanes {
    fn arrays_mut(&mut self) -> impl Iterator<Item = &mut LaneArray> {
        self.min.iter_mut().chain(self.max.iter_mut()).chain(self.world.iter_mut())
    }
}

/// Structure of arrays store of the items one culling pass looks at.
///
/// Every array holds `align_to_lane_count(len) + LANE_COUNT` entries. Entries
/// past `len` copy the last item, so full groups can be loaded without ever
/// producing data that was not written by an item.
#[derive(Debug, Default)]
pub struct SceneItemSet {
    members: DenseList,
    spheres: SphereLanes,
    boxes: BoxLanes,
    visibility: Vec<u32>,
    padding_stale: bool,
}

impl SceneItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Scene item of every position in the arrays.
    pub fn scene_items(&self) -> &[FreelistIndex] {
        self.members.items()
    }

    pub fn contains(&self, key: FreelistIndex) -> bool {
        self.members.contains(key)
    }

    /// Number of entries every array holds.
    pub fn capacity(&self) -> usize {
        self.visibility.len()
    }

    pub fn insert(&mut self, key: FreelistIndex, bounds: &ItemBounds) {
        let position = self.members.push(key);
        self.reserve(self.members.len());
        self.write(position, bounds);
        self.visibility[position] = VISIBLE;
        self.padding_stale = true;
    }

    pub fn update(&mut self, key: FreelistIndex, bounds: &ItemBounds) {
        if let Some(position) = self.members.position(key) {
            self.write(position, bounds);
            self.padding_stale = true;
        }
    }

    pub fn remove(&mut self, key: FreelistIndex) -> bool {
        let Some(removed) = self.members.swap_remove(key) else {
            return false;
        };
        if let Some(from) = removed.moved_from {
            self.copy_item(from, removed.position);
        }
        self.padding_stale = true;
        true
    }

    /// Visibility of the item after the last culling pass.
    pub fn is_visible(&self, key: FreelistIndex) -> Option<bool> {
        self.members.position(key).map(|position| self.visibility[position] != 0)
    }

    /// One flag per item, all bits set if visible.
    pub fn visibility_flags(&self) -> &[u32] {
        &self.visibility[..self.len()]
    }

    /// Grows the arrays to fit the current item count and refreshes the
    /// padding entries. Has to run before any culling task reads the arrays.
    pub fn prepare(&mut self) {
        profiling::scope!("SceneItemSet::prepare");

        self.reserve(self.len());
        if self.padding_stale {
            if let Some(last) = self.len().checked_sub(1) {
                for padding in self.len()..self.capacity() {
                    self.copy_item(last, padding);
                }
            }
            self.padding_stale = false;
        }
    }

    /// Arrays the culling kernels read together with the flags they write.
    pub fn culling_views(&mut self) -> (&SphereLanes, &BoxLanes, &mut [u32]) {
        debug_assert!(!self.padding_stale, "set used for culling without calling prepare");
        (&self.spheres, &self.boxes, &mut self.visibility)
    }

    pub fn set_all_visible(&mut self) {
        self.visibility.fill(VISIBLE);
    }

    fn reserve(&mut self, items: usize) {
        let needed = align_to_lane_count(items) + LANE_COUNT;
        if self.capacity() >= needed {
            return;
        }
        log::trace!("Growing scene item set from {} to {needed} entries", self.capacity());

        for array in self.spheres.arrays_mut() {
            array.resize(needed);
        }
        for array in self.boxes.arrays_mut() {
            array.resize(needed);
        }
        self.visibility.resize(needed, VISIBLE);
        self.padding_stale = true;
    }

    fn write(&mut self, position: usize, bounds: &ItemBounds) {
        let center = bounds.sphere.center;
        self.spheres.x.set(position, center.x);
        self.spheres.y.set(position, center.y);
        self.spheres.z.set(position, center.z);
        self.spheres.neg_radius.set(position, -bounds.sphere.radius);

        for axis in 0..3 {
            self.boxes.min[axis].set(position, bounds.min[axis]);
            self.boxes.max[axis].set(position, bounds.max[axis]);
        }
        for (array, value) in self.boxes.world.iter_mut().zip(bounds.world.to_cols_array()) {
            array.set(position, value);
        }
    }

    fn copy_item(&mut self, from: usize, to: usize) {
        for array in self.spheres.arrays_mut() {
            array.copy_item(from, to);
        }
        for array in self.boxes.arrays_mut() {
            array.copy_item(from, to);
        }
        self.visibility[to] = self.visibility[from];
    }
}
