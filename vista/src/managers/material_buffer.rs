use std::{
    ops::Range,
    sync::atomic::{AtomicUsize, Ordering},
};

use vista_types::{
    packed_element_offsets, ElementSource, MaterialBlueprint, MaterialHandle, MaterialProperties, MaterialPropertyId,
    MaterialPropertyValue, UniformBufferElement, PACKAGE_SIZE,
};

use crate::{
    backend::{Command, CommandBuffer, GpuBackend},
    error::MaterialBufferError,
    options::{MaterialBufferOptions, DEFAULT_MAXIMUM_POOL_BYTES},
    util::{
        dense_list::DenseList,
        freelist::{FreelistIndex, FreelistVec},
        math::{round_down_pot, round_up_pot},
        typedefs::FastHashMap,
    },
};

static MANAGER_ID_ALLOCATOR: AtomicUsize = AtomicUsize::new(0);

/// Per material properties, looked up by the material a slot belongs to.
pub trait MaterialPropertySource {
    fn material_properties(&self, material: MaterialHandle) -> Option<&MaterialProperties>;
}

impl MaterialPropertySource for FastHashMap<MaterialHandle, MaterialProperties> {
    fn material_properties(&self, material: MaterialHandle) -> Option<&MaterialProperties> {
        self.get(&material)
    }
}

impl MaterialPropertySource for [MaterialProperties] {
    fn material_properties(&self, material: MaterialHandle) -> Option<&MaterialProperties> {
        self.get(material.idx)
    }
}

impl MaterialPropertySource for Vec<MaterialProperties> {
    fn material_properties(&self, material: MaterialHandle) -> Option<&MaterialProperties> {
        self.as_slice().material_properties(material)
    }
}

/// Provides values no material, global or blueprint property defines, e.g.
/// camera matrices or the current time.
pub trait MaterialBlueprintResourceListener {
    /// Called once before the dirty slots of an upload are filled.
    fn begin_fill_material(&mut self) {}

    /// Writes the value of `id` into `out`, which is exactly as large as the
    /// element being filled. Returns false if the listener does not know the
    /// property.
    fn fill_material_value(&mut self, id: MaterialPropertyId, out: &mut [u8]) -> bool;
}

/// Listener that resolves nothing.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoResourceListener;

impl MaterialBlueprintResourceListener for NoResourceListener {
    fn fill_material_value(&mut self, _id: MaterialPropertyId, _out: &mut [u8]) -> bool {
        false
    }
}

/// Everything an upload reads property values from.
pub struct MaterialUploadContext<'a> {
    pub materials: &'a dyn MaterialPropertySource,
    pub global_properties: &'a MaterialProperties,
    pub listener: &'a mut dyn MaterialBlueprintResourceListener,
}

/// A material technique's claim on one record of a pool buffer.
///
/// Created unassigned. Only the manager that assigned a slot may be handed the
/// slot back.
#[derive(Debug)]
pub struct MaterialBufferSlot {
    material: MaterialHandle,
    /// Id of the assigning manager and the record's key inside of it.
    assignment: Option<(usize, FreelistIndex)>,
}

impl MaterialBufferSlot {
    pub fn new(material: MaterialHandle) -> Self {
        Self {
            material,
            assignment: None,
        }
    }

    pub fn material(&self) -> MaterialHandle {
        self.material
    }

    pub fn is_assigned(&self) -> bool {
        self.assignment.is_some()
    }

    /// Identity of the assignment, `None` while unassigned.
    pub fn key(&self) -> Option<FreelistIndex> {
        self.assignment.map(|(_, key)| key)
    }
}

/// Where an assigned slot lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub pool: usize,
    pub slot_index: u32,
    /// Position in [`MaterialBufferManager::assigned_slots`].
    pub global_index: usize,
    pub dirty: bool,
}

struct SlotState {
    material: MaterialHandle,
    pool: usize,
    slot: u32,
}

struct BufferPool<B: GpuBackend> {
    buffer: B::Buffer,
    resource_group: B::ResourceGroup,
    /// Popped from the back.
    free_slots: Vec<u32>,
    /// Cpu copy of the whole buffer.
    mirror: Vec<u8>,
}

/// Pools uniform buffers holding the per material data of one blueprint.
pub struct MaterialBufferManager<B: GpuBackend> {
    id: usize,
    blueprint: MaterialBlueprint,
    element_offsets: Vec<u32>,
    bytes_per_element: u32,
    buffer_size: u64,
    slots_per_pool: u32,
    root_parameter_index: u32,
    label: String,

    pools: Vec<BufferPool<B>>,
    slots: FreelistVec<SlotState>,
    assigned: DenseList,
    dirty: DenseList,
    last_bound_pool: Option<usize>,
}

impl<B: GpuBackend> MaterialBufferManager<B> {
    pub fn new(
        backend: &B,
        blueprint: MaterialBlueprint,
        options: &MaterialBufferOptions,
    ) -> Result<Self, MaterialBufferError> {
        profiling::scope!("MaterialBufferManager::new");

        let device_max = backend.max_uniform_buffer_size();
        if device_max < DEFAULT_MAXIMUM_POOL_BYTES {
            log::debug!(
                "Device uniform buffers are limited to {device_max} bytes, below the usual {DEFAULT_MAXIMUM_POOL_BYTES}"
            );
        }
        if options.maximum_pool_bytes > device_max {
            log::warn!(
                "Material pool size of {} bytes exceeds the device limit, clamping to {device_max}",
                options.maximum_pool_bytes
            );
        }
        let buffer_size = round_down_pot(options.maximum_pool_bytes.min(device_max), PACKAGE_SIZE as u64);

        let layout = &blueprint.uniform_buffer;
        let bytes_per_element = layout.bytes_per_element();
        if bytes_per_element == 0 {
            return Err(MaterialBufferError::EmptyElement);
        }
        if u64::from(bytes_per_element) > buffer_size {
            return Err(MaterialBufferError::ElementTooLarge {
                bytes_per_element,
                buffer_size,
            });
        }

        let element_offsets: Vec<u32> = packed_element_offsets(layout.elements.iter().map(|e| e.byte_size())).collect();
        let packed_bytes = element_offsets
            .iter()
            .zip(&layout.elements)
            .map(|(offset, element)| offset + element.byte_size())
            .max()
            .unwrap_or(0);
        if packed_bytes > bytes_per_element {
            return Err(MaterialBufferError::LayoutOverflow {
                packed_bytes,
                bytes_per_element,
            });
        }

        let slots_per_pool = (buffer_size / u64::from(bytes_per_element)) as u32;
        log::debug!(
            "Material buffer {:?}: {bytes_per_element} byte records, {slots_per_pool} per {buffer_size} byte pool",
            options.label
        );

        Ok(Self {
            id: MANAGER_ID_ALLOCATOR.fetch_add(1, Ordering::Relaxed),
            blueprint,
            element_offsets,
            bytes_per_element,
            buffer_size,
            slots_per_pool,
            root_parameter_index: options.root_parameter_index,
            label: options.label.clone(),
            pools: Vec::new(),
            slots: FreelistVec::new(),
            assigned: DenseList::new(),
            dirty: DenseList::new(),
            last_bound_pool: None,
        })
    }

    pub fn blueprint(&self) -> &MaterialBlueprint {
        &self.blueprint
    }

    pub fn bytes_per_element(&self) -> u32 {
        self.bytes_per_element
    }

    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    pub fn slots_per_pool(&self) -> u32 {
        self.slots_per_pool
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn pool_buffer(&self, pool: usize) -> &B::Buffer {
        &self.pools[pool].buffer
    }

    pub fn pool_resource_group(&self, pool: usize) -> &B::ResourceGroup {
        &self.pools[pool].resource_group
    }

    /// Free slot stack of a pool, the next slot handed out is last.
    pub fn free_slots(&self, pool: usize) -> &[u32] {
        &self.pools[pool].free_slots
    }

    /// Every assigned slot, indexed by [`SlotInfo::global_index`].
    pub fn assigned_slots(&self) -> &[FreelistIndex] {
        self.assigned.items()
    }

    pub fn dirty_slot_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn last_bound_pool(&self) -> Option<usize> {
        self.last_bound_pool
    }

    /// Placement of `slot`, `None` unless this manager assigned it.
    pub fn slot_info(&self, slot: &MaterialBufferSlot) -> Option<SlotInfo> {
        let key = self.own_key(slot)?;
        let state = self.slots.get(key)?;
        Some(SlotInfo {
            pool: state.pool,
            slot_index: state.slot,
            global_index: self.assigned.position(key)?,
            dirty: self.dirty.contains(key),
        })
    }

    fn own_key(&self, slot: &MaterialBufferSlot) -> Option<FreelistIndex> {
        match slot.assignment {
            Some((owner, key)) if owner == self.id => Some(key),
            _ => None,
        }
    }

    /// Assigns a record to `slot` and schedules it for upload. A slot that is
    /// already assigned gets released first.
    pub fn request_slot(&mut self, backend: &B, slot: &mut MaterialBufferSlot) {
        profiling::scope!("MaterialBufferManager::request_slot");

        if slot.is_assigned() {
            self.release_slot(slot);
        }

        let pool = match self.pools.iter().position(|pool| !pool.free_slots.is_empty()) {
            Some(pool) => pool,
            None => self.allocate_pool(backend),
        };
        let Some(slot_index) = self.pools[pool].free_slots.pop() else {
            unreachable!("pool {pool} was picked without a free slot");
        };

        let key = self.slots.push(SlotState {
            material: slot.material,
            pool,
            slot: slot_index,
        });
        self.assigned.push(key);
        self.dirty.push(key);
        slot.assignment = Some((self.id, key));
    }

    /// Returns the record of `slot` to its pool. Panics if the slot is not
    /// assigned by this manager.
    #[track_caller]
    pub fn release_slot(&mut self, slot: &mut MaterialBufferSlot) {
        let Some((owner, key)) = slot.assignment else {
            panic!("releasing a material buffer slot that was never assigned");
        };
        assert_eq!(owner, self.id, "material buffer slot {key:?} belongs to another manager");
        slot.assignment = None;
        let Some(state) = self.slots.remove(key) else {
            panic!("material buffer slot {key:?} is stale");
        };
        let Some(pool) = self.pools.get_mut(state.pool) else {
            panic!("material buffer slot {key:?} refers to unknown pool {}", state.pool);
        };
        assert!(
            !pool.free_slots.contains(&state.slot),
            "slot {} of pool {} is already free",
            state.slot,
            state.pool
        );

        self.dirty.swap_remove(key);
        pool.free_slots.push(state.slot);
        self.assigned.swap_remove(key);
    }

    /// Marks `slot` for upload. Scheduling a dirty slot again does nothing.
    #[track_caller]
    pub fn schedule_for_update(&mut self, slot: &MaterialBufferSlot) {
        let key = match self.own_key(slot) {
            Some(key) if self.slots.contains(key) => key,
            _ => panic!("scheduling an unassigned material buffer slot"),
        };
        if !self.dirty.contains(key) {
            self.dirty.push(key);
        }
    }

    /// Starts a new draw batch: forgets the bound pool and uploads every dirty
    /// slot.
    pub fn reset_last_bound_pool(&mut self, backend: &B, context: &mut MaterialUploadContext<'_>) {
        self.last_bound_pool = None;
        if !self.dirty.is_empty() {
            self.upload_dirty_slots(backend, context);
        }
    }

    /// Binds the pool of `slot` unless it is already bound.
    #[track_caller]
    pub fn fill_command_buffer(&mut self, slot: &MaterialBufferSlot, commands: &mut CommandBuffer<B>) {
        let Some(state) = self.own_key(slot).and_then(|key| self.slots.get(key)) else {
            panic!("binding an unassigned material buffer slot");
        };
        if self.last_bound_pool == Some(state.pool) {
            return;
        }

        commands.push(Command::SetGraphicsResourceGroup {
            root_parameter_index: self.root_parameter_index,
            resource_group: self.pools[state.pool].resource_group.clone(),
        });
        self.last_bound_pool = Some(state.pool);
    }

    fn allocate_pool(&mut self, backend: &B) -> usize {
        profiling::scope!("MaterialBufferManager::allocate_pool");

        let index = self.pools.len();
        let label = format!("{} {index}", self.label);
        let buffer = backend.create_uniform_buffer(self.buffer_size, &label);
        let resource_group = backend.create_resource_group(&buffer, self.root_parameter_index, &label);

        log::debug!("Allocated material buffer pool {label:?} with {} slots", self.slots_per_pool);

        self.pools.push(BufferPool {
            buffer,
            resource_group,
            free_slots: (0..self.slots_per_pool).rev().collect(),
            mirror: vec![0; self.buffer_size as usize],
        });
        index
    }

    fn upload_dirty_slots(&mut self, backend: &B, context: &mut MaterialUploadContext<'_>) {
        profiling::scope!("MaterialBufferManager::upload_dirty_slots");

        context.listener.begin_fill_material();

        let record_size = self.bytes_per_element as usize;
        let mut spans: Vec<Option<Range<usize>>> = vec![None; self.pools.len()];

        for key in self.dirty.drain() {
            let state = &self.slots[key];
            let start = state.slot as usize * record_size;
            let end = start + record_size;

            let pool = &mut self.pools[state.pool];
            fill_record(
                &self.blueprint,
                &self.element_offsets,
                state.material,
                &mut pool.mirror[start..end],
                context,
            );

            let span = spans[state.pool].get_or_insert(start..end);
            span.start = span.start.min(start);
            span.end = span.end.max(end);
        }

        for (pool, span) in self.pools.iter().zip(spans) {
            let Some(span) = span else {
                continue;
            };
            let start = round_down_pot(span.start, PACKAGE_SIZE as usize);
            let end = round_up_pot(span.end, PACKAGE_SIZE as usize).min(pool.mirror.len());
            backend.write_buffer(&pool.buffer, start as u64, &pool.mirror[start..end]);
        }
    }
}

fn fill_record(
    blueprint: &MaterialBlueprint,
    offsets: &[u32],
    material: MaterialHandle,
    record: &mut [u8],
    context: &mut MaterialUploadContext<'_>,
) {
    let material_properties = context.materials.material_properties(material);

    for (element, &offset) in blueprint.uniform_buffer.elements.iter().zip(offsets) {
        let offset = offset as usize;
        let out = &mut record[offset..offset + element.byte_size() as usize];

        let resolved = match element.source {
            ElementSource::Static(value) => Some(value),
            ElementSource::MaterialReference(id) => material_properties
                .and_then(|properties| properties.property_by_id(id))
                .or_else(|| context.global_properties.property_by_id(id))
                .or_else(|| blueprint.properties.property_by_id(id))
                .map(|property| property.value),
            ElementSource::GlobalReference(id) => context.global_properties.property_by_id(id).map(|p| p.value),
            ElementSource::UnknownReference(_) => None,
        };

        match resolved {
            Some(value) => write_value(element, value, out),
            None => {
                let Some(id) = element.reference() else {
                    unreachable!("static elements always resolve");
                };
                if !context.listener.fill_material_value(id, out) {
                    panic!("material property {id:?} of {material:?} can not be resolved");
                }
            }
        }
    }
}

#[track_caller]
fn write_value(element: &UniformBufferElement, value: MaterialPropertyValue, out: &mut [u8]) {
    assert_eq!(
        value.value_type(),
        element.value_type,
        "material property value does not match the blueprint's element type"
    );
    value.write_bytes(out);
}
