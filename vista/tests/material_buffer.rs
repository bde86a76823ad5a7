use glam::{Mat4, Vec2, Vec3, Vec4};
use rand::{rngs::StdRng, Rng, SeedableRng};
use vista::{
    backend::{CommandBuffer, HeadlessBackend},
    managers::{
        MaterialBlueprintResourceListener, MaterialBufferManager, MaterialBufferSlot, MaterialUploadContext,
        NoResourceListener,
    },
    options::MaterialBufferOptions,
    types::{
        ElementSource, MaterialBlueprint, MaterialHandle, MaterialProperties, MaterialProperty, MaterialPropertyId,
        MaterialPropertyValue, UniformBufferElement, UniformBufferLayout, ValueType,
    },
    util::typedefs::{FastHashMap, FastHashSet},
};

const ROUGHNESS: MaterialPropertyId = MaterialPropertyId::from_name("Roughness");
const SUN_DIRECTION: MaterialPropertyId = MaterialPropertyId::from_name("SunDirection");
const UV_SCALE: MaterialPropertyId = MaterialPropertyId::from_name("UvScale");
const TIME: MaterialPropertyId = MaterialPropertyId::from_name("Time");
const VIEW_PROJECTION: MaterialPropertyId = MaterialPropertyId::from_name("ViewProjection");
const TINT: MaterialPropertyId = MaterialPropertyId::from_name("Tint");

const RECORD: usize = 128;

/// Element sizes 4, 12, 8, 12, 4, 64, 16.
fn blueprint() -> MaterialBlueprint {
    let elements = vec![
        UniformBufferElement::new(ValueType::Float, ElementSource::MaterialReference(ROUGHNESS)),
        UniformBufferElement::new(ValueType::Float3, ElementSource::GlobalReference(SUN_DIRECTION)),
        UniformBufferElement::new(ValueType::Float2, ElementSource::MaterialReference(UV_SCALE)),
        UniformBufferElement::new(ValueType::Float3, ElementSource::UnknownReference(TIME)),
        UniformBufferElement::new(
            ValueType::Float,
            ElementSource::Static(MaterialPropertyValue::Float(0.5)),
        ),
        UniformBufferElement::new(ValueType::Float4x4, ElementSource::GlobalReference(VIEW_PROJECTION)),
        UniformBufferElement::new(ValueType::Float4, ElementSource::MaterialReference(TINT)),
    ];
    MaterialBlueprint {
        properties: MaterialProperties::from_properties(vec![
            MaterialProperty::new("UvScale", MaterialPropertyValue::Float2(Vec2::new(2.0, 3.0))),
            MaterialProperty::new("Roughness", MaterialPropertyValue::Float(1.0)),
        ])
        .unwrap(),
        uniform_buffer: UniformBufferLayout::packed(elements, 4),
    }
}

fn globals() -> MaterialProperties {
    MaterialProperties::from_properties(vec![
        MaterialProperty::new("SunDirection", MaterialPropertyValue::Float3(Vec3::new(0.0, -1.0, 0.0))),
        MaterialProperty::new(
            "ViewProjection",
            MaterialPropertyValue::Float4x4(Mat4::from_scale(Vec3::splat(2.0))),
        ),
        MaterialProperty::new("Tint", MaterialPropertyValue::Float4(Vec4::new(0.1, 0.2, 0.3, 0.4))),
        // Globals never override material properties.
        MaterialProperty::new("Roughness", MaterialPropertyValue::Float(9.0)),
    ])
    .unwrap()
}

fn material(roughness: f32) -> MaterialProperties {
    MaterialProperties::from_properties(vec![MaterialProperty::new(
        "Roughness",
        MaterialPropertyValue::Float(roughness),
    )])
    .unwrap()
}

#[derive(Default)]
struct TimeListener {
    batches: usize,
    time: f32,
}

impl MaterialBlueprintResourceListener for TimeListener {
    fn begin_fill_material(&mut self) {
        self.batches += 1;
        self.time += 1.0;
    }

    fn fill_material_value(&mut self, id: MaterialPropertyId, out: &mut [u8]) -> bool {
        if id != TIME {
            return false;
        }
        out.copy_from_slice(bytemuck::bytes_of(&[self.time; 3]));
        true
    }
}

fn upload(
    manager: &mut MaterialBufferManager<HeadlessBackend>,
    backend: &HeadlessBackend,
    materials: &FastHashMap<MaterialHandle, MaterialProperties>,
    listener: &mut TimeListener,
) {
    let globals = globals();
    manager.reset_last_bound_pool(
        backend,
        &mut MaterialUploadContext {
            materials,
            global_properties: &globals,
            listener,
        },
    );
}

fn read<T: bytemuck::Pod>(bytes: &[u8], offset: usize) -> T {
    bytemuck::pod_read_unaligned(&bytes[offset..offset + std::mem::size_of::<T>()])
}

#[test]
fn records_follow_packing_and_resolution_order() {
    let backend = HeadlessBackend::new(64 * 1024);
    let mut manager = MaterialBufferManager::new(&backend, blueprint(), &MaterialBufferOptions::default()).unwrap();
    assert_eq!(manager.bytes_per_element() as usize, RECORD);
    assert_eq!(manager.slots_per_pool() as usize, 64 * 1024 / RECORD);

    let handle = MaterialHandle::new(3);
    let mut materials = FastHashMap::default();
    materials.insert(handle, material(0.25));

    let mut slot = MaterialBufferSlot::new(handle);
    manager.request_slot(&backend, &mut slot);
    let mut listener = TimeListener::default();
    upload(&mut manager, &backend, &materials, &mut listener);
    assert_eq!(listener.batches, 1);

    let info = manager.slot_info(&slot).unwrap();
    assert!(!info.dirty);
    let bytes = backend.buffer_contents(*manager.pool_buffer(info.pool));
    let base = info.slot_index as usize * RECORD;

    // material property over global and blueprint default
    assert_eq!(read::<f32>(&bytes, base), 0.25);
    assert_eq!(read::<[f32; 3]>(&bytes, base + 4), [0.0, -1.0, 0.0]);
    // blueprint default
    assert_eq!(read::<[f32; 2]>(&bytes, base + 16), [2.0, 3.0]);
    // listener
    assert_eq!(read::<[f32; 3]>(&bytes, base + 32), [1.0; 3]);
    assert_eq!(read::<f32>(&bytes, base + 44), 0.5);
    assert_eq!(read::<[f32; 16]>(&bytes, base + 48), Mat4::from_scale(Vec3::splat(2.0)).to_cols_array());
    // material reference falling back to a global
    assert_eq!(read::<[f32; 4]>(&bytes, base + 112), [0.1, 0.2, 0.3, 0.4]);
    // padding between packages stays zero
    assert_eq!(read::<[u8; 4]>(&bytes, base + 24), [0; 4]);
}

#[test]
fn request_then_release_restores_pool_state() {
    let backend = HeadlessBackend::new(64 * 1024);
    let mut manager = MaterialBufferManager::new(&backend, blueprint(), &MaterialBufferOptions::default()).unwrap();

    let mut first = MaterialBufferSlot::new(MaterialHandle::new(0));
    manager.request_slot(&backend, &mut first);
    let pools = manager.pool_count();
    let mut free = manager.free_slots(0).to_vec();
    free.sort_unstable();
    let assigned = manager.assigned_slots().len();

    let mut second = MaterialBufferSlot::new(MaterialHandle::new(1));
    manager.request_slot(&backend, &mut second);
    manager.release_slot(&mut second);
    assert!(!second.is_assigned());
    assert_eq!(manager.slot_info(&second), None);

    let mut after = manager.free_slots(0).to_vec();
    after.sort_unstable();
    assert_eq!(manager.pool_count(), pools);
    assert_eq!(after, free);
    assert_eq!(manager.assigned_slots().len(), assigned);
    assert_eq!(manager.dirty_slot_count(), 1);
}

#[test]
fn requesting_an_assigned_slot_reassigns_it() {
    let backend = HeadlessBackend::new(64 * 1024);
    let mut manager = MaterialBufferManager::new(&backend, blueprint(), &MaterialBufferOptions::default()).unwrap();

    let mut slot = MaterialBufferSlot::new(MaterialHandle::new(0));
    manager.request_slot(&backend, &mut slot);
    let first = slot.key();
    manager.request_slot(&backend, &mut slot);

    assert_ne!(slot.key(), first);
    assert_eq!(manager.assigned_slots().len(), 1);
    assert_eq!(manager.dirty_slot_count(), 1);
    assert_eq!(manager.free_slots(0).len() as u32, manager.slots_per_pool() - 1);
}

#[test]
fn dirty_slots_upload_once_with_latest_data() {
    let backend = HeadlessBackend::new(64 * 1024);
    let mut manager = MaterialBufferManager::new(&backend, blueprint(), &MaterialBufferOptions::default()).unwrap();
    let mut listener = TimeListener::default();

    let handles = [MaterialHandle::new(0), MaterialHandle::new(1), MaterialHandle::new(2)];
    let mut materials: FastHashMap<_, _> = handles.iter().map(|&h| (h, material(0.5))).collect();
    let mut slots: Vec<_> = handles.iter().map(|&h| MaterialBufferSlot::new(h)).collect();
    for slot in &mut slots {
        manager.request_slot(&backend, slot);
    }
    upload(&mut manager, &backend, &materials, &mut listener);
    assert_eq!(backend.writes().len(), 1);
    assert_eq!(backend.writes()[0].size as usize, 3 * RECORD);

    let buffer = *manager.pool_buffer(0);
    let untouched = manager.slot_info(&slots[2]).unwrap();
    let before = backend.buffer_contents(buffer);
    backend.clear_writes();

    manager.schedule_for_update(&slots[1]);
    materials.insert(handles[1], material(0.75));
    manager.schedule_for_update(&slots[1]);
    assert_eq!(manager.dirty_slot_count(), 1);
    upload(&mut manager, &backend, &materials, &mut listener);

    let info = manager.slot_info(&slots[1]).unwrap();
    let writes = backend.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].offset as usize, info.slot_index as usize * RECORD);
    assert_eq!(writes[0].size as usize, RECORD);

    let after = backend.buffer_contents(buffer);
    assert_eq!(read::<f32>(&after, info.slot_index as usize * RECORD), 0.75);
    let range = untouched.slot_index as usize * RECORD..(untouched.slot_index as usize + 1) * RECORD;
    assert_eq!(after[range.clone()], before[range]);

    // Nothing dirty, nothing written.
    backend.clear_writes();
    upload(&mut manager, &backend, &materials, &mut listener);
    assert!(backend.writes().is_empty());
    assert_eq!(listener.batches, 2);
}

#[test]
fn one_write_per_touched_pool() {
    let backend = HeadlessBackend::new(64 * 1024);
    let options = MaterialBufferOptions {
        maximum_pool_bytes: 2 * RECORD as u64,
        ..MaterialBufferOptions::default()
    };
    let mut manager = MaterialBufferManager::new(&backend, blueprint(), &options).unwrap();
    let materials = FastHashMap::default();
    let mut listener = TimeListener::default();

    let mut slots: Vec<_> = (0..5).map(|i| MaterialBufferSlot::new(MaterialHandle::new(i))).collect();
    for slot in &mut slots {
        manager.request_slot(&backend, slot);
    }
    assert_eq!(manager.pool_count(), 3);
    assert_eq!(backend.buffer_count(), 3);

    upload(&mut manager, &backend, &materials, &mut listener);
    let written: FastHashSet<_> = backend.writes().iter().map(|write| write.buffer).collect();
    assert_eq!(backend.writes().len(), 3);
    assert_eq!(written.len(), 3);

    // A hole in the middle pool is refilled before a new pool is created.
    let freed = manager.slot_info(&slots[2]).unwrap();
    manager.release_slot(&mut slots[2]);
    let mut slot = MaterialBufferSlot::new(MaterialHandle::new(9));
    manager.request_slot(&backend, &mut slot);
    let refilled = manager.slot_info(&slot).unwrap();
    assert_eq!((refilled.pool, refilled.slot_index), (freed.pool, freed.slot_index));
    assert_eq!(manager.pool_count(), 3);
}

#[test]
fn assigned_list_stays_consistent() {
    let backend = HeadlessBackend::new(64 * 1024);
    let options = MaterialBufferOptions {
        maximum_pool_bytes: 8 * RECORD as u64,
        ..MaterialBufferOptions::default()
    };
    let mut manager = MaterialBufferManager::new(&backend, blueprint(), &options).unwrap();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut slots: Vec<_> = (0..64).map(|i| MaterialBufferSlot::new(MaterialHandle::new(i))).collect();

    for step in 0..2000 {
        let slot = &mut slots[rng.gen_range(0..64)];
        if slot.is_assigned() && rng.gen_bool(0.6) {
            manager.release_slot(slot);
        } else {
            manager.request_slot(&backend, slot);
        }

        let live: Vec<_> = slots.iter().filter(|slot| slot.is_assigned()).collect();
        assert_eq!(manager.assigned_slots().len(), live.len(), "step {step}");
        for slot in live {
            let info = manager.slot_info(slot).unwrap();
            assert_eq!(Some(manager.assigned_slots()[info.global_index]), slot.key(), "step {step}");
        }
    }

    let used: usize = (0..manager.pool_count())
        .map(|pool| manager.slots_per_pool() as usize - manager.free_slots(pool).len())
        .sum();
    assert_eq!(used, manager.assigned_slots().len());
}

#[test]
fn pool_binds_are_recorded() {
    let backend = HeadlessBackend::new(64 * 1024);
    let options = MaterialBufferOptions {
        maximum_pool_bytes: RECORD as u64,
        root_parameter_index: 3,
        ..MaterialBufferOptions::default()
    };
    let mut manager = MaterialBufferManager::new(&backend, blueprint(), &options).unwrap();
    let mut a = MaterialBufferSlot::new(MaterialHandle::new(0));
    let mut b = MaterialBufferSlot::new(MaterialHandle::new(1));
    manager.request_slot(&backend, &mut a);
    manager.request_slot(&backend, &mut b);

    let mut commands = CommandBuffer::new();
    manager.fill_command_buffer(&a, &mut commands);
    manager.fill_command_buffer(&a, &mut commands);
    manager.fill_command_buffer(&b, &mut commands);
    manager.fill_command_buffer(&a, &mut commands);
    assert_eq!(commands.len(), 3);

    let vista::backend::Command::SetGraphicsResourceGroup {
        root_parameter_index,
        resource_group,
    } = &commands.commands()[1];
    assert_eq!(*root_parameter_index, 3);
    assert_eq!(resource_group, manager.pool_resource_group(1));
}

#[test]
#[should_panic(expected = "can not be resolved")]
fn listener_refusal_is_fatal() {
    let backend = HeadlessBackend::new(64 * 1024);
    let mut manager = MaterialBufferManager::new(&backend, blueprint(), &MaterialBufferOptions::default()).unwrap();
    let mut slot = MaterialBufferSlot::new(MaterialHandle::new(0));
    manager.request_slot(&backend, &mut slot);

    let materials: Vec<MaterialProperties> = Vec::new();
    let globals = globals();
    manager.reset_last_bound_pool(
        &backend,
        &mut MaterialUploadContext {
            materials: &materials,
            global_properties: &globals,
            listener: &mut NoResourceListener,
        },
    );
}
