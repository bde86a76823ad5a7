use std::sync::Arc;

use ::wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    BindingType, Buffer, BufferBindingType, BufferDescriptor, BufferUsages, Device, Queue, RenderPass, ShaderStages,
};

use crate::backend::{Command, CommandBuffer, GpuBackend};

/// Backend creating wgpu uniform buffers with one bind group per buffer.
///
/// Every bind group has the buffer at binding 0 and uses
/// [`WgpuBackend::uniform_layout`], which pipelines consuming material data
/// must put at the root parameter index the material buffer manager uses.
pub struct WgpuBackend {
    device: Arc<Device>,
    queue: Arc<Queue>,
    uniform_layout: BindGroupLayout,
}

impl WgpuBackend {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>) -> Self {
        profiling::scope!("WgpuBackend::new");

        let uniform_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("material buffer bgl"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX_FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        Self {
            device,
            queue,
            uniform_layout,
        }
    }

    pub fn uniform_layout(&self) -> &BindGroupLayout {
        &self.uniform_layout
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }
}

impl GpuBackend for WgpuBackend {
    type Buffer = Arc<Buffer>;
    type ResourceGroup = Arc<BindGroup>;

    fn max_uniform_buffer_size(&self) -> u64 {
        self.device.limits().max_uniform_buffer_binding_size as u64
    }

    fn create_uniform_buffer(&self, size: u64, label: &str) -> Self::Buffer {
        Arc::new(self.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        }))
    }

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }

    fn create_resource_group(
        &self,
        buffer: &Self::Buffer,
        _root_parameter_index: u32,
        label: &str,
    ) -> Self::ResourceGroup {
        Arc::new(self.device.create_bind_group(&BindGroupDescriptor {
            label: Some(label),
            layout: &self.uniform_layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        }))
    }
}

/// Replays recorded commands into a render pass.
pub fn encode_commands<'rpass>(commands: &'rpass CommandBuffer<WgpuBackend>, rpass: &mut RenderPass<'rpass>) {
    for command in commands.commands() {
        match command {
            Command::SetGraphicsResourceGroup {
                root_parameter_index,
                resource_group,
            } => rpass.set_bind_group(*root_parameter_index, resource_group, &[]),
        }
    }
}
