use parking_lot::Mutex;

use crate::backend::GpuBackend;

/// Buffer living in [`HeadlessBackend`] memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HeadlessBuffer(usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HeadlessResourceGroup {
    pub buffer: HeadlessBuffer,
    pub root_parameter_index: u32,
}

/// A single recorded [`GpuBackend::write_buffer`] call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferWrite {
    pub buffer: HeadlessBuffer,
    pub offset: u64,
    pub size: u64,
}

/// Backend keeping every buffer in cpu memory.
///
/// Used to run the material buffer manager without a device, e.g. for tools
/// and tests. Every write is recorded.
pub struct HeadlessBackend {
    max_uniform_buffer_size: u64,
    buffers: Mutex<Vec<Vec<u8>>>,
    writes: Mutex<Vec<BufferWrite>>,
}

impl HeadlessBackend {
    pub fn new(max_uniform_buffer_size: u64) -> Self {
        Self {
            max_uniform_buffer_size,
            buffers: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn buffer_contents(&self, buffer: HeadlessBuffer) -> Vec<u8> {
        self.buffers.lock()[buffer.0].clone()
    }

    pub fn writes(&self) -> Vec<BufferWrite> {
        self.writes.lock().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }
}

impl GpuBackend for HeadlessBackend {
    type Buffer = HeadlessBuffer;
    type ResourceGroup = HeadlessResourceGroup;

    fn max_uniform_buffer_size(&self) -> u64 {
        self.max_uniform_buffer_size
    }

    fn create_uniform_buffer(&self, size: u64, _label: &str) -> Self::Buffer {
        let mut buffers = self.buffers.lock();
        buffers.push(vec![0; size as usize]);
        HeadlessBuffer(buffers.len() - 1)
    }

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) {
        let mut buffers = self.buffers.lock();
        let offset = offset as usize;
        buffers[buffer.0][offset..offset + data.len()].copy_from_slice(data);

        self.writes.lock().push(BufferWrite {
            buffer: *buffer,
            offset: offset as u64,
            size: data.len() as u64,
        });
    }

    fn create_resource_group(
        &self,
        buffer: &Self::Buffer,
        root_parameter_index: u32,
        _label: &str,
    ) -> Self::ResourceGroup {
        HeadlessResourceGroup {
            buffer: *buffer,
            root_parameter_index,
        }
    }
}
