//! The small slice of a graphics API the material buffer manager needs.

mod headless;
mod wgpu_backend;

pub use self::headless::{BufferWrite, HeadlessBackend, HeadlessBuffer, HeadlessResourceGroup};
pub use self::wgpu_backend::{encode_commands, WgpuBackend};

/// Uniform buffer creation, upload and binding.
pub trait GpuBackend {
    type Buffer;
    /// Binding object wrapping a buffer for shader access.
    type ResourceGroup: Clone;

    /// Largest uniform buffer binding the device supports, in bytes.
    fn max_uniform_buffer_size(&self) -> u64;

    fn create_uniform_buffer(&self, size: u64, label: &str) -> Self::Buffer;

    /// Copies `data` into the buffer at `offset`. This is the map, copy, unmap
    /// step of an upload and is called at most once per buffer per upload.
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]);

    fn create_resource_group(
        &self,
        buffer: &Self::Buffer,
        root_parameter_index: u32,
        label: &str,
    ) -> Self::ResourceGroup;
}

/// A recorded command.
pub enum Command<B: GpuBackend> {
    SetGraphicsResourceGroup {
        root_parameter_index: u32,
        resource_group: B::ResourceGroup,
    },
}

impl<B: GpuBackend> Clone for Command<B> {
    fn clone(&self) -> Self {
        match self {
            Self::SetGraphicsResourceGroup {
                root_parameter_index,
                resource_group,
            } => Self::SetGraphicsResourceGroup {
                root_parameter_index: *root_parameter_index,
                resource_group: resource_group.clone(),
            },
        }
    }
}

impl<B: GpuBackend> PartialEq for Command<B>
where
    B::ResourceGroup: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::SetGraphicsResourceGroup {
                    root_parameter_index: a_index,
                    resource_group: a_group,
                },
                Self::SetGraphicsResourceGroup {
                    root_parameter_index: b_index,
                    resource_group: b_group,
                },
            ) => a_index == b_index && a_group == b_group,
        }
    }
}

impl<B: GpuBackend> std::fmt::Debug for Command<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetGraphicsResourceGroup {
                root_parameter_index, ..
            } => f
                .debug_struct("SetGraphicsResourceGroup")
                .field("root_parameter_index", root_parameter_index)
                .finish_non_exhaustive(),
        }
    }
}

/// Commands recorded while preparing draws, replayed by the backend later.
pub struct CommandBuffer<B: GpuBackend> {
    commands: Vec<Command<B>>,
}

impl<B: GpuBackend> CommandBuffer<B> {
    pub fn new() -> Self {
        Self { commands: Vec::new() }
    }

    pub fn push(&mut self, command: Command<B>) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command<B>] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<B: GpuBackend> Default for CommandBuffer<B> {
    fn default() -> Self {
        Self::new()
    }
}
