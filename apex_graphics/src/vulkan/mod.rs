pub mod bindless;
pub mod command;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod queue;
pub mod queue_family;
pub mod resource;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod types;

pub use ash::{self, vk};
pub use gpu_allocator;
pub use raw_window_handle;

pub use bindless::{BindlessHeap, BindlessHeapDescriptor, BindlessSlot};
pub use command::{CommandBuffer, QueueOwnershipTransfer};
pub use device::Device;
pub use queue::Queue;
pub use resource::{
    Buffer, BufferDescriptor, ComputePipeline, ComputePipelineDescriptor, Image, ImageDescriptor,
    Pipeline, PipelineDescriptor, Sampler, SamplerDescriptor,
};
pub use shader::{ShaderModule, ShaderModuleDescriptor, ShaderStage};
pub use sync::{Fence, QueueSubmitSemaphoreDescriptor, Semaphore, SemaphoreType};
pub use types::{
    DescriptorSetLayoutBinding, PipelineDepthStencilState, PipelineRasterizationState,
    REVERSE_Z_CLEAR_VALUE,
};
