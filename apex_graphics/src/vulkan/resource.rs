//! Buffers, images, samplers and pipelines.
//!
//! Grounded on `eclale_graphics/src/vulkan/resource.rs`: the descriptor
//! write/update machinery there (per-material `DescriptorSet`) is replaced
//! by registration into the device's [`crate::vulkan::bindless::BindlessHeap`]
//! - a created [`Image`]/[`Buffer`] gets a [`BindlessSlot`] instead of a
//! dedicated descriptor set, and every pipeline built here uses the one
//! global pipeline layout from the heap. Pending-destruction deferred via
//! [`crate::vulkan::device::ResourceHub`] exactly as the teacher does, since
//! a resource referenced by an in-flight frame's command buffer cannot be
//! destroyed immediately.

use std::sync::Arc;

use anyhow::Result;
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::bindless::BindlessSlot;
use super::device::Device;
use super::sync::Fence;
use super::types::{PipelineDepthStencilState, PipelineRasterizationState};

pub struct BufferDescriptor {
    pub size: u64,
    pub usage_flags: vk::BufferUsageFlags,
    pub memory_location: MemoryLocation,
}

pub struct Buffer {
    pub(crate) raw: vk::Buffer,
    allocation: Option<Allocation>,
    pub size: u64,
    device: Arc<Device>,

    /// Bindless slot this buffer is bound at, per descriptor kind. `None`
    /// is the "-1/unbound" state; binding a kind twice is a precondition
    /// violation, not a silent replace.
    uniform_buffer_slot: Option<BindlessSlot>,
    storage_buffer_slot: Option<BindlessSlot>,
}

pub(crate) struct PendingDestructionBuffer {
    raw: vk::Buffer,
    allocation: Allocation,
}

impl Buffer {
    pub fn write_data<T: Copy>(&mut self, data: &[T]) -> Result<()> {
        let allocation = self.allocation.as_mut().expect("buffer has no CPU-visible allocation");
        let mapped = allocation
            .mapped_slice_mut()
            .ok_or_else(|| anyhow::anyhow!("buffer allocation is not host-visible"))?;
        let bytes = unsafe {
            std::slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(data))
        };
        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.raw);
        unsafe { self.device.shared.raw.get_buffer_device_address(&info) }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let allocation = self.allocation.take().expect("buffer allocation taken twice");
        self.device.schedule_destruction_buffer(self.raw, allocation);
    }
}

pub struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub usage_flags: vk::ImageUsageFlags,
    pub memory_location: MemoryLocation,
}

impl ImageDescriptor {
    pub fn new_2d_single_layer_level(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            format,
            usage_flags: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            memory_location: MemoryLocation::GpuOnly,
        }
    }
}

pub struct Image {
    pub(crate) raw: vk::Image,
    pub(crate) raw_view: vk::ImageView,
    allocation: Option<Allocation>,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    device: Arc<Device>,

    sampled_image_slot: Option<BindlessSlot>,
    storage_image_slot: Option<BindlessSlot>,
}

pub(crate) struct PendingDestructionImage {
    raw: vk::Image,
    raw_view: vk::ImageView,
    allocation: Allocation,
}

impl Drop for Image {
    fn drop(&mut self) {
        let allocation = self.allocation.take().expect("image allocation taken twice");
        self.device
            .schedule_destruction_image(self.raw, self.raw_view, allocation);
    }
}

#[derive(Clone)]
pub struct SamplerDescriptor {
    pub min_filter: vk::Filter,
    pub mag_filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
}

impl SamplerDescriptor {
    pub fn new() -> Self {
        Self {
            min_filter: vk::Filter::LINEAR,
            mag_filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
        }
    }

    pub fn min_filter(mut self, min_filter: vk::Filter) -> Self {
        self.min_filter = min_filter;
        self
    }

    pub fn mag_filter(mut self, mag_filter: vk::Filter) -> Self {
        self.mag_filter = mag_filter;
        self
    }
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Sampler {
    pub(crate) raw: vk::Sampler,
    device: Arc<Device>,
}

pub(crate) struct PendingDestructionSampler {
    raw: vk::Sampler,
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.device.schedule_destruction_sampler(self.raw);
    }
}

pub struct PipelineDescriptor<'a> {
    pub vertex_shader: vk::ShaderModule,
    pub fragment_shader: vk::ShaderModule,
    pub vertex_entry_point: &'a str,
    pub fragment_entry_point: &'a str,
    pub vertex_binding_descriptions: &'a [vk::VertexInputBindingDescription],
    pub vertex_attribute_descriptions: &'a [vk::VertexInputAttributeDescription],
    pub color_attachment_formats: &'a [vk::Format],
    pub depth_attachment_format: Option<vk::Format>,
    pub depth_stencil_state: PipelineDepthStencilState,
    pub rasterization_state: PipelineRasterizationState,
}

pub struct Pipeline {
    pub(crate) raw: vk::Pipeline,
    pub(crate) raw_layout: vk::PipelineLayout,
    device: Arc<Device>,
}

pub(crate) struct PendingDestructionPipeline {
    raw: vk::Pipeline,
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.device.schedule_destruction_pipeline(self.raw);
    }
}

pub struct ComputePipelineDescriptor<'a> {
    pub shader: vk::ShaderModule,
    pub entry_point: &'a str,
}

pub struct ComputePipeline {
    pub(crate) raw: vk::Pipeline,
    pub(crate) raw_layout: vk::PipelineLayout,
    device: Arc<Device>,
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        self.device.schedule_destruction_pipeline(self.raw);
    }
}

impl Device {
    pub fn create_buffer(self: &Arc<Self>, desc: BufferDescriptor) -> Result<Buffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage_flags | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let raw = unsafe { self.shared.raw.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.shared.raw.get_buffer_memory_requirements(raw) };

        let allocation = self.shared.allocator.lock().allocate(&AllocationCreateDesc {
            name: "apex_graphics buffer",
            requirements,
            location: desc.memory_location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            self.shared
                .raw
                .bind_buffer_memory(raw, allocation.memory(), allocation.offset())?;
        }

        Ok(Buffer {
            raw,
            allocation: Some(allocation),
            size: desc.size,
            device: self.clone(),
            uniform_buffer_slot: None,
            storage_buffer_slot: None,
        })
    }

    /// Registers `buffer` as a bindless uniform buffer, storing the
    /// returned slot on the buffer. Panics if the buffer already has a
    /// uniform buffer slot bound - rebinding a kind that is already bound
    /// is a precondition violation, not a silent replace.
    pub fn register_uniform_buffer(&self, buffer: &mut Buffer) -> Result<BindlessSlot> {
        assert!(
            buffer.uniform_buffer_slot.is_none(),
            "buffer already bound as a uniform buffer"
        );
        let slot = self.bindless_heap.register_uniform_buffer(buffer.raw, buffer.size)?;
        buffer.uniform_buffer_slot = Some(slot);
        Ok(slot)
    }

    pub fn register_storage_buffer(&self, buffer: &mut Buffer) -> Result<BindlessSlot> {
        assert!(
            buffer.storage_buffer_slot.is_none(),
            "buffer already bound as a storage buffer"
        );
        let slot = self.bindless_heap.register_storage_buffer(buffer.raw, buffer.size)?;
        buffer.storage_buffer_slot = Some(slot);
        Ok(slot)
    }

    /// Schedules/queues a buffer for destruction. Passed in by value rather
    /// than by reference to `Buffer` since this is called from `drop`.
    fn schedule_destruction_buffer(&self, raw: vk::Buffer, allocation: Allocation) {
        self.resource_hub
            .lock()
            .pending_destruction_buffers
            .push(PendingDestructionBuffer { raw, allocation });
    }

    pub(crate) fn destroy_buffer(&self, buffer: PendingDestructionBuffer) -> Result<()> {
        unsafe { self.shared.raw.destroy_buffer(buffer.raw, None) };
        self.shared.allocator.lock().free(buffer.allocation)?;
        Ok(())
    }

    pub fn create_image(self: &Arc<Self>, desc: ImageDescriptor) -> Result<Image> {
        let extent = vk::Extent3D {
            width: desc.width,
            height: desc.height,
            depth: 1,
        };
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage_flags)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let raw = unsafe { self.shared.raw.create_image(&image_info, None)? };
        let requirements = unsafe { self.shared.raw.get_image_memory_requirements(raw) };

        let allocation = self.shared.allocator.lock().allocate(&AllocationCreateDesc {
            name: "apex_graphics image",
            requirements,
            location: desc.memory_location,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            self.shared
                .raw
                .bind_image_memory(raw, allocation.memory(), allocation.offset())?;
        }

        let aspect_mask = if is_depth_format(desc.format) {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let view_info = vk::ImageViewCreateInfo::default()
            .image(raw)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        let raw_view = unsafe { self.shared.raw.create_image_view(&view_info, None)? };

        Ok(Image {
            raw,
            raw_view,
            allocation: Some(allocation),
            extent,
            format: desc.format,
            device: self.clone(),
            sampled_image_slot: None,
            storage_image_slot: None,
        })
    }

    pub fn register_sampled_image(&self, image: &mut Image) -> Result<BindlessSlot> {
        assert!(
            image.sampled_image_slot.is_none(),
            "image already bound as a sampled image"
        );
        let slot = self
            .bindless_heap
            .register_sampled_image(image.raw_view, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;
        image.sampled_image_slot = Some(slot);
        Ok(slot)
    }

    pub fn register_storage_image(&self, image: &mut Image) -> Result<BindlessSlot> {
        assert!(
            image.storage_image_slot.is_none(),
            "image already bound as a storage image"
        );
        let slot = self.bindless_heap.register_storage_image(image.raw_view)?;
        image.storage_image_slot = Some(slot);
        Ok(slot)
    }

    fn schedule_destruction_image(&self, raw: vk::Image, raw_view: vk::ImageView, allocation: Allocation) {
        self.resource_hub
            .lock()
            .pending_destruction_images
            .push(PendingDestructionImage { raw, raw_view, allocation });
    }

    pub(crate) fn destroy_image(&self, image: PendingDestructionImage) -> Result<()> {
        unsafe {
            self.shared.raw.destroy_image_view(image.raw_view, None);
            self.shared.raw.destroy_image(image.raw, None);
        }
        self.shared.allocator.lock().free(image.allocation)?;
        Ok(())
    }

    pub fn create_sampler(self: &Arc<Self>, desc: SamplerDescriptor) -> Result<Sampler> {
        let sampler_info = vk::SamplerCreateInfo::default()
            .min_filter(desc.min_filter)
            .mag_filter(desc.mag_filter)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode);
        let raw = unsafe { self.shared.raw.create_sampler(&sampler_info, None)? };
        Ok(Sampler {
            raw,
            device: self.clone(),
        })
    }

    fn schedule_destruction_sampler(&self, raw: vk::Sampler) {
        self.resource_hub
            .lock()
            .pending_destruction_samplers
            .push(PendingDestructionSampler { raw });
    }

    pub(crate) fn destroy_sampler(&self, sampler: PendingDestructionSampler) -> Result<()> {
        unsafe { self.shared.raw.destroy_sampler(sampler.raw, None) };
        Ok(())
    }

    pub fn create_pipeline(self: &Arc<Self>, desc: PipelineDescriptor) -> Result<Pipeline> {
        let vertex_entry = std::ffi::CString::new(desc.vertex_entry_point)?;
        let fragment_entry = std::ffi::CString::new(desc.fragment_entry_point)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(desc.vertex_shader)
                .name(vertex_entry.as_c_str()),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(desc.fragment_shader)
                .name(fragment_entry.as_c_str()),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(desc.vertex_binding_descriptions)
            .vertex_attribute_descriptions(desc.vertex_attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = desc.rasterization_state.to_vulkan_state();

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_state = desc.depth_stencil_state.to_vulkan_state();

        let color_blend_attachments = desc
            .color_attachment_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect::<Vec<_>>();
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(desc.color_attachment_formats)
            .depth_attachment_format(desc.depth_attachment_format.unwrap_or(vk::Format::UNDEFINED));

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(self.bindless_heap.pipeline_layout)
            .push_next(&mut rendering_info);

        let raw = unsafe {
            self.shared
                .raw
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, err)| err)?[0]
        };

        Ok(Pipeline {
            raw,
            raw_layout: self.bindless_heap.pipeline_layout,
            device: self.clone(),
        })
    }

    pub fn create_compute_pipeline(
        self: &Arc<Self>,
        desc: ComputePipelineDescriptor,
    ) -> Result<ComputePipeline> {
        let entry = std::ffi::CString::new(desc.entry_point)?;
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(desc.shader)
            .name(entry.as_c_str());

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(self.bindless_heap.pipeline_layout);

        let raw = unsafe {
            self.shared
                .raw
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, err)| err)?[0]
        };

        Ok(ComputePipeline {
            raw,
            raw_layout: self.bindless_heap.pipeline_layout,
            device: self.clone(),
        })
    }

    fn schedule_destruction_pipeline(&self, raw: vk::Pipeline) {
        self.resource_hub
            .lock()
            .pending_destruction_pipelines
            .push(PendingDestructionPipeline { raw });
    }

    pub(crate) fn destroy_pipeline(&self, pipeline: PendingDestructionPipeline) -> Result<()> {
        unsafe { self.shared.raw.destroy_pipeline(pipeline.raw, None) };
        Ok(())
    }

    /// Synchronous image upload: writes `data` into a host-visible staging
    /// buffer, records a transfer on the graphics queue's current-frame
    /// command pool, and blocks on a fence until it completes. Meant for
    /// one-off asset loads outside the per-frame submission path, not as a
    /// streaming upload mechanism.
    ///
    /// When a memory manager was supplied via
    /// [`Device::new_with_memory_manager`], the host-side copy of `data`
    /// (the bytes handed to the staging buffer's mapped pointer) is staged
    /// through one of its pools instead of relying on the caller's own
    /// buffer, so repeated uploads reuse the manager's reservation rather
    /// than growing the heap with a fresh allocation each time.
    pub fn upload_data_to_image_slow<T: Copy>(self: &Arc<Self>, image: &Image, data: &[T]) -> Result<()> {
        let byte_len = std::mem::size_of_val(data);
        let mut staging_buffer = self.create_buffer(BufferDescriptor {
            size: byte_len as u64,
            usage_flags: vk::BufferUsageFlags::TRANSFER_SRC,
            memory_location: MemoryLocation::CpuToGpu,
        })?;

        match &self.memory_manager {
            Some(memory_manager) => {
                let mut manager = memory_manager.lock();
                let handle = manager
                    .allocate(byte_len.max(1))
                    .map_err(|err| anyhow::anyhow!("staging scratch allocation failed: {err}"))?;
                unsafe {
                    std::ptr::copy_nonoverlapping(data.as_ptr() as *const u8, handle.ptr.as_ptr(), byte_len);
                    let scratch = std::slice::from_raw_parts(handle.ptr.as_ptr(), byte_len);
                    staging_buffer.write_data(scratch)?;
                }
                manager.free_handle(handle);
            }
            None => staging_buffer.write_data(data)?,
        }

        let pool_index = self.current_frame() as usize;
        let command_buffer = self.command_buffer_manager.lock().allocate_one_off(pool_index)?;
        command_buffer.begin()?;
        command_buffer.transition_image(
            image.raw,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::AccessFlags2::NONE,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        );
        command_buffer.copy_buffer_to_image(&staging_buffer, image.raw, image.extent);
        command_buffer.transition_image(
            image.raw,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_READ,
        );
        command_buffer.end()?;

        let fence = Fence::new(self.shared.clone(), false)?;
        self.queue_graphics_present
            .submit_and_fence(&[command_buffer.raw], &[], &[], fence.raw)?;
        fence.wait(u64::MAX)?;

        Ok(())
    }
}

fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D32_SFLOAT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}
