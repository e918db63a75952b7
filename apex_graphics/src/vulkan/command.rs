//! Command pool/buffer management and recording.
//!
//! Grounded on `lyzumu_graphics/src/vulkan/command.rs`'s `CommandPool` /
//! `CommandBufferManager` / `CommandBuffer`, extended with
//! `transition_image`/`copy_buffer`/`blit_image`/`push_constants` and
//! queue-ownership-transfer barrier pairs, none of which the teacher
//! needed since it only ever submits to one queue family.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use ash::vk;

use super::bindless::BindlessHeap;
use super::device::DeviceShared;
use super::resource::{Buffer, Pipeline, ComputePipeline};

pub(crate) struct CommandPool {
    pub(crate) raw: vk::CommandPool,
    device: Arc<DeviceShared>,
}

impl CommandPool {
    pub(crate) fn new(device: Arc<DeviceShared>, queue_family_index: u32) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let raw = unsafe { device.raw.create_command_pool(&info, None)? };
        Ok(Self { raw, device })
    }

    pub(crate) fn allocate_command_buffers(
        &self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.raw)
            .level(level)
            .command_buffer_count(count);
        Ok(unsafe { self.device.raw.allocate_command_buffers(&info)? })
    }

    pub(crate) fn reset(&self) -> Result<()> {
        unsafe {
            self.device
                .raw
                .reset_command_pool(self.raw, vk::CommandPoolResetFlags::empty())?
        };
        Ok(())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.raw.destroy_command_pool(self.raw, None) };
    }
}

/// Per-frame pool of preallocated primary command buffers, indexed by
/// frame-in-flight slot.
pub(crate) struct CommandBufferManager {
    device: Arc<DeviceShared>,
    command_pools: Vec<CommandPool>,
    command_buffers: Vec<CommandBuffer>,
    buffers_per_pool: u32,
    used_per_pool: Vec<u32>,
}

impl CommandBufferManager {
    pub(crate) fn new(device: Arc<DeviceShared>, pool_count: u32, buffers_per_pool: u32) -> Result<Self> {
        let graphics_family = device.queue_families.graphics_present.index;
        let command_pools = (0..pool_count)
            .map(|_| CommandPool::new(device.clone(), graphics_family))
            .collect::<Result<Vec<_>>>()?;

        let command_buffers = command_pools
            .iter()
            .map(|pool| {
                Ok(pool
                    .allocate_command_buffers(vk::CommandBufferLevel::PRIMARY, buffers_per_pool)?
                    .into_iter()
                    .map(|raw| CommandBuffer::new_from_vulkan_handle(raw, device.clone()))
                    .collect::<Vec<_>>())
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        Ok(Self {
            device,
            command_pools,
            command_buffers,
            buffers_per_pool,
            used_per_pool: vec![0; pool_count as usize],
        })
    }

    pub(crate) fn reset_command_pools(&mut self, pool_indices: &[usize]) -> Result<()> {
        for &index in pool_indices {
            self.command_pools[index].reset()?;
            self.used_per_pool[index] = 0;
        }
        Ok(())
    }

    pub(crate) fn get_command_buffer_at_pool(&mut self, pool_index: usize) -> Result<CommandBuffer> {
        let used = self.used_per_pool[pool_index];
        if used >= self.buffers_per_pool {
            return Err(anyhow!("all command buffers for this frame's pool are already in use"));
        }
        self.used_per_pool[pool_index] += 1;
        let index = pool_index * self.buffers_per_pool as usize + used as usize;
        Ok(self.command_buffers[index].clone())
    }

    pub(crate) fn allocate_one_off(&self, pool_index: usize) -> Result<CommandBuffer> {
        let raw = self.command_pools[pool_index]
            .allocate_command_buffers(vk::CommandBufferLevel::PRIMARY, 1)?[0];
        Ok(CommandBuffer::new_from_vulkan_handle(raw, self.device.clone()))
    }
}

/// Ownership transfer of a barrier across two queue families. Ignored
/// (`VK_QUEUE_FAMILY_IGNORED`) when source and destination queue are the
/// same family, since no transfer is needed in that case.
pub struct QueueOwnershipTransfer {
    pub src_queue_family: u32,
    pub dst_queue_family: u32,
}

impl QueueOwnershipTransfer {
    fn family_indices(&self) -> (u32, u32) {
        if self.src_queue_family == self.dst_queue_family {
            (vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED)
        } else {
            (self.src_queue_family, self.dst_queue_family)
        }
    }
}

#[derive(Clone)]
pub struct CommandBuffer {
    pub(crate) raw: vk::CommandBuffer,
    device: Arc<DeviceShared>,
}

impl CommandBuffer {
    fn new_from_vulkan_handle(raw: vk::CommandBuffer, device: Arc<DeviceShared>) -> Self {
        Self { raw, device }
    }

    pub fn begin(&self) -> Result<()> {
        let info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.raw.begin_command_buffer(self.raw, &info)? };
        Ok(())
    }

    pub fn end(&self) -> Result<()> {
        unsafe { self.device.raw.end_command_buffer(self.raw)? };
        Ok(())
    }

    pub fn begin_rendering(
        &self,
        color_attachments: &[vk::RenderingAttachmentInfo],
        depth_attachment: Option<&vk::RenderingAttachmentInfo>,
        render_area: vk::Rect2D,
    ) {
        let empty_depth = vk::RenderingAttachmentInfo::default();
        let info = vk::RenderingInfo::default()
            .color_attachments(color_attachments)
            .depth_attachment(depth_attachment.unwrap_or(&empty_depth))
            .render_area(render_area)
            .layer_count(1);
        unsafe { self.device.raw.cmd_begin_rendering(self.raw, &info) };
    }

    pub fn end_rendering(&self) {
        unsafe { self.device.raw.cmd_end_rendering(self.raw) };
    }

    pub fn set_viewport_and_scissor(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            self.device
                .raw
                .cmd_set_viewport(self.raw, 0, std::slice::from_ref(&viewport));
            self.device
                .raw
                .cmd_set_scissor(self.raw, 0, std::slice::from_ref(&scissor));
        }
    }

    pub fn pipeline_image_barrier(&self, barriers: &[vk::ImageMemoryBarrier2]) {
        let info = vk::DependencyInfo::default().image_memory_barriers(barriers);
        unsafe { self.device.raw.cmd_pipeline_barrier2(self.raw, &info) };
    }

    pub fn pipeline_buffer_barrier(&self, barriers: &[vk::BufferMemoryBarrier2]) {
        let info = vk::DependencyInfo::default().buffer_memory_barriers(barriers);
        unsafe { self.device.raw.cmd_pipeline_barrier2(self.raw, &info) };
    }

    /// One-shot layout transition with no queue-family ownership change.
    pub fn transition_image(
        &self,
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_stage: vk::PipelineStageFlags2,
        src_access: vk::AccessFlags2,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) {
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src_stage)
            .src_access_mask(src_access)
            .dst_stage_mask(dst_stage)
            .dst_access_mask(dst_access)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        self.pipeline_image_barrier(&[barrier]);
    }

    /// Release-side half of a queue ownership transfer; the acquiring queue
    /// must record a matching acquire barrier with the same
    /// [`QueueOwnershipTransfer`] before using the image.
    pub fn release_image_ownership(
        &self,
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
        layout: vk::ImageLayout,
        src_stage: vk::PipelineStageFlags2,
        src_access: vk::AccessFlags2,
        transfer: &QueueOwnershipTransfer,
    ) {
        let (src_family, dst_family) = transfer.family_indices();
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src_stage)
            .src_access_mask(src_access)
            .dst_stage_mask(vk::PipelineStageFlags2::NONE)
            .dst_access_mask(vk::AccessFlags2::NONE)
            .old_layout(layout)
            .new_layout(layout)
            .src_queue_family_index(src_family)
            .dst_queue_family_index(dst_family)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        self.pipeline_image_barrier(&[barrier]);
    }

    pub fn acquire_image_ownership(
        &self,
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
        layout: vk::ImageLayout,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
        transfer: &QueueOwnershipTransfer,
    ) {
        let (src_family, dst_family) = transfer.family_indices();
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::NONE)
            .src_access_mask(vk::AccessFlags2::NONE)
            .dst_stage_mask(dst_stage)
            .dst_access_mask(dst_access)
            .old_layout(layout)
            .new_layout(layout)
            .src_queue_family_index(src_family)
            .dst_queue_family_index(dst_family)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        self.pipeline_image_barrier(&[barrier]);
    }

    pub fn copy_buffer(&self, src: &Buffer, dst: &Buffer, size: u64) {
        let region = vk::BufferCopy2::default().size(size);
        let info = vk::CopyBufferInfo2::default()
            .src_buffer(src.raw)
            .dst_buffer(dst.raw)
            .regions(std::slice::from_ref(&region));
        unsafe { self.device.raw.cmd_copy_buffer2(self.raw, &info) };
    }

    pub fn copy_buffer_to_image(&self, buffer: &Buffer, image: vk::Image, extent: vk::Extent3D) {
        let region = vk::BufferImageCopy2::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D::default())
            .image_extent(extent);

        let info = vk::CopyBufferToImageInfo2::default()
            .src_buffer(buffer.raw)
            .dst_image(image)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .regions(std::slice::from_ref(&region));
        unsafe { self.device.raw.cmd_copy_buffer_to_image2(self.raw, &info) };
    }

    pub fn blit_image(
        &self,
        src: vk::Image,
        src_extent: vk::Extent3D,
        dst: vk::Image,
        dst_extent: vk::Extent3D,
        filter: vk::Filter,
    ) {
        let subresource = vk::ImageSubresourceLayers::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .mip_level(0)
            .base_array_layer(0)
            .layer_count(1);
        let region = vk::ImageBlit2::default()
            .src_subresource(subresource)
            .src_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: src_extent.width as i32,
                    y: src_extent.height as i32,
                    z: 1,
                },
            ])
            .dst_subresource(subresource)
            .dst_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: dst_extent.width as i32,
                    y: dst_extent.height as i32,
                    z: 1,
                },
            ]);
        let info = vk::BlitImageInfo2::default()
            .src_image(src)
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(dst)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .regions(std::slice::from_ref(&region))
            .filter(filter);
        unsafe { self.device.raw.cmd_blit_image2(self.raw, &info) };
    }

    pub fn bind_bindless_descriptor_sets(&self, heap: &BindlessHeap) {
        unsafe {
            self.device.raw.cmd_bind_descriptor_sets(
                self.raw,
                vk::PipelineBindPoint::GRAPHICS,
                heap.pipeline_layout,
                0,
                &heap.descriptor_sets(),
                &[],
            );
        }
    }

    pub fn bind_bindless_descriptor_sets_compute(&self, heap: &BindlessHeap) {
        unsafe {
            self.device.raw.cmd_bind_descriptor_sets(
                self.raw,
                vk::PipelineBindPoint::COMPUTE,
                heap.pipeline_layout,
                0,
                &heap.descriptor_sets(),
                &[],
            );
        }
    }

    pub fn push_constants(&self, heap: &BindlessHeap, bytes: &[u8]) {
        unsafe {
            self.device.raw.cmd_push_constants(
                self.raw,
                heap.pipeline_layout,
                vk::ShaderStageFlags::ALL,
                0,
                bytes,
            );
        }
    }

    pub fn bind_pipeline_graphics(&self, pipeline: &Pipeline) {
        unsafe {
            self.device
                .raw
                .cmd_bind_pipeline(self.raw, vk::PipelineBindPoint::GRAPHICS, pipeline.raw);
        }
    }

    pub fn bind_pipeline_compute(&self, pipeline: &ComputePipeline) {
        unsafe {
            self.device
                .raw
                .cmd_bind_pipeline(self.raw, vk::PipelineBindPoint::COMPUTE, pipeline.raw);
        }
    }

    pub fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[&Buffer], offsets: &[u64]) {
        let raw_buffers = buffers.iter().map(|buffer| buffer.raw).collect::<Vec<_>>();
        unsafe {
            self.device
                .raw
                .cmd_bind_vertex_buffers(self.raw, first_binding, &raw_buffers, offsets);
        }
    }

    /// Index buffers are always `u32`; the smaller `u16` encoding the
    /// teacher used is not supported here.
    pub fn bind_index_buffer(&self, buffer: &Buffer, offset: u64) {
        unsafe {
            self.device
                .raw
                .cmd_bind_index_buffer(self.raw, buffer.raw, offset, vk::IndexType::UINT32);
        }
    }

    pub fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device
                .raw
                .cmd_draw(self.raw, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    pub fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.raw.cmd_draw_indexed(
                self.raw,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    pub fn dispatch(&self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        unsafe {
            self.device
                .raw
                .cmd_dispatch(self.raw, group_count_x, group_count_y, group_count_z);
        }
    }
}
