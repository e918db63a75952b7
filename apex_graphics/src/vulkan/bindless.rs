//! Bindless descriptor heap.
//!
//! Five descriptor sets bound together through one global pipeline layout:
//! one single-binding `UPDATE_AFTER_BIND` set per resource kind (sampled
//! image, storage image, uniform buffer, storage buffer) at set indices
//! 0..4, each flagged `PARTIALLY_BOUND | UPDATE_AFTER_BIND |
//! VARIABLE_DESCRIPTOR_COUNT`, plus a fifth set at index 4 holding a small
//! fixed table of immutable samplers. The pipeline layout combines all five
//! sets with a single 128-byte push-constant range, so every pipeline in
//! the crate shares the same layout and no descriptor sets need rebinding
//! between draws.
//!
//! This has no equivalent in the teacher, whose descriptor handling
//! (`eclale_graphics/src/vulkan/resource.rs`'s `DescriptorSetLayoutDescriptor`
//! /`update_descriptor_set_bindless`) binds textures per-material instead of
//! through one global table; the update-after-bind pool plumbing and the
//! `DescriptorSetLayoutDescriptor::new_with_update_after_bind_flags`
//! constructor are reused, generalized to all four resource kinds across
//! their own dedicated sets.
//!
//! Slot assignment is a monotonically increasing counter per resource kind,
//! not a free list: a freed slot is never reused within a heap's lifetime.
//! Recycling would need a generation tag on every bindless handle to catch
//! stale accesses after reuse, which this crate does not implement.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use ash::vk;

use super::device::DeviceShared;

pub const PUSH_CONSTANTS_SIZE: u32 = 128;

pub const SET_SAMPLED_IMAGE: u32 = 0;
pub const SET_STORAGE_IMAGE: u32 = 1;
pub const SET_UNIFORM_BUFFER: u32 = 2;
pub const SET_STORAGE_BUFFER: u32 = 3;
pub const SET_SAMPLER: u32 = 4;

pub struct BindlessHeapDescriptor {
    pub max_sampled_images: u32,
    pub max_storage_images: u32,
    pub max_uniform_buffers: u32,
    pub max_storage_buffers: u32,
    pub immutable_samplers: Vec<vk::Sampler>,
}

impl Default for BindlessHeapDescriptor {
    fn default() -> Self {
        Self {
            max_sampled_images: 4096,
            max_storage_images: 1024,
            max_uniform_buffers: 1024,
            max_storage_buffers: 1024,
            immutable_samplers: Vec::new(),
        }
    }
}

/// A slot into one of the four bindless descriptor arrays. None of these
/// are ever reused once allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindlessSlot(pub u32);

struct SlotAllocator {
    next: AtomicU32,
    capacity: u32,
}

impl SlotAllocator {
    fn new(capacity: u32) -> Self {
        Self {
            next: AtomicU32::new(0),
            capacity,
        }
    }

    fn allocate(&self) -> Result<BindlessSlot> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed);
        if slot >= self.capacity {
            return Err(anyhow!(
                "bindless descriptor array exhausted (capacity {})",
                self.capacity
            ));
        }
        Ok(BindlessSlot(slot))
    }
}

/// One `UPDATE_AFTER_BIND` set holding a variable-count array of a single
/// descriptor type at binding 0.
fn create_variable_count_set_layout(
    device: &ash::Device,
    descriptor_type: vk::DescriptorType,
    descriptor_count: u32,
) -> Result<vk::DescriptorSetLayout> {
    let binding = vk::DescriptorSetLayoutBinding::default()
        .binding(0)
        .descriptor_type(descriptor_type)
        .descriptor_count(descriptor_count)
        .stage_flags(vk::ShaderStageFlags::ALL);
    let bindings = [binding];
    let binding_flags = [vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
        | vk::DescriptorBindingFlags::PARTIALLY_BOUND
        | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT];
    let mut binding_flags_info =
        vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
    let info = vk::DescriptorSetLayoutCreateInfo::default()
        .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
        .bindings(&bindings)
        .push_next(&mut binding_flags_info);
    Ok(unsafe { device.create_descriptor_set_layout(&info, None)? })
}

pub struct BindlessHeap {
    device: Arc<DeviceShared>,
    pub(crate) sampled_image_set_layout: vk::DescriptorSetLayout,
    pub(crate) storage_image_set_layout: vk::DescriptorSetLayout,
    pub(crate) uniform_buffer_set_layout: vk::DescriptorSetLayout,
    pub(crate) storage_buffer_set_layout: vk::DescriptorSetLayout,
    pub(crate) sampler_set_layout: vk::DescriptorSetLayout,
    pub(crate) pipeline_layout: vk::PipelineLayout,
    descriptor_pool: vk::DescriptorPool,
    sampled_image_set: vk::DescriptorSet,
    storage_image_set: vk::DescriptorSet,
    uniform_buffer_set: vk::DescriptorSet,
    storage_buffer_set: vk::DescriptorSet,
    sampler_set: vk::DescriptorSet,
    sampled_images: SlotAllocator,
    storage_images: SlotAllocator,
    uniform_buffers: SlotAllocator,
    storage_buffers: SlotAllocator,
}

impl BindlessHeap {
    pub(crate) fn new(device: Arc<DeviceShared>, desc: BindlessHeapDescriptor) -> Result<Self> {
        let sampled_image_set_layout = create_variable_count_set_layout(
            &device.raw,
            vk::DescriptorType::SAMPLED_IMAGE,
            desc.max_sampled_images,
        )?;
        let storage_image_set_layout = create_variable_count_set_layout(
            &device.raw,
            vk::DescriptorType::STORAGE_IMAGE,
            desc.max_storage_images,
        )?;
        let uniform_buffer_set_layout = create_variable_count_set_layout(
            &device.raw,
            vk::DescriptorType::UNIFORM_BUFFER,
            desc.max_uniform_buffers,
        )?;
        let storage_buffer_set_layout = create_variable_count_set_layout(
            &device.raw,
            vk::DescriptorType::STORAGE_BUFFER,
            desc.max_storage_buffers,
        )?;

        let sampler_count = desc.immutable_samplers.len().max(1) as u32;
        let sampler_binding = vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::SAMPLER)
            .descriptor_count(sampler_count)
            .stage_flags(vk::ShaderStageFlags::ALL)
            .immutable_samplers(&desc.immutable_samplers);
        let sampler_bindings = [sampler_binding];
        let sampler_set_layout_info =
            vk::DescriptorSetLayoutCreateInfo::default().bindings(&sampler_bindings);
        let sampler_set_layout = unsafe {
            device
                .raw
                .create_descriptor_set_layout(&sampler_set_layout_info, None)?
        };

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::SAMPLED_IMAGE)
                .descriptor_count(desc.max_sampled_images),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_IMAGE)
                .descriptor_count(desc.max_storage_images),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(desc.max_uniform_buffers),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(desc.max_storage_buffers),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::SAMPLER)
                .descriptor_count(sampler_count),
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
            .max_sets(5)
            .pool_sizes(&pool_sizes);
        let descriptor_pool = unsafe { device.raw.create_descriptor_pool(&pool_info, None)? };

        let set_layouts = [
            sampled_image_set_layout,
            storage_image_set_layout,
            uniform_buffer_set_layout,
            storage_buffer_set_layout,
            sampler_set_layout,
        ];
        let variable_counts = [
            desc.max_sampled_images,
            desc.max_storage_images,
            desc.max_uniform_buffers,
            desc.max_storage_buffers,
            0,
        ];
        let mut variable_count_info = vk::DescriptorSetVariableDescriptorCountAllocateInfo::default()
            .descriptor_counts(&variable_counts);
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(descriptor_pool)
            .set_layouts(&set_layouts)
            .push_next(&mut variable_count_info);
        let sets = unsafe { device.raw.allocate_descriptor_sets(&allocate_info)? };
        let sampled_image_set = sets[SET_SAMPLED_IMAGE as usize];
        let storage_image_set = sets[SET_STORAGE_IMAGE as usize];
        let uniform_buffer_set = sets[SET_UNIFORM_BUFFER as usize];
        let storage_buffer_set = sets[SET_STORAGE_BUFFER as usize];
        let sampler_set = sets[SET_SAMPLER as usize];

        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::ALL)
            .offset(0)
            .size(PUSH_CONSTANTS_SIZE);
        let push_constant_ranges = [push_constant_range];
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let pipeline_layout = unsafe {
            device
                .raw
                .create_pipeline_layout(&pipeline_layout_info, None)?
        };

        Ok(Self {
            device,
            sampled_image_set_layout,
            storage_image_set_layout,
            uniform_buffer_set_layout,
            storage_buffer_set_layout,
            sampler_set_layout,
            pipeline_layout,
            descriptor_pool,
            sampled_image_set,
            storage_image_set,
            uniform_buffer_set,
            storage_buffer_set,
            sampler_set,
            sampled_images: SlotAllocator::new(desc.max_sampled_images),
            storage_images: SlotAllocator::new(desc.max_storage_images),
            uniform_buffers: SlotAllocator::new(desc.max_uniform_buffers),
            storage_buffers: SlotAllocator::new(desc.max_storage_buffers),
        })
    }

    pub fn register_sampled_image(&self, view: vk::ImageView, layout: vk::ImageLayout) -> Result<BindlessSlot> {
        let slot = self.sampled_images.allocate()?;
        let image_info = vk::DescriptorImageInfo::default()
            .image_view(view)
            .image_layout(layout);
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.sampled_image_set)
            .dst_binding(0)
            .dst_array_element(slot.0)
            .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
            .image_info(std::slice::from_ref(&image_info));
        unsafe { self.device.raw.update_descriptor_sets(&[write], &[]) };
        Ok(slot)
    }

    pub fn register_storage_image(&self, view: vk::ImageView) -> Result<BindlessSlot> {
        let slot = self.storage_images.allocate()?;
        let image_info = vk::DescriptorImageInfo::default()
            .image_view(view)
            .image_layout(vk::ImageLayout::GENERAL);
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.storage_image_set)
            .dst_binding(0)
            .dst_array_element(slot.0)
            .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
            .image_info(std::slice::from_ref(&image_info));
        unsafe { self.device.raw.update_descriptor_sets(&[write], &[]) };
        Ok(slot)
    }

    pub fn register_uniform_buffer(&self, buffer: vk::Buffer, size: u64) -> Result<BindlessSlot> {
        let slot = self.uniform_buffers.allocate()?;
        let buffer_info = vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(0)
            .range(size);
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.uniform_buffer_set)
            .dst_binding(0)
            .dst_array_element(slot.0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(std::slice::from_ref(&buffer_info));
        unsafe { self.device.raw.update_descriptor_sets(&[write], &[]) };
        Ok(slot)
    }

    pub fn register_storage_buffer(&self, buffer: vk::Buffer, size: u64) -> Result<BindlessSlot> {
        let slot = self.storage_buffers.allocate()?;
        let buffer_info = vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(0)
            .range(size);
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.storage_buffer_set)
            .dst_binding(0)
            .dst_array_element(slot.0)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .buffer_info(std::slice::from_ref(&buffer_info));
        unsafe { self.device.raw.update_descriptor_sets(&[write], &[]) };
        Ok(slot)
    }

    /// The five sets in binding order (set indices 0..5 against
    /// [`Self::pipeline_layout`]): sampled image, storage image, uniform
    /// buffer, storage buffer, immutable sampler.
    pub fn descriptor_sets(&self) -> [vk::DescriptorSet; 5] {
        [
            self.sampled_image_set,
            self.storage_image_set,
            self.uniform_buffer_set,
            self.storage_buffer_set,
            self.sampler_set,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_allocator_hands_out_increasing_slots() {
        let allocator = SlotAllocator::new(4);
        assert_eq!(allocator.allocate().unwrap(), BindlessSlot(0));
        assert_eq!(allocator.allocate().unwrap(), BindlessSlot(1));
        assert_eq!(allocator.allocate().unwrap(), BindlessSlot(2));
        assert_eq!(allocator.allocate().unwrap(), BindlessSlot(3));
    }

    #[test]
    fn slot_allocator_errors_once_capacity_is_exhausted() {
        let allocator = SlotAllocator::new(1);
        assert!(allocator.allocate().is_ok());
        assert!(allocator.allocate().is_err());
    }
}

impl Drop for BindlessHeap {
    fn drop(&mut self) {
        unsafe {
            self.device
                .raw
                .destroy_pipeline_layout(self.pipeline_layout, None);
            self.device
                .raw
                .destroy_descriptor_set_layout(self.sampled_image_set_layout, None);
            self.device
                .raw
                .destroy_descriptor_set_layout(self.storage_image_set_layout, None);
            self.device
                .raw
                .destroy_descriptor_set_layout(self.uniform_buffer_set_layout, None);
            self.device
                .raw
                .destroy_descriptor_set_layout(self.storage_buffer_set_layout, None);
            self.device
                .raw
                .destroy_descriptor_set_layout(self.sampler_set_layout, None);
            self.device
                .raw
                .destroy_descriptor_pool(self.descriptor_pool, None);
        }
    }
}
