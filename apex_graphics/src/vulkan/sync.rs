//! Binary and timeline semaphore wrapper.
//!
//! Grounded on `lyzumu_graphics/src/vulkan/lib.rs`'s `Semaphore` /
//! `SemaphoreType` / `QueueSubmitSemaphoreDescriptor`.

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use super::device::DeviceShared;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SemaphoreType {
    Binary,
    Timeline,
}

pub struct Semaphore {
    device: Arc<DeviceShared>,
    pub(crate) raw: vk::Semaphore,
    pub semaphore_type: SemaphoreType,
}

impl Semaphore {
    pub fn new(device: Arc<DeviceShared>, semaphore_type: SemaphoreType) -> Result<Self> {
        let mut semaphore_type_info = vk::SemaphoreTypeCreateInfo::default().semaphore_type(
            match semaphore_type {
                SemaphoreType::Binary => vk::SemaphoreType::BINARY,
                SemaphoreType::Timeline => vk::SemaphoreType::TIMELINE,
            },
        );
        let semaphore_info = vk::SemaphoreCreateInfo::default().push_next(&mut semaphore_type_info);

        let raw = unsafe { device.raw.create_semaphore(&semaphore_info, None)? };

        Ok(Self {
            device,
            raw,
            semaphore_type,
        })
    }

    /// Current counter value. Only meaningful for timeline semaphores.
    pub fn timeline_value(&self) -> Result<u64> {
        Ok(unsafe { self.device.raw.get_semaphore_counter_value(self.raw)? })
    }

    pub fn wait_timeline_value(&self, value: u64, timeout_ns: u64) -> Result<()> {
        let semaphores = [self.raw];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.device.raw.wait_semaphores(&wait_info, timeout_ns)? };
        Ok(())
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_semaphore(self.raw, None);
        }
    }
}

/// One wait/signal entry in a `vkQueueSubmit2` call.
pub struct QueueSubmitSemaphoreDescriptor<'a> {
    pub semaphore: &'a Semaphore,
    pub stage_mask: vk::PipelineStageFlags2,
    /// Required for timeline semaphores, ignored for binary ones.
    pub value: Option<u64>,
}

pub struct Fence {
    device: Arc<DeviceShared>,
    pub(crate) raw: vk::Fence,
}

impl Fence {
    pub fn new(device: Arc<DeviceShared>, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        let raw = unsafe { device.raw.create_fence(&info, None)? };
        Ok(Self { device, raw })
    }

    pub fn wait(&self, timeout_ns: u64) -> Result<()> {
        unsafe {
            self.device
                .raw
                .wait_for_fences(&[self.raw], true, timeout_ns)?
        };
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.raw.reset_fences(&[self.raw])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_fence(self.raw, None);
        }
    }
}
