//! Queue handle and `vkQueueSubmit2`/`vkQueuePresentKHR` submission.
//!
//! Grounded on `lyzumu_graphics/src/vulkan/lib.rs`'s `Queue` /
//! `QueueSubmitSemaphoreDescriptor::submit_command_buffers`, with `present`
//! folded in here instead of on `Swapchain` since every queue role
//! (graphics, compute, transfer) goes through the same `submit` entry
//! point and only the graphics/present queue ever presents.

use anyhow::Result;
use ash::vk;

use super::sync::{QueueSubmitSemaphoreDescriptor, SemaphoreType};

#[derive(Clone)]
pub struct Queue {
    ash_device: ash::Device,
    pub(crate) raw: vk::Queue,
    pub family_index: u32,
}

impl Queue {
    pub(crate) fn new_from_vulkan_handle(ash_device: ash::Device, raw: vk::Queue, family_index: u32) -> Self {
        Self {
            ash_device,
            raw,
            family_index,
        }
    }

    pub fn submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[QueueSubmitSemaphoreDescriptor],
        signal_semaphores: &[QueueSubmitSemaphoreDescriptor],
        fence: vk::Fence,
    ) -> Result<()> {
        let wait_info = build_submit_semaphore_infos(wait_semaphores);
        let signal_info = build_submit_semaphore_infos(signal_semaphores);

        let command_buffer_infos = command_buffers
            .iter()
            .map(|cb| vk::CommandBufferSubmitInfo::default().command_buffer(*cb))
            .collect::<Vec<_>>();

        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_info)
            .signal_semaphore_infos(&signal_info)
            .command_buffer_infos(&command_buffer_infos);

        unsafe {
            self.ash_device
                .queue_submit2(self.raw, std::slice::from_ref(&submit_info), fence)?
        };

        Ok(())
    }

    pub fn submit_graphics(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[QueueSubmitSemaphoreDescriptor],
        signal_semaphores: &[QueueSubmitSemaphoreDescriptor],
    ) -> Result<()> {
        self.submit(command_buffers, wait_semaphores, signal_semaphores, vk::Fence::null())
    }

    pub fn submit_compute(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[QueueSubmitSemaphoreDescriptor],
        signal_semaphores: &[QueueSubmitSemaphoreDescriptor],
    ) -> Result<()> {
        self.submit(command_buffers, wait_semaphores, signal_semaphores, vk::Fence::null())
    }

    pub fn submit_transfer(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[QueueSubmitSemaphoreDescriptor],
        signal_semaphores: &[QueueSubmitSemaphoreDescriptor],
    ) -> Result<()> {
        self.submit(command_buffers, wait_semaphores, signal_semaphores, vk::Fence::null())
    }

    pub fn submit_and_fence(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[QueueSubmitSemaphoreDescriptor],
        signal_semaphores: &[QueueSubmitSemaphoreDescriptor],
        fence: vk::Fence,
    ) -> Result<()> {
        self.submit(command_buffers, wait_semaphores, signal_semaphores, fence)
    }

    pub fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe { swapchain_loader.queue_present(self.raw, &present_info)? };
        Ok(suboptimal)
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.ash_device.queue_wait_idle(self.raw)? };
        Ok(())
    }
}

fn build_submit_semaphore_infos(
    descriptors: &[QueueSubmitSemaphoreDescriptor],
) -> Vec<vk::SemaphoreSubmitInfo<'static>> {
    descriptors
        .iter()
        .map(|descriptor| {
            let value = if descriptor.semaphore.semaphore_type == SemaphoreType::Timeline {
                descriptor
                    .value
                    .expect("timeline semaphore submission requires a value")
            } else {
                0
            };
            vk::SemaphoreSubmitInfo::default()
                .semaphore(descriptor.semaphore.raw)
                .stage_mask(descriptor.stage_mask)
                .value(value)
        })
        .collect()
}
