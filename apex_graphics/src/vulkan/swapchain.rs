//! Swapchain creation, image acquisition and presentation.
//!
//! Ported from `lyzumu_graphics/src/vulkan/lib.rs`'s `Swapchain`, with
//! `queue_present` moved onto [`crate::vulkan::queue::Queue`] since
//! presentation is just another queue operation in this crate's submission
//! model.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use ash::{khr, vk};

use super::device::{DeviceShared, FRAMES_IN_FLIGHT};
use super::queue::Queue;

pub struct Swapchain {
    raw_ash: khr::swapchain::Device,
    raw_vulkan: vk::SwapchainKHR,
    images_raw: Vec<vk::Image>,
    pub(crate) image_views_raw: Vec<vk::ImageView>,
    pub(crate) image_index: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    device: Arc<DeviceShared>,
    requested_present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    pub(crate) fn new(device: Arc<DeviceShared>, requested_present_mode: vk::PresentModeKHR) -> Result<Self> {
        let surface_format = {
            let formats = unsafe {
                device.surface.raw_ash.get_physical_device_surface_formats(
                    device.physical_device.raw,
                    device.surface.raw_vulkan,
                )?
            };

            if formats.len() == 1 && formats[0].format == vk::Format::UNDEFINED {
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }
            } else {
                *formats
                    .iter()
                    .find(|format| {
                        format.format == vk::Format::B8G8R8A8_SRGB
                            && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
                    })
                    .unwrap_or(&formats[0])
            }
        };

        let present_mode = {
            let present_modes = unsafe {
                device
                    .surface
                    .raw_ash
                    .get_physical_device_surface_present_modes(
                        device.physical_device.raw,
                        device.surface.raw_vulkan,
                    )?
            };

            if present_modes.contains(&requested_present_mode) {
                requested_present_mode
            } else {
                vk::PresentModeKHR::FIFO
            }
        };

        let capabilities = unsafe {
            device
                .surface
                .raw_ash
                .get_physical_device_surface_capabilities(
                    device.physical_device.raw,
                    device.surface.raw_vulkan,
                )?
        };

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            capabilities.max_image_extent
        };

        // `max_image_count == 0` is Vulkan's "no maximum" sentinel, not a
        // literal clamp ceiling - only clamp against it when it is nonzero.
        let desired_image_count = (FRAMES_IN_FLIGHT as u32).max(capabilities.min_image_count + 1);
        let image_count = if capabilities.max_image_count == 0 {
            desired_image_count
        } else {
            desired_image_count.min(capabilities.max_image_count)
        };

        log::debug!("swapchain extent: {} x {}", extent.width, extent.height);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(device.surface.raw_vulkan)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::TRANSFER_SRC,
            )
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .present_mode(present_mode);

        let raw_ash = khr::swapchain::Device::new(&device.instance.raw, &device.raw);
        let raw_vulkan = unsafe { raw_ash.create_swapchain(&create_info, None)? };

        let images_raw = unsafe { raw_ash.get_swapchain_images(raw_vulkan)? };
        let image_views_raw = images_raw
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );
                Ok(unsafe { device.raw.create_image_view(&view_info, None)? })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            device,
            raw_ash,
            raw_vulkan,
            images_raw,
            image_views_raw,
            image_index: 0,
            surface_format,
            extent,
            requested_present_mode,
        })
    }

    pub(crate) fn acquire_next_image(&mut self, signal_semaphore: vk::Semaphore) -> Result<(u32, bool)> {
        let (image_index, suboptimal) = unsafe {
            self.raw_ash.acquire_next_image(
                self.raw_vulkan,
                u64::MAX - 1,
                signal_semaphore,
                vk::Fence::null(),
            )?
        };
        self.image_index = image_index;
        Ok((image_index, suboptimal))
    }

    pub(crate) fn present(&self, queue: &Queue, wait_semaphores: &[vk::Semaphore]) -> Result<bool> {
        queue.present(&self.raw_ash, self.raw_vulkan, self.image_index, wait_semaphores)
    }

    pub fn current_image_raw(&self) -> vk::Image {
        self.images_raw[self.image_index as usize]
    }

    pub fn current_image_view_raw(&self) -> vk::ImageView {
        self.image_views_raw[self.image_index as usize]
    }

    pub(crate) fn recreate(&mut self) -> Result<()> {
        self.destroy();
        log::debug!("recreating swapchain");
        let new_swapchain = Self::new(self.device.clone(), self.requested_present_mode)?;
        *self = new_swapchain;
        Ok(())
    }

    fn destroy(&mut self) {
        if !self.image_views_raw.is_empty() {
            unsafe {
                for view in self.image_views_raw.drain(..) {
                    self.device.raw.destroy_image_view(view, None);
                }
                self.raw_ash.destroy_swapchain(self.raw_vulkan, None);
            }
        }
    }

    pub fn is_valid_extent(&self) -> Result<()> {
        if self.extent.width == 0 || self.extent.height == 0 {
            return Err(anyhow!("swapchain extent is zero, window likely minimized"));
        }
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}
