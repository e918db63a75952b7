//! Physical device enumeration and selection.
//!
//! Grounded on `lyzumu_graphics/src/vulkan/lib.rs`'s `PhysicalDevice` /
//! `select_discrete_gpu`, extended with an explicit Vulkan 1.2/1.3
//! feature-bit predicate (descriptor indexing, timeline semaphores,
//! dynamic rendering, synchronization2) instead of just checking device
//! type, since every device this crate selects must support the full
//! bindless + dynamic-rendering feature set unconditionally.

use std::ffi::CStr;

use anyhow::{anyhow, Result};
use ash::vk;

use super::instance::Instance;
use super::queue_family::{enumerate_queue_families, QueueFamily};
use super::surface::Surface;

#[derive(Debug, Clone)]
pub struct PhysicalDevice {
    pub raw: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub limits: vk::PhysicalDeviceLimits,
    pub queue_families: Vec<QueueFamily>,
    pub(crate) supported_extensions: Vec<String>,
}

impl PhysicalDevice {
    fn new_from_vulkan_handle(
        instance: &ash::Instance,
        surface: &Surface,
        raw: vk::PhysicalDevice,
    ) -> Result<Self> {
        let properties = unsafe { instance.get_physical_device_properties(raw) };
        let name = unsafe {
            CStr::from_ptr(properties.device_name.as_ptr())
                .to_str()
                .unwrap()
                .to_owned()
        };

        let extension_properties = unsafe { instance.enumerate_device_extension_properties(raw)? };
        let supported_extensions = extension_properties
            .into_iter()
            .map(|prop| {
                let name = unsafe { CStr::from_ptr(prop.extension_name.as_ptr()) };
                name.to_str().unwrap().to_owned()
            })
            .collect();

        Ok(Self {
            raw,
            name,
            device_type: properties.device_type,
            limits: properties.limits,
            queue_families: enumerate_queue_families(instance, surface, raw)?,
            supported_extensions,
        })
    }

    pub fn supports_extensions(&self, extensions: &[&str]) -> bool {
        let supported = self
            .supported_extensions
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>();
        extensions.iter().all(|ext| supported.contains(ext))
    }

    /// Required device feature bits: descriptor indexing + update-after-bind
    /// (bindless), buffer device address, timeline semaphores, dynamic
    /// rendering, synchronization2, maintenance4, and the atomic-float
    /// storage-buffer add the bindless slot counters rely on.
    fn supports_required_features(&self, instance: &ash::Instance) -> bool {
        let mut vulkan12_features = vk::PhysicalDeviceVulkan12Features::default();
        let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default();
        let mut atomic_float_features = vk::PhysicalDeviceShaderAtomicFloatFeaturesEXT::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut vulkan12_features)
            .push_next(&mut vulkan13_features)
            .push_next(&mut atomic_float_features);

        unsafe { instance.get_physical_device_features2(self.raw, &mut features2) };

        vulkan12_features.descriptor_indexing == vk::TRUE
            && vulkan12_features.runtime_descriptor_array == vk::TRUE
            && vulkan12_features.descriptor_binding_partially_bound == vk::TRUE
            && vulkan12_features.descriptor_binding_variable_descriptor_count == vk::TRUE
            && vulkan12_features.descriptor_binding_sampled_image_update_after_bind == vk::TRUE
            && vulkan12_features.descriptor_binding_storage_image_update_after_bind == vk::TRUE
            && vulkan12_features.descriptor_binding_uniform_buffer_update_after_bind == vk::TRUE
            && vulkan12_features.descriptor_binding_storage_buffer_update_after_bind == vk::TRUE
            && vulkan12_features.shader_sampled_image_array_non_uniform_indexing == vk::TRUE
            && vulkan12_features.buffer_device_address == vk::TRUE
            && vulkan12_features.timeline_semaphore == vk::TRUE
            && vulkan13_features.dynamic_rendering == vk::TRUE
            && vulkan13_features.synchronization2 == vk::TRUE
            && vulkan13_features.maintenance4 == vk::TRUE
            && atomic_float_features.shader_buffer_float32_atomic_add == vk::TRUE
    }
}

pub(crate) fn enumerate_physical_devices(
    instance: &Instance,
    surface: &Surface,
) -> Result<Vec<PhysicalDevice>> {
    instance
        .enumerate_physical_devices()?
        .into_iter()
        .map(|raw| PhysicalDevice::new_from_vulkan_handle(&instance.raw, surface, raw))
        .collect()
}

/// Picks the first device satisfying the required 1.2/1.3 feature set,
/// preferring a discrete GPU over any other device type.
pub(crate) fn select_physical_device(
    instance: &Instance,
    devices: &[PhysicalDevice],
) -> Result<PhysicalDevice> {
    let mut candidates: Vec<&PhysicalDevice> = devices
        .iter()
        .filter(|device| {
            device.supports_extensions(&[
                "VK_KHR_swapchain",
                "VK_EXT_shader_atomic_float",
                "VK_KHR_dynamic_rendering",
                "VK_KHR_maintenance4",
            ]) && device.supports_required_features(&instance.raw)
        })
        .collect();

    candidates.sort_by_key(|device| match device.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        _ => 2,
    });

    candidates
        .into_iter()
        .next()
        .cloned()
        .ok_or_else(|| anyhow!("no physical device supports the required Vulkan 1.2/1.3 bindless feature set"))
}
