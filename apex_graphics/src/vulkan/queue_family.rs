//! Queue family bookkeeping and selection policy.
//!
//! Grounded on `lyzumu_graphics/src/vulkan/lib.rs`'s `QueueFamily` /
//! `select_queue_families`, generalized from "exactly one family per role,
//! unwrap-or-panic" to three independently optional roles: a combined
//! graphics+present family (required), a distinct compute family (falls
//! back to the graphics family if none exists), and a transfer family
//! (prefers a transfer-only family, falls back to the graphics family if
//! none exists).

use anyhow::{anyhow, Result};
use ash::vk;

use super::physical_device::PhysicalDevice;
use super::surface::Surface;

#[derive(Debug, Clone, Copy)]
pub struct QueueFamily {
    pub index: u32,
    pub properties: vk::QueueFamilyProperties,
    pub supports_present: bool,
}

impl QueueFamily {
    pub(crate) fn new(index: u32, properties: vk::QueueFamilyProperties, supports_present: bool) -> Self {
        Self {
            index,
            properties,
            supports_present,
        }
    }

    pub fn supports_graphics(&self) -> bool {
        self.properties
            .queue_flags
            .contains(vk::QueueFlags::GRAPHICS)
    }

    pub fn supports_compute(&self) -> bool {
        self.properties
            .queue_flags
            .contains(vk::QueueFlags::COMPUTE)
    }

    pub fn supports_transfer(&self) -> bool {
        self.properties
            .queue_flags
            .contains(vk::QueueFlags::TRANSFER)
    }

    pub fn is_transfer_only(&self) -> bool {
        self.supports_transfer() && !self.supports_graphics() && !self.supports_compute()
    }
}

pub(crate) fn enumerate_queue_families(
    instance: &ash::Instance,
    surface: &Surface,
    physical_device: vk::PhysicalDevice,
) -> Result<Vec<QueueFamily>> {
    let queue_family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    queue_family_properties
        .into_iter()
        .enumerate()
        .map(|(index, properties)| {
            let present_support = unsafe {
                surface.raw_ash.get_physical_device_surface_support(
                    physical_device,
                    index as u32,
                    surface.raw_vulkan,
                )?
            };
            Ok(QueueFamily::new(index as u32, properties, present_support))
        })
        .collect()
}

/// One family index per role; `compute`/`transfer` may alias `graphics`.
#[derive(Debug, Clone, Copy)]
pub struct SelectedQueueFamilies {
    pub graphics_present: QueueFamily,
    pub compute: QueueFamily,
    pub transfer: QueueFamily,
}

impl SelectedQueueFamilies {
    /// Distinct family indices, deduplicated, in a stable order - used to
    /// build `DeviceQueueCreateInfo` entries.
    pub fn distinct_indices(&self) -> Vec<u32> {
        let mut indices = vec![
            self.graphics_present.index,
            self.compute.index,
            self.transfer.index,
        ];
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

pub(crate) fn select_queue_families(device: &PhysicalDevice) -> Result<SelectedQueueFamilies> {
    select_queue_families_from(&device.queue_families)
}

/// Pure selection policy, factored out of [`select_queue_families`] so it
/// can be exercised against synthetic family lists without a physical
/// device.
pub(crate) fn select_queue_families_from(families: &[QueueFamily]) -> Result<SelectedQueueFamilies> {
    let graphics_present = families
        .iter()
        .find(|family| {
            family.properties.queue_count > 0
                && family.supports_graphics()
                && family.supports_present
        })
        .copied()
        .ok_or_else(|| anyhow!("no queue family supports both graphics and present"))?;

    let compute = families
        .iter()
        .filter(|family| family.properties.queue_count > 0)
        .find(|family| family.supports_compute() && family.index != graphics_present.index)
        .copied()
        .unwrap_or(graphics_present);

    let transfer = families
        .iter()
        .filter(|family| family.properties.queue_count > 0)
        .find(|family| family.is_transfer_only())
        .copied()
        .unwrap_or(graphics_present);

    Ok(SelectedQueueFamilies {
        graphics_present,
        compute,
        transfer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(index: u32, flags: vk::QueueFlags, present: bool) -> QueueFamily {
        QueueFamily::new(
            index,
            vk::QueueFamilyProperties {
                queue_flags: flags,
                queue_count: 1,
                timestamp_valid_bits: 0,
                min_image_transfer_granularity: vk::Extent3D::default(),
            },
            present,
        )
    }

    #[test]
    fn picks_distinct_compute_and_transfer_families_when_available() {
        let families = vec![
            family(0, vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, true),
            family(1, vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, false),
            family(2, vk::QueueFlags::TRANSFER, false),
        ];

        let selected = select_queue_families_from(&families).unwrap();
        assert_eq!(selected.graphics_present.index, 0);
        assert_eq!(selected.compute.index, 1);
        assert_eq!(selected.transfer.index, 2);
        assert_eq!(selected.distinct_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn falls_back_to_graphics_family_when_no_dedicated_queues_exist() {
        let families = vec![family(
            0,
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            true,
        )];

        let selected = select_queue_families_from(&families).unwrap();
        assert_eq!(selected.compute.index, 0);
        assert_eq!(selected.transfer.index, 0);
        assert_eq!(selected.distinct_indices(), vec![0]);
    }

    #[test]
    fn no_graphics_present_family_is_an_error() {
        let families = vec![family(0, vk::QueueFlags::COMPUTE, false)];
        assert!(select_queue_families_from(&families).is_err());
    }
}
