//! Window surface wrapper, ported from `lyzumu_graphics/src/vulkan/lib.rs`'s
//! `Surface`.

use anyhow::Result;
use ash::{khr, vk};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use super::instance::Instance;

pub struct Surface {
    pub(crate) raw_ash: khr::surface::Instance,
    pub(crate) raw_vulkan: vk::SurfaceKHR,
}

impl Surface {
    pub fn new(
        instance: &Instance,
        window_handle: RawWindowHandle,
        display_handle: RawDisplayHandle,
    ) -> Result<Self> {
        let raw_ash = khr::surface::Instance::new(&instance.entry, &instance.raw);
        let raw_vulkan = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.raw,
                display_handle,
                window_handle,
                None,
            )?
        };

        Ok(Self {
            raw_ash,
            raw_vulkan,
        })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.raw_ash.destroy_surface(self.raw_vulkan, None);
        }
    }
}
