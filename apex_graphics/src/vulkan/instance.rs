//! Vulkan instance creation and the debug messenger.
//!
//! Grounded on `lyzumu_graphics/src/vulkan/lib.rs`'s `Instance`. Beyond the
//! original, this unconditionally pushes a `VK_EXT_layer_settings` entry
//! turning on `VK_LAYER_KHRONOS_validation`'s sync-validation feature, since
//! every other bindless descriptor-array access in this crate depends on it
//! catching cross-frame hazards during development.

use std::ffi::{c_void, CStr, CString};

use anyhow::Result;
use ash::{ext::debug_utils, ext::layer_settings, vk};
use raw_window_handle::RawDisplayHandle;

const VALIDATION_LAYER_NAME: &str = "VK_LAYER_KHRONOS_validation";
const SYNC_VALIDATION_SETTING_NAME: &str = "validate_sync";

pub struct Instance {
    pub(crate) entry: ash::Entry,
    pub(crate) raw: ash::Instance,
    debug_utils: debug_utils::Instance,
    debug_utils_messenger: vk::DebugUtilsMessengerEXT,
}

impl Instance {
    pub fn new(display_handle: RawDisplayHandle) -> Result<Self> {
        let entry = unsafe { ash::Entry::load()? };

        let app_name = CString::new("apex").unwrap();
        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name.as_c_str())
            .api_version(vk::API_VERSION_1_3);

        let mut extension_names =
            ash_window::enumerate_required_extensions(display_handle)?.to_vec();
        extension_names.push(debug_utils::NAME.as_ptr());
        extension_names.push(layer_settings::NAME.as_ptr());

        let layer_strings = vec![CString::new(VALIDATION_LAYER_NAME).unwrap()];
        let layer_names: Vec<*const i8> =
            layer_strings.iter().map(|c_str| c_str.as_ptr()).collect();

        let validation_layer_name = CString::new(VALIDATION_LAYER_NAME).unwrap();
        let sync_validation_setting_name = CString::new(SYNC_VALIDATION_SETTING_NAME).unwrap();
        let sync_validation_values = [vk::TRUE];
        let layer_setting = vk::LayerSettingEXT::default()
            .layer_name(&validation_layer_name)
            .setting_name(&sync_validation_setting_name)
            .ty(vk::LayerSettingTypeEXT::BOOL32)
            .values(&sync_validation_values);
        let layer_settings = [layer_setting];
        let mut layer_settings_info =
            vk::LayerSettingsCreateInfoEXT::default().settings(&layer_settings);

        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names)
            .push_next(&mut layer_settings_info);

        let raw = unsafe { entry.create_instance(&instance_info, None)? };

        let debug_utils_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .flags(vk::DebugUtilsMessengerCreateFlagsEXT::empty())
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_utils_callback));

        let debug_utils = debug_utils::Instance::new(&entry, &raw);
        let debug_utils_messenger =
            unsafe { debug_utils.create_debug_utils_messenger(&debug_utils_info, None)? };

        Ok(Self {
            entry,
            raw,
            debug_utils,
            debug_utils_messenger,
        })
    }

    pub(crate) fn enumerate_physical_devices(&self) -> Result<Vec<vk::PhysicalDevice>> {
        Ok(unsafe { self.raw.enumerate_physical_devices()? })
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::trace!("instance dropped");
        unsafe {
            self.debug_utils
                .destroy_debug_utils_messenger(self.debug_utils_messenger, None);
            self.raw.destroy_instance(None);
        }
    }
}

unsafe extern "system" fn vulkan_debug_utils_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let severity = match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => "[Verbose]",
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => "[Warning]",
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => "[Error]",
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => "[Info]",
        _ => "[Unknown]",
    };
    let types = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "[General]",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "[Performance]",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "[Validation]",
        _ => "[Unknown]",
    };
    let message = CStr::from_ptr((*p_callback_data).p_message);
    log::debug!("[VK Debug]{}{}{:?}", severity, types, message);

    vk::FALSE
}
