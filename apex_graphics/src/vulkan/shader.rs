//! SPIR-V shader module loading and reflection.
//!
//! Grounded on `lyzumu_graphics/src/vulkan/shader.rs`'s `ShaderModule` /
//! `ShaderStage`, with `compile_shader_through_glslangvalidator_cli`
//! dropped in favor of loading pre-compiled `.spv` binaries directly and
//! deriving vertex-input bindings/attributes plus the entry point name via
//! `spirv-reflect` instead of hand-written shader metadata - the GLSL
//! source compile step moves out of the runtime crate entirely since it
//! belongs in the asset build pipeline, not this one.

use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ash::vk;

use super::device::{Device, DeviceShared};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub(crate) fn to_vulkan_shader_stage_flag(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
            Self::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

pub struct ShaderModuleDescriptor<'a> {
    pub spirv_file_name: &'a str,
    pub shader_stage: ShaderStage,
}

impl<'a> ShaderModuleDescriptor<'a> {
    pub fn new(spirv_file_name: &'a str, shader_stage: ShaderStage) -> Self {
        Self {
            spirv_file_name,
            shader_stage,
        }
    }
}

pub struct ShaderModule {
    pub(crate) raw: vk::ShaderModule,
    pub stage: ShaderStage,
    pub entry_point: String,
    device: Arc<DeviceShared>,
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_shader_module(self.raw, None);
        }
    }
}

/// One vertex attribute's binding/location/format/offset, derived from
/// reflecting a vertex shader's `Input` stage variables.
#[derive(Clone, Copy, Debug)]
pub struct VertexInputAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// Vertex-input layout recovered from a vertex shader's SPIR-V reflection
/// data, assuming one interleaved binding at stride `stride`.
pub struct VertexInputDescription {
    pub binding: vk::VertexInputBindingDescription,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

fn read_spirv_file(path: &str) -> Result<Vec<u32>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read SPIR-V binary - {}", path))?;
    let mut cursor = std::io::Cursor::new(bytes);
    Ok(ash::util::read_spv(&mut cursor)?)
}

fn reflect_module(spirv_words: &[u32]) -> Result<spirv_reflect::ShaderModule> {
    let bytes = unsafe {
        std::slice::from_raw_parts(spirv_words.as_ptr() as *const u8, spirv_words.len() * 4)
    };
    spirv_reflect::ShaderModule::load_u8_data(bytes)
        .map_err(|err| anyhow!("failed to reflect SPIR-V module: {err}"))
}

/// Derives one interleaved vertex-input binding from a vertex shader's
/// reflected `Input` stage variables, ordered by location.
pub fn reflect_vertex_input(spirv_words: &[u32]) -> Result<VertexInputDescription> {
    let module = reflect_module(spirv_words)?;
    let mut variables = module
        .enumerate_input_variables(None)
        .map_err(|err| anyhow!("failed to enumerate input variables: {err}"))?;
    // Built-ins (gl_VertexIndex, gl_InstanceIndex, ...) reflect with
    // location 0xFFFFFFFF and no mappable format - they aren't part of the
    // vertex buffer layout and must not become bogus attributes.
    variables.retain(|variable| {
        variable.built_in == spirv_reflect::types::ReflectBuiltIn::NoBuiltIn
            && reflect_format_to_vulkan(variable.format) != vk::Format::UNDEFINED
    });
    variables.sort_by_key(|variable| variable.location);

    let mut attributes = Vec::with_capacity(variables.len());
    let mut offset = 0u32;
    for variable in &variables {
        let format = reflect_format_to_vulkan(variable.format);
        attributes.push(
            vk::VertexInputAttributeDescription::default()
                .location(variable.location)
                .binding(0)
                .format(format)
                .offset(offset),
        );
        offset += format_size_bytes(format);
    }

    let binding = vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(offset)
        .input_rate(vk::VertexInputRate::VERTEX);

    Ok(VertexInputDescription { binding, attributes })
}

fn reflect_format_to_vulkan(format: spirv_reflect::types::ReflectFormat) -> vk::Format {
    use spirv_reflect::types::ReflectFormat;
    match format {
        ReflectFormat::R32_SFLOAT => vk::Format::R32_SFLOAT,
        ReflectFormat::R32G32_SFLOAT => vk::Format::R32G32_SFLOAT,
        ReflectFormat::R32G32B32_SFLOAT => vk::Format::R32G32B32_SFLOAT,
        ReflectFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        ReflectFormat::R32_UINT => vk::Format::R32_UINT,
        ReflectFormat::R32G32_UINT => vk::Format::R32G32_UINT,
        ReflectFormat::R32G32B32_UINT => vk::Format::R32G32B32_UINT,
        ReflectFormat::R32G32B32A32_UINT => vk::Format::R32G32B32A32_UINT,
        _ => vk::Format::UNDEFINED,
    }
}

fn format_size_bytes(format: vk::Format) -> u32 {
    match format {
        vk::Format::R32_SFLOAT | vk::Format::R32_UINT => 4,
        vk::Format::R32G32_SFLOAT | vk::Format::R32G32_UINT => 8,
        vk::Format::R32G32B32_SFLOAT | vk::Format::R32G32B32_UINT => 12,
        vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT => 16,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_matches_component_count() {
        assert_eq!(format_size_bytes(vk::Format::R32_SFLOAT), 4);
        assert_eq!(format_size_bytes(vk::Format::R32G32_SFLOAT), 8);
        assert_eq!(format_size_bytes(vk::Format::R32G32B32_SFLOAT), 12);
        assert_eq!(format_size_bytes(vk::Format::R32G32B32A32_SFLOAT), 16);
    }
}

impl Device {
    pub fn create_shader_module(&self, desc: ShaderModuleDescriptor) -> Result<ShaderModule> {
        let spirv_words = read_spirv_file(desc.spirv_file_name)?;
        let module = reflect_module(&spirv_words)?;
        let entry_point = module.get_entry_point_name();

        let create_info = vk::ShaderModuleCreateInfo::default().code(&spirv_words);
        let raw = unsafe { self.shared.raw.create_shader_module(&create_info, None)? };

        Ok(ShaderModule {
            raw,
            stage: desc.shader_stage,
            entry_point,
            device: self.shared.clone(),
        })
    }
}
