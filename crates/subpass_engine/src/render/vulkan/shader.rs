//! Pre-compiled SPIR-V shader modules

use ash::{vk, Device};
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Entry point every shader stage uses
pub const ENTRY_POINT: &CStr = c"main";

/// Shader module tagged with the stage it runs in
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
}

impl ShaderModule {
    /// Create a shader module from SPIR-V bytecode
    pub fn from_bytes(device: Device, bytes: &[u8], stage: vk::ShaderStageFlags) -> VulkanResult<Self> {
        // read_spv copies into u32 words, so the input slice need not be aligned.
        let code = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid SPIR-V: {e}")))?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::call("vkCreateShaderModule"))?
        };

        Ok(Self { device, module, stage })
    }

    /// Load a shader from a SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: Device, path: P, stage: vk::ShaderStageFlags) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to read shader file {}: {e}", path.display()))
        })?;
        Self::from_bytes(device, &bytes, stage)
    }

    /// Get shader module handle
    pub const fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage this module runs in
    pub const fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }

    /// `(stage, module)` pair as pipelines take it
    pub const fn stage_module(&self) -> (vk::ShaderStageFlags, vk::ShaderModule) {
        (self.stage, self.module)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}
