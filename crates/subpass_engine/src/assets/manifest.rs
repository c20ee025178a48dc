//! Asset manifest: which shaders, textures and meshes a demo loads

use ash::vk;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::render::vulkan::SamplerInfo;

/// Pipeline stage of a shader binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

impl ShaderStage {
    /// Vulkan stage flag
    pub const fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Texture filtering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFilter {
    /// Bilinear
    #[default]
    Linear,
    /// Point sampling
    Nearest,
}

impl TextureFilter {
    /// Repeating sampler with this filter
    pub fn sampler_info(self) -> SamplerInfo {
        SamplerInfo {
            filter: match self {
                Self::Linear => vk::Filter::LINEAR,
                Self::Nearest => vk::Filter::NEAREST,
            },
            ..SamplerInfo::default()
        }
    }
}

/// SPIR-V binary to load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderEntry {
    /// Lookup name
    pub name: String,
    /// Path relative to the manifest
    pub path: String,
    /// Stage the module runs in
    pub stage: ShaderStage,
}

/// Image file to load as a texture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureEntry {
    /// Lookup name
    pub name: String,
    /// Path relative to the manifest
    pub path: String,
    /// Sampler filter
    #[serde(default)]
    pub filter: TextureFilter,
}

/// OBJ file to import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshEntry {
    /// Lookup name
    pub name: String,
    /// Path relative to the manifest
    pub path: String,
}

/// Everything one demo needs loaded before its scene is built
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetManifest {
    /// Shader binaries
    pub shaders: Vec<ShaderEntry>,
    /// Textures
    pub textures: Vec<TextureEntry>,
    /// Meshes
    pub meshes: Vec<MeshEntry>,
}

impl Config for AssetManifest {}
