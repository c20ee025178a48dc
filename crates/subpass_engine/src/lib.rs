//! # Subpass Engine
//!
//! A Vulkan core for hand-assembled, multi-subpass render graphs.
//!
//! ## Layers
//!
//! - **render::vulkan**: RAII wrappers over ash, sub-allocated buffer regions,
//!   declarative render passes, descriptor sets with dynamic offsets,
//!   pipelines, depth-peeling subpass chains and frames-in-flight sync
//! - **render::RenderContext**: the long-lived device, swapchain and buffers
//!   passed explicitly to everything that touches the GPU
//! - **assets**: meshes, textures and shaders loaded from a manifest
//! - **scene**: camera, entities, lights and materials, packed into
//!   per-frame uniform records
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use subpass_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::load_or_default("engine.toml")?;
//!     subpass_engine::foundation::logging::init_with_level(&config.log_level);
//!
//!     let mut window = Window::new(&config.window)?;
//!     let mut context = RenderContext::new(&mut window, &config)?;
//!     let uniforms = SceneUniforms::new(&mut context)?;
//!     # let _ = uniforms;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for demo binaries
pub mod prelude {
    pub use crate::assets::{AssetError, AssetManifest, Assets, Handle, Mesh, Texture, Vertex};
    pub use crate::config::{Config, ConfigError, EngineConfig};
    pub use crate::foundation::math::{Mat4, Mat4Ext, Transform, Vec2, Vec3, Vec4};
    pub use crate::render::vulkan::{
        ActiveRenderPass, DescriptorSetInfo, FrameSync, GraphicsPipelineInfo, InputState, RenderPassInfo,
        VulkanError, VulkanResult, Window,
    };
    pub use crate::render::RenderContext;
    pub use crate::scene::{
        camera_controls, create_scene, update_scene_data, write_scene_data, Camera, Light, LightMode, Material,
        Scene, SceneConfig, SceneError, SceneFrameData, SceneUniforms,
    };
}
