//! Vulkan backend
//!
//! Thin RAII wrappers over ash plus the pure description types the render
//! graphs are assembled from. Every wrapper holds a cloned `ash::Device` and
//! must be dropped before the [`VulkanContext`] that created the device.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod depth_peel;
pub mod descriptors;
pub mod image;
pub mod pipeline;
pub mod region;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod uniform;
pub mod window;

pub use buffer::{Buffer, GpuRegionIo, RegionIo};
pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance, VulkanResult};
pub use depth_peel::DepthPeelChain;
pub use descriptors::{
    DescriptorPool, DescriptorSet, DescriptorSetInfo, DescriptorSetLayout, DescriptorWriter,
};
pub use image::{Image, ImageInfo, Sampler, SamplerInfo};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineInfo, VertexInput, VertexLayout};
pub use region::{Region, RegionArena, DEFAULT_REGION_ALIGNMENT};
pub use render_pass::{AttachmentInfo, FramebufferInfo, RenderPass, RenderPassInfo, SubpassInfo};
pub use shader::ShaderModule;
pub use swapchain::Swapchain;
pub use sync::{Fence, FenceOps, FrameSlot, FrameSlotTracker, FrameSync, Semaphore};
pub use uniform::{UniformBuffer, UniformLayout};
pub use window::{InputState, Window, WindowError, WindowResult};
