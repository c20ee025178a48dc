//! Declarative render pass construction
//!
//! A [`RenderPassInfo`] lists attachments, subpasses, dependencies and the
//! per-swapchain-image framebuffer view lists. Array position is the index:
//! callers keep their own named constants for attachment and subpass slots.
//! [`create_render_pass`] validates the description before touching the
//! driver, then creates the render pass, one framebuffer per view list and
//! one primary command buffer per framebuffer.

use ash::{vk, Device};

use crate::render::vulkan::commands::{ActiveRenderPass, CommandPool, CommandRecorder};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// One attachment slot and the value it is cleared to
#[derive(Clone, Copy)]
pub struct AttachmentInfo {
    /// Native attachment description
    pub description: vk::AttachmentDescription,
    /// Clear value used when `load_op` is CLEAR
    pub clear_value: vk::ClearValue,
}

impl AttachmentInfo {
    /// Cleared color attachment, contents discarded after the pass
    pub fn color(format: vk::Format, clear: [f32; 4], final_layout: vk::ImageLayout) -> Self {
        Self {
            description: vk::AttachmentDescription {
                format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout,
                ..Default::default()
            },
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue { float32: clear },
            },
        }
    }

    /// Swapchain image: cleared, stored and handed to the presentation engine
    pub fn swapchain(format: vk::Format, clear: [f32; 4]) -> Self {
        Self::color(format, clear, vk::ImageLayout::PRESENT_SRC_KHR).store()
    }

    /// Depth(-stencil) attachment cleared to depth 1, stencil 0
    pub fn depth(format: vk::Format, final_layout: vk::ImageLayout) -> Self {
        Self {
            description: vk::AttachmentDescription {
                format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                stencil_load_op: vk::AttachmentLoadOp::CLEAR,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout,
                ..Default::default()
            },
            clear_value: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        }
    }

    /// Keep the attachment's contents after the pass
    #[must_use]
    pub fn store(mut self) -> Self {
        self.description.store_op = vk::AttachmentStoreOp::STORE;
        self
    }
}

/// Attachment references used by one subpass
#[derive(Debug, Clone, Default)]
pub struct SubpassInfo {
    /// Color attachments in output-location order
    pub color_refs: Vec<vk::AttachmentReference>,
    /// Depth/stencil attachment, if any
    pub depth_ref: Option<vk::AttachmentReference>,
    /// Input attachments in `input_attachment_index` order
    pub input_refs: Vec<vk::AttachmentReference>,
    /// Attachments untouched here whose contents later subpasses need
    pub preserve: Vec<u32>,
}

/// Reference to `attachment` as a color output
pub const fn color_ref(attachment: u32) -> vk::AttachmentReference {
    vk::AttachmentReference {
        attachment,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }
}

/// Reference to `attachment` as the depth/stencil target
pub const fn depth_ref(attachment: u32) -> vk::AttachmentReference {
    vk::AttachmentReference {
        attachment,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    }
}

/// Reference to `attachment` as an input attachment in `layout`
pub const fn input_ref(attachment: u32, layout: vk::ImageLayout) -> vk::AttachmentReference {
    vk::AttachmentReference { attachment, layout }
}

/// Build a subpass dependency
pub fn dependency(
    src_subpass: u32,
    dst_subpass: u32,
    src_stage_mask: vk::PipelineStageFlags,
    dst_stage_mask: vk::PipelineStageFlags,
    src_access_mask: vk::AccessFlags,
    dst_access_mask: vk::AccessFlags,
    by_region: bool,
) -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass,
        dst_subpass,
        src_stage_mask,
        dst_stage_mask,
        src_access_mask,
        dst_access_mask,
        dependency_flags: if by_region {
            vk::DependencyFlags::BY_REGION
        } else {
            vk::DependencyFlags::empty()
        },
    }
}

/// Views bound to one framebuffer, in attachment order
#[derive(Debug, Clone)]
pub struct FramebufferInfo {
    /// One view per attachment description
    pub attachments: Vec<vk::ImageView>,
    /// Framebuffer size
    pub extent: vk::Extent2D,
    /// Layer count
    pub layers: u32,
}

/// Complete description of a render pass and its framebuffers
#[derive(Clone, Default)]
pub struct RenderPassInfo {
    /// Attachment slots, index = position
    pub attachments: Vec<AttachmentInfo>,
    /// Subpasses, index = position
    pub subpasses: Vec<SubpassInfo>,
    /// Synchronization edges between subpasses
    pub dependencies: Vec<vk::SubpassDependency>,
    /// One entry per swapchain image
    pub framebuffers: Vec<FramebufferInfo>,
}

impl RenderPassInfo {
    /// Check every index and count before any native object is created
    pub fn validate(&self) -> VulkanResult<()> {
        let attachment_count = self.attachments.len();
        let subpass_count = self.subpasses.len();

        if subpass_count == 0 {
            return Err(VulkanError::Validation("render pass declares no subpasses".to_string()));
        }
        if self.framebuffers.is_empty() {
            return Err(VulkanError::Validation("render pass declares no framebuffers".to_string()));
        }

        let check_attachment = |subpass: usize, kind: &str, attachment: u32| -> VulkanResult<()> {
            if attachment == vk::ATTACHMENT_UNUSED || (attachment as usize) < attachment_count {
                Ok(())
            } else {
                Err(VulkanError::Validation(format!(
                    "subpass {subpass} {kind} reference {attachment} is out of range ({attachment_count} attachments)"
                )))
            }
        };

        for (index, subpass) in self.subpasses.iter().enumerate() {
            for reference in &subpass.color_refs {
                check_attachment(index, "color", reference.attachment)?;
            }
            if let Some(reference) = &subpass.depth_ref {
                check_attachment(index, "depth", reference.attachment)?;
            }
            for reference in &subpass.input_refs {
                check_attachment(index, "input", reference.attachment)?;
            }
            for &attachment in &subpass.preserve {
                check_attachment(index, "preserve", attachment)?;
            }
        }

        let valid_subpass = |subpass: u32| subpass == vk::SUBPASS_EXTERNAL || (subpass as usize) < subpass_count;
        for (index, dep) in self.dependencies.iter().enumerate() {
            if !valid_subpass(dep.src_subpass) || !valid_subpass(dep.dst_subpass) {
                return Err(VulkanError::Validation(format!(
                    "dependency {index} ({} -> {}) names a subpass outside 0..{subpass_count}",
                    dep.src_subpass, dep.dst_subpass
                )));
            }
            if dep.src_subpass == vk::SUBPASS_EXTERNAL && dep.dst_subpass == vk::SUBPASS_EXTERNAL {
                return Err(VulkanError::Validation(format!("dependency {index} is external on both ends")));
            }
            if dep.src_subpass != vk::SUBPASS_EXTERNAL
                && dep.dst_subpass != vk::SUBPASS_EXTERNAL
                && dep.src_subpass > dep.dst_subpass
            {
                return Err(VulkanError::Validation(format!(
                    "dependency {index} points backwards ({} -> {})",
                    dep.src_subpass, dep.dst_subpass
                )));
            }
        }

        for (index, framebuffer) in self.framebuffers.iter().enumerate() {
            if framebuffer.attachments.len() != attachment_count {
                return Err(VulkanError::Validation(format!(
                    "framebuffer {index} has {} views but the render pass has {attachment_count} attachments",
                    framebuffer.attachments.len()
                )));
            }
            if framebuffer.layers == 0 {
                return Err(VulkanError::Validation(format!("framebuffer {index} has zero layers")));
            }
        }

        Ok(())
    }
}

/// A created render pass with its framebuffers and command buffers
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    command_buffers: Vec<vk::CommandBuffer>,
    clear_values: Vec<vk::ClearValue>,
    subpass_color_counts: Vec<u32>,
    extent: vk::Extent2D,
}

/// Validate `info` and create the render pass, framebuffers and command buffers
pub fn create_render_pass(device: &Device, command_pool: &CommandPool, info: &RenderPassInfo) -> VulkanResult<RenderPass> {
    info.validate()?;

    let attachments: Vec<vk::AttachmentDescription> = info.attachments.iter().map(|a| a.description).collect();
    let subpasses: Vec<vk::SubpassDescription> = info
        .subpasses
        .iter()
        .map(|subpass| {
            let mut builder = vk::SubpassDescription::builder()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .color_attachments(&subpass.color_refs)
                .input_attachments(&subpass.input_refs)
                .preserve_attachments(&subpass.preserve);
            if let Some(depth) = &subpass.depth_ref {
                builder = builder.depth_stencil_attachment(depth);
            }
            builder.build()
        })
        .collect();

    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&info.dependencies);

    let render_pass_handle = unsafe {
        device
            .create_render_pass(&create_info, None)
            .map_err(VulkanError::call("vkCreateRenderPass"))?
    };

    // From here on the partially built pass cleans itself up on error.
    let mut render_pass = RenderPass {
        device: device.clone(),
        render_pass: render_pass_handle,
        framebuffers: Vec::with_capacity(info.framebuffers.len()),
        command_buffers: Vec::new(),
        clear_values: info.attachments.iter().map(|a| a.clear_value).collect(),
        subpass_color_counts: info.subpasses.iter().map(|s| s.color_refs.len() as u32).collect(),
        extent: info.framebuffers[0].extent,
    };

    for framebuffer in &info.framebuffers {
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass_handle)
            .attachments(&framebuffer.attachments)
            .width(framebuffer.extent.width)
            .height(framebuffer.extent.height)
            .layers(framebuffer.layers);

        let handle = unsafe {
            device
                .create_framebuffer(&framebuffer_info, None)
                .map_err(VulkanError::call("vkCreateFramebuffer"))?
        };
        render_pass.framebuffers.push(handle);
    }

    render_pass.command_buffers = command_pool.allocate_command_buffers(info.framebuffers.len() as u32)?;

    log::debug!(
        "Created render pass: {} attachments, {} subpasses, {} dependencies, {} framebuffers",
        attachments.len(),
        subpasses.len(),
        info.dependencies.len(),
        info.framebuffers.len()
    );

    Ok(render_pass)
}

impl RenderPass {
    /// Native handle
    pub const fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Framebuffer for swapchain image `image_index`
    pub fn framebuffer(&self, image_index: usize) -> VulkanResult<vk::Framebuffer> {
        self.framebuffers
            .get(image_index)
            .copied()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("no framebuffer for image {image_index}"),
            })
    }

    /// Command buffer for swapchain image `image_index`
    pub fn command_buffer(&self, image_index: usize) -> VulkanResult<vk::CommandBuffer> {
        self.command_buffers
            .get(image_index)
            .copied()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("no command buffer for image {image_index}"),
            })
    }

    /// A recorder over this pass's command buffer for `image_index`
    pub fn recorder(&self, image_index: usize) -> VulkanResult<CommandRecorder> {
        Ok(CommandRecorder::new(self.command_buffer(image_index)?, self.device.clone()))
    }

    /// Begin this pass on `recorder` with the declared clear values over the full extent
    pub fn begin<'a>(&self, recorder: &'a mut CommandRecorder, image_index: usize) -> VulkanResult<ActiveRenderPass<'a>> {
        let framebuffer = self.framebuffer(image_index)?;
        recorder.begin_render_pass(self.render_pass, framebuffer, self.render_area(), &self.clear_values)
    }

    /// Full-framebuffer render area
    pub const fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }

    /// Framebuffer extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of subpasses
    pub fn subpass_count(&self) -> usize {
        self.subpass_color_counts.len()
    }

    /// Number of color attachments written by `subpass`
    pub fn color_attachment_count(&self, subpass: u32) -> VulkanResult<u32> {
        self.subpass_color_counts
            .get(subpass as usize)
            .copied()
            .ok_or_else(|| VulkanError::Validation(format!("render pass has no subpass {subpass}")))
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn extent() -> vk::Extent2D {
        vk::Extent2D { width: 64, height: 64 }
    }

    fn forward_info(image_count: usize) -> RenderPassInfo {
        RenderPassInfo {
            attachments: vec![
                AttachmentInfo::depth(vk::Format::D32_SFLOAT, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
                AttachmentInfo::swapchain(vk::Format::B8G8R8A8_SRGB, [0.0, 0.0, 0.0, 1.0]),
            ],
            subpasses: vec![SubpassInfo {
                color_refs: vec![color_ref(1)],
                depth_ref: Some(depth_ref(0)),
                ..Default::default()
            }],
            dependencies: vec![dependency(
                vk::SUBPASS_EXTERNAL,
                0,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags::empty(),
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                false,
            )],
            framebuffers: (0..image_count)
                .map(|i| FramebufferInfo {
                    attachments: vec![vk::ImageView::from_raw(1), vk::ImageView::from_raw(10 + i as u64)],
                    extent: extent(),
                    layers: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn test_valid_forward_pass() {
        let info = forward_info(3);
        assert!(info.validate().is_ok());
        for framebuffer in &info.framebuffers {
            assert_eq!(framebuffer.attachments.len(), info.attachments.len());
        }
    }

    #[test]
    fn test_out_of_range_attachment_rejected() {
        let mut info = forward_info(2);
        info.subpasses[0].input_refs.push(input_ref(2, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        assert!(matches!(info.validate(), Err(VulkanError::Validation(_))));
    }

    #[test]
    fn test_framebuffer_view_count_must_match() {
        let mut info = forward_info(2);
        info.framebuffers[1].attachments.pop();
        assert!(matches!(info.validate(), Err(VulkanError::Validation(_))));
    }

    #[test]
    fn test_dependency_subpass_range() {
        let mut info = forward_info(1);
        info.dependencies[0].dst_subpass = 1;
        assert!(info.validate().is_err());

        info.dependencies[0].dst_subpass = vk::SUBPASS_EXTERNAL;
        assert!(info.validate().is_err());

        info.dependencies[0] = dependency(
            0,
            vk::SUBPASS_EXTERNAL,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::AccessFlags::empty(),
            true,
        );
        assert!(info.validate().is_ok());
        assert_eq!(info.dependencies[0].dependency_flags, vk::DependencyFlags::BY_REGION);
    }

    #[test]
    fn test_unused_attachment_allowed() {
        let mut info = forward_info(1);
        info.subpasses[0].color_refs.push(color_ref(vk::ATTACHMENT_UNUSED));
        assert!(info.validate().is_ok());
    }

    #[test]
    fn test_empty_pass_rejected() {
        assert!(RenderPassInfo::default().validate().is_err());
    }

    #[test]
    fn test_attachment_presets() {
        let swapchain = AttachmentInfo::swapchain(vk::Format::B8G8R8A8_SRGB, [0.0; 4]);
        assert_eq!(swapchain.description.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(swapchain.description.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        let depth = AttachmentInfo::depth(vk::Format::D32_SFLOAT, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        let clear = unsafe { depth.clear_value.depth_stencil };
        assert_eq!(clear.depth, 1.0);
        assert_eq!(clear.stencil, 0);
    }
}
