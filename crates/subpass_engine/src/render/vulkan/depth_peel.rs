//! Subpass chain for depth peeling
//!
//! Layer 0 is peeled by subpass 0 into depth A and the peel color target,
//! then composited into the swapchain image by subpass 1. Every further
//! layer `i` gets a peel subpass `2i` that reads the previous layer's depth
//! as an input attachment and writes the other depth image, followed by a
//! blend subpass `2i + 1`. With `N` further layers that is `2 + 2N`
//! subpasses, chained by `2 + 2N` dependencies: one from EXTERNAL into
//! subpass 0 and one between each consecutive pair.
//!
//! Load ops only apply at an attachment's first use, so the caller clears
//! the depth and peel color attachments at the start of every peel subpass
//! after the first.

use ash::vk;

use crate::render::vulkan::render_pass::{
    color_ref, depth_ref, input_ref, AttachmentInfo, FramebufferInfo, RenderPassInfo, SubpassInfo,
};

/// First ping-pong depth image
pub const DEPTH_A: u32 = 0;
/// Second ping-pong depth image
pub const DEPTH_B: u32 = 1;
/// Color of the layer currently being peeled
pub const PEEL_COLOR: u32 = 2;
/// Swapchain image the layers are composited into
pub const SWAPCHAIN: u32 = 3;
/// Attachments the chain uses
pub const ATTACHMENT_COUNT: usize = 4;

/// Depth images must be readable as input attachments, so they carry no stencil aspect
pub const PEEL_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
/// Format of the peel color target
pub const PEEL_COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Subpass layout for one layer count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthPeelChain {
    extra_layers: u32,
}

impl DepthPeelChain {
    /// A chain peeling `extra_layers` layers after the first
    pub const fn new(extra_layers: u32) -> Self {
        Self { extra_layers }
    }

    /// Layers peeled in total
    pub const fn layer_count(&self) -> u32 {
        self.extra_layers + 1
    }

    /// `2 + 2N`
    pub const fn subpass_count(&self) -> u32 {
        2 + 2 * self.extra_layers
    }

    /// Subpass that peels `layer`
    pub const fn peel_subpass(layer: u32) -> u32 {
        2 * layer
    }

    /// Subpass that composites `layer` into the swapchain image
    pub const fn blend_subpass(layer: u32) -> u32 {
        2 * layer + 1
    }

    /// Depth attachment written while peeling `layer`
    pub const fn depth_written(layer: u32) -> u32 {
        if layer % 2 == 0 {
            DEPTH_A
        } else {
            DEPTH_B
        }
    }

    /// Depth attachment the peel of `layer` compares against, none for the first layer
    pub const fn depth_read(layer: u32) -> Option<u32> {
        if layer == 0 {
            None
        } else {
            Some(Self::depth_written(layer - 1))
        }
    }

    /// Subpass descriptions in execution order
    pub fn subpasses(&self) -> Vec<SubpassInfo> {
        let mut subpasses = Vec::with_capacity(self.subpass_count() as usize);
        for layer in 0..self.layer_count() {
            let written = Self::depth_written(layer);
            subpasses.push(SubpassInfo {
                color_refs: vec![color_ref(PEEL_COLOR)],
                depth_ref: Some(depth_ref(written)),
                input_refs: Self::depth_read(layer)
                    .map(|read| vec![input_ref(read, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL)])
                    .unwrap_or_default(),
                preserve: vec![SWAPCHAIN],
            });
            subpasses.push(SubpassInfo {
                color_refs: vec![color_ref(SWAPCHAIN)],
                depth_ref: None,
                input_refs: vec![input_ref(PEEL_COLOR, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)],
                preserve: vec![written],
            });
        }
        subpasses
    }

    /// EXTERNAL into subpass 0, then one edge per consecutive subpass pair
    pub fn dependencies(&self) -> Vec<vk::SubpassDependency> {
        std::iter::once(vk::SUBPASS_EXTERNAL)
            .chain(0..self.subpass_count() - 1)
            .map(|src| chain_dependency(src, src.wrapping_add(1)))
            .collect()
    }

    /// Attachment slots in index order
    pub fn attachments(&self, swapchain_format: vk::Format) -> Vec<AttachmentInfo> {
        let depth = AttachmentInfo::depth(PEEL_DEPTH_FORMAT, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        vec![
            depth,
            depth,
            AttachmentInfo::color(PEEL_COLOR_FORMAT, [0.0; 4], vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            AttachmentInfo::swapchain(swapchain_format, [0.0, 0.0, 0.0, 1.0]),
        ]
    }

    /// Full render pass description; `views` holds one `[depth_a, depth_b, peel_color, swapchain]` list per image
    pub fn render_pass_info(
        &self,
        swapchain_format: vk::Format,
        views: Vec<[vk::ImageView; ATTACHMENT_COUNT]>,
        extent: vk::Extent2D,
    ) -> RenderPassInfo {
        RenderPassInfo {
            attachments: self.attachments(swapchain_format),
            subpasses: self.subpasses(),
            dependencies: self.dependencies(),
            framebuffers: views
                .into_iter()
                .map(|views| FramebufferInfo {
                    attachments: views.to_vec(),
                    extent,
                    layers: 1,
                })
                .collect(),
        }
    }
}

/// Serializes attachment access between `src` and `dst`, region-local
fn chain_dependency(src: u32, dst: u32) -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: src,
        dst_subpass: dst,
        src_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE
            | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::FRAGMENT_SHADER
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        src_access_mask: vk::AccessFlags::MEMORY_READ
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::INPUT_ATTACHMENT_READ
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dependency_flags: vk::DependencyFlags::BY_REGION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_counts_scale_with_layers() {
        for n in 0..6 {
            let chain = DepthPeelChain::new(n);
            assert_eq!(chain.subpasses().len() as u32, 2 + 2 * n);
            assert_eq!(chain.dependencies().len() as u32, 2 + 2 * n);
            assert_eq!(chain.subpass_count(), 2 + 2 * n);
        }
    }

    #[test]
    fn test_dependencies_form_a_strict_chain() {
        let deps = DepthPeelChain::new(4).dependencies();
        assert_eq!(deps[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(deps[0].dst_subpass, 0);
        for dep in &deps {
            assert_eq!(dep.dst_subpass, dep.src_subpass.wrapping_add(1));
            assert_eq!(dep.dependency_flags, vk::DependencyFlags::BY_REGION);
            assert!(dep.src_stage_mask.contains(vk::PipelineStageFlags::BOTTOM_OF_PIPE));
            assert!(dep.dst_stage_mask.contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        }
        for pair in deps[1..].windows(2) {
            assert_eq!(pair[1].src_subpass, pair[0].src_subpass + 1);
        }
    }

    #[test]
    fn test_depth_ping_pong() {
        let subpasses = DepthPeelChain::new(3).subpasses();

        assert_eq!(subpasses[0].depth_ref.unwrap().attachment, DEPTH_A);
        assert!(subpasses[0].input_refs.is_empty());

        for layer in 1..4 {
            let peel = &subpasses[DepthPeelChain::peel_subpass(layer) as usize];
            let read = peel.input_refs[0].attachment;
            let written = peel.depth_ref.unwrap().attachment;
            assert_ne!(read, written);
            assert_eq!(Some(read), DepthPeelChain::depth_read(layer));
            assert_eq!(written, DepthPeelChain::depth_written(layer));

            // The depth just peeled survives the blend subpass for the next peel.
            let blend = &subpasses[DepthPeelChain::blend_subpass(layer) as usize];
            assert!(blend.preserve.contains(&written));
        }
    }

    #[test]
    fn test_blend_subpasses_write_swapchain_from_peel_color() {
        let chain = DepthPeelChain::new(2);
        let subpasses = chain.subpasses();
        for layer in 0..chain.layer_count() {
            let blend = &subpasses[DepthPeelChain::blend_subpass(layer) as usize];
            assert_eq!(blend.color_refs[0].attachment, SWAPCHAIN);
            assert_eq!(blend.input_refs[0].attachment, PEEL_COLOR);
            assert!(blend.depth_ref.is_none());
        }
    }

    #[test]
    fn test_render_pass_info_validates() {
        let chain = DepthPeelChain::new(2);
        let views = (0..3)
            .map(|i| {
                [
                    vk::ImageView::from_raw(1),
                    vk::ImageView::from_raw(2),
                    vk::ImageView::from_raw(3),
                    vk::ImageView::from_raw(10 + i),
                ]
            })
            .collect();
        let info = chain.render_pass_info(vk::Format::B8G8R8A8_SRGB, views, vk::Extent2D { width: 8, height: 8 });

        assert!(info.validate().is_ok());
        assert_eq!(info.attachments.len(), ATTACHMENT_COUNT);
        assert_eq!(info.framebuffers.len(), 3);
    }
}
