//! Stencil outlines
//!
//! Entities are drawn lit while writing 1 into the stencil buffer, then
//! redrawn slightly enlarged in a flat color wherever the stencil is not 1.

use std::process::ExitCode;

use ash::vk;
use bytemuck::{Pod, Zeroable};

use scene_demos::common::{self, DemoApp, DemoResult, DrawConstants, RenderGraph, SceneBindings};
use subpass_engine::render::vulkan::descriptors::bind_descriptor_sets;
use subpass_engine::render::vulkan::image::aspect_for_format;
use subpass_engine::render::vulkan::pipeline::{create_graphics_pipeline, stencil_not_equal, stencil_write};
use subpass_engine::render::vulkan::render_pass::{color_ref, create_render_pass, dependency, depth_ref};
use subpass_engine::render::vulkan::{
    ActiveRenderPass, AttachmentInfo, FramebufferInfo, GraphicsPipeline, GraphicsPipelineInfo, Image, RenderPass,
    RenderPassInfo, SubpassInfo,
};

const DEPTH_STENCIL: u32 = 0;
const SWAPCHAIN: u32 = 1;

const STENCIL_REFERENCE: u32 = 1;
const OUTLINE_SCALE: f32 = 1.05;
const OUTLINE_COLOR: [f32; 4] = [1.0, 0.6, 0.1, 1.0];

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct OutlineConstants {
    color: [f32; 4],
    scale: f32,
}

impl OutlineConstants {
    const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
        vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
    );

    const fn range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: Self::STAGES,
            offset: 0,
            size: std::mem::size_of::<Self>() as u32,
        }
    }

    fn push(&self, pass: &mut ActiveRenderPass<'_>, layout: vk::PipelineLayout) {
        pass.push_constants(layout, Self::STAGES, 0, bytemuck::bytes_of(self));
    }
}

struct StencilGraph {
    lit: GraphicsPipeline,
    outline: GraphicsPipeline,
    bindings: SceneBindings,
    render_pass: RenderPass,
    _depth_stencil: Vec<Image>,
}

impl RenderGraph for StencilGraph {
    const TITLE: &'static str = "Stencil";
    const SCENE: &'static str = "stencil.toml";

    fn build(app: &DemoApp) -> DemoResult<Self> {
        let context = &app.context;
        let extent = context.swapchain_extent();
        let format = context.depth_format();
        if !aspect_for_format(format).contains(vk::ImageAspectFlags::STENCIL) {
            log::warn!("Depth format {format:?} has no stencil aspect, outlines will cover entities");
        }

        let depth_stencil = app.create_attachments(format, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)?;

        let info = RenderPassInfo {
            attachments: vec![
                AttachmentInfo::depth(format, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
                AttachmentInfo::swapchain(context.swapchain_format(), [0.02, 0.02, 0.03, 1.0]),
            ],
            subpasses: vec![SubpassInfo {
                color_refs: vec![color_ref(SWAPCHAIN)],
                depth_ref: Some(depth_ref(DEPTH_STENCIL)),
                ..SubpassInfo::default()
            }],
            dependencies: vec![dependency(
                vk::SUBPASS_EXTERNAL,
                0,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::AccessFlags::empty(),
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                false,
            )],
            framebuffers: depth_stencil
                .iter()
                .zip(context.swapchain().image_views())
                .map(|(depth, &swapchain)| FramebufferInfo {
                    attachments: vec![depth.view(), swapchain],
                    extent,
                    layers: 1,
                })
                .collect(),
        };
        let render_pass = create_render_pass(context.device(), context.command_pool(), &info)?;

        let bindings = SceneBindings::new(app, &[])?;
        let (vertex_layout, vertex_inputs) = common::mesh_vertex_layout()?;

        let lit_info = GraphicsPipelineInfo {
            shader_stages: app.shader_stages(&["forward.vert", "forward.frag"])?,
            descriptor_set_layouts: bindings.scene_layouts(),
            push_constant_ranges: vec![DrawConstants::range()],
            vertex_inputs: vertex_inputs.clone(),
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            stencil_front: Some(stencil_write(STENCIL_REFERENCE)),
            ..GraphicsPipelineInfo::new(extent)
        };
        let lit = create_graphics_pipeline(context.device(), &render_pass, 0, &lit_info, &vertex_layout)?;

        let outline_info = GraphicsPipelineInfo {
            shader_stages: app.shader_stages(&["outline.vert", "outline.frag"])?,
            descriptor_set_layouts: vec![bindings.model_layout.handle()],
            push_constant_ranges: vec![OutlineConstants::range()],
            vertex_inputs,
            cull_mode: vk::CullModeFlags::NONE,
            depth_test: false,
            depth_write: false,
            stencil_front: Some(stencil_not_equal(STENCIL_REFERENCE)),
            ..GraphicsPipelineInfo::new(extent)
        };
        let outline = create_graphics_pipeline(context.device(), &render_pass, 0, &outline_info, &vertex_layout)?;

        Ok(Self {
            lit,
            outline,
            bindings,
            render_pass,
            _depth_stencil: depth_stencil,
        })
    }

    fn record(&mut self, app: &DemoApp, image_index: usize) -> DemoResult<Vec<vk::CommandBuffer>> {
        let lit_layout = self.lit.layout();
        let outline_layout = self.outline.layout();
        let outline = OutlineConstants {
            color: OUTLINE_COLOR,
            scale: OUTLINE_SCALE,
        };

        let mut recorder = self.render_pass.recorder(image_index)?;
        recorder.begin()?;
        {
            let mut pass = self.render_pass.begin(&mut recorder, image_index)?;
            self.bindings
                .draw_entities(app, &mut pass, &self.lit, image_index, &[], |pass, entity| {
                    DrawConstants::new(&app.scene, entity).push(pass, lit_layout);
                })?;

            // Outlines go on top of every entity, so they are drawn after all of them.
            pass.bind_pipeline(self.outline.handle());
            outline.push(&mut pass, outline_layout);
            for (index, entity) in app.scene.entities().iter().enumerate() {
                bind_descriptor_sets(&mut pass, outline_layout, &[&self.bindings.entity_set], image_index, index as u32)?;
                app.mesh(entity.mesh)?.draw(&mut pass, 1);
            }
        }
        Ok(vec![recorder.end()?])
    }
}

fn main() -> ExitCode {
    common::run::<StencilGraph>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline_constants_match_shader_block() {
        // vec4 color followed by float scale
        assert_eq!(std::mem::size_of::<OutlineConstants>(), 20);
        assert_eq!(OutlineConstants::range().size, 20);
        assert!(OutlineConstants::STAGES.contains(vk::ShaderStageFlags::VERTEX));
    }

    #[test]
    fn test_outline_is_enlarged() {
        assert!(OUTLINE_SCALE > 1.0);
    }
}
