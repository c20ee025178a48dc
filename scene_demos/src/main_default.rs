//! Forward-lit textured scene
//!
//! One subpass drawing into a depth attachment and the swapchain image.

use std::process::ExitCode;

use ash::vk;

use scene_demos::common::{self, DemoApp, DemoResult, DrawConstants, RenderGraph, SceneBindings};
use subpass_engine::render::vulkan::pipeline::create_graphics_pipeline;
use subpass_engine::render::vulkan::render_pass::{color_ref, create_render_pass, dependency, depth_ref};
use subpass_engine::render::vulkan::{
    AttachmentInfo, FramebufferInfo, GraphicsPipeline, GraphicsPipelineInfo, Image, RenderPass, RenderPassInfo,
    SubpassInfo,
};

const DEPTH: u32 = 0;
const SWAPCHAIN: u32 = 1;

struct DefaultGraph {
    pipeline: GraphicsPipeline,
    bindings: SceneBindings,
    render_pass: RenderPass,
    _depth: Vec<Image>,
}

impl RenderGraph for DefaultGraph {
    const TITLE: &'static str = "Default";
    const SCENE: &'static str = "default.toml";

    fn build(app: &DemoApp) -> DemoResult<Self> {
        let context = &app.context;
        let extent = context.swapchain_extent();

        let depth = app.create_attachments(context.depth_format(), vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)?;

        let info = RenderPassInfo {
            attachments: vec![
                AttachmentInfo::depth(context.depth_format(), vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
                AttachmentInfo::swapchain(context.swapchain_format(), [0.02, 0.02, 0.03, 1.0]),
            ],
            subpasses: vec![SubpassInfo {
                color_refs: vec![color_ref(SWAPCHAIN)],
                depth_ref: Some(depth_ref(DEPTH)),
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
            framebuffers: depth
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
        let pipeline_info = GraphicsPipelineInfo {
            shader_stages: app.shader_stages(&["forward.vert", "forward.frag"])?,
            descriptor_set_layouts: bindings.scene_layouts(),
            push_constant_ranges: vec![DrawConstants::range()],
            vertex_inputs,
            ..GraphicsPipelineInfo::new(extent)
        };
        let pipeline = create_graphics_pipeline(context.device(), &render_pass, 0, &pipeline_info, &vertex_layout)?;

        Ok(Self {
            pipeline,
            bindings,
            render_pass,
            _depth: depth,
        })
    }

    fn record(&mut self, app: &DemoApp, image_index: usize) -> DemoResult<Vec<vk::CommandBuffer>> {
        let layout = self.pipeline.layout();
        let mut recorder = self.render_pass.recorder(image_index)?;
        recorder.begin()?;
        {
            let mut pass = self.render_pass.begin(&mut recorder, image_index)?;
            self.bindings
                .draw_entities(app, &mut pass, &self.pipeline, image_index, &[], |pass, entity| {
                    DrawConstants::new(&app.scene, entity).push(pass, layout);
                })?;
        }
        Ok(vec![recorder.end()?])
    }
}

fn main() -> ExitCode {
    common::run::<DefaultGraph>()
}
