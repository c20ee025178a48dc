//! Alpha-blended translucent entities over an opaque scene
//!
//! One subpass into a depth attachment and the swapchain image. Entities
//! with the `glass` material are drawn after the opaque ones, farthest from
//! the camera first, blending "over" what is already there.

use std::process::ExitCode;

use ash::vk;

use scene_demos::common::{self, DemoApp, DemoResult, DrawConstants, RenderGraph, SceneBindings};
use subpass_engine::foundation::math::Vec3;
use subpass_engine::render::vulkan::pipeline::{blend_alpha_over, create_graphics_pipeline};
use subpass_engine::render::vulkan::render_pass::{color_ref, create_render_pass, dependency, depth_ref};
use subpass_engine::render::vulkan::{
    ActiveRenderPass, AttachmentInfo, FramebufferInfo, GraphicsPipeline, GraphicsPipelineInfo, Image, RenderPass,
    RenderPassInfo, SubpassInfo,
};

const DEPTH: u32 = 0;
const SWAPCHAIN: u32 = 1;

/// Entities using this material are blended
const TRANSLUCENT_MATERIAL: &str = "glass";

fn pass_info(
    depth_format: vk::Format,
    swapchain_format: vk::Format,
    targets: impl IntoIterator<Item = (vk::ImageView, vk::ImageView)>,
    extent: vk::Extent2D,
) -> RenderPassInfo {
    RenderPassInfo {
        attachments: vec![
            AttachmentInfo::depth(depth_format, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            AttachmentInfo::swapchain(swapchain_format, [0.02, 0.02, 0.03, 1.0]),
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
        framebuffers: targets
            .into_iter()
            .map(|(depth, swapchain)| FramebufferInfo {
                attachments: vec![depth, swapchain],
                extent,
                layers: 1,
            })
            .collect(),
    }
}

/// Blending "over" the swapchain; depth still tested and written so nearer
/// glass hides farther glass drawn after it
fn translucent_info(base: GraphicsPipelineInfo) -> GraphicsPipelineInfo {
    GraphicsPipelineInfo {
        depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
        color_blend_attachments: vec![blend_alpha_over()],
        ..base
    }
}

/// Entity indexes split into opaque ones in scene order and translucent ones
/// farthest from `eye` first
///
/// `entities` yields `(material, position)` per entity.
fn draw_order(
    eye: Vec3,
    translucent_material: Option<usize>,
    entities: impl IntoIterator<Item = (usize, Vec3)>,
) -> (Vec<usize>, Vec<usize>) {
    let mut opaque = Vec::new();
    let mut translucent = Vec::new();
    for (index, (material, position)) in entities.into_iter().enumerate() {
        if Some(material) == translucent_material {
            translucent.push((index, (position - eye).norm_squared()));
        } else {
            opaque.push(index);
        }
    }
    translucent.sort_by(|a, b| b.1.total_cmp(&a.1));
    (opaque, translucent.into_iter().map(|(index, _)| index).collect())
}

struct TransparencyGraph {
    opaque_pipeline: GraphicsPipeline,
    translucent_pipeline: GraphicsPipeline,
    bindings: SceneBindings,
    render_pass: RenderPass,
    _depth: Vec<Image>,
}

impl TransparencyGraph {
    fn draw(
        &self,
        app: &DemoApp,
        pass: &mut ActiveRenderPass<'_>,
        pipeline: &GraphicsPipeline,
        image_index: usize,
        indexes: &[usize],
    ) -> DemoResult<()> {
        let layout = pipeline.layout();
        pass.bind_pipeline(pipeline.handle());
        let entities = app.scene.entities();
        for &index in indexes {
            let Some(entity) = entities.get(index) else {
                continue;
            };
            self.bindings.bind_entity(pass, layout, image_index, index, entity, &[])?;
            DrawConstants::new(&app.scene, entity).push(pass, layout);
            app.mesh(entity.mesh)?.draw(pass, 1);
        }
        Ok(())
    }
}

impl RenderGraph for TransparencyGraph {
    const TITLE: &'static str = "Transparency";
    const SCENE: &'static str = "transparency.toml";

    fn build(app: &DemoApp) -> DemoResult<Self> {
        let context = &app.context;
        let device = context.device();
        let extent = context.swapchain_extent();

        let depth = app.create_attachments(context.depth_format(), vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)?;
        let info = pass_info(
            context.depth_format(),
            context.swapchain_format(),
            depth
                .iter()
                .map(Image::view)
                .zip(context.swapchain().image_views().iter().copied()),
            extent,
        );
        let render_pass = create_render_pass(device, context.command_pool(), &info)?;

        let bindings = SceneBindings::new(app, &[])?;
        let (vertex_layout, vertex_inputs) = common::mesh_vertex_layout()?;
        let opaque_info = GraphicsPipelineInfo {
            shader_stages: app.shader_stages(&["forward.vert", "forward.frag"])?,
            descriptor_set_layouts: bindings.scene_layouts(),
            push_constant_ranges: vec![DrawConstants::range()],
            vertex_inputs,
            ..GraphicsPipelineInfo::new(extent)
        };
        let blended_info = translucent_info(GraphicsPipelineInfo {
            shader_stages: app.shader_stages(&["forward.vert", "forward_alpha.frag"])?,
            ..opaque_info.clone()
        });
        let opaque_pipeline = create_graphics_pipeline(device, &render_pass, 0, &opaque_info, &vertex_layout)?;
        let translucent_pipeline = create_graphics_pipeline(device, &render_pass, 0, &blended_info, &vertex_layout)?;

        if app.scene.material_index(TRANSLUCENT_MATERIAL).is_none() {
            log::warn!("Scene has no {TRANSLUCENT_MATERIAL:?} material, every entity is drawn opaque");
        }

        Ok(Self {
            opaque_pipeline,
            translucent_pipeline,
            bindings,
            render_pass,
            _depth: depth,
        })
    }

    fn record(&mut self, app: &DemoApp, image_index: usize) -> DemoResult<Vec<vk::CommandBuffer>> {
        let scene = &app.scene;
        let (opaque, translucent) = draw_order(
            scene.camera.transform.position,
            scene.material_index(TRANSLUCENT_MATERIAL),
            scene
                .entities()
                .iter()
                .map(|entity| (entity.material, entity.transform.position)),
        );

        let mut recorder = self.render_pass.recorder(image_index)?;
        recorder.begin()?;
        {
            let mut pass = self.render_pass.begin(&mut recorder, image_index)?;
            self.draw(app, &mut pass, &self.opaque_pipeline, image_index, &opaque)?;
            self.draw(app, &mut pass, &self.translucent_pipeline, image_index, &translucent)?;
        }
        Ok(vec![recorder.end()?])
    }
}

fn main() -> ExitCode {
    common::run::<TransparencyGraph>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use subpass_engine::config::Config;
    use subpass_engine::scene::SceneConfig;

    #[test]
    fn test_pass_info_attachments() {
        let targets = (1..=3).map(|i| (vk::ImageView::from_raw(i), vk::ImageView::from_raw(10 + i)));
        let extent = vk::Extent2D { width: 640, height: 480 };
        let info = pass_info(vk::Format::D32_SFLOAT, vk::Format::B8G8R8A8_SRGB, targets, extent);
        assert!(info.validate().is_ok());

        let depth = info.attachments[DEPTH as usize].description;
        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        let color = info.attachments[SWAPCHAIN as usize].description;
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        assert_eq!(info.subpasses.len(), 1);
        assert_eq!(info.subpasses[0].color_refs[0].attachment, SWAPCHAIN);
        assert_eq!(info.subpasses[0].depth_ref.map(|r| r.attachment), Some(DEPTH));
        assert_eq!(info.dependencies[0].src_subpass, vk::SUBPASS_EXTERNAL);

        assert_eq!(info.framebuffers.len(), 3);
        assert_eq!(
            info.framebuffers[1].attachments,
            [vk::ImageView::from_raw(2), vk::ImageView::from_raw(12)]
        );
    }

    #[test]
    fn test_translucent_pipeline_blends_over() {
        let info = translucent_info(GraphicsPipelineInfo::new(vk::Extent2D { width: 8, height: 8 }));
        assert_eq!(info.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert!(info.depth_test && info.depth_write);
        assert_eq!(info.cull_mode, vk::CullModeFlags::BACK);

        let [blend] = info.color_blend_attachments[..] else {
            panic!("expected one blend state");
        };
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blend.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(blend.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
    }

    #[test]
    fn test_translucent_drawn_back_to_front_after_opaque() {
        let eye = Vec3::new(0.0, 0.0, -10.0);
        let entities = [
            (0, Vec3::new(0.0, 0.0, 0.0)),
            (1, Vec3::new(0.0, 0.0, -6.0)),
            (1, Vec3::new(0.0, 0.0, 3.0)),
            (0, Vec3::new(5.0, 0.0, 0.0)),
            (1, Vec3::new(0.0, 0.0, -1.5)),
        ];
        let (opaque, translucent) = draw_order(eye, Some(1), entities);
        assert_eq!(opaque, [0, 3]);
        assert_eq!(translucent, [2, 4, 1]);
    }

    #[test]
    fn test_everything_opaque_without_glass() {
        let entities = [(0, Vec3::zeros()), (0, Vec3::x())];
        let (opaque, translucent) = draw_order(Vec3::zeros(), None, entities);
        assert_eq!(opaque, [0, 1]);
        assert!(translucent.is_empty());
    }

    #[test]
    fn test_bundled_scene_has_glass_row() {
        let path = common::resources_dir().join("scenes").join(TransparencyGraph::SCENE);
        let config = SceneConfig::load_from_file(path).unwrap();
        let glass = config
            .materials
            .iter()
            .position(|material| material.name == TRANSLUCENT_MATERIAL);
        assert_eq!(glass, Some(1));

        let cubes: Vec<_> = config
            .entities
            .iter()
            .filter(|entity| entity.material.as_deref() == Some(TRANSLUCENT_MATERIAL))
            .collect();
        assert_eq!(cubes.len(), 4);
        for (i, cube) in cubes.iter().enumerate() {
            assert_eq!(cube.transform.position.z, 1.5 * i as f32);
        }
    }
}
