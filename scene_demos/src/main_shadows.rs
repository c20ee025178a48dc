//! Shadow mapping from the first directional light and the first point light
//!
//! A depth-only render pass fills a shadow map from the directional light's
//! point of view; the main pass samples it with a comparison sampler. The
//! point light renders six faces of linear distance, each copied into one
//! layer of a cube map the main pass samples along the light-to-fragment
//! direction. The two command buffers are submitted together, shadow work first.

use std::process::ExitCode;

use ash::vk;
use bytemuck::{Pod, Zeroable};

use scene_demos::common::{self, DemoApp, DemoError, DemoResult, DrawConstants, RenderGraph, SceneBindings};
use subpass_engine::render::vulkan::commands::CommandRecorder;
use subpass_engine::render::vulkan::descriptors::{
    allocate_descriptor_set, bind_descriptor_sets, DescriptorSet, DescriptorSetInfo, DescriptorSetLayout,
    DescriptorWriter,
};
use subpass_engine::render::vulkan::image::record_layout_transition;
use subpass_engine::render::vulkan::pipeline::create_graphics_pipeline;
use subpass_engine::render::vulkan::render_pass::{color_ref, create_render_pass, dependency, depth_ref};
use subpass_engine::render::vulkan::{
    AttachmentInfo, FramebufferInfo, GraphicsPipeline, GraphicsPipelineInfo, Image, ImageInfo, RenderPass,
    RenderPassInfo, Sampler, SamplerInfo, SubpassInfo,
};
use subpass_engine::scene::{Light, LightMode, Scene};

const SHADOW_MAP_SIZE: u32 = 4096;
const SHADOW_MAP_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

const OMNI_SHADOW_SIZE: u32 = 1024;
const CUBE_FACES: u32 = 6;

const DEPTH: u32 = 0;
const SWAPCHAIN: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ShadowConstants {
    light_index: u32,
}

impl ShadowConstants {
    const fn range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: std::mem::size_of::<Self>() as u32,
        }
    }
}

/// Per-face constants of the point-light pass
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct OmniConstants {
    view_projection: [[f32; 4]; 4],
    light_position: [f32; 3],
    far_clip: f32,
}

impl OmniConstants {
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

    fn faces(light: &Light) -> [Self; 6] {
        light.cube_face_view_projections().map(|view_projection| Self {
            view_projection: view_projection.into(),
            light_position: light.transform.position.into(),
            far_clip: light.shadow_far(),
        })
    }
}

const fn omni_extent() -> vk::Extent2D {
    vk::Extent2D {
        width: OMNI_SHADOW_SIZE,
        height: OMNI_SHADOW_SIZE,
    }
}

const fn shadow_extent() -> vk::Extent2D {
    vk::Extent2D {
        width: SHADOW_MAP_SIZE,
        height: SHADOW_MAP_SIZE,
    }
}

/// Index of the light that casts shadows
fn shadow_light(scene: &Scene) -> Option<usize> {
    scene
        .lights()
        .iter()
        .position(|light| light.mode == LightMode::Directional)
}

/// Index of the light that casts cube shadows
fn omni_light(scene: &Scene) -> Option<usize> {
    scene.lights().iter().position(|light| light.mode == LightMode::Point)
}

/// Cube-compatible six-layer depth image that face renders are copied into
fn omni_cube_info() -> ImageInfo {
    ImageInfo {
        view_type: vk::ImageViewType::CUBE,
        layers: CUBE_FACES,
        ..ImageInfo::attachment(
            SHADOW_MAP_FORMAT,
            omni_extent(),
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )
    }
}

/// Copy of a whole face target into cube layer `face`
fn cube_face_copy(face: u32) -> vk::ImageCopy {
    let layers = |base_array_layer| vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::DEPTH,
        mip_level: 0,
        base_array_layer,
        layer_count: 1,
    };
    vk::ImageCopy {
        src_subresource: layers(0),
        src_offset: vk::Offset3D::default(),
        dst_subresource: layers(face),
        dst_offset: vk::Offset3D::default(),
        extent: vk::Extent3D {
            width: OMNI_SHADOW_SIZE,
            height: OMNI_SHADOW_SIZE,
            depth: 1,
        },
    }
}

/// Depth-only pass over one face target that ends ready to be copied from
fn omni_face_pass_info(face_view: vk::ImageView, image_count: u32) -> RenderPassInfo {
    RenderPassInfo {
        attachments: vec![AttachmentInfo::depth(SHADOW_MAP_FORMAT, vk::ImageLayout::TRANSFER_SRC_OPTIMAL).store()],
        subpasses: vec![SubpassInfo {
            depth_ref: Some(depth_ref(0)),
            ..SubpassInfo::default()
        }],
        dependencies: vec![
            // The previous face's copy must have read the target before it is cleared.
            dependency(
                vk::SUBPASS_EXTERNAL,
                0,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                false,
            ),
            dependency(
                0,
                vk::SUBPASS_EXTERNAL,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                vk::AccessFlags::TRANSFER_READ,
                false,
            ),
        ],
        framebuffers: (0..image_count)
            .map(|_| FramebufferInfo {
                attachments: vec![face_view],
                extent: omni_extent(),
                layers: 1,
            })
            .collect(),
    }
}

/// Depth-only pass over one shared shadow map, one framebuffer per swapchain image
fn shadow_pass_info(shadow_view: vk::ImageView, image_count: u32) -> RenderPassInfo {
    RenderPassInfo {
        attachments: vec![AttachmentInfo::depth(SHADOW_MAP_FORMAT, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL).store()],
        subpasses: vec![SubpassInfo {
            depth_ref: Some(depth_ref(0)),
            ..SubpassInfo::default()
        }],
        dependencies: vec![
            // The previous frame's main pass must be done sampling before the map is cleared.
            dependency(
                vk::SUBPASS_EXTERNAL,
                0,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::AccessFlags::SHADER_READ,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                true,
            ),
            dependency(
                0,
                vk::SUBPASS_EXTERNAL,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                vk::AccessFlags::SHADER_READ,
                true,
            ),
        ],
        framebuffers: (0..image_count)
            .map(|_| FramebufferInfo {
                attachments: vec![shadow_view],
                extent: shadow_extent(),
                layers: 1,
            })
            .collect(),
    }
}

struct ShadowsGraph {
    shadow_pipeline: GraphicsPipeline,
    omni_pipeline: GraphicsPipeline,
    main_pipeline: GraphicsPipeline,
    shadow_set: DescriptorSet,
    _shadow_layout: DescriptorSetLayout,
    bindings: SceneBindings,
    shadow_pass: RenderPass,
    omni_pass: RenderPass,
    main_pass: RenderPass,
    _shadow_sampler: Sampler,
    _omni_sampler: Sampler,
    _shadow_map: Image,
    omni_cube: Image,
    omni_target: Image,
    _depth: Vec<Image>,
    light_index: u32,
    omni_index: Option<usize>,
}

impl ShadowsGraph {
    /// Render each cube face from `light` and copy it into its cube layer
    fn record_cube_faces(
        &self,
        app: &DemoApp,
        recorder: &mut CommandRecorder,
        image_index: usize,
        light: &Light,
    ) -> DemoResult<()> {
        record_layout_transition(
            recorder,
            &self.omni_cube,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        let layout = self.omni_pipeline.layout();
        for (face, constants) in (0..CUBE_FACES).zip(OmniConstants::faces(light)) {
            {
                let mut pass = self.omni_pass.begin(recorder, image_index)?;
                pass.bind_pipeline(self.omni_pipeline.handle());
                pass.push_constants(layout, OmniConstants::STAGES, 0, bytemuck::bytes_of(&constants));
                for (index, entity) in app.scene.entities().iter().enumerate() {
                    bind_descriptor_sets(&mut pass, layout, &[&self.bindings.entity_set], image_index, index as u32)?;
                    app.mesh(entity.mesh)?.draw(&mut pass, 1);
                }
            }
            recorder.copy_image(
                self.omni_target.handle(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.omni_cube.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[cube_face_copy(face)],
            );
        }

        record_layout_transition(
            recorder,
            &self.omni_cube,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        Ok(())
    }
}

impl RenderGraph for ShadowsGraph {
    const TITLE: &'static str = "Shadows";
    const SCENE: &'static str = "shadows.toml";

    fn build(app: &DemoApp) -> DemoResult<Self> {
        let light_index = shadow_light(&app.scene)
            .ok_or_else(|| DemoError::Missing("directional light to cast shadows".to_string()))?;

        let context = &app.context;
        let device = context.device();
        let extent = context.swapchain_extent();
        let image_count = app.image_count();

        let shadow_map = context.create_image(ImageInfo::attachment(
            SHADOW_MAP_FORMAT,
            shadow_extent(),
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        ))?;
        let shadow_sampler = Sampler::new(device.clone(), SamplerInfo::shadow_map())?;
        let shadow_pass = create_render_pass(
            device,
            context.command_pool(),
            &shadow_pass_info(shadow_map.view(), image_count),
        )?;

        let omni_index = omni_light(&app.scene);
        let omni_cube = context.create_image(omni_cube_info())?;
        let omni_target = context.create_image(ImageInfo::attachment(
            SHADOW_MAP_FORMAT,
            omni_extent(),
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
        ))?;
        let omni_sampler = Sampler::new(device.clone(), SamplerInfo::cube_depth())?;
        let omni_pass = create_render_pass(
            device,
            context.command_pool(),
            &omni_face_pass_info(omni_target.view(), image_count),
        )?;

        // Each frame expects the cube readable by shaders, even when no point light renders into it.
        let mut recorder = context.command_pool().begin_single_time()?;
        record_layout_transition(
            &mut recorder,
            &omni_cube,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        context
            .command_pool()
            .submit_single_time(recorder, context.graphics_queue())?;

        let depth = app.create_attachments(context.depth_format(), vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)?;
        let main_info = RenderPassInfo {
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
        let main_pass = create_render_pass(device, context.command_pool(), &main_info)?;

        let shadow_set_info = DescriptorSetInfo::new(1)
            .combined_image_sampler(vk::ShaderStageFlags::FRAGMENT)
            .combined_image_sampler(vk::ShaderStageFlags::FRAGMENT);
        let bindings = SceneBindings::new(app, &[shadow_set_info.clone()])?;
        let shadow_layout = DescriptorSetLayout::new(device, &shadow_set_info)?;
        let shadow_set = allocate_descriptor_set(&bindings.pool, &shadow_layout, 1)?;
        DescriptorWriter::new()
            .combined_image_sampler(shadow_set.instance_for(0)?, 0, shadow_map.view(), shadow_sampler.handle())
            .combined_image_sampler(shadow_set.instance_for(0)?, 1, omni_cube.view(), omni_sampler.handle())
            .update(device);

        let (vertex_layout, vertex_inputs) = common::mesh_vertex_layout()?;

        let shadow_info = GraphicsPipelineInfo {
            shader_stages: app.shader_stages(&["shadow.vert", "shadow.frag"])?,
            descriptor_set_layouts: vec![bindings.model_layout.handle(), bindings.lights_layout.handle()],
            push_constant_ranges: vec![ShadowConstants::range()],
            vertex_inputs: vertex_inputs.clone(),
            cull_mode: vk::CullModeFlags::NONE,
            color_blend_attachments: Vec::new(),
            ..GraphicsPipelineInfo::new(shadow_extent())
        };
        let shadow_pipeline = create_graphics_pipeline(device, &shadow_pass, 0, &shadow_info, &vertex_layout)?;

        // Faces are rendered without the Y flip, which reverses their winding.
        let omni_info = GraphicsPipelineInfo {
            shader_stages: app.shader_stages(&["shadow_omni.vert", "shadow_omni.frag"])?,
            descriptor_set_layouts: vec![bindings.model_layout.handle()],
            push_constant_ranges: vec![OmniConstants::range()],
            vertex_inputs: vertex_inputs.clone(),
            cull_mode: vk::CullModeFlags::NONE,
            color_blend_attachments: Vec::new(),
            ..GraphicsPipelineInfo::new(omni_extent())
        };
        let omni_pipeline = create_graphics_pipeline(device, &omni_pass, 0, &omni_info, &vertex_layout)?;

        let mut main_layouts = bindings.scene_layouts();
        main_layouts.push(shadow_layout.handle());
        let main_pipeline_info = GraphicsPipelineInfo {
            shader_stages: app.shader_stages(&["forward.vert", "forward_shadow.frag"])?,
            descriptor_set_layouts: main_layouts,
            push_constant_ranges: vec![DrawConstants::range()],
            vertex_inputs,
            ..GraphicsPipelineInfo::new(extent)
        };
        let main_pipeline = create_graphics_pipeline(device, &main_pass, 0, &main_pipeline_info, &vertex_layout)?;

        log::info!("Light {light_index} casts shadows into a {SHADOW_MAP_SIZE}x{SHADOW_MAP_SIZE} map");
        match omni_index {
            Some(index) => log::info!("Light {index} casts cube shadows, {OMNI_SHADOW_SIZE}x{OMNI_SHADOW_SIZE} per face"),
            None => log::info!("No point light, cube shadows are skipped"),
        }
        Ok(Self {
            shadow_pipeline,
            omni_pipeline,
            main_pipeline,
            shadow_set,
            _shadow_layout: shadow_layout,
            bindings,
            shadow_pass,
            omni_pass,
            main_pass,
            _shadow_sampler: shadow_sampler,
            _omni_sampler: omni_sampler,
            _shadow_map: shadow_map,
            omni_cube,
            omni_target,
            _depth: depth,
            light_index: light_index as u32,
            omni_index,
        })
    }

    fn record(&mut self, app: &DemoApp, image_index: usize) -> DemoResult<Vec<vk::CommandBuffer>> {
        let mut shadow_recorder = self.shadow_pass.recorder(image_index)?;
        shadow_recorder.begin()?;
        {
            let mut pass = self.shadow_pass.begin(&mut shadow_recorder, image_index)?;
            let layout = self.shadow_pipeline.layout();
            pass.bind_pipeline(self.shadow_pipeline.handle());
            let constants = ShadowConstants {
                light_index: self.light_index,
            };
            pass.push_constants(layout, vk::ShaderStageFlags::VERTEX, 0, bytemuck::bytes_of(&constants));
            for (index, entity) in app.scene.entities().iter().enumerate() {
                bind_descriptor_sets(
                    &mut pass,
                    layout,
                    &[&self.bindings.entity_set, &self.bindings.lights_set],
                    image_index,
                    index as u32,
                )?;
                app.mesh(entity.mesh)?.draw(&mut pass, 1);
            }
        }
        if let Some(light) = self.omni_index.and_then(|index| app.scene.lights().get(index)) {
            self.record_cube_faces(app, &mut shadow_recorder, image_index, light)?;
        }
        let shadow_commands = shadow_recorder.end()?;

        let mut main_recorder = self.main_pass.recorder(image_index)?;
        main_recorder.begin()?;
        {
            let mut pass = self.main_pass.begin(&mut main_recorder, image_index)?;
            let layout = self.main_pipeline.layout();
            self.bindings.draw_entities(
                app,
                &mut pass,
                &self.main_pipeline,
                image_index,
                &[&self.shadow_set],
                |pass, entity| {
                    DrawConstants::new(&app.scene, entity).push(pass, layout);
                },
            )?;
        }
        Ok(vec![shadow_commands, main_recorder.end()?])
    }
}

fn main() -> ExitCode {
    common::run::<ShadowsGraph>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_shadow_pass_info() {
        let info = shadow_pass_info(vk::ImageView::from_raw(7), 3);
        assert!(info.validate().is_ok());
        assert_eq!(info.framebuffers.len(), 3);
        assert!(info.framebuffers.iter().all(|fb| fb.attachments == [vk::ImageView::from_raw(7)]));
        assert!(info.subpasses[0].color_refs.is_empty());

        let depth = info.attachments[0].description;
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(depth.final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_shadow_pass_dependencies() {
        let info = shadow_pass_info(vk::ImageView::from_raw(1), 1);
        let [incoming, outgoing] = info.dependencies[..] else {
            panic!("expected two dependencies");
        };
        assert_eq!(incoming.src_subpass, vk::SUBPASS_EXTERNAL);
        assert!(incoming.dst_stage_mask.contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert_eq!(outgoing.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert!(outgoing.src_stage_mask.contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert!(outgoing.dst_stage_mask.contains(vk::PipelineStageFlags::TOP_OF_PIPE));
        assert_eq!(outgoing.dst_access_mask, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_shadow_light_is_first_directional() {
        let mut scene = Scene::default();
        scene.push_light(Light::default()).unwrap();
        assert_eq!(shadow_light(&scene), None);

        for _ in 0..2 {
            scene
                .push_light(Light {
                    mode: LightMode::Directional,
                    ..Light::default()
                })
                .unwrap();
        }
        assert_eq!(shadow_light(&scene), Some(1));
    }

    #[test]
    fn test_shadow_constants_are_vertex_only() {
        assert_eq!(ShadowConstants::range().size, 4);
        assert_eq!(ShadowConstants::range().stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_omni_light_is_first_point() {
        let mut scene = Scene::default();
        let directional = Light {
            mode: LightMode::Directional,
            ..Light::default()
        };
        scene.push_light(directional).unwrap();
        assert_eq!(omni_light(&scene), None);

        scene.push_light(Light::default()).unwrap();
        scene.push_light(Light::default()).unwrap();
        assert_eq!(omni_light(&scene), Some(1));
    }

    #[test]
    fn test_omni_cube_info() {
        let info = omni_cube_info();
        assert_eq!(info.view_type, vk::ImageViewType::CUBE);
        assert_eq!(info.layers, 6);
        assert_eq!(info.format, vk::Format::D32_SFLOAT);
        assert_eq!(info.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!(info.usage, vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED);
        assert_eq!(info.extent, omni_extent());
    }

    #[test]
    fn test_cube_face_copy_targets_one_layer() {
        for face in 0..CUBE_FACES {
            let copy = cube_face_copy(face);
            assert_eq!(copy.src_subresource.base_array_layer, 0);
            assert_eq!(copy.dst_subresource.base_array_layer, face);
            assert_eq!(copy.dst_subresource.layer_count, 1);
            assert_eq!(copy.dst_subresource.aspect_mask, vk::ImageAspectFlags::DEPTH);
            assert_eq!(copy.extent.width, OMNI_SHADOW_SIZE);
            assert_eq!(copy.extent.depth, 1);
        }
    }

    #[test]
    fn test_omni_face_pass_ends_ready_for_copy() {
        let info = omni_face_pass_info(vk::ImageView::from_raw(9), 2);
        assert!(info.validate().is_ok());
        assert_eq!(info.framebuffers.len(), 2);
        assert_eq!(info.framebuffers[0].extent, omni_extent());

        let depth = info.attachments[0].description;
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(depth.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(depth.final_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

        let [incoming, outgoing] = info.dependencies[..] else {
            panic!("expected two dependencies");
        };
        assert_eq!(incoming.src_stage_mask, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(outgoing.dst_stage_mask, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(outgoing.dst_access_mask, vk::AccessFlags::TRANSFER_READ);
    }

    #[test]
    fn test_omni_constants_per_face() {
        assert_eq!(OmniConstants::range().size, 80);
        assert!(OmniConstants::STAGES.contains(vk::ShaderStageFlags::FRAGMENT));

        let light = Light {
            far_clip: 12.0,
            ..Light::default()
        };
        let faces = OmniConstants::faces(&light);
        let expected = light.cube_face_view_projections();
        for (constants, view_projection) in faces.iter().zip(expected) {
            assert_eq!(constants.view_projection, <[[f32; 4]; 4]>::from(view_projection));
            assert_eq!(constants.far_clip, 12.0);
        }
    }
}
