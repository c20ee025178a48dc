//! Deferred lighting in one render pass
//!
//! Subpass 0 fills the G-buffer, subpass 1 shades a full-screen triangle
//! from it through input attachments, and subpass 2 draws a small cube at
//! every light using the depth left by the G-buffer pass. Keys 1-4 switch
//! between the composite and the raw albedo, position and normal buffers.

use std::process::ExitCode;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glfw::Key;

use scene_demos::common::{self, DemoApp, DemoResult, RenderGraph, SceneBindings};
use subpass_engine::assets::{Handle, Mesh};
use subpass_engine::render::vulkan::descriptors::{
    allocate_descriptor_set, bind_descriptor_sets, DescriptorSet, DescriptorSetInfo, DescriptorSetLayout,
    DescriptorWriter,
};
use subpass_engine::render::vulkan::pipeline::{blend_disabled, create_graphics_pipeline};
use subpass_engine::render::vulkan::render_pass::{color_ref, create_render_pass, dependency, depth_ref, input_ref};
use subpass_engine::render::vulkan::{
    ActiveRenderPass, AttachmentInfo, FramebufferInfo, GraphicsPipeline, GraphicsPipelineInfo, Image, InputState,
    RenderPass, RenderPassInfo, SubpassInfo, VertexLayout,
};
use subpass_engine::scene::Scene;

const ALBEDO: u32 = 0;
const POSITION: u32 = 1;
const NORMAL: u32 = 2;
const DEPTH: u32 = 3;
const SWAPCHAIN: u32 = 4;
const MATERIAL: u32 = 5;

/// G-buffer attachments in input attachment order
const GBUFFER: [u32; 4] = [ALBEDO, POSITION, NORMAL, MATERIAL];

const GBUFFER_SUBPASS: u32 = 0;
const LIGHTING_SUBPASS: u32 = 1;
const GIZMO_SUBPASS: u32 = 2;

const ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const VECTOR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
const MATERIAL_FORMAT: vk::Format = vk::Format::R8_UINT;

/// What the lighting subpass writes to the screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(i32)]
enum ViewMode {
    #[default]
    Composite = 0,
    Albedo = 1,
    Position = 2,
    Normal = 3,
}

impl ViewMode {
    const KEYS: [(Key, Self); 4] = [
        (Key::Num1, Self::Composite),
        (Key::Num2, Self::Albedo),
        (Key::Num3, Self::Position),
        (Key::Num4, Self::Normal),
    ];

    fn from_input(input: &InputState) -> Option<Self> {
        Self::KEYS
            .iter()
            .find(|(key, _)| input.key_down(*key))
            .map(|&(_, mode)| mode)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GBufferConstants {
    material_index: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LightingConstants {
    view_position: [f32; 3],
    mode: i32,
    light_count: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GizmoConstants {
    light_index: u32,
}

fn fragment_range<T>() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::FRAGMENT,
        offset: 0,
        size: std::mem::size_of::<T>() as u32,
    }
}

fn push_fragment<T: Pod>(pass: &mut ActiveRenderPass<'_>, layout: vk::PipelineLayout, constants: &T) {
    pass.push_constants(layout, vk::ShaderStageFlags::FRAGMENT, 0, bytemuck::bytes_of(constants));
}

/// Four input attachments read by the lighting subpass
fn gbuffer_set_info(image_count: u32) -> DescriptorSetInfo {
    GBUFFER
        .iter()
        .fold(DescriptorSetInfo::new(image_count), |info, _| info.input_attachment())
}

fn render_pass_info(
    swapchain_format: vk::Format,
    depth_format: vk::Format,
    framebuffers: Vec<FramebufferInfo>,
) -> RenderPassInfo {
    let gbuffer = |format| AttachmentInfo::color(format, [0.0; 4], vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    let read = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;

    RenderPassInfo {
        attachments: vec![
            gbuffer(ALBEDO_FORMAT),
            gbuffer(VECTOR_FORMAT),
            gbuffer(VECTOR_FORMAT),
            AttachmentInfo::depth(depth_format, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            AttachmentInfo::swapchain(swapchain_format, [0.0, 0.0, 0.0, 1.0]),
            gbuffer(MATERIAL_FORMAT),
        ],
        subpasses: vec![
            SubpassInfo {
                color_refs: GBUFFER.iter().map(|&a| color_ref(a)).collect(),
                depth_ref: Some(depth_ref(DEPTH)),
                input_refs: Vec::new(),
                preserve: vec![SWAPCHAIN],
            },
            SubpassInfo {
                color_refs: vec![color_ref(SWAPCHAIN)],
                depth_ref: None,
                input_refs: GBUFFER.iter().map(|&a| input_ref(a, read)).collect(),
                preserve: vec![DEPTH],
            },
            SubpassInfo {
                color_refs: vec![color_ref(SWAPCHAIN)],
                depth_ref: Some(depth_ref(DEPTH)),
                ..SubpassInfo::default()
            },
        ],
        dependencies: vec![
            dependency(
                vk::SUBPASS_EXTERNAL,
                GBUFFER_SUBPASS,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::AccessFlags::empty(),
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                false,
            ),
            dependency(
                GBUFFER_SUBPASS,
                LIGHTING_SUBPASS,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::AccessFlags::INPUT_ATTACHMENT_READ,
                true,
            ),
            dependency(
                LIGHTING_SUBPASS,
                GIZMO_SUBPASS,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                true,
            ),
            dependency(
                GBUFFER_SUBPASS,
                GIZMO_SUBPASS,
                vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                true,
            ),
        ],
        framebuffers,
    }
}

/// Per-image attachment images
struct GBufferImages {
    albedo: Image,
    position: Image,
    normal: Image,
    depth: Image,
    material: Image,
}

impl GBufferImages {
    fn create_all(app: &DemoApp) -> DemoResult<Vec<Self>> {
        let gbuffer_usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT;
        let albedo = app.create_attachments(ALBEDO_FORMAT, gbuffer_usage)?;
        let position = app.create_attachments(VECTOR_FORMAT, gbuffer_usage)?;
        let normal = app.create_attachments(VECTOR_FORMAT, gbuffer_usage)?;
        let depth = app.create_attachments(
            app.context.depth_format(),
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;
        let material = app.create_attachments(MATERIAL_FORMAT, gbuffer_usage)?;

        Ok(albedo
            .into_iter()
            .zip(position)
            .zip(normal)
            .zip(depth)
            .zip(material)
            .map(|((((albedo, position), normal), depth), material)| Self {
                albedo,
                position,
                normal,
                depth,
                material,
            })
            .collect())
    }

    /// Views in attachment index order
    fn views(&self, swapchain: vk::ImageView) -> Vec<vk::ImageView> {
        vec![
            self.albedo.view(),
            self.position.view(),
            self.normal.view(),
            self.depth.view(),
            swapchain,
            self.material.view(),
        ]
    }

    /// Views in input attachment order
    fn input_views(&self) -> [vk::ImageView; 4] {
        [
            self.albedo.view(),
            self.position.view(),
            self.normal.view(),
            self.material.view(),
        ]
    }
}

struct LightingGraph {
    gbuffer: GraphicsPipeline,
    lighting: GraphicsPipeline,
    gizmo: GraphicsPipeline,
    gbuffer_set: DescriptorSet,
    _gbuffer_layout: DescriptorSetLayout,
    bindings: SceneBindings,
    render_pass: RenderPass,
    _images: Vec<GBufferImages>,
    gizmo_mesh: Handle<Mesh>,
    mode: ViewMode,
}

impl RenderGraph for LightingGraph {
    const TITLE: &'static str = "Deferred lighting";
    const SCENE: &'static str = "lighting.toml";

    fn build(app: &DemoApp) -> DemoResult<Self> {
        let context = &app.context;
        let device = context.device();
        let extent = context.swapchain_extent();
        let image_count = app.image_count();

        let images = GBufferImages::create_all(app)?;
        let framebuffers = images
            .iter()
            .zip(context.swapchain().image_views())
            .map(|(images, &swapchain)| FramebufferInfo {
                attachments: images.views(swapchain),
                extent,
                layers: 1,
            })
            .collect();
        let info = render_pass_info(context.swapchain_format(), context.depth_format(), framebuffers);
        let render_pass = create_render_pass(device, context.command_pool(), &info)?;

        let bindings = SceneBindings::new(app, &[gbuffer_set_info(image_count)])?;
        let gbuffer_layout = DescriptorSetLayout::new(device, &gbuffer_set_info(image_count))?;
        let gbuffer_set = allocate_descriptor_set(&bindings.pool, &gbuffer_layout, image_count)?;

        let mut writer = DescriptorWriter::new();
        for (image, images) in images.iter().enumerate() {
            let set = gbuffer_set.instance_for(image)?;
            for (binding, view) in images.input_views().into_iter().enumerate() {
                writer = writer.input_attachment(set, binding as u32, view, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
            }
        }
        writer.update(device);

        let (vertex_layout, vertex_inputs) = common::mesh_vertex_layout()?;

        let gbuffer_info = GraphicsPipelineInfo {
            shader_stages: app.shader_stages(&["forward.vert", "gbuffer.frag"])?,
            descriptor_set_layouts: bindings.scene_layouts(),
            push_constant_ranges: vec![fragment_range::<GBufferConstants>()],
            vertex_inputs: vertex_inputs.clone(),
            color_blend_attachments: vec![blend_disabled(); GBUFFER.len()],
            ..GraphicsPipelineInfo::new(extent)
        };
        let gbuffer = create_graphics_pipeline(device, &render_pass, GBUFFER_SUBPASS, &gbuffer_info, &vertex_layout)?;

        let lighting_info = GraphicsPipelineInfo {
            shader_stages: app.shader_stages(&["fullscreen.vert", "deferred_lighting.frag"])?,
            descriptor_set_layouts: vec![gbuffer_layout.handle(), bindings.lights_layout.handle()],
            push_constant_ranges: vec![fragment_range::<LightingConstants>()],
            cull_mode: vk::CullModeFlags::NONE,
            depth_test: false,
            depth_write: false,
            ..GraphicsPipelineInfo::new(extent)
        };
        let lighting = create_graphics_pipeline(
            device,
            &render_pass,
            LIGHTING_SUBPASS,
            &lighting_info,
            &VertexLayout::new(),
        )?;

        let gizmo_info = GraphicsPipelineInfo {
            shader_stages: app.shader_stages(&["gizmo.vert", "gizmo.frag"])?,
            descriptor_set_layouts: vec![bindings.model_layout.handle(), bindings.lights_layout.handle()],
            push_constant_ranges: vec![fragment_range::<GizmoConstants>()],
            vertex_inputs,
            ..GraphicsPipelineInfo::new(extent)
        };
        let gizmo = create_graphics_pipeline(device, &render_pass, GIZMO_SUBPASS, &gizmo_info, &vertex_layout)?;

        Ok(Self {
            gbuffer,
            lighting,
            gizmo,
            gbuffer_set,
            _gbuffer_layout: gbuffer_layout,
            bindings,
            render_pass,
            _images: images,
            gizmo_mesh: app.assets.meshes.handle("cube")?,
            mode: ViewMode::default(),
        })
    }

    fn update(&mut self, input: &InputState, _scene: &mut Scene) {
        if let Some(mode) = ViewMode::from_input(input) {
            if mode != self.mode {
                log::info!("View mode {mode:?}");
                self.mode = mode;
            }
        }
    }

    fn record(&mut self, app: &DemoApp, image_index: usize) -> DemoResult<Vec<vk::CommandBuffer>> {
        let scene = &app.scene;
        let mut recorder = self.render_pass.recorder(image_index)?;
        recorder.begin()?;
        {
            let mut pass = self.render_pass.begin(&mut recorder, image_index)?;

            let gbuffer_layout = self.gbuffer.layout();
            self.bindings
                .draw_entities(app, &mut pass, &self.gbuffer, image_index, &[], |pass, entity| {
                    let constants = GBufferConstants {
                        material_index: entity.material as u32,
                    };
                    push_fragment(pass, gbuffer_layout, &constants);
                })?;

            pass.next_subpass();
            pass.bind_pipeline(self.lighting.handle());
            bind_descriptor_sets(
                &mut pass,
                self.lighting.layout(),
                &[&self.gbuffer_set, &self.bindings.lights_set],
                image_index,
                0,
            )?;
            let constants = LightingConstants {
                view_position: scene.camera.transform.position.into(),
                mode: self.mode as i32,
                light_count: scene.lights().len() as u32,
            };
            push_fragment(&mut pass, self.lighting.layout(), &constants);
            pass.draw(3, 1, 0, 0);

            pass.next_subpass();
            pass.bind_pipeline(self.gizmo.handle());
            let cube = app.mesh(self.gizmo_mesh)?;
            for light_index in 0..scene.lights().len() {
                bind_descriptor_sets(
                    &mut pass,
                    self.gizmo.layout(),
                    &[&self.bindings.gizmo_set, &self.bindings.lights_set],
                    image_index,
                    light_index as u32,
                )?;
                let constants = GizmoConstants {
                    light_index: light_index as u32,
                };
                push_fragment(&mut pass, self.gizmo.layout(), &constants);
                cube.draw(&mut pass, 1);
            }
        }
        Ok(vec![recorder.end()?])
    }
}

fn main() -> ExitCode {
    common::run::<LightingGraph>()
}
