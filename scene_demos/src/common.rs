//! Window, context, scene and frame-loop plumbing shared by every demo

use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;
use std::process::ExitCode;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glfw::Key;
use thiserror::Error;

use subpass_engine::assets::{AssetError, Assets, Handle, ImageData, Mesh, Texture, VERTEX_ATTRIBUTE_WIDTHS};
use subpass_engine::config::{Config, ConfigError, EngineConfig};
use subpass_engine::foundation::logging;
use subpass_engine::render::vulkan::descriptors::{
    allocate_descriptor_set, bind_descriptor_sets, create_descriptor_pool, DescriptorPool, DescriptorSet,
    DescriptorSetInfo, DescriptorSetLayout, DescriptorWriter,
};
use subpass_engine::render::vulkan::{
    ActiveRenderPass, FrameSync, GraphicsPipeline, Image, ImageInfo, InputState, SamplerInfo, VertexInput,
    VertexLayout, VulkanError, VulkanResult, Window, WindowError,
};
use subpass_engine::render::RenderContext;
use subpass_engine::scene::{
    camera_controls, create_scene, update_scene_data, write_scene_data, Entity, Scene, SceneConfig, SceneError,
    SceneUniforms,
};

/// Errors that end a demo
#[derive(Error, Debug)]
pub enum DemoError {
    /// Window creation or surface failure
    #[error(transparent)]
    Window(#[from] WindowError),

    /// Any Vulkan failure
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// Asset loading failure
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Scene construction failure
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Config file failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A handle did not resolve
    #[error("Missing {0}")]
    Missing(String),
}

/// Result type for demo code
pub type DemoResult<T> = Result<T, DemoError>;

/// Set index of the per-entity model matrices
pub const MODEL_SET: u32 = 0;
/// Set index of the light and material arrays
pub const LIGHTS_SET: u32 = 1;
/// Set index of the entity texture
pub const TEXTURE_SET: u32 = 2;
/// First set index free for demo-specific sets
pub const FIRST_EXTRA_SET: u32 = 3;

/// Directory holding configs, meshes, textures and compiled shaders
pub fn resources_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources")
}

/// One hand-assembled render graph
pub trait RenderGraph: Sized {
    /// Window title
    const TITLE: &'static str;
    /// Scene file name under `resources/scenes`
    const SCENE: &'static str;

    /// Create render passes, attachments, descriptor sets and pipelines
    fn build(app: &DemoApp) -> DemoResult<Self>;

    /// React to input before the frame's uniforms are written
    fn update(&mut self, _input: &InputState, _scene: &mut Scene) {}

    /// Record this frame's command buffers, in submission order
    fn record(&mut self, app: &DemoApp, image_index: usize) -> DemoResult<Vec<vk::CommandBuffer>>;
}

/// Run `G` to completion and turn the outcome into an exit code
pub fn run<G: RenderGraph>() -> ExitCode {
    match run_graph::<G>() {
        Ok(()) => {
            log::info!("{} finished", G::TITLE);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{} failed: {e}", G::TITLE);
            ExitCode::FAILURE
        }
    }
}

fn run_graph<G: RenderGraph>() -> DemoResult<()> {
    let config = EngineConfig::load_or_default(resources_dir().join("engine.toml"));
    logging::init_with_level(config.as_ref().map_or("info", |c| c.log_level.as_str()));
    let config = config?.with_title(G::TITLE);

    let mut app = DemoApp::new(&config, G::SCENE)?;
    let mut graph = G::build(&app)?;
    log::info!("{} ready", G::TITLE);

    let result = app.run(&mut graph);
    // The graph's objects are destroyed before the app's; nothing may still be in flight.
    app.context.wait_idle()?;
    result
}

/// Everything a render graph draws from
///
/// Fields drop top to bottom: GPU objects before the [`RenderContext`],
/// the context before the window whose surface it uses.
pub struct DemoApp {
    /// Frame slots and image ownership
    pub frame_sync: FrameSync,
    /// Per-image uniform arrays
    pub uniforms: SceneUniforms,
    /// White texture for untextured entities
    pub fallback_texture: Texture,
    /// Loaded meshes, textures and shaders
    pub assets: Assets,
    /// Camera, entities and lights
    pub scene: Scene,
    /// Device, swapchain and backing buffers
    pub context: RenderContext,
    /// Window and input
    pub window: Window,
}

impl DemoApp {
    /// Open the window, bring up Vulkan, load assets and build the scene
    pub fn new(config: &EngineConfig, scene_file: &str) -> DemoResult<Self> {
        let resources = resources_dir();

        let mut window = Window::new(&config.window)?;
        let mut context = RenderContext::new(&mut window, config)?;
        let assets = Assets::load_manifest(&mut context, resources.join("assets.toml"))?;

        let scene_config = SceneConfig::load_from_file(resources.join("scenes").join(scene_file))?;
        let extent = context.swapchain_extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let scene = create_scene(&scene_config, &assets, aspect)?;

        let uniforms = SceneUniforms::new(&mut context)?;
        let fallback_texture = Texture::upload(
            &context,
            &ImageData::solid_color(1, 1, [255; 4]),
            SamplerInfo::default(),
        )?;
        let frame_sync = FrameSync::new(context.device(), config.frames_in_flight, context.swapchain_image_count())?;

        Ok(Self {
            frame_sync,
            uniforms,
            fallback_texture,
            assets,
            scene,
            context,
            window,
        })
    }

    /// Frame loop: input, acquire, sync, uniforms, record, submit, present, cycle
    pub fn run<G: RenderGraph>(&mut self, graph: &mut G) -> DemoResult<()> {
        while !self.window.should_close() {
            self.window.poll_events();
            if self.window.input().key_down(Key::Escape) {
                self.window.set_should_close(true);
            }

            let input = self.window.input();
            camera_controls(&mut self.scene.camera.transform, input);
            graph.update(input, &mut self.scene);

            let image_index = self.frame_sync.acquire(self.context.swapchain())?;
            self.frame_sync.sync(image_index)?;

            let frame_data = update_scene_data(&self.scene);
            write_scene_data(&self.context, &self.uniforms, &frame_data, image_index as usize)?;

            let command_buffers = graph.record(self, image_index as usize)?;
            self.frame_sync
                .submit(self.context.device(), self.context.graphics_queue(), &command_buffers)?;
            self.frame_sync
                .present(self.context.swapchain(), self.context.present_queue(), image_index)?;
            self.frame_sync.cycle();
        }
        Ok(())
    }

    /// Mesh behind `handle`
    pub fn mesh(&self, handle: Handle<Mesh>) -> DemoResult<&Mesh> {
        self.assets
            .meshes
            .get(handle)
            .ok_or_else(|| DemoError::Missing(format!("mesh {handle:?}")))
    }

    /// `(stage, module)` pairs for the named shaders
    pub fn shader_stages(&self, names: &[&str]) -> DemoResult<Vec<(vk::ShaderStageFlags, vk::ShaderModule)>> {
        names
            .iter()
            .map(|name| Ok(self.assets.shader(name)?.stage_module()))
            .collect()
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> u32 {
        self.context.swapchain_image_count() as u32
    }

    /// One attachment image per swapchain image
    pub fn create_attachments(&self, format: vk::Format, usage: vk::ImageUsageFlags) -> VulkanResult<Vec<Image>> {
        let extent = self.context.swapchain_extent();
        (0..self.image_count())
            .map(|_| self.context.create_image(ImageInfo::attachment(format, extent, usage)))
            .collect()
    }
}

/// Interleaved position/normal/uv layout and the inputs feeding locations 0, 1, 2
pub fn mesh_vertex_layout() -> VulkanResult<(VertexLayout, Vec<VertexInput>)> {
    let mut layout = VertexLayout::new();
    let mut inputs = Vec::with_capacity(VERTEX_ATTRIBUTE_WIDTHS.len());
    for (location, &width) in VERTEX_ATTRIBUTE_WIDTHS.iter().enumerate() {
        inputs.push(VertexInput {
            binding: 0,
            location: location as u32,
            attribute_index: layout.push_vertex_attribute(width)?,
        });
    }
    Ok((layout, inputs))
}

/// Push constants of the forward-lit pipelines
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DrawConstants {
    /// Camera position for specular terms
    pub view_position: [f32; 3],
    /// Lights in use
    pub light_count: u32,
    /// Index into the material array
    pub material_index: u32,
}

impl DrawConstants {
    /// Stages that read the block
    pub const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
        vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
    );

    /// Constants for drawing `entity` in `scene`
    pub fn new(scene: &Scene, entity: &Entity) -> Self {
        Self {
            view_position: scene.camera.transform.position.into(),
            light_count: scene.lights().len() as u32,
            material_index: entity.material as u32,
        }
    }

    /// Range to declare in the pipeline layout
    pub const fn range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: Self::STAGES,
            offset: 0,
            size: std::mem::size_of::<Self>() as u32,
        }
    }

    /// Push onto `pass` for `layout`
    pub fn push(&self, pass: &mut ActiveRenderPass<'_>, layout: vk::PipelineLayout) {
        pass.push_constants(layout, Self::STAGES, 0, bytemuck::bytes_of(self));
    }
}

/// Per-image model matrices bound with a dynamic offset
pub fn model_set_info(image_count: u32) -> DescriptorSetInfo {
    DescriptorSetInfo::new(image_count).dynamic_uniform(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
}

/// Per-image light array (binding 0) and material array (binding 1)
pub fn lights_set_info(image_count: u32) -> DescriptorSetInfo {
    DescriptorSetInfo::new(image_count)
        .binding(
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        )
        .binding(
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        )
}

/// Static sampled texture
pub fn texture_set_info() -> DescriptorSetInfo {
    DescriptorSetInfo::new(1).combined_image_sampler(vk::ShaderStageFlags::FRAGMENT)
}

/// Every set a demo allocates: entity and gizmo models, lights, one set
/// per texture plus the fallback, then the demo's own
pub fn pool_infos(image_count: u32, texture_count: usize, extra: &[DescriptorSetInfo]) -> Vec<DescriptorSetInfo> {
    let mut infos = vec![
        model_set_info(image_count),
        model_set_info(image_count),
        lights_set_info(image_count),
    ];
    infos.extend(std::iter::repeat(texture_set_info()).take(texture_count + 1));
    infos.extend_from_slice(extra);
    infos
}

/// First occurrence of each item, in order
pub fn unique<T: Copy + Eq + Hash>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|item| seen.insert(*item)).collect()
}

/// Scene descriptor sets shared by all demos, plus the pool demo sets come from
pub struct SceneBindings {
    /// Entity model matrices
    pub entity_set: DescriptorSet,
    /// Light gizmo model matrices
    pub gizmo_set: DescriptorSet,
    /// Light and material arrays
    pub lights_set: DescriptorSet,
    texture_sets: HashMap<Handle<Texture>, DescriptorSet>,
    fallback_set: DescriptorSet,
    /// Layout of the entity and gizmo sets
    pub model_layout: DescriptorSetLayout,
    /// Layout of the lights set
    pub lights_layout: DescriptorSetLayout,
    /// Layout of texture sets
    pub texture_layout: DescriptorSetLayout,
    /// Pool sized for the scene sets and `extra`
    pub pool: DescriptorPool,
}

impl SceneBindings {
    /// Allocate and write the scene sets; `extra` reserves room for the demo's own sets
    pub fn new(app: &DemoApp, extra: &[DescriptorSetInfo]) -> DemoResult<Self> {
        let device = app.context.device();
        let image_count = app.image_count();
        let textures = unique(app.scene.entities().iter().filter_map(|entity| entity.texture));

        let pool = create_descriptor_pool(device, &pool_infos(image_count, textures.len(), extra))?;
        let model_layout = DescriptorSetLayout::new(device, &model_set_info(image_count))?;
        let lights_layout = DescriptorSetLayout::new(device, &lights_set_info(image_count))?;
        let texture_layout = DescriptorSetLayout::new(device, &texture_set_info())?;

        let uniforms = &app.uniforms;
        let mut entity_set = allocate_descriptor_set(&pool, &model_layout, image_count)?;
        entity_set.set_dynamic_strides(&[uniforms.entity_models.element_size()])?;
        let mut gizmo_set = allocate_descriptor_set(&pool, &model_layout, image_count)?;
        gizmo_set.set_dynamic_strides(&[uniforms.light_models.element_size()])?;
        let lights_set = allocate_descriptor_set(&pool, &lights_layout, image_count)?;

        let mut writer = DescriptorWriter::new();
        for image in 0..image_count as usize {
            let lights = uniforms.lights.region(image)?;
            let materials = uniforms.materials.region(image)?;
            writer = writer
                .uniform(
                    entity_set.instance_for(image)?,
                    0,
                    uniforms.entity_models.region(image)?,
                    uniforms.entity_models.element_size(),
                    true,
                )
                .uniform(
                    gizmo_set.instance_for(image)?,
                    0,
                    uniforms.light_models.region(image)?,
                    uniforms.light_models.element_size(),
                    true,
                )
                .uniform(lights_set.instance_for(image)?, 0, lights, lights.size, false)
                .uniform(lights_set.instance_for(image)?, 1, materials, materials.size, false);
        }

        let mut texture_sets = HashMap::with_capacity(textures.len());
        for handle in textures {
            let texture = app
                .assets
                .textures
                .get(handle)
                .ok_or_else(|| DemoError::Missing(format!("texture {handle:?}")))?;
            let set = allocate_descriptor_set(&pool, &texture_layout, 1)?;
            writer = writer.combined_image_sampler(set.instance_for(0)?, 0, texture.image.view(), texture.sampler.handle());
            texture_sets.insert(handle, set);
        }

        let fallback_set = allocate_descriptor_set(&pool, &texture_layout, 1)?;
        writer = writer.combined_image_sampler(
            fallback_set.instance_for(0)?,
            0,
            app.fallback_texture.image.view(),
            app.fallback_texture.sampler.handle(),
        );

        log::debug!("Writing {} scene descriptors", writer.len());
        writer.update(device);

        Ok(Self {
            entity_set,
            gizmo_set,
            lights_set,
            texture_sets,
            fallback_set,
            model_layout,
            lights_layout,
            texture_layout,
            pool,
        })
    }

    /// Layouts of sets 0, 1 and 2
    pub fn scene_layouts(&self) -> Vec<vk::DescriptorSetLayout> {
        vec![
            self.model_layout.handle(),
            self.lights_layout.handle(),
            self.texture_layout.handle(),
        ]
    }

    /// Texture set for `texture`, the white fallback when absent
    pub fn texture_set(&self, texture: Option<Handle<Texture>>) -> &DescriptorSet {
        texture
            .and_then(|handle| self.texture_sets.get(&handle))
            .unwrap_or(&self.fallback_set)
    }

    /// Bind sets 0..=2 for entity `entity_index`, followed by `extra`
    pub fn bind_entity(
        &self,
        pass: &mut ActiveRenderPass<'_>,
        pipeline_layout: vk::PipelineLayout,
        image_index: usize,
        entity_index: usize,
        entity: &Entity,
        extra: &[&DescriptorSet],
    ) -> DemoResult<()> {
        let mut sets = vec![&self.entity_set, &self.lights_set, self.texture_set(entity.texture)];
        sets.extend_from_slice(extra);
        bind_descriptor_sets(pass, pipeline_layout, &sets, image_index, entity_index as u32)?;
        Ok(())
    }

    /// Bind and draw every entity with `pipeline`, calling `per_entity` before each draw
    pub fn draw_entities(
        &self,
        app: &DemoApp,
        pass: &mut ActiveRenderPass<'_>,
        pipeline: &GraphicsPipeline,
        image_index: usize,
        extra: &[&DescriptorSet],
        mut per_entity: impl FnMut(&mut ActiveRenderPass<'_>, &Entity),
    ) -> DemoResult<()> {
        pass.bind_pipeline(pipeline.handle());
        for (index, entity) in app.scene.entities().iter().enumerate() {
            self.bind_entity(pass, pipeline.layout(), image_index, index, entity, extra)?;
            per_entity(pass, entity);
            app.mesh(entity.mesh)?.draw(pass, 1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subpass_engine::assets::Vertex;
    use subpass_engine::render::vulkan::descriptors::pool_sizes;

    #[test]
    fn test_vertex_layout_matches_vertex() {
        let (layout, inputs) = mesh_vertex_layout().unwrap();
        assert_eq!(layout.stride() as usize, std::mem::size_of::<Vertex>());
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[2].location, 2);
        assert_eq!(layout.attribute(2).unwrap().offset, 24);
    }

    #[test]
    fn test_draw_constants_layout() {
        assert_eq!(std::mem::size_of::<DrawConstants>(), 20);
        assert_eq!(DrawConstants::range().size, 20);
        assert!(DrawConstants::STAGES.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_pool_infos_cover_scene_sets() {
        let extra = [DescriptorSetInfo::new(3).input_attachment()];
        let infos = pool_infos(3, 2, &extra);
        assert_eq!(infos.len(), 3 + 3 + 1);

        let (sizes, sets) = pool_sizes(&infos).unwrap();
        // 2 model sets + lights set per image, 3 texture sets, 3 input sets
        assert_eq!(sets, 3 + 3 + 3 + 3 + 3);
        let count = |ty| sizes.iter().find(|s| s.ty == ty).map_or(0, |s| s.descriptor_count);
        assert_eq!(count(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC), 6);
        assert_eq!(count(vk::DescriptorType::UNIFORM_BUFFER), 6);
        assert_eq!(count(vk::DescriptorType::COMBINED_IMAGE_SAMPLER), 3);
        assert_eq!(count(vk::DescriptorType::INPUT_ATTACHMENT), 3);
    }

    #[test]
    fn test_unique_keeps_first_occurrence_order() {
        assert_eq!(unique([3, 1, 3, 2, 1]), vec![3, 1, 2]);
        assert!(unique(Vec::<u8>::new()).is_empty());
    }
}
