//! Order-independent transparency by depth peeling
//!
//! Usage: `depth_peeling_demo [EXTRA_LAYERS]`
//!
//! Each layer is peeled in its own subpass and composited front to back into
//! the swapchain image by the blend subpass that follows it.

use std::process::ExitCode;

use ash::vk;

use scene_demos::common::{self, DemoApp, DemoResult, DrawConstants, RenderGraph, SceneBindings};
use subpass_engine::render::vulkan::depth_peel::{
    DEPTH_A, PEEL_COLOR_FORMAT, PEEL_DEPTH_FORMAT,
};
use subpass_engine::render::vulkan::descriptors::{
    allocate_descriptor_set, bind_descriptor_sets, DescriptorSet, DescriptorSetInfo, DescriptorSetLayout,
    DescriptorWriter,
};
use subpass_engine::render::vulkan::pipeline::{blend_front_to_back_under, create_graphics_pipeline};
use subpass_engine::render::vulkan::render_pass::create_render_pass;
use subpass_engine::render::vulkan::{
    DepthPeelChain, GraphicsPipeline, GraphicsPipelineInfo, Image, RenderPass, VertexLayout,
};

/// Layers peeled after the first when no argument is given
const DEFAULT_EXTRA_LAYERS: u32 = 3;
/// Upper bound keeping the subpass count within what drivers accept
const MAX_EXTRA_LAYERS: u32 = 15;

/// Extra layer count from the first argument, falling back to the default
fn extra_layers(arg: Option<String>) -> u32 {
    let Some(arg) = arg else {
        return DEFAULT_EXTRA_LAYERS;
    };
    match arg.parse::<u32>() {
        Ok(layers) if layers <= MAX_EXTRA_LAYERS => layers,
        Ok(layers) => {
            log::warn!("{layers} extra layers requested, clamping to {MAX_EXTRA_LAYERS}");
            MAX_EXTRA_LAYERS
        }
        Err(e) => {
            log::warn!("Ignoring layer count {arg:?}: {e}");
            DEFAULT_EXTRA_LAYERS
        }
    }
}

/// Per-image attachment images
struct PeelImages {
    depth_a: Image,
    depth_b: Image,
    color: Image,
}

/// Input attachment sets, one instance per swapchain image
struct PeelSets {
    read_a: DescriptorSet,
    read_b: DescriptorSet,
    color: DescriptorSet,
}

impl PeelSets {
    /// Depth input the peel of `layer` compares against
    fn depth_read(&self, layer: u32) -> Option<&DescriptorSet> {
        DepthPeelChain::depth_read(layer).map(|attachment| {
            if attachment == DEPTH_A {
                &self.read_a
            } else {
                &self.read_b
            }
        })
    }
}

fn input_set_info(image_count: u32) -> DescriptorSetInfo {
    DescriptorSetInfo::new(image_count).input_attachment()
}

struct DepthPeelingGraph {
    peel_pipelines: Vec<GraphicsPipeline>,
    blend_pipelines: Vec<GraphicsPipeline>,
    sets: PeelSets,
    _input_layout: DescriptorSetLayout,
    bindings: SceneBindings,
    render_pass: RenderPass,
    _images: Vec<PeelImages>,
    chain: DepthPeelChain,
}

impl RenderGraph for DepthPeelingGraph {
    const TITLE: &'static str = "Depth peeling";
    const SCENE: &'static str = "depth_peeling.toml";

    fn build(app: &DemoApp) -> DemoResult<Self> {
        let chain = DepthPeelChain::new(extra_layers(std::env::args().nth(1)));
        log::info!(
            "Peeling {} layers in {} subpasses",
            chain.layer_count(),
            chain.subpass_count()
        );

        let context = &app.context;
        let device = context.device();
        let extent = context.swapchain_extent();
        let image_count = app.image_count();

        let depth_usage = vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT;
        let color_usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT;
        let images: Vec<PeelImages> = app
            .create_attachments(PEEL_DEPTH_FORMAT, depth_usage)?
            .into_iter()
            .zip(app.create_attachments(PEEL_DEPTH_FORMAT, depth_usage)?)
            .zip(app.create_attachments(PEEL_COLOR_FORMAT, color_usage)?)
            .map(|((depth_a, depth_b), color)| PeelImages { depth_a, depth_b, color })
            .collect();

        let views = images
            .iter()
            .zip(context.swapchain().image_views())
            .map(|(images, &swapchain)| [images.depth_a.view(), images.depth_b.view(), images.color.view(), swapchain])
            .collect();
        let info = chain.render_pass_info(context.swapchain_format(), views, extent);
        let render_pass = create_render_pass(device, context.command_pool(), &info)?;

        let input_info = input_set_info(image_count);
        let bindings = SceneBindings::new(app, &[input_info.clone(), input_info.clone(), input_info.clone()])?;
        let input_layout = DescriptorSetLayout::new(device, &input_info)?;
        let sets = PeelSets {
            read_a: allocate_descriptor_set(&bindings.pool, &input_layout, image_count)?,
            read_b: allocate_descriptor_set(&bindings.pool, &input_layout, image_count)?,
            color: allocate_descriptor_set(&bindings.pool, &input_layout, image_count)?,
        };

        let depth_read = vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL;
        let color_read = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        let mut writer = DescriptorWriter::new();
        for (image, images) in images.iter().enumerate() {
            writer = writer
                .input_attachment(sets.read_a.instance_for(image)?, 0, images.depth_a.view(), depth_read)
                .input_attachment(sets.read_b.instance_for(image)?, 0, images.depth_b.view(), depth_read)
                .input_attachment(sets.color.instance_for(image)?, 0, images.color.view(), color_read);
        }
        writer.update(device);

        let (vertex_layout, vertex_inputs) = common::mesh_vertex_layout()?;
        let mut peel_pipelines = Vec::with_capacity(chain.layer_count() as usize);
        let mut blend_pipelines = Vec::with_capacity(chain.layer_count() as usize);
        for layer in 0..chain.layer_count() {
            let (fragment, layouts) = if layer == 0 {
                ("peel_first.frag", bindings.scene_layouts())
            } else {
                let mut layouts = bindings.scene_layouts();
                layouts.push(input_layout.handle());
                ("peel.frag", layouts)
            };
            let peel_info = GraphicsPipelineInfo {
                shader_stages: app.shader_stages(&["forward.vert", fragment])?,
                descriptor_set_layouts: layouts,
                push_constant_ranges: vec![DrawConstants::range()],
                vertex_inputs: vertex_inputs.clone(),
                cull_mode: vk::CullModeFlags::NONE,
                ..GraphicsPipelineInfo::new(extent)
            };
            peel_pipelines.push(create_graphics_pipeline(
                device,
                &render_pass,
                DepthPeelChain::peel_subpass(layer),
                &peel_info,
                &vertex_layout,
            )?);

            let blend_info = GraphicsPipelineInfo {
                shader_stages: app.shader_stages(&["fullscreen.vert", "peel_blend.frag"])?,
                descriptor_set_layouts: vec![input_layout.handle()],
                cull_mode: vk::CullModeFlags::NONE,
                depth_test: false,
                depth_write: false,
                color_blend_attachments: vec![blend_front_to_back_under()],
                ..GraphicsPipelineInfo::new(extent)
            };
            blend_pipelines.push(create_graphics_pipeline(
                device,
                &render_pass,
                DepthPeelChain::blend_subpass(layer),
                &blend_info,
                &VertexLayout::new(),
            )?);
        }

        Ok(Self {
            peel_pipelines,
            blend_pipelines,
            sets,
            _input_layout: input_layout,
            bindings,
            render_pass,
            _images: images,
            chain,
        })
    }

    fn record(&mut self, app: &DemoApp, image_index: usize) -> DemoResult<Vec<vk::CommandBuffer>> {
        let render_area = self.render_pass.render_area();
        let mut recorder = self.render_pass.recorder(image_index)?;
        recorder.begin()?;
        {
            let mut pass = self.render_pass.begin(&mut recorder, image_index)?;
            for ((layer, peel), blend) in (0..self.chain.layer_count())
                .zip(&self.peel_pipelines)
                .zip(&self.blend_pipelines)
            {
                if layer > 0 {
                    pass.next_subpass();
                    // Load ops ran once at the start of the pass.
                    pass.clear_attachments(&peel_clears(), render_area);
                }

                let extra: Vec<&DescriptorSet> = self.sets.depth_read(layer).into_iter().collect();
                let layout = peel.layout();
                self.bindings
                    .draw_entities(app, &mut pass, peel, image_index, &extra, |pass, entity| {
                        DrawConstants::new(&app.scene, entity).push(pass, layout);
                    })?;

                pass.next_subpass();
                pass.bind_pipeline(blend.handle());
                bind_descriptor_sets(&mut pass, blend.layout(), &[&self.sets.color], image_index, 0)?;
                pass.draw(3, 1, 0, 0);
            }
        }
        Ok(vec![recorder.end()?])
    }
}

/// Clears for the peel color (to transparent) and written depth (to far)
fn peel_clears() -> [vk::ClearAttachment; 2] {
    [
        vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue { float32: [0.0; 4] },
            },
        },
        vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::DEPTH,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        },
    ]
}

fn main() -> ExitCode {
    common::run::<DepthPeelingGraph>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_layers_argument() {
        assert_eq!(extra_layers(None), DEFAULT_EXTRA_LAYERS);
        assert_eq!(extra_layers(Some("0".to_string())), 0);
        assert_eq!(extra_layers(Some("5".to_string())), 5);
        assert_eq!(extra_layers(Some("many".to_string())), DEFAULT_EXTRA_LAYERS);
        assert_eq!(extra_layers(Some("1000".to_string())), MAX_EXTRA_LAYERS);
    }

    #[test]
    fn test_peel_clears_cover_color_and_depth() {
        let clears = peel_clears();
        assert_eq!(clears[0].aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(clears[1].aspect_mask, vk::ImageAspectFlags::DEPTH);
        let depth = unsafe { clears[1].clear_value.depth_stencil.depth };
        assert_eq!(depth, 1.0);
    }

    #[test]
    fn test_input_set_is_single_fragment_input() {
        let bindings = input_set_info(2).layout_bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::INPUT_ATTACHMENT);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }
}
