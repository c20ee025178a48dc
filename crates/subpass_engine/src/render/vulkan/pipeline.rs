//! Vertex layouts and graphics pipelines bound to one subpass
//!
//! A pipeline is created for exactly one `(render pass, subpass)` pair.
//! Viewport and scissor are baked in, not dynamic state.

use ash::{vk, Device};

use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::shader::ENTRY_POINT;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// One attribute of the interleaved vertex format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// 32-bit float format with 1 to 4 components
    pub format: vk::Format,
    /// Byte offset inside a vertex
    pub offset: u32,
}

/// Interleaved vertex format built one attribute at a time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
    stride: u32,
}

impl VertexLayout {
    /// Create an empty layout
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute of `element_count` floats and return its index
    pub fn push_vertex_attribute(&mut self, element_count: u32) -> VulkanResult<u32> {
        let format = match element_count {
            1 => vk::Format::R32_SFLOAT,
            2 => vk::Format::R32G32_SFLOAT,
            3 => vk::Format::R32G32B32_SFLOAT,
            4 => vk::Format::R32G32B32A32_SFLOAT,
            _ => {
                return Err(VulkanError::InvalidOperation {
                    reason: format!("vertex attributes hold 1 to 4 floats, not {element_count}"),
                })
            }
        };

        let index = self.attributes.len() as u32;
        self.attributes.push(VertexAttribute {
            format,
            offset: self.stride,
        });
        self.stride += element_count * std::mem::size_of::<f32>() as u32;
        Ok(index)
    }

    /// Bytes per vertex
    pub const fn stride(&self) -> u32 {
        self.stride
    }

    /// Attribute at `index`
    pub fn attribute(&self, index: u32) -> Option<&VertexAttribute> {
        self.attributes.get(index as usize)
    }
}

/// Feeds layout attribute `attribute_index` to shader `location`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexInput {
    /// Vertex buffer binding
    pub binding: u32,
    /// Shader input location
    pub location: u32,
    /// Index returned by [`VertexLayout::push_vertex_attribute`]
    pub attribute_index: u32,
}

/// Blending turned off, all channels written
pub fn blend_disabled() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::FALSE,
        src_color_blend_factor: vk::BlendFactor::ONE,
        dst_color_blend_factor: vk::BlendFactor::ZERO,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    }
}

/// Classic back-to-front "over": `src.rgb * src.a + dst.rgb * (1 - src.a)`
pub fn blend_alpha_over() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::TRUE,
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        ..blend_disabled()
    }
}

/// Front-to-back "under" for peeled layers
///
/// The target starts at alpha 1 and holds remaining transmittance in alpha.
/// Each layer adds `dst.a * src.rgb` (the shader premultiplies by its alpha)
/// and scales transmittance by `1 - src.a`.
pub fn blend_front_to_back_under() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::TRUE,
        src_color_blend_factor: vk::BlendFactor::DST_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE,
        src_alpha_blend_factor: vk::BlendFactor::ZERO,
        dst_alpha_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        ..blend_disabled()
    }
}

/// Writes `reference` wherever geometry is drawn
pub const fn stencil_write(reference: u32) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: vk::StencilOp::REPLACE,
        pass_op: vk::StencilOp::REPLACE,
        depth_fail_op: vk::StencilOp::REPLACE,
        compare_op: vk::CompareOp::ALWAYS,
        compare_mask: 0xFF,
        write_mask: 0xFF,
        reference,
    }
}

/// Passes only where the stencil does not hold `reference`
pub const fn stencil_not_equal(reference: u32) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: vk::StencilOp::KEEP,
        pass_op: vk::StencilOp::REPLACE,
        depth_fail_op: vk::StencilOp::KEEP,
        compare_op: vk::CompareOp::NOT_EQUAL,
        compare_mask: 0xFF,
        write_mask: 0xFF,
        reference,
    }
}

/// Fixed-function and programmable state of one pipeline
#[derive(Debug, Clone)]
pub struct GraphicsPipelineInfo {
    /// `(stage, module)` pairs, at least vertex and fragment
    pub shader_stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule)>,
    /// Set layouts in set-number order
    pub descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    /// Push constant ranges
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    /// Attributes read from the vertex layout
    pub vertex_inputs: Vec<VertexInput>,
    /// Static viewport
    pub viewport: vk::Viewport,
    /// Static scissor
    pub scissor: vk::Rect2D,
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Fill mode
    pub polygon_mode: vk::PolygonMode,
    /// Culled faces
    pub cull_mode: vk::CullModeFlags,
    /// Winding of front faces
    pub front_face: vk::FrontFace,
    /// Depth test on
    pub depth_test: bool,
    /// Depth write on
    pub depth_write: bool,
    /// Depth compare op
    pub depth_compare_op: vk::CompareOp,
    /// Stencil state for front faces; `None` leaves the stencil test off
    pub stencil_front: Option<vk::StencilOpState>,
    /// Stencil state for back faces; the front state when `None`
    pub stencil_back: Option<vk::StencilOpState>,
    /// One blend state per color attachment of the target subpass
    pub color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
}

impl GraphicsPipelineInfo {
    /// Defaults sized to `extent`
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            shader_stages: Vec::new(),
            descriptor_set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
            vertex_inputs: Vec::new(),
            viewport: vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
            scissor: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS,
            stencil_front: None,
            stencil_back: None,
            color_blend_attachments: vec![blend_disabled()],
        }
    }

    /// `(front, back)` stencil states, `None` when the stencil test is off
    pub fn stencil_states(&self) -> Option<(vk::StencilOpState, vk::StencilOpState)> {
        self.stencil_front
            .map(|front| (front, self.stencil_back.unwrap_or(front)))
    }

    /// Vertex input state pieces for `layout`
    pub fn vertex_input_descriptions(
        &self,
        layout: &VertexLayout,
    ) -> VulkanResult<(Vec<vk::VertexInputBindingDescription>, Vec<vk::VertexInputAttributeDescription>)> {
        let mut attributes = Vec::with_capacity(self.vertex_inputs.len());
        let mut bindings: Vec<vk::VertexInputBindingDescription> = Vec::new();

        for input in &self.vertex_inputs {
            let attribute = layout.attribute(input.attribute_index).ok_or_else(|| {
                VulkanError::Validation(format!("vertex layout has no attribute {}", input.attribute_index))
            })?;
            attributes.push(vk::VertexInputAttributeDescription {
                location: input.location,
                binding: input.binding,
                format: attribute.format,
                offset: attribute.offset,
            });
            if !bindings.iter().any(|b| b.binding == input.binding) {
                bindings.push(vk::VertexInputBindingDescription {
                    binding: input.binding,
                    stride: layout.stride(),
                    input_rate: vk::VertexInputRate::VERTEX,
                });
            }
        }
        Ok((bindings, attributes))
    }

    /// Check the pieces that must agree with the target subpass
    pub fn validate(&self, subpass_color_count: u32) -> VulkanResult<()> {
        if self.color_blend_attachments.len() != subpass_color_count as usize {
            return Err(VulkanError::Validation(format!(
                "{} blend states for a subpass with {subpass_color_count} color attachments",
                self.color_blend_attachments.len()
            )));
        }
        if self.shader_stages.len() < 2 {
            return Err(VulkanError::Validation(format!(
                "pipeline needs at least 2 shader stages, got {}",
                self.shader_stages.len()
            )));
        }
        Ok(())
    }
}

/// Pipeline and its layout, tied to one subpass
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    subpass: u32,
}

/// Create a pipeline for `subpass` of `render_pass`
pub fn create_graphics_pipeline(
    device: &Device,
    render_pass: &RenderPass,
    subpass: u32,
    info: &GraphicsPipelineInfo,
    vertex_layout: &VertexLayout,
) -> VulkanResult<GraphicsPipeline> {
    info.validate(render_pass.color_attachment_count(subpass)?)?;

    let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = info
        .shader_stages
        .iter()
        .map(|&(stage, module)| {
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(stage)
                .module(module)
                .name(ENTRY_POINT)
                .build()
        })
        .collect();

    let (bindings, attributes) = info.vertex_input_descriptions(vertex_layout)?;
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(info.topology)
        .primitive_restart_enable(false);

    let viewports = [info.viewport];
    let scissors = [info.scissor];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(info.polygon_mode)
        .line_width(1.0)
        .cull_mode(info.cull_mode)
        .front_face(info.front_face)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let stencil = info.stencil_states();
    let (front, back) = stencil.unwrap_or_default();
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(info.depth_test)
        .depth_write_enable(info.depth_write)
        .depth_compare_op(info.depth_compare_op)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(stencil.is_some())
        .front(front)
        .back(back)
        .min_depth_bounds(0.0)
        .max_depth_bounds(1.0);

    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(&info.color_blend_attachments);

    let layout_info = vk::PipelineLayoutCreateInfo::builder()
        .set_layouts(&info.descriptor_set_layouts)
        .push_constant_ranges(&info.push_constant_ranges);
    let layout = unsafe {
        device
            .create_pipeline_layout(&layout_info, None)
            .map_err(VulkanError::call("vkCreatePipelineLayout"))?
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .layout(layout)
        .render_pass(render_pass.handle())
        .subpass(subpass);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
    };
    let pipeline = match pipelines {
        Ok(pipelines) => pipelines.into_iter().next(),
        Err((_, result)) => {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            return Err(VulkanError::call("vkCreateGraphicsPipelines")(result));
        }
    };
    let Some(pipeline) = pipeline else {
        unsafe { device.destroy_pipeline_layout(layout, None) };
        return Err(VulkanError::InvalidOperation {
            reason: "vkCreateGraphicsPipelines returned no pipeline".to_string(),
        });
    };

    log::debug!(
        "Created pipeline for subpass {subpass}: {} stages, {} vertex inputs, {} blend states",
        shader_stages.len(),
        attributes.len(),
        info.color_blend_attachments.len()
    );

    Ok(GraphicsPipeline {
        device: device.clone(),
        pipeline,
        layout,
        render_pass: render_pass.handle(),
        subpass,
    })
}

impl GraphicsPipeline {
    /// Get pipeline handle
    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Render pass the pipeline was built against
    pub const fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Subpass the pipeline was built for
    pub const fn subpass(&self) -> u32 {
        self.subpass
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn mesh_layout() -> (VertexLayout, u32, u32, u32) {
        let mut layout = VertexLayout::new();
        let position = layout.push_vertex_attribute(3).unwrap();
        let normal = layout.push_vertex_attribute(3).unwrap();
        let uv = layout.push_vertex_attribute(2).unwrap();
        (layout, position, normal, uv)
    }

    #[test]
    fn test_vertex_layout_offsets() {
        let (layout, position, normal, uv) = mesh_layout();
        assert_eq!((position, normal, uv), (0, 1, 2));
        assert_eq!(layout.stride(), 32);
        assert_eq!(layout.attribute(normal).unwrap().offset, 12);
        assert_eq!(layout.attribute(uv).unwrap().offset, 24);
        assert_eq!(layout.attribute(uv).unwrap().format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_vertex_layout_rejects_bad_width() {
        let mut layout = VertexLayout::new();
        assert!(layout.push_vertex_attribute(0).is_err());
        assert!(layout.push_vertex_attribute(5).is_err());
        assert_eq!(layout.stride(), 0);
    }

    #[test]
    fn test_vertex_inputs_select_subset() {
        let (layout, position, _, uv) = mesh_layout();
        let mut info = GraphicsPipelineInfo::new(vk::Extent2D { width: 8, height: 8 });
        info.vertex_inputs = vec![
            VertexInput { binding: 0, location: 0, attribute_index: position },
            VertexInput { binding: 0, location: 1, attribute_index: uv },
        ];

        let (bindings, attributes) = info.vertex_input_descriptions(&layout).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].stride, 32);
        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].offset, 24);

        info.vertex_inputs.push(VertexInput { binding: 0, location: 2, attribute_index: 9 });
        assert!(info.vertex_input_descriptions(&layout).is_err());
    }

    #[test]
    fn test_defaults() {
        let info = GraphicsPipelineInfo::new(vk::Extent2D { width: 1600, height: 900 });
        assert_eq!(info.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(info.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(info.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(info.depth_compare_op, vk::CompareOp::LESS);
        assert!(info.depth_test && info.depth_write);
        assert!(info.stencil_front.is_none() && info.stencil_back.is_none());
        assert!(info.stencil_states().is_none());
        assert_eq!(info.color_blend_attachments.len(), 1);
        assert_eq!(info.color_blend_attachments[0].blend_enable, vk::FALSE);
        assert_eq!(info.viewport.width, 1600.0);
    }

    #[test]
    fn test_blend_count_must_match_subpass() {
        let mut info = GraphicsPipelineInfo::new(vk::Extent2D { width: 8, height: 8 });
        info.shader_stages = vec![
            (vk::ShaderStageFlags::VERTEX, vk::ShaderModule::from_raw(1)),
            (vk::ShaderStageFlags::FRAGMENT, vk::ShaderModule::from_raw(2)),
        ];
        assert!(info.validate(1).is_ok());
        assert!(info.validate(4).is_err());

        info.color_blend_attachments = vec![blend_disabled(); 4];
        assert!(info.validate(4).is_ok());

        info.shader_stages.pop();
        assert!(info.validate(4).is_err());
    }

    #[test]
    fn test_presets() {
        let under = blend_front_to_back_under();
        assert_eq!(under.src_color_blend_factor, vk::BlendFactor::DST_ALPHA);
        assert_eq!(under.dst_color_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(under.dst_alpha_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);

        let over = blend_alpha_over();
        assert_eq!(over.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(over.color_write_mask, vk::ColorComponentFlags::RGBA);

        let write = stencil_write(1);
        assert_eq!(write.compare_op, vk::CompareOp::ALWAYS);
        assert_eq!(write.depth_fail_op, vk::StencilOp::REPLACE);
        let outline = stencil_not_equal(1);
        assert_eq!(outline.compare_op, vk::CompareOp::NOT_EQUAL);
        assert_eq!(outline.fail_op, vk::StencilOp::KEEP);
        assert_eq!(outline.reference, 1);
    }

    #[test]
    fn test_stencil_back_defaults_to_front() {
        let mut info = GraphicsPipelineInfo::new(vk::Extent2D { width: 8, height: 8 });
        info.stencil_front = Some(stencil_write(2));
        let (front, back) = info.stencil_states().unwrap();
        assert_eq!(front.compare_op, vk::CompareOp::ALWAYS);
        assert_eq!(back.compare_op, vk::CompareOp::ALWAYS);
        assert_eq!(back.reference, 2);

        info.stencil_back = Some(stencil_not_equal(3));
        let (front, back) = info.stencil_states().unwrap();
        assert_eq!(front.reference, 2);
        assert_eq!(back.compare_op, vk::CompareOp::NOT_EQUAL);
        assert_eq!(back.reference, 3);
    }

    #[test]
    fn test_back_stencil_alone_keeps_test_off() {
        let mut info = GraphicsPipelineInfo::new(vk::Extent2D { width: 8, height: 8 });
        info.stencil_back = Some(stencil_write(1));
        assert!(info.stencil_states().is_none());
    }
}
