//! Per-frame uniform records and their upload
//!
//! [`update_scene_data`] is pure: it turns a [`Scene`] into the records the
//! shaders read. [`write_scene_data`] copies them into the current swapchain
//! image's regions. Records are `#[repr(C)]` and laid out for std140.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Mat4;
use crate::render::vulkan::{UniformBuffer, VulkanResult};
use crate::render::RenderContext;
use crate::scene::{Scene, MAX_ENTITIES, MAX_LIGHTS, MAX_MATERIALS};

/// Model and model-view-projection matrices of one object
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelUbo {
    /// Object to world
    pub model: [[f32; 4]; 4],
    /// Object to clip
    pub mvp: [[f32; 4]; 4],
}

impl ModelUbo {
    /// Record for `model` seen through `view_projection`
    pub fn new(model: &Mat4, view_projection: &Mat4) -> Self {
        Self {
            model: (*model).into(),
            mvp: (view_projection * model).into(),
        }
    }
}

/// Lighting and shadow parameters of one light
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightUbo {
    /// Shadow-map view-projection
    pub view_projection: [[f32; 4]; 4],
    /// RGBA color
    pub color: [f32; 4],
    /// World position
    pub position: [f32; 3],
    /// 0 directional, 1 point
    pub mode: i32,
    /// World direction
    pub direction: [f32; 3],
    /// Point-light shadow far plane
    pub far_clip: f32,
    /// Shadow depth bias
    pub depth_bias: i32,
    /// Shadow normal bias
    pub normal_bias: i32,
    /// Linear attenuation
    pub linear: f32,
    /// Quadratic attenuation
    pub quadratic: f32,
    /// Ambient term
    pub ambient: f32,
    _pad: [f32; 3],
}

/// Material parameters
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MaterialUbo {
    /// Specular exponent
    pub shine_exponent: u32,
    _pad: [u32; 3],
}

/// Everything the shaders read for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneFrameData {
    /// One per entity, in entity order
    pub entity_models: Vec<ModelUbo>,
    /// One per light, for drawing light gizmos
    pub light_models: Vec<ModelUbo>,
    /// One per light
    pub lights: Vec<LightUbo>,
    /// One per material
    pub materials: Vec<MaterialUbo>,
}

/// Build this frame's uniform records from `scene`
pub fn update_scene_data(scene: &Scene) -> SceneFrameData {
    let view_projection = scene.camera.view_projection();

    let entity_models = scene
        .entities()
        .iter()
        .map(|entity| ModelUbo::new(&entity.transform.model_matrix(), &view_projection))
        .collect();

    let light_models = scene
        .lights()
        .iter()
        .map(|light| ModelUbo::new(&light.transform.model_matrix(), &view_projection))
        .collect();

    let lights = scene
        .lights()
        .iter()
        .map(|light| {
            // Scenes validate attenuation indexes on creation.
            let (linear, quadratic) = light.attenuation().unwrap_or_default();
            LightUbo {
                view_projection: light.view_projection().into(),
                color: light.color,
                position: light.transform.position.into(),
                mode: light.mode as i32,
                direction: light.direction().into(),
                far_clip: light.shadow_far(),
                depth_bias: light.depth_bias,
                normal_bias: light.normal_bias,
                linear,
                quadratic,
                ambient: light.ambient,
                _pad: [0.0; 3],
            }
        })
        .collect();

    let materials = scene
        .materials()
        .iter()
        .map(|material| MaterialUbo {
            shine_exponent: material.shine_exponent,
            _pad: [0; 3],
        })
        .collect();

    SceneFrameData {
        entity_models,
        light_models,
        lights,
        materials,
    }
}

/// Per-image uniform arrays sized for the scene limits
pub struct SceneUniforms {
    /// Entity model matrices, bound with a dynamic offset per entity
    pub entity_models: UniformBuffer,
    /// Light gizmo model matrices, bound with a dynamic offset per light
    pub light_models: UniformBuffer,
    /// Whole light array
    pub lights: UniformBuffer,
    /// Whole material array
    pub materials: UniformBuffer,
}

impl SceneUniforms {
    /// Allocate all arrays from the host buffer
    pub fn new(context: &mut RenderContext) -> VulkanResult<Self> {
        Ok(Self {
            entity_models: context.create_uniform_buffer::<ModelUbo>(MAX_ENTITIES as u32)?,
            light_models: context.create_uniform_buffer::<ModelUbo>(MAX_LIGHTS as u32)?,
            lights: context.create_packed_uniform_buffer::<LightUbo>(MAX_LIGHTS as u32)?,
            materials: context.create_packed_uniform_buffer::<MaterialUbo>(MAX_MATERIALS as u32)?,
        })
    }
}

/// Write `data` into the regions of swapchain image `image_index`
pub fn write_scene_data(
    context: &RenderContext,
    uniforms: &SceneUniforms,
    data: &SceneFrameData,
    image_index: usize,
) -> VulkanResult<()> {
    let host = context.host_buffer();
    uniforms.entity_models.write(host, image_index, &data.entity_models)?;
    uniforms.light_models.write(host, image_index, &data.light_models)?;
    uniforms.lights.write(host, image_index, &data.lights)?;
    uniforms.materials.write(host, image_index, &data.materials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes_are_std140_multiples() {
        assert_eq!(std::mem::size_of::<ModelUbo>(), 128);
        assert_eq!(std::mem::size_of::<LightUbo>(), 144);
        assert_eq!(std::mem::size_of::<MaterialUbo>(), 16);
        assert_eq!(std::mem::offset_of!(LightUbo, position), 80);
        assert_eq!(std::mem::offset_of!(LightUbo, direction), 96);
        assert_eq!(std::mem::offset_of!(LightUbo, depth_bias), 112);
        assert_eq!(std::mem::offset_of!(LightUbo, ambient), 128);
    }

    #[test]
    fn test_model_ubo_composes_mvp() {
        let model = Mat4::new_translation(&crate::foundation::math::Vec3::new(1.0, 2.0, 3.0));
        let vp = Mat4::new_scaling(2.0);
        let ubo = ModelUbo::new(&model, &vp);
        let mvp: [[f32; 4]; 4] = (vp * model).into();
        assert_eq!(ubo.mvp, mvp);
        // Column-major: translation lives in the last column.
        assert_eq!(ubo.model[3][..3], [1.0, 2.0, 3.0]);
    }
}
