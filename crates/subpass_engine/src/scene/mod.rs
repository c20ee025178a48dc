//! Scene layer
//!
//! A [`Scene`] is a camera plus bounded lists of entities, lights and
//! materials. It is built from a [`SceneConfig`] against loaded assets, and
//! turned into per-frame uniform records by [`update_scene_data`].

mod camera;
mod config;
mod light;
mod uniforms;

pub use camera::{camera_controls, Camera, MAX_PITCH, MOUSE_SENSITIVITY, MOVE_STEP, VIEW_UP};
pub use config::{EntityConfig, SceneConfig};
pub use light::{
    Light, LightMode, Material, CUBE_FACE_AXES, DIRECTIONAL_SHADOW_EXTENT, DIRECTIONAL_SHADOW_FAR,
    DIRECTIONAL_SHADOW_NEAR, LIGHT_ATTENUATION, POINT_SHADOW_NEAR,
};
pub use uniforms::{
    update_scene_data, write_scene_data, LightUbo, MaterialUbo, ModelUbo, SceneFrameData, SceneUniforms,
};

use thiserror::Error;

use crate::assets::{Assets, Handle, Mesh, Texture};
use crate::config::ConfigError;
use crate::foundation::math::Transform;

/// Most entities a scene holds
pub const MAX_ENTITIES: usize = 1024;
/// Most lights a scene holds
pub const MAX_LIGHTS: usize = 16;
/// Most materials a scene holds
pub const MAX_MATERIALS: usize = 16;

/// Scene construction errors
#[derive(Error, Debug)]
pub enum SceneError {
    /// A list is full
    #[error("Scene holds at most {max} {kind}")]
    CapacityExceeded {
        /// Which list
        kind: &'static str,
        /// Its limit
        max: usize,
    },

    /// Entity names an asset or material that does not exist
    #[error("Unknown {kind} '{name}'")]
    UnknownAsset {
        /// Asset kind
        kind: &'static str,
        /// Requested name
        name: String,
    },

    /// Light attenuation index outside the table
    #[error("Attenuation index {0} out of range (0..{})", LIGHT_ATTENUATION.len())]
    InvalidAttenuationIndex(usize),

    /// Scene file could not be read
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;

/// Drawable object
#[derive(Debug, Clone)]
pub struct Entity {
    /// Display name
    pub name: String,
    /// Placement
    pub transform: Transform,
    /// Geometry
    pub mesh: Handle<Mesh>,
    /// Optional texture
    pub texture: Option<Handle<Texture>>,
    /// Index into the scene's materials
    pub material: usize,
}

/// Camera, entities, lights and materials
#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// Viewer
    pub camera: Camera,
    entities: Vec<Entity>,
    lights: Vec<Light>,
    materials: Vec<Material>,
}

impl Scene {
    /// Empty scene seen through `camera`
    pub const fn new(camera: Camera) -> Self {
        Self {
            camera,
            entities: Vec::new(),
            lights: Vec::new(),
            materials: Vec::new(),
        }
    }

    /// Append an entity, returning its index
    pub fn push_entity(&mut self, entity: Entity) -> SceneResult<usize> {
        push_bounded(&mut self.entities, entity, "entities", MAX_ENTITIES)
    }

    /// Append a light, returning its index
    pub fn push_light(&mut self, light: Light) -> SceneResult<usize> {
        if light.attenuation().is_none() {
            return Err(SceneError::InvalidAttenuationIndex(light.attenuation_index));
        }
        push_bounded(&mut self.lights, light, "lights", MAX_LIGHTS)
    }

    /// Append a material, returning its index
    pub fn push_material(&mut self, material: Material) -> SceneResult<usize> {
        push_bounded(&mut self.materials, material, "materials", MAX_MATERIALS)
    }

    /// Entities in draw order
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Mutable entities, for animation
    pub fn entities_mut(&mut self) -> &mut [Entity] {
        &mut self.entities
    }

    /// Lights
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Mutable lights
    pub fn lights_mut(&mut self) -> &mut [Light] {
        &mut self.lights
    }

    /// Materials
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// Index of the material called `name`
    pub fn material_index(&self, name: &str) -> Option<usize> {
        self.materials.iter().position(|m| m.name == name)
    }
}

fn push_bounded<T>(list: &mut Vec<T>, item: T, kind: &'static str, max: usize) -> SceneResult<usize> {
    if list.len() >= max {
        return Err(SceneError::CapacityExceeded { kind, max });
    }
    list.push(item);
    Ok(list.len() - 1)
}

/// Name to handle resolution used while building scenes
pub trait AssetLookup {
    /// Mesh called `name`
    fn mesh(&self, name: &str) -> Option<Handle<Mesh>>;
    /// Texture called `name`
    fn texture(&self, name: &str) -> Option<Handle<Texture>>;
}

impl AssetLookup for Assets {
    fn mesh(&self, name: &str) -> Option<Handle<Mesh>> {
        self.meshes.handle(name).ok()
    }

    fn texture(&self, name: &str) -> Option<Handle<Texture>> {
        self.textures.handle(name).ok()
    }
}

/// Build a scene from `config`, resolving asset names through `assets`
///
/// The camera's aspect ratio is replaced by `aspect`. A scene without
/// materials gets one default material so every entity has index 0 to
/// fall back on.
pub fn create_scene(config: &SceneConfig, assets: &impl AssetLookup, aspect: f32) -> SceneResult<Scene> {
    let mut scene = Scene::new(Camera { aspect, ..config.camera });

    for material in &config.materials {
        scene.push_material(material.clone())?;
    }
    if scene.materials.is_empty() {
        scene.push_material(Material::default())?;
    }

    for light in &config.lights {
        scene.push_light(*light)?;
    }

    for entity in &config.entities {
        let mesh = assets.mesh(&entity.mesh).ok_or_else(|| SceneError::UnknownAsset {
            kind: "mesh",
            name: entity.mesh.clone(),
        })?;
        let texture = match &entity.texture {
            Some(name) => Some(assets.texture(name).ok_or_else(|| SceneError::UnknownAsset {
                kind: "texture",
                name: name.clone(),
            })?),
            None => None,
        };
        let material = match &entity.material {
            Some(name) => scene.material_index(name).ok_or_else(|| SceneError::UnknownAsset {
                kind: "material",
                name: name.clone(),
            })?,
            None => 0,
        };

        scene.push_entity(Entity {
            name: entity.name.clone(),
            transform: entity.transform,
            mesh,
            texture,
            material,
        })?;
    }

    log::info!(
        "Scene created: {} entities, {} lights, {} materials",
        scene.entities.len(),
        scene.lights.len(),
        scene.materials.len()
    );
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetTable;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::vulkan::Region;
    use approx::assert_relative_eq;
    use ash::vk;

    struct FakeAssets {
        meshes: AssetTable<Mesh>,
    }

    impl FakeAssets {
        fn new(names: &[&str]) -> Self {
            let mut meshes = AssetTable::new("mesh");
            let region = Region {
                buffer: vk::Buffer::null(),
                offset: 0,
                size: 0,
            };
            for name in names {
                meshes.insert(*name, Mesh {
                    vertex_region: region,
                    index_region: region,
                    index_count: 0,
                });
            }
            Self { meshes }
        }
    }

    impl AssetLookup for FakeAssets {
        fn mesh(&self, name: &str) -> Option<Handle<Mesh>> {
            self.meshes.handle(name).ok()
        }

        fn texture(&self, _name: &str) -> Option<Handle<Texture>> {
            None
        }
    }

    fn entity(mesh: &str, position: Vec3) -> EntityConfig {
        EntityConfig {
            mesh: mesh.to_string(),
            transform: Transform::from_position(position),
            ..EntityConfig::default()
        }
    }

    const TWO_ENTITIES_ONE_LIGHT: &str = r#"
[camera]
fov = 60.0
[camera.transform]
position = [0.0, -2.0, -6.0]

[[entities]]
name = "box"
mesh = "cube"
material = "shiny"
[entities.transform]
position = [1.0, 0.0, 5.0]

[[entities]]
name = "card"
mesh = "quad"
[entities.transform]
position = [-2.0, 1.0, 3.0]
rotation = [0.0, 45.0, 0.0]
scale = [2.0, 2.0, 1.0]

[[lights]]
mode = "directional"
color = [1.0, 0.9, 0.8, 1.0]
attenuation_index = 3
[lights.transform]
position = [-4.0, -8.0, -2.0]
rotation = [60.0, 20.0, 0.0]

[[materials]]
name = "matte"
shine_exponent = 2

[[materials]]
name = "shiny"
shine_exponent = 48
"#;

    #[test]
    fn test_two_entities_one_light_frame_data() {
        let config: SceneConfig = toml::from_str(TWO_ENTITIES_ONE_LIGHT).unwrap();
        let assets = FakeAssets::new(&["cube", "quad"]);
        let scene = create_scene(&config, &assets, 4.0 / 3.0).unwrap();
        assert_relative_eq!(scene.camera.aspect, 4.0 / 3.0);
        assert_relative_eq!(scene.camera.fov, 60.0);
        assert_eq!(scene.entities()[0].material, 1);
        assert_eq!(scene.entities()[1].material, 0);

        let data = update_scene_data(&scene);
        assert_eq!(data.entity_models.len(), 2);
        assert_eq!(data.lights.len(), 1);
        assert_eq!(data.light_models.len(), 1);
        assert_eq!(data.materials.len(), 2);
        assert_eq!(data.materials[1].shine_exponent, 48);

        let projection = scene.camera.projection_matrix();
        let view = scene.camera.view_matrix();
        let positions = [Vec3::new(1.0, 0.0, 5.0), Vec3::new(-2.0, 1.0, 3.0)];
        for ((ubo, entity), position) in data.entity_models.iter().zip(scene.entities()).zip(positions) {
            assert_relative_eq!(entity.transform.position, position);
            let model = entity.transform.model_matrix();
            let expected = projection * view * model;
            assert_relative_eq!(Mat4::from(ubo.mvp), expected, epsilon = 1e-5);
            assert_relative_eq!(Mat4::from(ubo.model), model);
        }

        let light = &scene.lights()[0];
        let record = &data.lights[0];
        assert_eq!(record.mode, 0);
        assert_eq!(record.color, [1.0, 0.9, 0.8, 1.0]);
        assert_relative_eq!(Vec3::from(record.position), Vec3::new(-4.0, -8.0, -2.0));
        assert_relative_eq!(Vec3::from(record.direction), light.direction());
        assert_relative_eq!(record.linear, LIGHT_ATTENUATION[3].0);
        assert_relative_eq!(record.quadratic, LIGHT_ATTENUATION[3].1);
        assert_eq!(record.normal_bias, 16);
        assert_relative_eq!(record.far_clip, 50.0);
        assert_relative_eq!(Mat4::from(record.view_projection), light.view_projection(), epsilon = 1e-5);
        assert_relative_eq!(
            Mat4::from(data.light_models[0].model),
            light.transform.model_matrix()
        );
    }

    #[test]
    fn test_light_attenuation_copied_from_table() {
        let mut scene = Scene::default();
        scene
            .push_light(Light {
                attenuation_index: 5,
                ..Light::default()
            })
            .unwrap();
        let data = update_scene_data(&scene);
        assert_relative_eq!(data.lights[0].linear, LIGHT_ATTENUATION[5].0);
        assert_relative_eq!(data.lights[0].quadratic, LIGHT_ATTENUATION[5].1);
        assert_eq!(data.lights[0].normal_bias, 16);
    }

    #[test]
    fn test_unknown_mesh_is_reported() {
        let config = SceneConfig {
            entities: vec![entity("teapot", Vec3::zeros())],
            ..SceneConfig::default()
        };
        let err = create_scene(&config, &FakeAssets::new(&["cube"]), 1.0).unwrap_err();
        assert!(matches!(err, SceneError::UnknownAsset { kind: "mesh", ref name } if name == "teapot"));
    }

    #[test]
    fn test_unknown_texture_is_reported() {
        let config = SceneConfig {
            entities: vec![EntityConfig {
                texture: Some("wood".to_string()),
                ..entity("cube", Vec3::zeros())
            }],
            ..SceneConfig::default()
        };
        let err = create_scene(&config, &FakeAssets::new(&["cube"]), 1.0).unwrap_err();
        assert!(matches!(err, SceneError::UnknownAsset { kind: "texture", .. }));
    }

    #[test]
    fn test_materials_resolve_by_name() {
        let config = SceneConfig {
            entities: vec![
                entity("cube", Vec3::zeros()),
                EntityConfig {
                    material: Some("shiny".to_string()),
                    ..entity("cube", Vec3::zeros())
                },
            ],
            materials: vec![
                Material {
                    name: "matte".to_string(),
                    shine_exponent: 1,
                },
                Material {
                    name: "shiny".to_string(),
                    shine_exponent: 64,
                },
            ],
            ..SceneConfig::default()
        };
        let scene = create_scene(&config, &FakeAssets::new(&["cube"]), 1.0).unwrap();
        assert_eq!(scene.entities()[0].material, 0);
        assert_eq!(scene.entities()[1].material, 1);
        assert_eq!(update_scene_data(&scene).materials[1].shine_exponent, 64);
    }

    #[test]
    fn test_capacity_limits() {
        let mut scene = Scene::default();
        for _ in 0..MAX_LIGHTS {
            scene.push_light(Light::default()).unwrap();
        }
        let err = scene.push_light(Light::default()).unwrap_err();
        assert!(matches!(err, SceneError::CapacityExceeded { kind: "lights", max: MAX_LIGHTS }));

        for _ in 0..MAX_MATERIALS {
            scene.push_material(Material::default()).unwrap();
        }
        assert!(scene.push_material(Material::default()).is_err());
        assert_eq!(scene.materials().len(), MAX_MATERIALS);
    }

    #[test]
    fn test_bad_attenuation_index_rejected() {
        let mut scene = Scene::default();
        let err = scene
            .push_light(Light {
                attenuation_index: 99,
                ..Light::default()
            })
            .unwrap_err();
        assert!(matches!(err, SceneError::InvalidAttenuationIndex(99)));
        assert!(scene.lights().is_empty());
    }
}
