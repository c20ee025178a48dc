//! Scene description files

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::foundation::math::Transform;
use crate::scene::camera::Camera;
use crate::scene::light::{Light, Material};

/// One entity as written in a scene file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Display name
    pub name: String,
    /// Mesh asset name
    pub mesh: String,
    /// Texture asset name
    pub texture: Option<String>,
    /// Material name; the first material when absent
    pub material: Option<String>,
    /// Placement
    pub transform: Transform,
}

/// Camera, entities, lights and materials of one scene
///
/// The camera's aspect ratio is replaced with the swapchain's when the scene
/// is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Initial camera
    pub camera: Camera,
    /// Entities in draw order
    pub entities: Vec<EntityConfig>,
    /// Lights
    pub lights: Vec<Light>,
    /// Materials
    pub materials: Vec<Material>,
}

impl Config for SceneConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::scene::light::LightMode;
    use approx::assert_relative_eq;

    const SCENE: &str = r#"
[camera]
fov = 75.0
[camera.transform]
position = [10.0, -5.0, 14.0]
rotation = [45.0, 0.0, 0.0]

[[entities]]
name = "floor"
mesh = "quad"
texture = "wood"
[entities.transform]
rotation = [-90.0, 0.0, 0.0]
scale = [32.0, 32.0, 1.0]

[[entities]]
mesh = "cube"
material = "shiny"

[[lights]]
mode = "directional"
depth_bias = 1
[lights.transform]
position = [8.0, -4.0, 15.5]

[[materials]]
name = "shiny"
shine_exponent = 32
"#;

    #[test]
    fn test_parse_scene_toml() {
        let config: SceneConfig = toml::from_str(SCENE).unwrap();

        assert_relative_eq!(config.camera.fov, 75.0);
        assert_relative_eq!(config.camera.z_far, 100.0);
        assert_relative_eq!(config.camera.transform.position, Vec3::new(10.0, -5.0, 14.0));

        assert_eq!(config.entities.len(), 2);
        assert_eq!(config.entities[0].texture.as_deref(), Some("wood"));
        assert_relative_eq!(config.entities[0].transform.scale, Vec3::new(32.0, 32.0, 1.0));
        assert_relative_eq!(config.entities[1].transform.scale, Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(config.entities[1].material.as_deref(), Some("shiny"));

        assert_eq!(config.lights[0].mode, LightMode::Directional);
        assert_eq!(config.lights[0].depth_bias, 1);
        assert_eq!(config.lights[0].normal_bias, 16);
        assert_eq!(config.materials[0].shine_exponent, 32);
    }

    #[test]
    fn test_ron_scene() {
        let config: SceneConfig = ron::from_str(
            "(entities: [(mesh: \"cube\", texture: Some(\"wood\"))], lights: [(attenuation_index: 8)])",
        )
        .unwrap();
        assert_eq!(config.entities[0].mesh, "cube");
        assert_eq!(config.entities[0].texture.as_deref(), Some("wood"));
        assert_relative_eq!(config.entities[0].transform.scale, Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(config.lights[0].attenuation_index, 8);
    }
}
