//! Lights and materials

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Mat4, Mat4Ext, Transform, Vec3};
use crate::scene::camera::VIEW_UP;

/// Linear and quadratic attenuation terms, nearest reach first
pub const LIGHT_ATTENUATION: [(f32, f32); 12] = [
    (0.7, 1.8),
    (0.35, 0.44),
    (0.22, 0.20),
    (0.14, 0.07),
    (0.09, 0.032),
    (0.07, 0.017),
    (0.045, 0.0075),
    (0.027, 0.0028),
    (0.022, 0.0019),
    (0.014, 0.0007),
    (0.007, 0.0002),
    (0.0014, 0.000_007),
];

/// Half-extent of the directional shadow frustum
pub const DIRECTIONAL_SHADOW_EXTENT: f32 = 30.0;
/// Near plane of the directional shadow frustum
pub const DIRECTIONAL_SHADOW_NEAR: f32 = 1.0;
/// Far plane of the directional shadow frustum
pub const DIRECTIONAL_SHADOW_FAR: f32 = 60.0;

/// Near plane of point-light shadow projections
pub const POINT_SHADOW_NEAR: f32 = 0.1;

/// `(direction, up)` of each cube shadow face in layer order +X, -X, +Y, -Y, +Z, -Z
///
/// Rendered without the Y flip so each face lands in its cube layer the way
/// cube sampling addresses it.
pub const CUBE_FACE_AXES: [([f32; 3], [f32; 3]); 6] = [
    ([1.0, 0.0, 0.0], [0.0, -1.0, 0.0]),
    ([-1.0, 0.0, 0.0], [0.0, -1.0, 0.0]),
    ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
    ([0.0, -1.0, 0.0], [0.0, 0.0, -1.0]),
    ([0.0, 0.0, 1.0], [0.0, -1.0, 0.0]),
    ([0.0, 0.0, -1.0], [0.0, -1.0, 0.0]),
];

/// How a light illuminates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightMode {
    /// Parallel rays along the light's forward vector
    Directional = 0,
    /// Radiates from the light's position
    #[default]
    Point = 1,
}

/// Scene light
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Light {
    /// Position, orientation and gizmo scale
    pub transform: Transform,
    /// Directional or point
    pub mode: LightMode,
    /// RGBA color
    pub color: [f32; 4],
    /// Shadow depth bias
    pub depth_bias: i32,
    /// Shadow normal bias
    pub normal_bias: i32,
    /// Ambient term
    pub ambient: f32,
    /// Index into [`LIGHT_ATTENUATION`]
    pub attenuation_index: usize,
    /// Far plane of point-light shadow projections
    pub far_clip: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            mode: LightMode::Point,
            color: [1.0; 4],
            depth_bias: 0,
            normal_bias: 16,
            ambient: 0.3,
            attenuation_index: 3,
            far_clip: 50.0,
        }
    }
}

impl Light {
    /// `(linear, quadratic)`, `None` when the index is out of range
    pub fn attenuation(&self) -> Option<(f32, f32)> {
        LIGHT_ATTENUATION.get(self.attenuation_index).copied()
    }

    /// Direction the light faces
    pub fn direction(&self) -> Vec3 {
        self.transform.forward()
    }

    /// View-projection used to render this light's shadow map
    ///
    /// Directional lights use a fixed orthographic box; point lights a
    /// 90 degree perspective along their forward vector.
    pub fn view_projection(&self) -> Mat4 {
        let position = self.transform.position;
        let view = Mat4::look_at(position, position + self.direction(), VIEW_UP);
        let projection = match self.mode {
            LightMode::Directional => Mat4::orthographic(
                -DIRECTIONAL_SHADOW_EXTENT,
                DIRECTIONAL_SHADOW_EXTENT,
                -DIRECTIONAL_SHADOW_EXTENT,
                DIRECTIONAL_SHADOW_EXTENT,
                DIRECTIONAL_SHADOW_NEAR,
                DIRECTIONAL_SHADOW_FAR,
            ),
            LightMode::Point => Mat4::perspective(90_f32.to_radians(), 1.0, POINT_SHADOW_NEAR, self.shadow_far()),
        };
        projection.flip_y() * view
    }

    /// Far plane of point-light shadows, kept beyond the near plane
    pub fn shadow_far(&self) -> f32 {
        self.far_clip.max(2.0 * POINT_SHADOW_NEAR)
    }

    /// View-projection of each cube shadow face, in [`CUBE_FACE_AXES`] order
    pub fn cube_face_view_projections(&self) -> [Mat4; 6] {
        let position = self.transform.position;
        let projection = Mat4::perspective(90_f32.to_radians(), 1.0, POINT_SHADOW_NEAR, self.shadow_far());
        CUBE_FACE_AXES.map(|(direction, up)| {
            projection * Mat4::look_at(position, position + Vec3::from(direction), Vec3::from(up))
        })
    }
}

/// Surface parameters shared by entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    /// Lookup name
    pub name: String,
    /// Specular exponent
    pub shine_exponent: u32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            shine_exponent: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let light = Light::default();
        assert_eq!(light.mode, LightMode::Point);
        assert_eq!(light.color, [1.0; 4]);
        assert_eq!(light.normal_bias, 16);
        assert_relative_eq!(light.ambient, 0.3);
        assert_eq!(light.attenuation(), Some((0.14, 0.07)));
        assert_eq!(Material::default().shine_exponent, 2);
    }

    #[test]
    fn test_attenuation_out_of_range() {
        let light = Light {
            attenuation_index: LIGHT_ATTENUATION.len(),
            ..Light::default()
        };
        assert_eq!(light.attenuation(), None);
    }

    #[test]
    fn test_directional_shadow_box() {
        let light = Light {
            mode: LightMode::Directional,
            transform: Transform::from_position(Vec3::new(0.0, -10.0, 0.0)),
            ..Light::default()
        };
        let vp = light.view_projection();

        // Forward is +Z; a point 30 units ahead sits mid-way through the 1..60 range.
        let mid = vp * Vec4::new(0.0, -10.0, 30.5, 1.0);
        assert_relative_eq!(mid.w, 1.0, epsilon = 1e-5);
        assert_relative_eq!(mid.z, 0.5, epsilon = 1e-4);

        let edge = vp * Vec4::new(30.0, -10.0, 10.0, 1.0);
        assert_relative_eq!(edge.x.abs(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_mode_parses_lowercase() {
        let light: Light = toml::from_str("mode = \"directional\"\nattenuation_index = 8\n").unwrap();
        assert_eq!(light.mode, LightMode::Directional);
        assert_eq!(light.attenuation_index, 8);
        assert_eq!(light.normal_bias, 16);
    }

    /// Project `offset` from the light through the face its major axis selects
    fn face_ndc(light: &Light, face: usize, offset: Vec3) -> Vec3 {
        let position = light.transform.position + offset;
        let clip = light.cube_face_view_projections()[face] * Vec4::new(position.x, position.y, position.z, 1.0);
        Vec3::new(clip.x, clip.y, clip.z) / clip.w
    }

    #[test]
    fn test_cube_faces_match_cube_sampling() {
        let light = Light {
            transform: Transform::from_position(Vec3::new(2.0, -3.0, 1.0)),
            far_clip: 20.0,
            ..Light::default()
        };

        // A direction with major axis m maps to face coordinates (sc, tc) / |m|,
        // which must equal the face's (x, y) in normalized device coordinates.
        let cases = [
            (0, Vec3::new(1.0, 0.5, 0.25), (-0.25, -0.5)),
            (1, Vec3::new(-1.0, 0.5, 0.25), (0.25, -0.5)),
            (2, Vec3::new(0.5, 1.0, 0.25), (0.5, 0.25)),
            (3, Vec3::new(0.5, -1.0, 0.25), (0.5, -0.25)),
            (4, Vec3::new(0.5, 0.25, 1.0), (0.5, -0.25)),
            (5, Vec3::new(0.5, 0.25, -1.0), (-0.5, -0.25)),
        ];
        for (face, offset, (s, t)) in cases {
            let ndc = face_ndc(&light, face, offset * 4.0);
            assert_relative_eq!(ndc.x, s, epsilon = 1e-5);
            assert_relative_eq!(ndc.y, t, epsilon = 1e-5);
            assert!(ndc.z > 0.0 && ndc.z < 1.0);
        }
    }

    #[test]
    fn test_cube_faces_share_far_plane() {
        let light = Light {
            far_clip: 10.0,
            ..Light::default()
        };
        for face in 0..6 {
            let (direction, _) = CUBE_FACE_AXES[face];
            let far = face_ndc(&light, face, Vec3::from(direction) * 10.0);
            assert_relative_eq!(far.z, 1.0, epsilon = 1e-4);
            let near = face_ndc(&light, face, Vec3::from(direction) * POINT_SHADOW_NEAR);
            assert_relative_eq!(near.z, 0.0, epsilon = 1e-4);
        }

        let tiny = Light {
            far_clip: 0.0,
            ..Light::default()
        };
        assert_relative_eq!(tiny.shadow_far(), 2.0 * POINT_SHADOW_NEAR);
    }
}
