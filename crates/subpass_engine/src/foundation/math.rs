//! Math utilities and types
//!
//! nalgebra aliases plus the handful of matrix builders the renderer needs.
//! All matrices are column-major and follow Vulkan clip conventions
//! (depth in `[0, 1]`, y pointing down after projection).

use serde::{Deserialize, Serialize};

pub use nalgebra::{Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Position, Euler rotation in degrees (applied X, then Y, then Z) and scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    /// World-space position
    pub position: Vec3,
    /// Rotation around X, Y and Z in degrees
    pub rotation: Vec3,
    /// Per-axis scale
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Vec3::zeros(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Transform at `position` with no rotation and unit scale
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// `Rx * Ry * Rz` for this transform's rotation
    pub fn rotation_matrix(&self) -> Mat4 {
        Mat4::rotation_x(self.rotation.x.to_radians())
            * Mat4::rotation_y(self.rotation.y.to_radians())
            * Mat4::rotation_z(self.rotation.z.to_radians())
    }

    /// Model matrix: `T * Rx * Ry * Rz * S`
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation_matrix()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Forward direction: the third row of the rotation matrix
    pub fn forward(&self) -> Vec3 {
        let m = self.rotation_matrix();
        Vec3::new(m[(2, 0)], m[(2, 1)], m[(2, 2)])
    }

    /// Move along the transform's own right/up/forward axes
    pub fn local_translate(&mut self, translation: Vec3) {
        let world = self.rotation_matrix() * Mat4::new_translation(&self.position);
        let right = Vec3::new(world[(0, 0)], world[(0, 1)], world[(0, 2)]);
        let up = Vec3::new(world[(1, 0)], world[(1, 1)], world[(1, 2)]);
        let forward = Vec3::new(world[(2, 0)], world[(2, 1)], world[(2, 2)]);
        self.position += right * translation.x + up * translation.y + forward * translation.z;
    }
}

/// Matrix builders used by cameras and lights
pub trait Mat4Ext {
    /// Rotation around the X axis (radians)
    fn rotation_x(angle: f32) -> Mat4;

    /// Rotation around the Y axis (radians)
    fn rotation_y(angle: f32) -> Mat4;

    /// Rotation around the Z axis (radians)
    fn rotation_z(angle: f32) -> Mat4;

    /// Right-handed perspective projection with depth mapped to `[0, 1]`
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed orthographic projection with depth mapped to `[0, 1]`
    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Negate the y scale so a projection built for y-up lands in Vulkan's y-down clip space
    fn flip_y(self) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn rotation_x(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::x_axis(), angle)
    }

    fn rotation_y(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::y_axis(), angle)
    }

    fn rotation_z(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::z_axis(), angle)
    }

    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (near - far);
        result[(3, 2)] = -1.0;
        result[(2, 3)] = -(far * near) / (far - near);
        result
    }

    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        let mut result = Mat4::identity();
        result[(0, 0)] = 2.0 / (right - left);
        result[(1, 1)] = 2.0 / (top - bottom);
        result[(2, 2)] = -1.0 / (far - near);
        result[(0, 3)] = -(right + left) / (right - left);
        result[(1, 3)] = -(top + bottom) / (top - bottom);
        result[(2, 3)] = -near / (far - near);
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        Mat4::new(
            right.x, right.y, right.z, -right.dot(&eye),
            camera_up.x, camera_up.y, camera_up.z, -camera_up.dot(&eye),
            -forward.x, -forward.y, -forward.z, forward.dot(&eye),
            0.0, 0.0, 0.0, 1.0,
        )
    }

    fn flip_y(mut self) -> Mat4 {
        self[(1, 1)] *= -1.0;
        self
    }
}

/// Round `value` up to the next multiple of `alignment`
///
/// `None` when `alignment` is zero or the rounded value does not fit in a `u64`.
pub const fn align_up(value: u64, alignment: u64) -> Option<u64> {
    value.checked_next_multiple_of(alignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_default_transform_is_identity() {
        let transform = Transform::default();
        assert_relative_eq!(transform.model_matrix(), Mat4::identity(), epsilon = EPSILON);
    }

    #[test]
    fn test_model_matrix_order() {
        let transform = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Vec3::new(0.0, 90.0, 0.0),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };

        // Scale first, then rotate +90 around Y (x -> -z), then translate.
        let p = transform.model_matrix().transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(1.0, 2.0, 1.0), epsilon = EPSILON);
    }

    #[test]
    fn test_forward_without_rotation_is_z() {
        assert_relative_eq!(Transform::default().forward(), Vec3::z(), epsilon = EPSILON);
    }

    #[test]
    fn test_local_translate_follows_rotation() {
        let mut transform = Transform::default();
        transform.rotation.y = 90.0;
        transform.local_translate(Vec3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(transform.position, transform.forward(), epsilon = EPSILON);
        assert_relative_eq!(transform.position.norm(), 1.0, epsilon = EPSILON);
    }

    #[test]
    fn test_perspective_depth_range() {
        let proj = Mat4::perspective(90_f32.to_radians(), 1.0, 0.1, 100.0);

        let near = proj * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = EPSILON);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = EPSILON);
    }

    #[test]
    fn test_flip_y() {
        let proj = Mat4::perspective(1.0, 1.5, 0.1, 10.0);
        let flipped = proj.flip_y();
        assert_relative_eq!(flipped[(1, 1)], -proj[(1, 1)]);
        assert_relative_eq!(flipped[(0, 0)], proj[(0, 0)]);
    }

    #[test]
    fn test_look_at_maps_target_onto_negative_z() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let target = Vec3::new(1.0, 2.0, 10.0);
        let view = Mat4::look_at(eye, target, Vec3::new(0.0, -1.0, 0.0));

        let p = view.transform_point(&Point3::from(target));
        assert_relative_eq!(p, Point3::new(0.0, 0.0, -7.0), epsilon = EPSILON);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), Some(0));
        assert_eq!(align_up(1, 4), Some(4));
        assert_eq!(align_up(256, 256), Some(256));
        assert_eq!(align_up(257, 256), Some(512));
    }

    #[test]
    fn test_align_up_overflow_and_zero_alignment() {
        assert_eq!(align_up(u64::MAX, 4), None);
        assert_eq!(align_up(u64::MAX - 2, 256), None);
        assert_eq!(align_up(u64::MAX, 1), Some(u64::MAX));
        assert_eq!(align_up(8, 0), None);
    }
}
