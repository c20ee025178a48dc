//! Free-fly perspective camera
//!
//! The camera is a [`Transform`] plus projection parameters. Its view looks
//! along the transform's forward row with `-Y` as up, so world space is
//! y-down like Vulkan clip space. The projection's `[1][1]` element is
//! negated to land in Vulkan's y-down clip space.

use glfw::{Key, MouseButton};
use serde::{Deserialize, Serialize};

use crate::foundation::math::{Mat4, Mat4Ext, Transform, Vec3};
use crate::render::vulkan::InputState;

/// Up vector every view matrix is built with
pub const VIEW_UP: Vec3 = Vec3::new(0.0, -1.0, 0.0);

/// Degrees of rotation per pixel of mouse movement
pub const MOUSE_SENSITIVITY: f32 = 0.4;

/// Pitch limit in degrees
pub const MAX_PITCH: f32 = 80.0;

/// Translation per frame at modifier 1
pub const MOVE_STEP: f32 = 0.01;

/// Perspective camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    /// Position and Euler rotation; scale is ignored
    pub transform: Transform,
    /// Vertical field of view in degrees
    pub fov: f32,
    /// Width over height
    pub aspect: f32,
    /// Near clip distance
    pub z_near: f32,
    /// Far clip distance
    pub z_far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            fov: 90.0,
            aspect: 16.0 / 9.0,
            z_near: 0.1,
            z_far: 100.0,
        }
    }
}

impl Camera {
    /// Look-at view along the transform's forward vector
    pub fn view_matrix(&self) -> Mat4 {
        let position = self.transform.position;
        Mat4::look_at(position, position + self.transform.forward(), VIEW_UP)
    }

    /// Zero-to-one depth perspective with y flipped for Vulkan
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective(self.fov.to_radians(), self.aspect, self.z_near, self.z_far).flip_y()
    }

    /// `projection * view`
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Mouse-look with the right button held, WASD/QE movement
///
/// Shift moves at 4x, control at 1x, otherwise 2x.
pub fn camera_controls(transform: &mut Transform, input: &InputState) {
    if input.mouse_button_down(MouseButton::Button2) {
        let (dx, dy) = input.mouse_delta;
        transform.rotation.x += dy as f32 * MOUSE_SENSITIVITY;
        transform.rotation.y -= dx as f32 * MOUSE_SENSITIVITY;
        transform.rotation.x = transform.rotation.x.clamp(-MAX_PITCH, MAX_PITCH);
    }

    let modifier = if input.key_down(Key::LeftShift) {
        4.0
    } else if input.key_down(Key::LeftControl) {
        1.0
    } else {
        2.0
    };
    let step = MOVE_STEP * modifier;

    let mut translation = Vec3::zeros();
    if input.key_down(Key::W) {
        translation.z += step;
    }
    if input.key_down(Key::S) {
        translation.z -= step;
    }
    if input.key_down(Key::D) {
        translation.x += step;
    }
    if input.key_down(Key::A) {
        translation.x -= step;
    }
    if input.key_down(Key::E) {
        translation.y -= step;
    }
    if input.key_down(Key::Q) {
        translation.y += step;
    }
    transform.local_translate(translation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Point3, Vec4};
    use approx::assert_relative_eq;

    #[test]
    fn test_view_projection_composition() {
        let camera = Camera {
            transform: Transform {
                position: Vec3::new(10.0, -5.0, 14.0),
                rotation: Vec3::new(45.0, 0.0, 0.0),
                ..Transform::default()
            },
            ..Camera::default()
        };
        assert_relative_eq!(
            camera.view_projection(),
            camera.projection_matrix() * camera.view_matrix(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let unflipped = Mat4::perspective(camera.fov.to_radians(), camera.aspect, camera.z_near, camera.z_far);
        assert_relative_eq!(camera.projection_matrix()[(1, 1)], -unflipped[(1, 1)]);
    }

    #[test]
    fn test_point_ahead_lands_in_depth_range() {
        let camera = Camera::default();
        let ahead = camera.transform.position + camera.transform.forward() * 10.0;
        let clip = camera.view_projection() * Vec4::new(ahead.x, ahead.y, ahead.z, 1.0);
        let depth = clip.z / clip.w;
        assert!(depth > 0.0 && depth < 1.0, "depth {depth}");
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-5);

        let view = camera.view_matrix().transform_point(&Point3::from(ahead));
        assert_relative_eq!(view.z, -10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_keys_move_along_local_axes() {
        let mut input = InputState::default();
        input.set_key(Key::W, true);
        let mut transform = Transform::default();
        camera_controls(&mut transform, &input);
        assert_relative_eq!(transform.position, Vec3::new(0.0, 0.0, 0.02), epsilon = 1e-6);

        input.set_key(Key::LeftShift, true);
        input.set_key(Key::D, true);
        let mut transform = Transform::default();
        camera_controls(&mut transform, &input);
        assert_relative_eq!(transform.position, Vec3::new(0.04, 0.0, 0.04), epsilon = 1e-6);
    }

    #[test]
    fn test_control_is_slowest() {
        let mut input = InputState::default();
        input.set_key(Key::LeftControl, true);
        input.set_key(Key::E, true);
        let mut transform = Transform::default();
        camera_controls(&mut transform, &input);
        assert_relative_eq!(transform.position.y, -0.01, epsilon = 1e-6);
    }

    #[test]
    fn test_mouse_look_needs_right_button_and_clamps_pitch() {
        let mut input = InputState::default();
        input.set_mouse_position(0.0, 0.0);
        input.set_mouse_position(10.0, 1000.0);

        let mut transform = Transform::default();
        camera_controls(&mut transform, &input);
        assert_relative_eq!(transform.rotation, Vec3::zeros());

        input.set_mouse_button(MouseButton::Button2, true);
        camera_controls(&mut transform, &input);
        assert_relative_eq!(transform.rotation.x, MAX_PITCH);
        assert_relative_eq!(transform.rotation.y, -4.0, epsilon = 1e-5);
    }
}
