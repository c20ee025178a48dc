//! GLFW window wrapper with per-frame input state

use glfw::{Action, Key, MouseButton, WindowEvent};
use std::collections::HashSet;
use thiserror::Error;

use crate::config::WindowConfig;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window itself could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// Any other GLFW failure
    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// Keys and mouse buttons currently held, plus cursor movement since the last poll
#[derive(Debug, Default, Clone)]
pub struct InputState {
    keys_down: HashSet<i32>,
    buttons_down: HashSet<i32>,
    /// Cursor position in window coordinates
    pub mouse_position: (f64, f64),
    /// Cursor movement since the previous poll
    pub mouse_delta: (f64, f64),
}

impl InputState {
    /// Is `key` held down
    pub fn key_down(&self, key: Key) -> bool {
        self.keys_down.contains(&(key as i32))
    }

    /// Is `button` held down
    pub fn mouse_button_down(&self, button: MouseButton) -> bool {
        self.buttons_down.contains(&(button as i32))
    }

    /// Record a key transition
    pub fn set_key(&mut self, key: Key, down: bool) {
        if down {
            self.keys_down.insert(key as i32);
        } else {
            self.keys_down.remove(&(key as i32));
        }
    }

    /// Record a mouse-button transition
    pub fn set_mouse_button(&mut self, button: MouseButton, down: bool) {
        if down {
            self.buttons_down.insert(button as i32);
        } else {
            self.buttons_down.remove(&(button as i32));
        }
    }

    /// Record a new cursor position and update the delta
    pub fn set_mouse_position(&mut self, x: f64, y: f64) {
        self.mouse_delta = (x - self.mouse_position.0, y - self.mouse_position.1);
        self.mouse_position = (x, y);
    }

    fn apply(&mut self, event: &WindowEvent) {
        match *event {
            WindowEvent::Key(key, _, action, _) => self.set_key(key, action != Action::Release),
            WindowEvent::MouseButton(button, action, _) => self.set_mouse_button(button, action != Action::Release),
            _ => {}
        }
    }
}

/// GLFW window wrapper with proper resource management
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, WindowEvent)>,
    input: InputState,
}

impl Window {
    /// Create a window without a client API, ready for a Vulkan surface
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::GlfwError("Vulkan is not supported by GLFW on this system".to_string()));
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(false));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_pos(config.x, config.y);
        window.set_key_polling(true);
        window.set_mouse_button_polling(true);
        window.set_close_polling(true);

        let mut input = InputState::default();
        let (x, y) = window.get_cursor_pos();
        input.mouse_position = (x, y);

        log::info!("Created {}x{} window \"{}\"", config.width, config.height, config.title);

        Ok(Self {
            glfw,
            window,
            events,
            input,
        })
    }

    /// Has the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request the window to close at the end of this frame
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Pump GLFW events into the input state
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
        for (_, event) in glfw::flush_messages(&self.events) {
            self.input.apply(&event);
        }
        let (x, y) = self.window.get_cursor_pos();
        self.input.set_mouse_position(x, y);
    }

    /// Input gathered by the last [`Window::poll_events`]
    pub const fn input(&self) -> &InputState {
        &self.input
    }

    /// Framebuffer size in pixels
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    /// Get required Vulkan instance extensions from GLFW
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::GlfwError("Failed to get required extensions".to_string()))
    }

    /// Create Vulkan surface using GLFW's built-in functionality
    pub fn create_vulkan_surface(&mut self, instance: ash::vk::Instance) -> WindowResult<ash::vk::SurfaceKHR> {
        let mut surface = ash::vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == ash::vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::GlfwError(format!("Failed to create Vulkan surface: {result:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_state_tracks_press_and_release() {
        let mut input = InputState::default();
        input.set_key(Key::W, true);
        assert!(input.key_down(Key::W));
        assert!(!input.key_down(Key::S));

        input.set_key(Key::W, false);
        assert!(!input.key_down(Key::W));
    }

    #[test]
    fn test_mouse_delta() {
        let mut input = InputState::default();
        input.set_mouse_position(10.0, 20.0);
        input.set_mouse_position(15.0, 18.0);
        assert_eq!(input.mouse_delta, (5.0, -2.0));
        assert_eq!(input.mouse_position, (15.0, 18.0));
    }

    #[test]
    fn test_repeat_counts_as_held() {
        let mut input = InputState::default();
        input.apply(&WindowEvent::Key(Key::E, 0, Action::Repeat, glfw::Modifiers::empty()));
        assert!(input.key_down(Key::E));
        input.apply(&WindowEvent::MouseButton(MouseButton::Button2, Action::Press, glfw::Modifiers::empty()));
        assert!(input.mouse_button_down(MouseButton::Button2));
    }
}
