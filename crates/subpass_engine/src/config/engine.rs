//! Engine settings: window, Vulkan instance, backing-buffer sizes and frame pacing

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};

const MIB: u64 = 1024 * 1024;

/// Window creation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Client width in pixels
    pub width: u32,
    /// Client height in pixels
    pub height: u32,
    /// Initial x position on screen
    pub x: i32,
    /// Initial y position on screen
    pub y: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "subpass engine".to_string(),
            width: 1600,
            height: 900,
            x: 320,
            y: 180,
        }
    }
}

/// Vulkan instance parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Application name reported to the driver
    pub app_name: String,
    /// Enable `VK_LAYER_KHRONOS_validation` and the debug messenger
    pub enable_validation: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            app_name: "subpass engine".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

/// Sizes of the two backing buffers every region is carved from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Host-visible, coherent buffer (staging + per-frame uniforms)
    pub host_buffer_size: u64,
    /// Device-local buffer (vertex and index data)
    pub device_buffer_size: u64,
    /// Staging region carved out of the host buffer at startup
    pub staging_region_size: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            host_buffer_size: 256 * MIB,
            device_buffer_size: 256 * MIB,
            staging_region_size: 64 * MIB,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of frame slots cycled by the frame loop
    pub frames_in_flight: usize,
    /// Default log filter (overridden by `RUST_LOG`)
    pub log_level: String,
    /// Window settings
    pub window: WindowConfig,
    /// Instance settings
    pub instance: InstanceConfig,
    /// Backing-buffer settings
    pub memory: MemoryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            log_level: "info".to_string(),
            window: WindowConfig::default(),
            instance: InstanceConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Set the window title and instance application name together
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.instance.app_name.clone_from(&title);
        self.window.title = title;
        self
    }

    /// Set the window size
    pub const fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window.width = width;
        self.window.height = height;
        self
    }

    /// Reject settings the renderer cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 {
            return Err(ConfigError::Invalid("frames_in_flight must be at least 1".to_string()));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid("window size must be non-zero".to_string()));
        }

        let memory = &self.memory;
        if memory.host_buffer_size == 0 || memory.device_buffer_size == 0 || memory.staging_region_size == 0 {
            return Err(ConfigError::Invalid("buffer sizes must be non-zero".to_string()));
        }
        if memory.staging_region_size > memory.host_buffer_size {
            return Err(ConfigError::Invalid(format!(
                "staging region ({} bytes) does not fit in the host buffer ({} bytes)",
                memory.staging_region_size, memory.host_buffer_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.memory.host_buffer_size, 256 * MIB);
        assert_eq!(config.memory.staging_region_size, 64 * MIB);
    }

    #[test]
    fn test_staging_must_fit_in_host_buffer() {
        let mut config = EngineConfig::default();
        config.memory.staging_region_size = config.memory.host_buffer_size + 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_frames_in_flight_rejected() {
        let mut config = EngineConfig::default();
        config.frames_in_flight = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("frames_in_flight = 3\n[window]\ntitle = \"peel\"\n").unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.window.title, "peel");
        assert_eq!(config.window.width, 1600);
        assert_eq!(config.memory.device_buffer_size, 256 * MIB);
    }

    #[test]
    fn test_with_title_sets_app_name() {
        let config = EngineConfig::default().with_title("lighting");
        assert_eq!(config.window.title, "lighting");
        assert_eq!(config.instance.app_name, "lighting");
    }
}
