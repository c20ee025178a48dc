//! Vulkan context: instance, physical device selection, logical device and surface
//!
//! Owns the objects that live for the whole run. Everything created later
//! (swapchain, buffers, render passes) borrows or clones the `ash::Device`
//! held here and must be dropped before this context.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};
use std::ffi::{c_char, CStr, CString};
use thiserror::Error;

use crate::config::InstanceConfig;
use crate::render::vulkan::window::Window;

/// Failures raised while talking to the driver or validating a render graph
#[derive(Error, Debug)]
pub enum VulkanError {
    /// Bare result code from a call that was not tagged
    #[error("driver returned {0:?}")]
    Api(vk::Result),

    /// A named Vulkan call failed
    #[error("{call} failed: {result:?}")]
    ApiCall {
        /// Name of the failing call
        call: &'static str,
        /// Result code returned by the driver
        result: vk::Result,
    },

    /// Request that cannot be honoured with the objects at hand
    #[error("invalid operation: {reason}")]
    InvalidOperation {
        /// What was wrong with the request
        reason: String,
    },

    /// A buffer or image allocation did not fit
    #[error("could not allocate {requested} bytes")]
    OutOfMemory {
        /// Bytes asked for
        requested: u64,
    },

    /// A region allocation would run past the end of its backing buffer
    #[error("Region of {requested} bytes at offset {offset} exceeds buffer capacity of {capacity} bytes")]
    RegionCapacityExceeded {
        /// Aligned size that was requested
        requested: u64,
        /// Aligned offset the region would have started at
        offset: u64,
        /// Capacity of the backing buffer
        capacity: u64,
    },

    /// More descriptor sets declared than the pool's max-sets ceiling
    #[error("Descriptor pool needs {requested} sets but the ceiling is {max_sets}")]
    DescriptorPoolExhausted {
        /// Sets required by the declared descriptor set infos
        requested: u32,
        /// Fixed ceiling
        max_sets: u32,
    },

    /// Instance, surface or device bring-up failed
    #[error("startup failed: {0}")]
    InitializationFailed(String),

    /// None of the device memory types satisfy the requested properties
    #[error("no memory type matches the requested properties")]
    NoSuitableMemoryType,

    /// A render graph description is inconsistent
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl VulkanError {
    /// Build a `map_err` adapter that tags a result code with the failing call's name
    pub fn call(call: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::ApiCall { call, result }
    }
}

/// Shorthand used by every render module
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Loaded entry points plus the instance, and the validation messenger when enabled
pub struct VulkanInstance {
    /// Loader function table
    pub entry: Entry,
    /// Instance-level function table
    pub instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Load the loader and create the instance; validation layers follow `config`
    pub fn new(window: &Window, config: &InstanceConfig) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("loading libvulkan: {e:?}")))?;

        let app_name = CString::new(config.app_name.as_str())
            .map_err(|e| VulkanError::InitializationFailed(format!("application name {:?}: {e}", config.app_name)))?;
        let engine_name = c"subpass_engine";
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(format!("window extensions: {e}")))?;
        let mut extension_names = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VulkanError::InitializationFailed(format!("extension name: {e}")))?;
        if config.enable_validation {
            extension_names.push(DebugUtils::name().to_owned());
        }
        let extensions: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();

        let layer_names: Vec<&CStr> = if config.enable_validation {
            vec![c"VK_LAYER_KHRONOS_validation"]
        } else {
            Vec::new()
        };
        let layers: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::call("vkCreateInstance"))?
        };

        let debug = if config.enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            Some((debug_utils, messenger))
        } else {
            None
        };

        log::debug!(
            "Created Vulkan instance (validation: {}, {} extensions)",
            config.enable_validation,
            extensions.len()
        );

        Ok(Self { entry, instance, debug })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::call("vkCreateDebugUtilsMessengerEXT"))
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Forward validation messages into the `log` facade
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let text = CStr::from_ptr((*data).p_message).to_string_lossy();
    log::log!(target: "vulkan", validation_level(severity), "{kind:?}: {text}");
    vk::FALSE
}

fn validation_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else {
        log::Level::Debug
    }
}

/// First graphics-capable family and first family that can present, in that order
fn pick_queue_families(
    flags: impl IntoIterator<Item = vk::QueueFlags>,
    mut can_present: impl FnMut(u32) -> VulkanResult<bool>,
) -> VulkanResult<(Option<u32>, Option<u32>)> {
    let mut graphics = None;
    let mut present = None;
    for (index, flags) in (0u32..).zip(flags) {
        if graphics.is_none() && flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
        }
        if present.is_none() && can_present(index)? {
            present = Some(index);
        }
        if graphics.is_some() && present.is_some() {
            break;
        }
    }
    Ok((graphics, present))
}

/// The GPU picked for rendering and what was learned about it while picking
pub struct PhysicalDeviceInfo {
    /// Raw handle
    pub device: vk::PhysicalDevice,
    /// Name and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Heaps and memory types, searched by buffer and image allocation
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Family queried for the graphics queue
    pub graphics_family: u32,
    /// Family queried for the present queue
    pub present_family: u32,
    /// First entry of the candidate list usable as an optimal-tiling depth attachment
    pub depth_format: vk::Format,
}

/// Depth formats in order of preference; stencil-capable first for the stencil demo
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT,
];

impl PhysicalDeviceInfo {
    /// First enumerated device that can draw, present to `surface` and create swapchains
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::call("vkEnumeratePhysicalDevices"))?
        };

        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader) {
                Ok(device_info) => {
                    log::info!("Rendering on {}", device_info.name());
                    return Ok(device_info);
                }
                Err(e) => log::debug!("Rejected physical device: {e}"),
            }
        }

        Err(VulkanError::InitializationFailed("no physical device can render to this window".to_string()))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let (graphics_family, present_family) =
            pick_queue_families(queue_families.iter().map(|family| family.queue_flags), |index| unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::call("vkGetPhysicalDeviceSurfaceSupportKHR"))
            })?;
        let graphics_family = graphics_family
            .ok_or_else(|| VulkanError::InitializationFailed("device has no graphics queue".to_string()))?;
        let present_family = present_family
            .ok_or_else(|| VulkanError::InitializationFailed("device cannot present to the surface".to_string()))?;

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::call("vkEnumerateDeviceExtensionProperties"))?
        };
        let has_swapchain = extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Err(VulkanError::InitializationFailed(
                "VK_KHR_swapchain is not available".to_string(),
            ));
        }

        let depth_format = DEPTH_FORMAT_CANDIDATES
            .into_iter()
            .find(|&format| {
                let props = unsafe { instance.get_physical_device_format_properties(device, format) };
                props
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .ok_or_else(|| VulkanError::InitializationFailed("no depth attachment format is supported".to_string()))?;

        Ok(Self {
            device,
            properties,
            memory_properties,
            graphics_family,
            present_family,
            depth_format,
        })
    }

    /// Human-readable device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Alignment required for uniform-buffer descriptor offsets
    pub const fn min_uniform_alignment(&self) -> u64 {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }
}

/// Device handle and the two queues the renderer submits to, which may be the same queue
pub struct LogicalDevice {
    /// Device-level function table
    pub device: Device,
    /// Receives every command buffer submission
    pub graphics_queue: vk::Queue,
    /// Receives swapchain presents
    pub present_queue: vk::Queue,
}

impl LogicalDevice {
    /// One queue per distinct family, swapchain extension enabled
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let mut families = vec![physical_device_info.graphics_family, physical_device_info.present_family];
        families.dedup();

        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];
        let device_features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(false).build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::call("vkCreateDevice"))?
        };

        let graphics_queue = unsafe { device.get_device_queue(physical_device_info.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device_info.present_family, 0) };

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Instance, surface, physical and logical device for one window
///
/// Field order is drop order: the device goes before the instance.
pub struct VulkanContext {
    /// Window surface the swapchain presents to
    pub surface: vk::SurfaceKHR,
    /// `VK_KHR_surface` function table
    pub surface_loader: Surface,
    /// Chosen GPU
    pub physical_device: PhysicalDeviceInfo,
    /// Device and queues
    pub device: LogicalDevice,
    /// Instance and validation messenger
    pub instance: VulkanInstance,
}

impl VulkanContext {
    /// Bring up everything needed to render into `window`
    pub fn new(window: &mut Window, config: &InstanceConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, config)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("window surface: {e}")))?;

        let physical_device = PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &surface_loader)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device)?;

        Ok(Self {
            surface,
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// Instance function table
    pub const fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Device function table
    pub const fn device(&self) -> &Device {
        &self.device.device
    }

    /// Queue for submissions
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Queue for presents
    pub const fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Family the command pool allocates from
    pub const fn graphics_queue_family(&self) -> u32 {
        self.physical_device.graphics_family
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
