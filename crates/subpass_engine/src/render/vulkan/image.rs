//! Images with bound memory and a matching view, samplers and texture upload

use ash::{vk, Device};

use crate::render::vulkan::buffer::{find_memory_type, Buffer};
use crate::render::vulkan::commands::{CommandPool, CommandRecorder};
use crate::render::vulkan::region::Region;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Everything needed to create an [`Image`]
#[derive(Debug, Clone, Copy)]
pub struct ImageInfo {
    /// Pixel format of both the image and its view
    pub format: vk::Format,
    /// Size in pixels
    pub extent: vk::Extent2D,
    /// Tiling mode
    pub tiling: vk::ImageTiling,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Memory properties for the backing allocation
    pub memory_properties: vk::MemoryPropertyFlags,
    /// Aspect the view covers
    pub aspect_mask: vk::ImageAspectFlags,
    /// View type (2D or cube)
    pub view_type: vk::ImageViewType,
    /// Array layers (6 for cube maps)
    pub layers: u32,
}

impl ImageInfo {
    /// Device-local 2D attachment image, aspect derived from the format
    pub fn attachment(format: vk::Format, extent: vk::Extent2D, usage: vk::ImageUsageFlags) -> Self {
        Self {
            format,
            extent,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            aspect_mask: aspect_for_format(format),
            view_type: vk::ImageViewType::TYPE_2D,
            layers: 1,
        }
    }

    /// RGBA8 sRGB texture that receives a transfer then gets sampled
    pub fn texture(extent: vk::Extent2D) -> Self {
        Self::attachment(
            vk::Format::R8G8B8A8_SRGB,
            extent,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )
    }
}

/// Aspect flags implied by a format: depth (and stencil) for depth formats, color otherwise
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT | vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 => vk::ImageAspectFlags::DEPTH,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// GPU image, its memory and one view over all layers
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    info: ImageInfo,
}

impl Image {
    /// Create the image, bind memory and create a view of the same format
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        info: ImageInfo,
    ) -> VulkanResult<Self> {
        let flags = if info.view_type == vk::ImageViewType::CUBE {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let image_create_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(info.layers)
            .format(info.format)
            .tiling(info.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device
                .create_image(&image_create_info, None)
                .map_err(VulkanError::call("vkCreateImage"))?
        };

        let memory = match Self::allocate_and_bind(&device, memory_properties, image, info.memory_properties) {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                return Err(err);
            }
        };

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(info.view_type)
            .format(info.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: info.aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: info.layers,
            });

        let view = match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(result) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(VulkanError::call("vkCreateImageView")(result));
            }
        };

        Ok(Self {
            device,
            image,
            memory,
            view,
            info,
        })
    }

    fn allocate_and_bind(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        image: vk::Image,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<vk::DeviceMemory> {
        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = find_memory_type(memory_properties, requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        unsafe {
            let memory = device
                .allocate_memory(&alloc_info, None)
                .map_err(|_| VulkanError::OutOfMemory {
                    requested: requirements.size,
                })?;
            if let Err(result) = device.bind_image_memory(image, memory, 0) {
                device.free_memory(memory, None);
                return Err(VulkanError::call("vkBindImageMemory")(result));
            }
            Ok(memory)
        }
    }

    /// Image handle
    pub const fn handle(&self) -> vk::Image {
        self.image
    }

    /// View handle
    pub const fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Format shared by image and view
    pub const fn format(&self) -> vk::Format {
        self.info.format
    }

    /// Size in pixels
    pub const fn extent(&self) -> vk::Extent2D {
        self.info.extent
    }

    /// Creation parameters
    pub const fn info(&self) -> &ImageInfo {
        &self.info
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Stage and access masks for one layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Stages that must finish before the transition
    pub src_stage: vk::PipelineStageFlags,
    /// Stages that wait on the transition
    pub dst_stage: vk::PipelineStageFlags,
    /// Writes made available
    pub src_access: vk::AccessFlags,
    /// Accesses made visible
    pub dst_access: vk::AccessFlags,
}

/// Masks for the transitions texture upload and cube shadow maps perform
pub fn layout_transition(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<LayoutTransition> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok(LayoutTransition {
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::SHADER_READ,
        }),
        (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(LayoutTransition {
            src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
            src_access: vk::AccessFlags::SHADER_READ,
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
        }),
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(LayoutTransition {
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok(LayoutTransition {
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
        }),
        _ => Err(VulkanError::InvalidOperation {
            reason: format!("unsupported layout transition {old:?} -> {new:?}"),
        }),
    }
}

fn transition_barrier(
    image: &Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    transition: &LayoutTransition,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image.handle())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: image.info.aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: image.info.layers,
        })
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access)
        .build()
}

/// Record a barrier moving every layer of `image` from `old` to `new`
pub fn record_layout_transition(
    recorder: &mut CommandRecorder,
    image: &Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> VulkanResult<()> {
    let transition = layout_transition(old, new)?;
    recorder.image_barrier(
        transition.src_stage,
        transition.dst_stage,
        transition_barrier(image, old, new, &transition),
    );
    Ok(())
}

/// Upload tightly packed pixels into `image` and leave it ready for sampling
///
/// Pixels are staged through `staging` (a region of `host`), then copied
/// with a blocking one-time command buffer.
pub fn upload_image_pixels(
    host: &Buffer,
    staging: &Region,
    command_pool: &CommandPool,
    queue: vk::Queue,
    image: &Image,
    pixels: &[u8],
) -> VulkanResult<()> {
    if pixels.len() as vk::DeviceSize > staging.size {
        return Err(VulkanError::InvalidOperation {
            reason: format!("{} pixel bytes do not fit in the {}-byte staging region", pixels.len(), staging.size),
        });
    }
    host.write_region(staging, 0, pixels)?;

    let to_transfer = layout_transition(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
    let to_shader = layout_transition(
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )?;

    let mut recorder = command_pool.begin_single_time()?;
    recorder.image_barrier(
        to_transfer.src_stage,
        to_transfer.dst_stage,
        transition_barrier(
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &to_transfer,
        ),
    );

    let extent = image.extent();
    recorder.copy_buffer_to_image(
        staging.buffer,
        image.handle(),
        &[vk::BufferImageCopy {
            buffer_offset: staging.offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: image.info.aspect_mask,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: image.info.layers,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        }],
    );

    recorder.image_barrier(
        to_shader.src_stage,
        to_shader.dst_stage,
        transition_barrier(
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            &to_shader,
        ),
    );

    command_pool.submit_single_time(recorder, queue)
}

/// Parameters for a [`Sampler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerInfo {
    /// Magnification and minification filter
    pub filter: vk::Filter,
    /// Addressing mode on all three axes
    pub address_mode: vk::SamplerAddressMode,
    /// Depth comparison for shadow-map lookups
    pub compare_op: Option<vk::CompareOp>,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            compare_op: None,
        }
    }
}

impl SamplerInfo {
    /// Clamp-to-border comparison sampler for shadow maps
    pub const fn shadow_map() -> Self {
        Self {
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            compare_op: Some(vk::CompareOp::LESS_OR_EQUAL),
        }
    }

    /// Unfiltered edge-clamped reads of stored depth, as cube shadow maps need
    pub const fn cube_depth() -> Self {
        Self {
            filter: vk::Filter::NEAREST,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            compare_op: None,
        }
    }
}

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Create a sampler from `info`
    pub fn new(device: Device, info: SamplerInfo) -> VulkanResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(info.filter)
            .min_filter(info.filter)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(info.address_mode)
            .address_mode_v(info.address_mode)
            .address_mode_w(info.address_mode)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .compare_enable(info.compare_op.is_some())
            .compare_op(info.compare_op.unwrap_or(vk::CompareOp::ALWAYS))
            .max_lod(1.0);

        let sampler = unsafe {
            device
                .create_sampler(&create_info, None)
                .map_err(VulkanError::call("vkCreateSampler"))?
        };

        Ok(Self { device, sampler })
    }

    /// Sampler handle
    pub const fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_for_format() {
        assert_eq!(aspect_for_format(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(aspect_for_format(vk::Format::R16G16B16A16_SFLOAT), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_texture_info() {
        let info = ImageInfo::texture(vk::Extent2D { width: 4, height: 2 });
        assert_eq!(info.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert!(info.usage.contains(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED));
        assert_eq!(info.memory_properties, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert_eq!(info.layers, 1);
    }

    #[test]
    fn test_upload_transitions() {
        let first = layout_transition(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(first.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(first.dst_access, vk::AccessFlags::TRANSFER_WRITE);

        let second = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(second.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(second.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(second.dst_access, vk::AccessFlags::SHADER_READ);

        assert!(layout_transition(vk::ImageLayout::GENERAL, vk::ImageLayout::PRESENT_SRC_KHR).is_err());
    }

    #[test]
    fn test_cube_shadow_transitions() {
        let initial = layout_transition(vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(initial.src_access, vk::AccessFlags::empty());
        assert_eq!(initial.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        let to_copy = layout_transition(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_copy.src_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(to_copy.src_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_copy.dst_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(to_copy.dst_access, vk::AccessFlags::TRANSFER_WRITE);
    }

    #[test]
    fn test_cube_depth_sampler() {
        let info = SamplerInfo::cube_depth();
        assert_eq!(info.compare_op, None);
        assert_eq!(info.filter, vk::Filter::NEAREST);
        assert_eq!(info.address_mode, vk::SamplerAddressMode::CLAMP_TO_EDGE);
    }

    #[test]
    fn test_shadow_sampler_compares() {
        let info = SamplerInfo::shadow_map();
        assert_eq!(info.compare_op, Some(vk::CompareOp::LESS_OR_EQUAL));
        assert_eq!(SamplerInfo::default().compare_op, None);
    }
}
