//! Per-run render state passed explicitly to everything that needs the GPU

use ash::{vk, Device};
use bytemuck::Pod;

use crate::config::EngineConfig;
use crate::render::vulkan::buffer::{self, Buffer, GpuRegionIo};
use crate::render::vulkan::image::{self, Image, ImageInfo};
use crate::render::vulkan::{
    CommandPool, Region, Swapchain, UniformBuffer, VulkanContext, VulkanError, VulkanResult, Window,
    DEFAULT_REGION_ALIGNMENT,
};

/// Device, swapchain, command pool and the two backing buffers
///
/// Fields drop top to bottom, so everything created from the device goes
/// before the [`VulkanContext`].
pub struct RenderContext {
    staging: Region,
    host_buffer: Buffer,
    device_buffer: Buffer,
    command_pool: CommandPool,
    swapchain: Swapchain,
    vulkan: VulkanContext,
}

impl RenderContext {
    /// Bring up Vulkan for `window` and allocate the backing buffers
    pub fn new(window: &mut Window, config: &EngineConfig) -> VulkanResult<Self> {
        config
            .validate()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        let vulkan = VulkanContext::new(window, &config.instance)?;
        let device = vulkan.device().clone();

        let (width, height) = window.framebuffer_size();
        let swapchain = Swapchain::new(
            vulkan.instance(),
            device.clone(),
            vulkan.surface,
            &vulkan.surface_loader,
            &vulkan.physical_device,
            vk::Extent2D { width, height },
        )?;

        let command_pool = CommandPool::new(device.clone(), vulkan.graphics_queue_family())?;

        let memory = &config.memory;
        let mut host_buffer = Buffer::new(
            device.clone(),
            &vulkan.physical_device.memory_properties,
            memory.host_buffer_size,
            vk::BufferUsageFlags::UNIFORM_BUFFER
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let device_buffer = Buffer::new(
            device,
            &vulkan.physical_device.memory_properties,
            memory.device_buffer_size,
            vk::BufferUsageFlags::UNIFORM_BUFFER
                | vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let staging = host_buffer.allocate_region(memory.staging_region_size, DEFAULT_REGION_ALIGNMENT)?;

        log::info!(
            "Render context ready: host buffer {} MiB, device buffer {} MiB, staging {} MiB",
            memory.host_buffer_size >> 20,
            memory.device_buffer_size >> 20,
            memory.staging_region_size >> 20
        );

        Ok(Self {
            staging,
            host_buffer,
            device_buffer,
            command_pool,
            swapchain,
            vulkan,
        })
    }

    /// Underlying Vulkan objects
    pub const fn vulkan(&self) -> &VulkanContext {
        &self.vulkan
    }

    /// Logical device
    pub const fn device(&self) -> &Device {
        self.vulkan.device()
    }

    /// Graphics queue
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.vulkan.graphics_queue()
    }

    /// Present queue
    pub const fn present_queue(&self) -> vk::Queue {
        self.vulkan.present_queue()
    }

    /// Swapchain
    pub const fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Graphics command pool
    pub const fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Host-visible backing buffer
    pub const fn host_buffer(&self) -> &Buffer {
        &self.host_buffer
    }

    /// Device-local backing buffer
    pub const fn device_buffer(&self) -> &Buffer {
        &self.device_buffer
    }

    /// Number of swapchain images
    pub fn swapchain_image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// Swapchain extent
    pub const fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Swapchain image format
    pub const fn swapchain_format(&self) -> vk::Format {
        self.swapchain.format().format
    }

    /// Depth(-stencil) format picked for the device
    pub const fn depth_format(&self) -> vk::Format {
        self.vulkan.physical_device.depth_format
    }

    /// `minUniformBufferOffsetAlignment`
    pub const fn min_uniform_alignment(&self) -> vk::DeviceSize {
        self.vulkan.physical_device.min_uniform_alignment()
    }

    /// Carve a region out of the host-visible buffer
    pub fn allocate_host_region(&mut self, size: vk::DeviceSize, alignment: vk::DeviceSize) -> VulkanResult<Region> {
        self.host_buffer.allocate_region(size, alignment)
    }

    /// Carve a region out of the device-local buffer
    pub fn allocate_device_region(&mut self, size: vk::DeviceSize, alignment: vk::DeviceSize) -> VulkanResult<Region> {
        self.device_buffer.allocate_region(size, alignment)
    }

    /// Per-swapchain-image uniform array of `element_count` records of `T`
    pub fn create_uniform_buffer<T: Pod>(&mut self, element_count: u32) -> VulkanResult<UniformBuffer> {
        let alignment = self.min_uniform_alignment();
        let instances = self.swapchain_image_count();
        UniformBuffer::new::<T>(&mut self.host_buffer, element_count, instances, alignment)
    }

    /// Per-swapchain-image uniform array bound whole, records at std140 stride
    pub fn create_packed_uniform_buffer<T: Pod>(&mut self, element_count: u32) -> VulkanResult<UniformBuffer> {
        let alignment = self.min_uniform_alignment();
        let instances = self.swapchain_image_count();
        UniformBuffer::packed::<T>(&mut self.host_buffer, element_count, instances, alignment)
    }

    /// Standalone buffer with its own memory
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Buffer> {
        Buffer::new(
            self.device().clone(),
            &self.vulkan.physical_device.memory_properties,
            size,
            usage,
            properties,
        )
    }

    /// Image, memory and view from `info`
    pub fn create_image(&self, info: ImageInfo) -> VulkanResult<Image> {
        Image::new(self.device().clone(), &self.vulkan.physical_device.memory_properties, info)
    }

    fn region_io(&self) -> GpuRegionIo<'_> {
        GpuRegionIo {
            host: &self.host_buffer,
            command_pool: &self.command_pool,
            queue: self.graphics_queue(),
        }
    }

    /// Mapped write into a host-visible region
    pub fn write_to_host_region(&self, region: &Region, data: &[u8], dst_offset: vk::DeviceSize) -> VulkanResult<()> {
        buffer::write_to_host_region(&mut self.region_io(), region, data, dst_offset)
    }

    /// Staged, blocking write into a device-local region
    pub fn write_to_device_region(&self, dst: &Region, data: &[u8], dst_offset: vk::DeviceSize) -> VulkanResult<()> {
        buffer::write_to_device_region(&mut self.region_io(), &self.staging, dst, data, dst_offset)
    }

    /// Staged, blocking readback of a device-local region
    pub fn read_device_region(
        &self,
        src: &Region,
        src_offset: vk::DeviceSize,
        len: vk::DeviceSize,
    ) -> VulkanResult<Vec<u8>> {
        buffer::read_device_region(&mut self.region_io(), &self.staging, src, src_offset, len)
    }

    /// Upload RGBA8 pixels into `image` and leave it shader-readable
    pub fn upload_texture(&self, image: &Image, pixels: &[u8]) -> VulkanResult<()> {
        image::upload_image_pixels(
            &self.host_buffer,
            &self.staging,
            &self.command_pool,
            self.graphics_queue(),
            image,
            pixels,
        )
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe {
            self.device()
                .device_wait_idle()
                .map_err(VulkanError::call("vkDeviceWaitIdle"))
        }
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::error!("Device did not go idle before teardown: {e}");
        }
    }
}
