//! Backing buffers, memory-type selection and the host/device region write paths
//!
//! Two buffers are created per run: a host-visible one for staging and
//! per-frame uniforms, and a device-local one for vertex and index data.
//! Regions are carved from each with [`Buffer::allocate_region`].
//!
//! Device-local regions are never mapped. Writes go through the staging
//! region and a blocking one-time copy, and reads come back the same way.
//! The byte movement is behind [`RegionIo`] so the staging protocol can be
//! exercised without a GPU.

use ash::{vk, Device};

use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::region::{Region, RegionArena};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// A `VkBuffer` with its own memory allocation and region arena
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
    arena: RegionArena,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory satisfying `properties`
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::call("vkCreateBuffer"))?
        };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory = find_memory_type(memory_properties, mem_requirements.memory_type_bits, properties)
            .and_then(|memory_type_index| {
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(mem_requirements.size)
                    .memory_type_index(memory_type_index);
                unsafe {
                    device.allocate_memory(&alloc_info, None).map_err(|result| match result {
                        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                            VulkanError::OutOfMemory {
                                requested: mem_requirements.size,
                            }
                        }
                        result => VulkanError::ApiCall {
                            call: "vkAllocateMemory",
                            result,
                        },
                    })
                }
            });

        let memory = match memory {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        unsafe {
            if let Err(result) = device.bind_buffer_memory(buffer, memory, 0) {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
                return Err(VulkanError::call("vkBindBufferMemory")(result));
            }
        }

        log::debug!("Created {size}-byte buffer ({usage:?}, {properties:?})");

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            usage,
            properties,
            arena: RegionArena::new(buffer, size),
        })
    }

    /// Carve the next region out of this buffer
    pub fn allocate_region(&mut self, size: vk::DeviceSize, alignment: vk::DeviceSize) -> VulkanResult<Region> {
        self.arena.allocate(size, alignment)
    }

    /// Copy `data` into the mapped memory of a host-visible region
    pub fn write_region(&self, region: &Region, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        let len = data.len() as vk::DeviceSize;
        self.check_host_access(region, offset, len)?;
        if len == 0 {
            return Ok(());
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, region.offset + offset, len, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::call("vkMapMemory"))?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Read `len` bytes back out of a host-visible region
    pub fn read_region(&self, region: &Region, offset: vk::DeviceSize, len: vk::DeviceSize) -> VulkanResult<Vec<u8>> {
        self.check_host_access(region, offset, len)?;
        let mut out = vec![0_u8; len as usize];
        if len == 0 {
            return Ok(out);
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, region.offset + offset, len, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::call("vkMapMemory"))?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), out.as_mut_ptr(), out.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(out)
    }

    fn check_host_access(&self, region: &Region, offset: vk::DeviceSize, len: vk::DeviceSize) -> VulkanResult<()> {
        if region.buffer != self.buffer {
            return Err(VulkanError::InvalidOperation {
                reason: format!("region belongs to {:?}, not {:?}", region.buffer, self.buffer),
            });
        }
        if !self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(VulkanError::InvalidOperation {
                reason: "host access to a buffer without HOST_VISIBLE memory".to_string(),
            });
        }
        region.check_range(offset, len)
    }

    /// Get buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Capacity in bytes
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage flags the buffer was created with
    pub const fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Memory properties of the backing allocation
    pub const fn properties(&self) -> vk::MemoryPropertyFlags {
        self.properties
    }

    /// Bytes already handed out as regions
    pub const fn used(&self) -> vk::DeviceSize {
        self.arena.used()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Find the first memory type allowed by `type_filter` that has every flag in `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            type_filter & (1 << i) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Byte movement between regions
///
/// `write_host` and `read_host` touch host-visible regions directly;
/// `copy_region` runs a buffer-to-buffer copy and returns only once it has
/// completed.
pub trait RegionIo {
    /// Copy `data` into a host-visible region at `offset`
    fn write_host(&mut self, region: &Region, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()>;

    /// Read `len` bytes of a host-visible region starting at `offset`
    fn read_host(&self, region: &Region, offset: vk::DeviceSize, len: vk::DeviceSize) -> VulkanResult<Vec<u8>>;

    /// Blocking copy of `size` bytes between two regions
    fn copy_region(
        &mut self,
        src: &Region,
        src_offset: vk::DeviceSize,
        dst: &Region,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VulkanResult<()>;
}

/// Direct mapped write into a host-visible region. No GPU work
pub fn write_to_host_region<I: RegionIo + ?Sized>(
    io: &mut I,
    region: &Region,
    data: &[u8],
    dst_offset: vk::DeviceSize,
) -> VulkanResult<()> {
    region.check_range(dst_offset, data.len() as vk::DeviceSize)?;
    io.write_host(region, dst_offset, data)
}

/// Write `data` into a device-local region through the staging region, blocking until done
pub fn write_to_device_region<I: RegionIo + ?Sized>(
    io: &mut I,
    staging: &Region,
    dst: &Region,
    data: &[u8],
    dst_offset: vk::DeviceSize,
) -> VulkanResult<()> {
    let len = data.len() as vk::DeviceSize;
    check_staging_size(staging, len)?;
    dst.check_range(dst_offset, len)?;
    if len == 0 {
        return Ok(());
    }

    io.write_host(staging, 0, data)?;
    io.copy_region(staging, 0, dst, dst_offset, len)
}

/// Read `len` bytes of a device-local region back through the staging region
pub fn read_device_region<I: RegionIo + ?Sized>(
    io: &mut I,
    staging: &Region,
    src: &Region,
    src_offset: vk::DeviceSize,
    len: vk::DeviceSize,
) -> VulkanResult<Vec<u8>> {
    check_staging_size(staging, len)?;
    src.check_range(src_offset, len)?;
    if len == 0 {
        return Ok(Vec::new());
    }

    io.copy_region(src, src_offset, staging, 0, len)?;
    io.read_host(staging, 0, len)
}

fn check_staging_size(staging: &Region, len: vk::DeviceSize) -> VulkanResult<()> {
    if len > staging.size {
        return Err(VulkanError::InvalidOperation {
            reason: format!("{len} bytes do not fit in the {}-byte staging region", staging.size),
        });
    }
    Ok(())
}

/// [`RegionIo`] over the host buffer and a graphics queue
pub struct GpuRegionIo<'a> {
    /// Host-visible buffer all host reads and writes must target
    pub host: &'a Buffer,
    /// Pool the one-time copy command buffers come from
    pub command_pool: &'a CommandPool,
    /// Queue copies are submitted to
    pub queue: vk::Queue,
}

impl RegionIo for GpuRegionIo<'_> {
    fn write_host(&mut self, region: &Region, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        self.host.write_region(region, offset, data)
    }

    fn read_host(&self, region: &Region, offset: vk::DeviceSize, len: vk::DeviceSize) -> VulkanResult<Vec<u8>> {
        self.host.read_region(region, offset, len)
    }

    fn copy_region(
        &mut self,
        src: &Region,
        src_offset: vk::DeviceSize,
        dst: &Region,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VulkanResult<()> {
        src.check_range(src_offset, size)?;
        dst.check_range(dst_offset, size)?;

        let mut recorder = self.command_pool.begin_single_time()?;
        recorder.copy_buffer(
            src.buffer,
            dst.buffer,
            &[vk::BufferCopy {
                src_offset: src.offset + src_offset,
                dst_offset: dst.offset + dst_offset,
                size,
            }],
        );
        self.command_pool.submit_single_time(recorder, self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::collections::HashMap;

    /// Buffers as plain byte vectors; copies complete immediately
    struct FakeIo {
        memory: HashMap<vk::Buffer, Vec<u8>>,
        copies: usize,
    }

    impl FakeIo {
        fn new(buffers: &[(vk::Buffer, usize)]) -> Self {
            Self {
                memory: buffers.iter().map(|&(b, size)| (b, vec![0; size])).collect(),
                copies: 0,
            }
        }

        fn bytes(&mut self, region: &Region) -> &mut [u8] {
            let start = region.offset as usize;
            let end = region.end() as usize;
            &mut self.memory.get_mut(&region.buffer).unwrap()[start..end]
        }
    }

    impl RegionIo for FakeIo {
        fn write_host(&mut self, region: &Region, offset: u64, data: &[u8]) -> VulkanResult<()> {
            let offset = offset as usize;
            self.bytes(region)[offset..offset + data.len()].copy_from_slice(data);
            Ok(())
        }

        fn read_host(&self, region: &Region, offset: u64, len: u64) -> VulkanResult<Vec<u8>> {
            let start = (region.offset + offset) as usize;
            Ok(self.memory[&region.buffer][start..start + len as usize].to_vec())
        }

        fn copy_region(&mut self, src: &Region, src_offset: u64, dst: &Region, dst_offset: u64, size: u64) -> VulkanResult<()> {
            let (src_offset, dst_offset, size) = (src_offset as usize, dst_offset as usize, size as usize);
            let chunk = self.bytes(src)[src_offset..src_offset + size].to_vec();
            self.bytes(dst)[dst_offset..dst_offset + size].copy_from_slice(&chunk);
            self.copies += 1;
            Ok(())
        }
    }

    fn host() -> vk::Buffer {
        vk::Buffer::from_raw(1)
    }

    fn device() -> vk::Buffer {
        vk::Buffer::from_raw(2)
    }

    #[test]
    fn test_device_region_round_trip() {
        let mut host_arena = RegionArena::new(host(), 1024);
        let mut device_arena = RegionArena::new(device(), 1024);
        let staging = host_arena.allocate(256, 4).unwrap();
        let _padding = device_arena.allocate(10, 4).unwrap();
        let dst = device_arena.allocate(100, 4).unwrap();

        let mut io = FakeIo::new(&[(host(), 1024), (device(), 1024)]);
        let data: Vec<u8> = (0..64).map(|i| (i * 7 % 251) as u8).collect();

        write_to_device_region(&mut io, &staging, &dst, &data, 20).unwrap();
        let back = read_device_region(&mut io, &staging, &dst, 20, data.len() as u64).unwrap();

        assert_eq!(back, data);
        assert_eq!(io.copies, 2);
        // Bytes outside the written range are untouched.
        assert!(io.bytes(&dst)[..20].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_upload_larger_than_staging_fails_without_copying() {
        let staging = RegionArena::new(host(), 1024).allocate(16, 4).unwrap();
        let dst = RegionArena::new(device(), 1024).allocate(64, 4).unwrap();
        let mut io = FakeIo::new(&[(host(), 1024), (device(), 1024)]);

        let result = write_to_device_region(&mut io, &staging, &dst, &[1; 32], 0);
        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
        assert_eq!(io.copies, 0);
    }

    #[test]
    fn test_write_past_region_end_rejected() {
        let staging = RegionArena::new(host(), 1024).allocate(256, 4).unwrap();
        let dst = RegionArena::new(device(), 1024).allocate(16, 4).unwrap();
        let mut io = FakeIo::new(&[(host(), 1024), (device(), 1024)]);

        assert!(write_to_device_region(&mut io, &staging, &dst, &[1; 8], 12).is_err());
        assert!(write_to_host_region(&mut io, &staging, &[1; 8], 252).is_err());
        assert!(write_to_host_region(&mut io, &staging, &[1; 8], 248).is_ok());
    }

    #[test]
    fn test_find_memory_type() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        props.memory_types[2].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        let coherent = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&props, 0b111, coherent).unwrap(), 2);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(),
            1
        );
        assert!(matches!(
            find_memory_type(&props, 0b011, coherent),
            Err(VulkanError::NoSuitableMemoryType)
        ));
    }
}
