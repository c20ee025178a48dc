//! Per-frame uniform arrays addressed with dynamic offsets
//!
//! One region per swapchain image, each holding `element_count` records of
//! `element_size` bytes. `element_size` is the record size rounded up to the
//! device's minimum uniform-buffer offset alignment so that
//! `index * element_size` is always a legal dynamic offset.

use ash::vk;
use bytemuck::Pod;

use crate::foundation::math::align_up;
use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::region::Region;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Array stride std140 rounds every struct element up to
pub const STD140_ARRAY_ALIGNMENT: vk::DeviceSize = 16;

/// Size arithmetic for one uniform array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLayout {
    /// Bytes per record including alignment padding
    pub element_size: vk::DeviceSize,
    /// Records per instance
    pub element_count: u32,
}

impl UniformLayout {
    /// Layout for `element_count` records of `record_size` bytes
    pub fn new(record_size: usize, element_count: u32, min_alignment: vk::DeviceSize) -> VulkanResult<Self> {
        let element_size = align_up(record_size as vk::DeviceSize, min_alignment.max(1))
            .filter(|size| size.checked_mul(vk::DeviceSize::from(element_count)).is_some())
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("{element_count} uniform records of {record_size} bytes overflow a region"),
            })?;
        Ok(Self {
            element_size,
            element_count,
        })
    }

    /// Bytes per instance region
    pub const fn region_size(&self) -> vk::DeviceSize {
        self.element_size * self.element_count as vk::DeviceSize
    }

    /// Lay `records` out at `element_size` strides
    pub fn pack<T: Pod>(&self, records: &[T]) -> VulkanResult<Vec<u8>> {
        if records.len() > self.element_count as usize {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{} uniform records exceed the array length of {}",
                    records.len(),
                    self.element_count
                ),
            });
        }

        let stride = self.element_size as usize;
        let mut bytes = vec![0_u8; records.len() * stride];
        for (chunk, record) in bytes.chunks_exact_mut(stride).zip(records) {
            let src = bytemuck::bytes_of(record);
            chunk[..src.len()].copy_from_slice(src);
        }
        Ok(bytes)
    }
}

/// A uniform array with one host-visible region per instance
#[derive(Debug, Clone)]
pub struct UniformBuffer {
    layout: UniformLayout,
    regions: Vec<Region>,
}

impl UniformBuffer {
    /// Allocate `instance_count` regions from the host buffer
    pub fn new<T: Pod>(
        host: &mut Buffer,
        element_count: u32,
        instance_count: usize,
        min_alignment: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        let layout = UniformLayout::new(std::mem::size_of::<T>(), element_count, min_alignment)?;
        Self::with_layout(host, layout, instance_count, min_alignment)
    }

    /// Uniform array read whole by the shader, records at std140 array stride
    ///
    /// `T` must already be a multiple of 16 bytes. Regions still start at
    /// `min_alignment` so the array can be bound at its region offset.
    pub fn packed<T: Pod>(
        host: &mut Buffer,
        element_count: u32,
        instance_count: usize,
        min_alignment: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        let record_size = std::mem::size_of::<T>();
        if record_size % STD140_ARRAY_ALIGNMENT as usize != 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{record_size}-byte record is not a multiple of the std140 array stride"),
            });
        }
        let layout = UniformLayout::new(record_size, element_count, STD140_ARRAY_ALIGNMENT)?;
        Self::with_layout(host, layout, instance_count, min_alignment)
    }

    fn with_layout(
        host: &mut Buffer,
        layout: UniformLayout,
        instance_count: usize,
        min_alignment: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        let element_count = layout.element_count;
        let regions = (0..instance_count)
            .map(|_| host.allocate_region(layout.region_size(), min_alignment.max(1)))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!(
            "Uniform array: {} x {} bytes, {} instances",
            element_count,
            layout.element_size,
            instance_count
        );

        Ok(Self { layout, regions })
    }

    /// Write `records` to the start of instance `instance`
    pub fn write<T: Pod>(&self, host: &Buffer, instance: usize, records: &[T]) -> VulkanResult<()> {
        let region = self.region(instance)?;
        let bytes = self.layout.pack(records)?;
        host.write_region(region, 0, &bytes)
    }

    /// Region backing instance `instance`
    pub fn region(&self, instance: usize) -> VulkanResult<&Region> {
        self.regions.get(instance).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("uniform instance {instance} out of {}", self.regions.len()),
        })
    }

    /// All instance regions in order
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Record stride; this is the dynamic-offset stride of any set bound to it
    pub const fn element_size(&self) -> vk::DeviceSize {
        self.layout.element_size
    }

    /// Records per instance
    pub const fn element_count(&self) -> u32 {
        self.layout.element_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Record {
        value: [f32; 3],
    }

    #[test]
    fn test_element_size_rounds_to_alignment() {
        assert_eq!(UniformLayout::new(128, 4, 256).unwrap().element_size, 256);
        assert_eq!(UniformLayout::new(12, 4, 64).unwrap().element_size, 64);
        assert_eq!(UniformLayout::new(256, 4, 256).unwrap().element_size, 256);
        assert_eq!(UniformLayout::new(12, 4, 0).unwrap().element_size, 12);
    }

    #[test]
    fn test_oversized_layout_rejected() {
        assert!(UniformLayout::new(usize::MAX, 1, 256).is_err());
        assert!(UniformLayout::new(1 << 40, u32::MAX, 256).is_err());
    }

    #[test]
    fn test_last_dynamic_offset_stays_inside_region() {
        let layout = UniformLayout::new(128, 1024, 256).unwrap();
        let last_offset = u64::from(layout.element_count - 1) * layout.element_size;
        assert!(last_offset < layout.region_size());
        assert_eq!(layout.region_size() - last_offset, layout.element_size);
    }

    #[test]
    fn test_pack_places_records_at_stride() {
        let layout = UniformLayout::new(std::mem::size_of::<Record>(), 3, 16).unwrap();
        let records = [Record { value: [1.0, 2.0, 3.0] }, Record { value: [4.0, 5.0, 6.0] }];
        let bytes = layout.pack(&records).unwrap();

        assert_eq!(bytes.len(), 32);
        let second: [f32; 3] = bytemuck::pod_read_unaligned(&bytes[16..28]);
        assert_eq!(second, [4.0, 5.0, 6.0]);
        assert!(bytes[12..16].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pack_rejects_too_many_records() {
        let layout = UniformLayout::new(std::mem::size_of::<Record>(), 1, 16).unwrap();
        let records = [Record { value: [0.0; 3] }; 2];
        assert!(layout.pack(&records).is_err());
    }
}
