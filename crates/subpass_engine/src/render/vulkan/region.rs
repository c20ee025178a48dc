//! Linear sub-allocation of fixed-size byte ranges out of a backing buffer
//!
//! A [`RegionArena`] only ever bumps forward: regions are never freed
//! individually and the arena lives exactly as long as the buffer it tracks.
//! Running past capacity is an error, never a partial region.

use ash::vk;

use crate::foundation::math::align_up;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Alignment used when the caller has no stronger requirement
pub const DEFAULT_REGION_ALIGNMENT: u64 = 4;

/// A byte range inside a buffer. Holds the buffer handle, not the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Buffer the range lives in
    pub buffer: vk::Buffer,
    /// Byte offset from the start of the buffer
    pub offset: vk::DeviceSize,
    /// Byte size of the range
    pub size: vk::DeviceSize,
}

impl Region {
    /// One past the last byte of the region
    pub const fn end(&self) -> vk::DeviceSize {
        self.offset + self.size
    }

    /// Check that `len` bytes starting `offset` bytes into the region stay inside it
    pub fn check_range(&self, offset: vk::DeviceSize, len: vk::DeviceSize) -> VulkanResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{len} bytes at offset {offset} do not fit in a region of {} bytes",
                    self.size
                ),
            }),
        }
    }
}

/// Bump-allocator state for one buffer
#[derive(Debug, Clone)]
pub struct RegionArena {
    buffer: vk::Buffer,
    capacity: vk::DeviceSize,
    end: vk::DeviceSize,
}

impl RegionArena {
    /// Start an empty arena over `capacity` bytes of `buffer`
    pub const fn new(buffer: vk::Buffer, capacity: vk::DeviceSize) -> Self {
        Self {
            buffer,
            capacity,
            end: 0,
        }
    }

    /// Carve the next `size` bytes, starting at a multiple of `alignment`
    pub fn allocate(&mut self, size: vk::DeviceSize, alignment: vk::DeviceSize) -> VulkanResult<Region> {
        if alignment == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "region alignment must be non-zero".to_string(),
            });
        }

        let offset = align_up(self.end, alignment);
        let aligned_size = align_up(size, alignment);
        match (offset, aligned_size) {
            (Some(offset), Some(aligned_size))
                if offset.checked_add(aligned_size).is_some_and(|end| end <= self.capacity) =>
            {
                self.end = offset + aligned_size;
                log::trace!("Allocated region [{offset}, {}) of {:?}", offset + size, self.buffer);
                Ok(Region {
                    buffer: self.buffer,
                    offset,
                    size,
                })
            }
            _ => Err(VulkanError::RegionCapacityExceeded {
                requested: aligned_size.unwrap_or(size),
                offset: offset.unwrap_or(self.end),
                capacity: self.capacity,
            }),
        }
    }

    /// Bytes handed out so far, including alignment padding
    pub const fn used(&self) -> vk::DeviceSize {
        self.end
    }

    /// Total bytes the arena can hand out
    pub const fn capacity(&self) -> vk::DeviceSize {
        self.capacity
    }

    /// Bytes left at the end of the arena
    pub const fn remaining(&self) -> vk::DeviceSize {
        self.capacity - self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn arena(capacity: u64) -> RegionArena {
        RegionArena::new(vk::Buffer::from_raw(1), capacity)
    }

    fn overlaps(a: &Region, b: &Region) -> bool {
        a.offset < b.end() && b.offset < a.end()
    }

    #[test]
    fn test_regions_never_overlap_and_respect_alignment() {
        let mut arena = arena(1 << 16);
        let requests = [(3, 4), (100, 256), (1, 4), (17, 16), (64, 64), (5, 1), (1000, 256)];

        let mut regions = Vec::new();
        for (size, alignment) in requests {
            let region = arena.allocate(size, alignment).unwrap();
            assert_eq!(region.offset % alignment, 0);
            assert_eq!(region.size, size);
            assert!(region.end() <= arena.capacity());
            regions.push(region);
        }

        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                assert!(!overlaps(a, b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn test_capacity_exceeded_returns_no_region() {
        let mut arena = arena(64);
        arena.allocate(60, 4).unwrap();

        let result = arena.allocate(8, 4);
        assert!(matches!(
            result,
            Err(VulkanError::RegionCapacityExceeded { requested: 8, offset: 60, capacity: 64 })
        ));
        // A failed allocation does not move the bump pointer.
        assert_eq!(arena.used(), 60);
        assert!(arena.allocate(4, 4).is_ok());
    }

    #[test]
    fn test_exact_fit_succeeds() {
        let mut arena = arena(256);
        let region = arena.allocate(256, 256).unwrap();
        assert_eq!(region.offset, 0);
        assert_eq!(arena.remaining(), 0);
        assert!(arena.allocate(1, 1).is_err());
    }

    #[test]
    fn test_alignment_padding_counts_against_capacity() {
        let mut arena = arena(512);
        arena.allocate(1, 4).unwrap();
        // Next 256-aligned offset is 256; 257 bytes round up to 512 and do not fit.
        assert!(arena.allocate(257, 256).is_err());
        let region = arena.allocate(256, 256).unwrap();
        assert_eq!(region.offset, 256);
    }

    #[test]
    fn test_huge_request_fails_without_wrapping() {
        let mut arena = arena(1024);
        for (size, alignment) in [(u64::MAX, 4), (u64::MAX - 2, 256), (u64::MAX, 1), (u64::MAX - 1023, 1)] {
            let result = arena.allocate(size, alignment);
            assert!(
                matches!(result, Err(VulkanError::RegionCapacityExceeded { capacity: 1024, .. })),
                "{size} bytes at alignment {alignment} gave {result:?}"
            );
        }
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn test_huge_request_after_padding_fails() {
        let mut arena = arena(1024);
        arena.allocate(1, 1).unwrap();
        // 1 rounds to 256, then u64::MAX - 255 more bytes overflows the end
        assert!(arena.allocate(u64::MAX - 255, 256).is_err());
        assert_eq!(arena.used(), 1);
    }

    #[test]
    fn test_zero_alignment_rejected() {
        let mut arena = arena(64);
        assert!(matches!(arena.allocate(4, 0), Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_check_range() {
        let region = Region {
            buffer: vk::Buffer::null(),
            offset: 128,
            size: 64,
        };
        assert!(region.check_range(0, 64).is_ok());
        assert!(region.check_range(32, 32).is_ok());
        assert!(region.check_range(32, 33).is_err());
        assert!(region.check_range(u64::MAX, 2).is_err());
    }
}
