//! Semaphores, fences and the frame-slot ring
//!
//! Each frame in flight owns one [`FrameSlot`]. A frame walks through
//! [`FrameSync::acquire`], [`FrameSync::sync`], recording, [`FrameSync::submit`],
//! [`FrameSync::present`] and [`FrameSync::cycle`]. All fence waits are
//! unbounded. The fence bookkeeping lives in [`FrameSlotTracker`], which only
//! sees fences through [`FenceOps`].

use ash::{vk, Device};

use crate::render::vulkan::swapchain::Swapchain;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Binary semaphore for GPU-GPU ordering
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::call("vkCreateSemaphore"))?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub const fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::call("vkCreateFence"))?
        };

        Ok(Self { device, fence })
    }

    /// Block until the fence is signaled
    pub fn wait(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .map_err(VulkanError::call("vkWaitForFences"))
        }
    }

    /// Reset fence
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(VulkanError::call("vkResetFences"))
        }
    }

    /// Get the fence handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Fence access by slot index
pub trait FenceOps {
    /// Block until slot `slot`'s fence is signaled
    fn wait(&mut self, slot: usize) -> VulkanResult<()>;

    /// Unsignal slot `slot`'s fence
    fn reset(&mut self, slot: usize) -> VulkanResult<()>;
}

/// Which slot is current and which slot last claimed each swapchain image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSlotTracker {
    slot_count: usize,
    current: usize,
    image_owners: Vec<Option<usize>>,
}

impl FrameSlotTracker {
    /// Track `slot_count` slots over `image_count` swapchain images
    pub fn new(slot_count: usize, image_count: usize) -> VulkanResult<Self> {
        if slot_count == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "frame sync needs at least one frame slot".to_string(),
            });
        }
        Ok(Self {
            slot_count,
            current: 0,
            image_owners: vec![None; image_count],
        })
    }

    /// Slot the next frame uses
    pub const fn current(&self) -> usize {
        self.current
    }

    /// Number of slots
    pub const fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Slot that last claimed `image_index`
    pub fn owner(&self, image_index: u32) -> Option<usize> {
        self.image_owners.get(image_index as usize).copied().flatten()
    }

    /// Wait until the current slot's previous submission has retired
    pub fn wait_current<F: FenceOps>(&self, fences: &mut F) -> VulkanResult<()> {
        fences.wait(self.current)
    }

    /// Claim `image_index` for the current slot
    ///
    /// Waits on the image's previous owner when that is another slot, then
    /// resets the current slot's fence.
    pub fn claim_image<F: FenceOps>(&mut self, image_index: u32, fences: &mut F) -> VulkanResult<()> {
        let image_count = self.image_owners.len();
        let owner = self
            .image_owners
            .get_mut(image_index as usize)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("swapchain image {image_index} out of range for {image_count} images"),
            })?;

        if let Some(previous) = *owner {
            if previous != self.current {
                fences.wait(previous)?;
            }
        }
        *owner = Some(self.current);
        fences.reset(self.current)
    }

    /// Advance to the next slot
    pub fn cycle(&mut self) {
        self.current = (self.current + 1) % self.slot_count;
    }
}

/// Synchronization objects of one frame in flight
pub struct FrameSlot {
    /// Signaled when the acquired swapchain image is ready
    pub image_acquired: Semaphore,
    /// Signaled when the frame's command buffers finish
    pub render_finished: Semaphore,
    /// Signaled when the frame's submission retires
    pub in_flight: Fence,
}

impl FrameSlot {
    /// Create a slot whose fence starts signaled
    pub fn new(device: Device) -> VulkanResult<Self> {
        let image_acquired = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            image_acquired,
            render_finished,
            in_flight,
        })
    }
}

struct SlotFences<'a>(&'a [FrameSlot]);

impl SlotFences<'_> {
    fn fence(&self, slot: usize) -> VulkanResult<&Fence> {
        self.0
            .get(slot)
            .map(|s| &s.in_flight)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("no frame slot {slot}"),
            })
    }
}

impl FenceOps for SlotFences<'_> {
    fn wait(&mut self, slot: usize) -> VulkanResult<()> {
        self.fence(slot)?.wait()
    }

    fn reset(&mut self, slot: usize) -> VulkanResult<()> {
        self.fence(slot)?.reset()
    }
}

/// Ring of frame slots driving acquire, submit and present
pub struct FrameSync {
    slots: Vec<FrameSlot>,
    tracker: FrameSlotTracker,
}

impl FrameSync {
    /// Create `frames_in_flight` slots for a swapchain of `image_count` images
    pub fn new(device: &Device, frames_in_flight: usize, image_count: usize) -> VulkanResult<Self> {
        let tracker = FrameSlotTracker::new(frames_in_flight, image_count)?;
        let slots = (0..frames_in_flight)
            .map(|_| FrameSlot::new(device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!("Created {frames_in_flight} frame slots over {image_count} swapchain images");
        Ok(Self { slots, tracker })
    }

    fn current_slot(&self) -> VulkanResult<&FrameSlot> {
        self.slots
            .get(self.tracker.current())
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("no frame slot {}", self.tracker.current()),
            })
    }

    /// Wait for the current slot, then acquire the next swapchain image
    pub fn acquire(&self, swapchain: &Swapchain) -> VulkanResult<u32> {
        self.tracker.wait_current(&mut SlotFences(&self.slots))?;
        swapchain.acquire_next_image(self.current_slot()?.image_acquired.handle())
    }

    /// Make sure no other slot still uses `image_index` and claim it
    pub fn sync(&mut self, image_index: u32) -> VulkanResult<()> {
        self.tracker.claim_image(image_index, &mut SlotFences(&self.slots))
    }

    /// Submit `command_buffers` behind the acquire semaphore
    pub fn submit(&self, device: &Device, queue: vk::Queue, command_buffers: &[vk::CommandBuffer]) -> VulkanResult<()> {
        let slot = self.current_slot()?;
        let wait_semaphores = [slot.image_acquired.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [slot.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .queue_submit(queue, &[submit_info.build()], slot.in_flight.handle())
                .map_err(VulkanError::call("vkQueueSubmit"))
        }
    }

    /// Present `image_index` once rendering has finished
    pub fn present(&self, swapchain: &Swapchain, queue: vk::Queue, image_index: u32) -> VulkanResult<()> {
        swapchain.present(queue, image_index, self.current_slot()?.render_finished.handle())
    }

    /// Move on to the next slot
    pub fn cycle(&mut self) {
        self.tracker.cycle();
    }

    /// Slot tracker state
    pub const fn tracker(&self) -> &FrameSlotTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fences over a fake GPU that retires a slot's work when it is waited on
    #[derive(Default)]
    struct FakeFences {
        pending: Vec<bool>,
        waits: Vec<usize>,
        max_in_flight: usize,
    }

    impl FakeFences {
        fn new(slots: usize) -> Self {
            Self {
                pending: vec![false; slots],
                ..Self::default()
            }
        }

        fn submit(&mut self, slot: usize) {
            assert!(!self.pending[slot], "slot {slot} submitted twice without a wait");
            self.pending[slot] = true;
            let in_flight = self.pending.iter().filter(|p| **p).count();
            self.max_in_flight = self.max_in_flight.max(in_flight);
        }
    }

    impl FenceOps for FakeFences {
        fn wait(&mut self, slot: usize) -> VulkanResult<()> {
            self.waits.push(slot);
            self.pending[slot] = false;
            Ok(())
        }

        fn reset(&mut self, slot: usize) -> VulkanResult<()> {
            assert!(!self.pending[slot], "reset of slot {slot} while its work is pending");
            Ok(())
        }
    }

    fn run_frame(tracker: &mut FrameSlotTracker, fences: &mut FakeFences, image_index: u32) {
        tracker.wait_current(fences).unwrap();
        tracker.claim_image(image_index, fences).unwrap();
        fences.submit(tracker.current());
        tracker.cycle();
    }

    #[test]
    fn test_in_flight_never_exceeds_slots() {
        let slots = 2;
        let images = 3;
        let mut tracker = FrameSlotTracker::new(slots, images).unwrap();
        let mut fences = FakeFences::new(slots);

        for frame in 0..50u32 {
            run_frame(&mut tracker, &mut fences, frame % images as u32);
            assert!(fences.pending.iter().filter(|p| **p).count() <= slots);
        }
        assert_eq!(fences.max_in_flight, slots);
    }

    #[test]
    fn test_slots_cycle() {
        let mut tracker = FrameSlotTracker::new(3, 3).unwrap();
        let seen: Vec<usize> = (0..7)
            .map(|_| {
                let current = tracker.current();
                tracker.cycle();
                current
            })
            .collect();
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_image_claimed_by_other_slot_waits_on_it() {
        let mut tracker = FrameSlotTracker::new(2, 3).unwrap();
        let mut fences = FakeFences::new(2);

        // Slot 0 takes image 2.
        run_frame(&mut tracker, &mut fences, 2);
        assert_eq!(tracker.owner(2), Some(0));

        // Slot 1 gets the same image back before slot 0 was waited on again.
        fences.waits.clear();
        tracker.wait_current(&mut fences).unwrap();
        tracker.claim_image(2, &mut fences).unwrap();
        assert_eq!(fences.waits, vec![1, 0]);
        assert_eq!(tracker.owner(2), Some(1));
    }

    #[test]
    fn test_same_slot_reclaim_skips_extra_wait() {
        let mut tracker = FrameSlotTracker::new(1, 2).unwrap();
        let mut fences = FakeFences::new(1);

        run_frame(&mut tracker, &mut fences, 0);
        fences.waits.clear();
        run_frame(&mut tracker, &mut fences, 0);
        assert_eq!(fences.waits, vec![0]);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(FrameSlotTracker::new(0, 3).is_err());

        let mut tracker = FrameSlotTracker::new(2, 3).unwrap();
        let mut fences = FakeFences::new(2);
        assert!(tracker.claim_image(3, &mut fences).is_err());
        assert_eq!(tracker.owner(3), None);
    }
}
