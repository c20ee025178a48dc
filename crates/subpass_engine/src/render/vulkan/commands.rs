//! Command pools and command buffer recording
//!
//! [`CommandRecorder`] tracks whether its buffer is recording so misuse shows
//! up as an error instead of a validation-layer message. [`ActiveRenderPass`]
//! ends the render pass when dropped.

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::call("vkCreateCommandPool"))?
        };

        Ok(Self { device, command_pool })
    }

    /// Allocate `count` primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::call("vkAllocateCommandBuffers"))
        }
    }

    /// Get the command pool handle
    pub const fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Allocate a command buffer and begin recording it for a single submission
    pub fn begin_single_time(&self) -> VulkanResult<CommandRecorder> {
        let command_buffer = self
            .allocate_command_buffers(1)?
            .pop()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "Command buffer allocation returned nothing".to_string(),
            })?;

        let mut recorder = CommandRecorder::new(command_buffer, self.device.clone());
        recorder.begin()?;
        Ok(recorder)
    }

    /// End `recorder`, submit it to `queue` and block until the queue is idle
    ///
    /// The command buffer goes back to the pool whether or not submission succeeds.
    pub fn submit_single_time(&self, recorder: CommandRecorder, queue: vk::Queue) -> VulkanResult<()> {
        let command_buffer = recorder.end()?;
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();

        let result = unsafe {
            self.device
                .queue_submit(queue, &[submit_info], vk::Fence::null())
                .map_err(VulkanError::call("vkQueueSubmit"))
                .and_then(|()| {
                    self.device
                        .queue_wait_idle(queue)
                        .map_err(VulkanError::call("vkQueueWaitIdle"))
                })
        };

        unsafe {
            self.device.free_command_buffers(self.command_pool, &command_buffers);
        }
        result
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            // Frees every command buffer allocated from the pool
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Records into one command buffer
pub struct CommandRecorder {
    command_buffer: vk::CommandBuffer,
    device: Device,
    recording: bool,
}

impl CommandRecorder {
    /// Wrap an allocated command buffer; recording starts with [`CommandRecorder::begin`]
    pub const fn new(command_buffer: vk::CommandBuffer, device: Device) -> Self {
        Self {
            command_buffer,
            device,
            recording: false,
        }
    }

    /// Begin command recording. Implicitly resets the buffer
    pub fn begin(&mut self) -> VulkanResult<&mut Self> {
        if self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::call("vkBeginCommandBuffer"))?;
        }

        self.recording = true;
        Ok(self)
    }

    /// Begin a render pass over `render_area`, starting in subpass 0
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> VulkanResult<ActiveRenderPass<'_>> {
        self.ensure_recording()?;

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
        }

        Ok(ActiveRenderPass { recorder: self })
    }

    /// End command recording
    pub fn end(mut self) -> VulkanResult<vk::CommandBuffer> {
        self.ensure_recording()?;

        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::call("vkEndCommandBuffer"))?;
        }

        self.recording = false;
        Ok(self.command_buffer)
    }

    /// Copy `regions` from `src` to `dst`
    pub fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe {
            self.device.cmd_copy_buffer(self.command_buffer, src, dst, regions);
        }
    }

    /// Copy buffer contents into an image in TRANSFER_DST_OPTIMAL layout
    pub fn copy_buffer_to_image(&mut self, src: vk::Buffer, dst: vk::Image, regions: &[vk::BufferImageCopy]) {
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                regions,
            );
        }
    }

    /// Copy `regions` between two images in the given layouts
    pub fn copy_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        unsafe {
            self.device
                .cmd_copy_image(self.command_buffer, src, src_layout, dst, dst_layout, regions);
        }
    }

    /// Record a single image memory barrier
    pub fn image_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: vk::ImageMemoryBarrier,
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    /// Get the command buffer handle
    pub const fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    fn ensure_recording(&self) -> VulkanResult<()> {
        if self.recording {
            Ok(())
        } else {
            Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            })
        }
    }
}

/// A render pass being recorded; ends the pass on drop
pub struct ActiveRenderPass<'a> {
    recorder: &'a mut CommandRecorder,
}

impl ActiveRenderPass<'_> {
    fn device(&self) -> &Device {
        &self.recorder.device
    }

    fn command_buffer(&self) -> vk::CommandBuffer {
        self.recorder.command_buffer
    }

    /// Advance to the next subpass
    pub fn next_subpass(&mut self) {
        unsafe {
            self.device()
                .cmd_next_subpass(self.command_buffer(), vk::SubpassContents::INLINE);
        }
    }

    /// Bind a graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device()
                .cmd_bind_pipeline(self.command_buffer(), vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    /// Bind descriptor sets starting at `first_set`
    pub fn bind_descriptor_sets(
        &mut self,
        pipeline_layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                self.command_buffer(),
                vk::PipelineBindPoint::GRAPHICS,
                pipeline_layout,
                first_set,
                sets,
                dynamic_offsets,
            );
        }
    }

    /// Bind vertex buffers
    pub fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(self.command_buffer(), first_binding, buffers, offsets);
        }
    }

    /// Bind a u32 index buffer
    pub fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe {
            self.device()
                .cmd_bind_index_buffer(self.command_buffer(), buffer, offset, vk::IndexType::UINT32);
        }
    }

    /// Draw indexed
    pub fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
        unsafe {
            self.device().cmd_draw_indexed(
                self.command_buffer(),
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    /// Non-indexed draw, used for full-screen triangles
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device()
                .cmd_draw(self.command_buffer(), vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    /// Push constants to shaders
    pub fn push_constants(&mut self, pipeline_layout: vk::PipelineLayout, stage_flags: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        unsafe {
            self.device()
                .cmd_push_constants(self.command_buffer(), pipeline_layout, stage_flags, offset, data);
        }
    }

    /// Clear attachments of the current subpass inside `rect`
    pub fn clear_attachments(&mut self, attachments: &[vk::ClearAttachment], rect: vk::Rect2D) {
        let clear_rect = vk::ClearRect {
            rect,
            base_array_layer: 0,
            layer_count: 1,
        };
        unsafe {
            self.device()
                .cmd_clear_attachments(self.command_buffer(), attachments, &[clear_rect]);
        }
    }
}

impl Drop for ActiveRenderPass<'_> {
    fn drop(&mut self) {
        unsafe {
            self.recorder.device.cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}
