//! Descriptor pools, layouts, per-frame set instances and dynamic offsets
//!
//! Every set a render graph uses is declared up front as a
//! [`DescriptorSetInfo`]. The pool is sized to exactly what those
//! declarations need. A set that changes per frame gets one instance per
//! swapchain image; a static set gets one instance.
//!
//! Uniform arrays are shared by many entities through dynamic offsets: the
//! offset for entity `i` is `i * stride`, one per dynamic binding in
//! binding order.

use ash::{vk, Device};
use std::collections::BTreeMap;

use crate::render::vulkan::commands::ActiveRenderPass;
use crate::render::vulkan::region::Region;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Ceiling on sets allocated from one pool
pub const MAX_DESCRIPTOR_SETS: u32 = 64;

/// One binding slot; its binding number is its position in the set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    /// Descriptor type
    pub descriptor_type: vk::DescriptorType,
    /// Array length
    pub count: u32,
    /// Stages that read it
    pub stages: vk::ShaderStageFlags,
}

/// Declared shape of one descriptor set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetInfo {
    /// Bindings in binding-number order
    pub bindings: Vec<DescriptorBinding>,
    /// 1 for static sets, the swapchain image count for per-frame sets
    pub instance_count: u32,
}

impl DescriptorSetInfo {
    /// An empty set with `instance_count` instances
    pub const fn new(instance_count: u32) -> Self {
        Self {
            bindings: Vec::new(),
            instance_count,
        }
    }

    /// Append a binding
    #[must_use]
    pub fn binding(mut self, descriptor_type: vk::DescriptorType, stages: vk::ShaderStageFlags) -> Self {
        self.bindings.push(DescriptorBinding {
            descriptor_type,
            count: 1,
            stages,
        });
        self
    }

    /// Append a dynamic uniform buffer binding
    #[must_use]
    pub fn dynamic_uniform(self, stages: vk::ShaderStageFlags) -> Self {
        self.binding(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, stages)
    }

    /// Append a combined image sampler binding
    #[must_use]
    pub fn combined_image_sampler(self, stages: vk::ShaderStageFlags) -> Self {
        self.binding(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stages)
    }

    /// Append a fragment-stage input attachment binding
    #[must_use]
    pub fn input_attachment(self) -> Self {
        self.binding(vk::DescriptorType::INPUT_ATTACHMENT, vk::ShaderStageFlags::FRAGMENT)
    }

    /// Number of bindings that consume a dynamic offset at bind time
    pub fn dynamic_binding_count(&self) -> usize {
        self.bindings
            .iter()
            .filter(|b| is_dynamic(b.descriptor_type))
            .map(|b| b.count as usize)
            .sum()
    }

    /// Native layout bindings, numbered by position
    pub fn layout_bindings(&self) -> Vec<vk::DescriptorSetLayoutBinding> {
        self.bindings
            .iter()
            .enumerate()
            .map(|(index, b)| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(index as u32)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
                    .build()
            })
            .collect()
    }
}

fn is_dynamic(descriptor_type: vk::DescriptorType) -> bool {
    descriptor_type == vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        || descriptor_type == vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
}

/// Pool sizes summed per type across `infos` (instances multiply), plus the set count
pub fn pool_sizes(infos: &[DescriptorSetInfo]) -> VulkanResult<(Vec<vk::DescriptorPoolSize>, u32)> {
    let set_count: u32 = infos.iter().map(|info| info.instance_count).sum();
    if set_count > MAX_DESCRIPTOR_SETS {
        return Err(VulkanError::DescriptorPoolExhausted {
            requested: set_count,
            max_sets: MAX_DESCRIPTOR_SETS,
        });
    }

    // Keyed by raw type value so the output order is stable.
    let mut totals: BTreeMap<i32, u32> = BTreeMap::new();
    for info in infos {
        for binding in &info.bindings {
            *totals.entry(binding.descriptor_type.as_raw()).or_default() += binding.count * info.instance_count;
        }
    }

    let sizes = totals
        .into_iter()
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
            ty: vk::DescriptorType::from_raw(ty),
            descriptor_count,
        })
        .collect();
    Ok((sizes, set_count))
}

/// Descriptor pool wrapper with RAII cleanup
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
    max_sets: u32,
}

/// Create a pool sized exactly for `infos`
pub fn create_descriptor_pool(device: &Device, infos: &[DescriptorSetInfo]) -> VulkanResult<DescriptorPool> {
    let (sizes, set_count) = pool_sizes(infos)?;

    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .max_sets(MAX_DESCRIPTOR_SETS)
        .pool_sizes(&sizes);

    let pool = unsafe {
        device
            .create_descriptor_pool(&pool_info, None)
            .map_err(VulkanError::call("vkCreateDescriptorPool"))?
    };

    log::debug!("Descriptor pool: {set_count} sets, sizes {sizes:?}");

    Ok(DescriptorPool {
        pool,
        device: device.clone(),
        max_sets: MAX_DESCRIPTOR_SETS,
    })
}

impl DescriptorPool {
    /// Allocate one set per entry in `layouts` in a single call
    pub fn allocate_descriptor_sets(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(|result| match result {
            vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                VulkanError::DescriptorPoolExhausted {
                    requested: layouts.len() as u32,
                    max_sets: self.max_sets,
                }
            }
            result => VulkanError::call("vkAllocateDescriptorSets")(result),
        })
    }

    /// Get the pool handle
    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    info: DescriptorSetInfo,
}

impl DescriptorSetLayout {
    /// Create the native layout for `info`
    pub fn new(device: &Device, info: &DescriptorSetInfo) -> VulkanResult<Self> {
        let bindings = info.layout_bindings();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(VulkanError::call("vkCreateDescriptorSetLayout"))?
        };

        Ok(Self {
            layout,
            device: device.clone(),
            info: info.clone(),
        })
    }

    /// Get the Vulkan descriptor set layout handle
    pub const fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// The declaration this layout was built from
    pub const fn info(&self) -> &DescriptorSetInfo {
        &self.info
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// A set's instances plus the strides its dynamic offsets advance by
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    layout: vk::DescriptorSetLayout,
    instances: Vec<vk::DescriptorSet>,
    dynamic_binding_count: usize,
    dynamic_strides: Vec<u32>,
}

/// Allocate `instance_count` sets sharing `layout`
pub fn allocate_descriptor_set(
    pool: &DescriptorPool,
    layout: &DescriptorSetLayout,
    instance_count: u32,
) -> VulkanResult<DescriptorSet> {
    let layouts = vec![layout.handle(); instance_count as usize];
    let instances = pool.allocate_descriptor_sets(&layouts)?;
    Ok(DescriptorSet::from_parts(
        layout.handle(),
        instances,
        layout.info().dynamic_binding_count(),
    ))
}

impl DescriptorSet {
    /// Assemble from already allocated handles
    pub const fn from_parts(
        layout: vk::DescriptorSetLayout,
        instances: Vec<vk::DescriptorSet>,
        dynamic_binding_count: usize,
    ) -> Self {
        Self {
            layout,
            instances,
            dynamic_binding_count,
            dynamic_strides: Vec::new(),
        }
    }

    /// Register one stride per dynamic binding, in binding order
    pub fn set_dynamic_strides(&mut self, strides: &[vk::DeviceSize]) -> VulkanResult<()> {
        if strides.len() != self.dynamic_binding_count {
            return Err(VulkanError::Validation(format!(
                "{} dynamic strides given for a layout with {} dynamic bindings",
                strides.len(),
                self.dynamic_binding_count
            )));
        }
        self.dynamic_strides = strides
            .iter()
            .map(|&stride| {
                u32::try_from(stride)
                    .map_err(|_| VulkanError::Validation(format!("dynamic stride {stride} does not fit in u32")))
            })
            .collect::<VulkanResult<_>>()?;
        Ok(())
    }

    /// Instance to bind for `image_index`: per-frame sets index by image, static sets always use 0
    pub fn instance_for(&self, image_index: usize) -> VulkanResult<vk::DescriptorSet> {
        let index = if self.instances.len() > 1 { image_index } else { 0 };
        self.instances
            .get(index)
            .copied()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("descriptor set has no instance for image {image_index}"),
            })
    }

    /// `entity_index * stride` for each dynamic binding
    pub fn dynamic_offsets(&self, entity_index: u32) -> VulkanResult<Vec<u32>> {
        if self.dynamic_strides.len() != self.dynamic_binding_count {
            return Err(VulkanError::Validation(format!(
                "descriptor set has {} dynamic bindings but {} registered strides",
                self.dynamic_binding_count,
                self.dynamic_strides.len()
            )));
        }
        self.dynamic_strides
            .iter()
            .map(|&stride| {
                entity_index.checked_mul(stride).ok_or_else(|| {
                    VulkanError::Validation(format!("dynamic offset for entity {entity_index} overflows"))
                })
            })
            .collect()
    }

    /// Layout handle
    pub const fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// All instances
    pub fn instances(&self) -> &[vk::DescriptorSet] {
        &self.instances
    }
}

/// Handles and concatenated dynamic offsets for binding `sets` as sets `0..sets.len()`
pub fn descriptor_bindings(
    sets: &[&DescriptorSet],
    image_index: usize,
    entity_index: u32,
) -> VulkanResult<(Vec<vk::DescriptorSet>, Vec<u32>)> {
    let mut handles = Vec::with_capacity(sets.len());
    let mut offsets = Vec::new();
    for set in sets {
        handles.push(set.instance_for(image_index)?);
        offsets.extend(set.dynamic_offsets(entity_index)?);
    }
    Ok((handles, offsets))
}

/// Bind `sets` for swapchain image `image_index`, offset to entity `entity_index`
pub fn bind_descriptor_sets(
    pass: &mut ActiveRenderPass<'_>,
    pipeline_layout: vk::PipelineLayout,
    sets: &[&DescriptorSet],
    image_index: usize,
    entity_index: u32,
) -> VulkanResult<()> {
    let (handles, offsets) = descriptor_bindings(sets, image_index, entity_index)?;
    pass.bind_descriptor_sets(pipeline_layout, 0, &handles, &offsets);
    Ok(())
}

enum PendingWrite {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

/// Collects descriptor writes and applies them in one update
#[derive(Default)]
pub struct DescriptorWriter {
    writes: Vec<(vk::DescriptorSet, u32, vk::DescriptorType, PendingWrite)>,
}

impl DescriptorWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Point a uniform binding at `range` bytes of `region`
    ///
    /// For dynamic bindings `range` is one element; the dynamic offset picks which.
    #[must_use]
    pub fn uniform(
        mut self,
        set: vk::DescriptorSet,
        binding: u32,
        region: &Region,
        range: vk::DeviceSize,
        dynamic: bool,
    ) -> Self {
        let descriptor_type = if dynamic {
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        } else {
            vk::DescriptorType::UNIFORM_BUFFER
        };
        self.writes.push((
            set,
            binding,
            descriptor_type,
            PendingWrite::Buffer(vk::DescriptorBufferInfo {
                buffer: region.buffer,
                offset: region.offset,
                range,
            }),
        ));
        self
    }

    /// Bind a sampled image
    #[must_use]
    pub fn combined_image_sampler(
        mut self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Self {
        self.writes.push((
            set,
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            PendingWrite::Image(vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }),
        ));
        self
    }

    /// Bind an input attachment read in `layout`
    #[must_use]
    pub fn input_attachment(mut self, set: vk::DescriptorSet, binding: u32, view: vk::ImageView, layout: vk::ImageLayout) -> Self {
        self.writes.push((
            set,
            binding,
            vk::DescriptorType::INPUT_ATTACHMENT,
            PendingWrite::Image(vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: view,
                image_layout: layout,
            }),
        ));
        self
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Are there no queued writes
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply every queued write
    pub fn update(self, device: &Device) {
        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|(set, binding, descriptor_type, pending)| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(*descriptor_type);
                match pending {
                    PendingWrite::Buffer(info) => builder.buffer_info(std::slice::from_ref(info)).build(),
                    PendingWrite::Image(info) => builder.image_info(std::slice::from_ref(info)).build(),
                }
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}
