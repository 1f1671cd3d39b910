/// Vulkan binding table layout and table resources
///
/// A binding layout owns both the descriptor set layout and the pool its
/// tables are allocated from; the pool is sized by `max_tables` at
/// creation and never grows.

use std::any::Any;
use std::sync::{Arc, Mutex};

use ash::vk;

use nova_3d_engine::nova3d::gpu::{
    validate_binding_writes, BindingKind, BindingLayout, BindingLayoutDesc, BindingResource,
    BindingTable, BindingWrite, ShaderStage,
};
use nova_3d_engine::nova3d::{Error, Result};

use crate::vulkan_buffer::vulkan_buffer;
use crate::vulkan_texture::{vulkan_sampler, vulkan_view};

pub(crate) fn stages_to_vk(stages: &[ShaderStage]) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    for stage in stages {
        flags |= match stage {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        };
    }
    flags
}

fn kind_to_vk(kind: BindingKind) -> vk::DescriptorType {
    match kind {
        BindingKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        BindingKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    }
}

pub struct VulkanBindingLayout {
    pub(crate) layout: vk::DescriptorSetLayout,
    pub(crate) pool: Mutex<vk::DescriptorPool>,
    desc: BindingLayoutDesc,
    device: Arc<ash::Device>,
}

impl VulkanBindingLayout {
    pub(crate) fn new(device: Arc<ash::Device>, desc: &BindingLayoutDesc) -> Result<Self> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(kind_to_vk(binding.kind))
                    .descriptor_count(binding.count)
                    .stage_flags(stages_to_vk(&binding.stages))
            })
            .collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe {
            vk_err(device.create_descriptor_set_layout(&layout_info, None), "descriptor set layout")?
        };

        // Pool sized for max_tables sets of every declared binding
        let pool_sizes: Vec<vk::DescriptorPoolSize> = desc
            .bindings
            .iter()
            .map(|binding| vk::DescriptorPoolSize {
                ty: kind_to_vk(binding.kind),
                descriptor_count: binding.count * desc.max_tables.max(1),
            })
            .collect();
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(desc.max_tables.max(1))
            .pool_sizes(&pool_sizes);
        let pool = unsafe { vk_err(device.create_descriptor_pool(&pool_info, None), "descriptor pool")? };

        Ok(Self { layout, pool: Mutex::new(pool), desc: desc.clone(), device })
    }

    pub(crate) fn allocate_table(&self) -> Result<VulkanBindingTable> {
        let pool = *self.pool.lock().unwrap();
        let layouts = [self.layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { vk_err(self.device.allocate_descriptor_sets(&allocate_info), "descriptor set")? };
        Ok(VulkanBindingTable { set: sets[0] })
    }
}

impl BindingLayout for VulkanBindingLayout {
    fn desc(&self) -> &BindingLayoutDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBindingLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(*self.pool.lock().unwrap(), None);
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

pub(crate) fn vulkan_binding_layout(layout: &Arc<dyn BindingLayout>) -> &VulkanBindingLayout {
    layout
        .as_any()
        .downcast_ref::<VulkanBindingLayout>()
        .expect("binding layout was not created by the Vulkan backend")
}

pub struct VulkanBindingTable {
    pub(crate) set: vk::DescriptorSet,
}

impl BindingTable for VulkanBindingTable {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn vulkan_binding_table(table: &Arc<dyn BindingTable>) -> &VulkanBindingTable {
    table
        .as_any()
        .downcast_ref::<VulkanBindingTable>()
        .expect("binding table was not created by the Vulkan backend")
}

/// Apply a set of binding writes to one descriptor set
pub(crate) fn write_binding_table(
    device: &ash::Device,
    layout: &VulkanBindingLayout,
    table: &VulkanBindingTable,
    writes: &[BindingWrite],
) -> Result<()> {
    validate_binding_writes(&layout.desc, writes)?;

    // Info structs must outlive the WriteDescriptorSet array
    let mut buffer_infos: Vec<vk::DescriptorBufferInfo> = Vec::new();
    let mut image_infos: Vec<Vec<vk::DescriptorImageInfo>> = Vec::new();
    for write in writes {
        match &write.resource {
            BindingResource::Buffer { buffer, offset, size } => {
                buffer_infos.push(vk::DescriptorBufferInfo {
                    buffer: vulkan_buffer(buffer).buffer,
                    offset: *offset,
                    range: *size,
                });
            }
            BindingResource::Images(images) => {
                image_infos.push(
                    images
                        .iter()
                        .map(|image| vk::DescriptorImageInfo {
                            sampler: vulkan_sampler(&image.sampler).sampler,
                            image_view: vulkan_view(&image.view).view,
                            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        })
                        .collect(),
                );
            }
        }
    }

    let mut vk_writes: Vec<vk::WriteDescriptorSet> = Vec::with_capacity(writes.len());
    let mut buffer_cursor = 0;
    let mut image_cursor = 0;
    for write in writes {
        let base = vk::WriteDescriptorSet::default()
            .dst_set(table.set)
            .dst_binding(write.binding)
            .dst_array_element(0);
        match &write.resource {
            BindingResource::Buffer { .. } => {
                vk_writes.push(
                    base.descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                        .buffer_info(std::slice::from_ref(&buffer_infos[buffer_cursor])),
                );
                buffer_cursor += 1;
            }
            BindingResource::Images(_) => {
                vk_writes.push(
                    base.descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(&image_infos[image_cursor]),
                );
                image_cursor += 1;
            }
        }
    }

    unsafe {
        device.update_descriptor_sets(&vk_writes, &[]);
    }
    Ok(())
}

fn vk_err<T>(result: std::result::Result<T, vk::Result>, what: &str) -> Result<T> {
    result.map_err(|e| Error::BackendError(format!("Failed to create {}: {:?}", what, e)))
}
