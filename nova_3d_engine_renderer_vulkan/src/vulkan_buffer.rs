/// Vulkan buffer resource
///
/// All buffers are host-visible and persistently mapped (CpuToGpu), so
/// uniform and geometry uploads are plain memcpys with no staging pass.

use std::any::Any;
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};

use nova_3d_engine::nova3d::gpu::{Buffer, BufferUsage};
use nova_3d_engine::nova3d::Result;

pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    flags
}

pub struct VulkanBuffer {
    pub(crate) buffer: vk::Buffer,
    pub(crate) size: u64,
    pub(crate) allocation: Mutex<Option<Allocation>>,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) allocator: Arc<Mutex<Allocator>>,
}

impl Buffer for VulkanBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if offset + data.len() as u64 > self.size {
            return Err(nova_3d_engine::nova3d::Error::InvalidResource(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                self.size
            )));
        }
        let mut allocation = self.allocation.lock().unwrap();
        let Some(allocation) = allocation.as_mut() else {
            return Err(nova_3d_engine::nova3d::Error::InvalidResource(
                "write to a freed buffer".to_string(),
            ));
        };
        let Some(mapped) = allocation.mapped_slice_mut() else {
            return Err(nova_3d_engine::nova3d::Error::BackendError(
                "buffer memory is not host-visible".to_string(),
            ));
        };
        let offset = offset as usize;
        mapped[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.lock().unwrap().take() {
            let _ = self.allocator.lock().unwrap().free(allocation);
        }
    }
}

pub(crate) fn vulkan_buffer(buffer: &Arc<dyn Buffer>) -> &VulkanBuffer {
    buffer
        .as_any()
        .downcast_ref::<VulkanBuffer>()
        .expect("buffer was not created by the Vulkan backend")
}
