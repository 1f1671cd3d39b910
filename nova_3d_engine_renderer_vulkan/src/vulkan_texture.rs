/// Vulkan texture, texture view and sampler resources
///
/// Textures own their image and GPU allocation; views and samplers keep
/// the device handle alive through `Arc` so Drop order never matters.

use std::any::Any;
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};

use nova_3d_engine::nova3d::gpu::{
    AddressMode, Filter, ImageLayout, Sampler, Texture, TextureFormat, TextureInfo, TextureView,
};

// ===== FORMAT CONVERSIONS =====

pub(crate) fn format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::R16G16B16A16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::D16_UNORM => vk::Format::D16_UNORM,
        TextureFormat::D32_FLOAT => vk::Format::D32_SFLOAT,
        TextureFormat::D24_UNORM_S8_UINT => vk::Format::D24_UNORM_S8_UINT,
    }
}

pub(crate) fn aspect_of(format: TextureFormat) -> vk::ImageAspectFlags {
    if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub(crate) fn layout_to_vk(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthAttachment => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthReadOnly => vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub(crate) fn filter_to_vk(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

// ===== TEXTURE =====

/// A Vulkan image plus its memory allocation
///
/// Swapchain images are wrapped with `allocation: None`; their memory
/// belongs to the swapchain and must not be freed here.
pub struct VulkanTexture {
    pub(crate) image: vk::Image,
    pub(crate) info: TextureInfo,
    pub(crate) allocation: Mutex<Option<Allocation>>,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) allocator: Option<Arc<Mutex<Allocator>>>,
}

impl Texture for VulkanTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        if let Some(allocator) = &self.allocator {
            unsafe {
                self.device.destroy_image(self.image, None);
            }
            if let Some(allocation) = self.allocation.lock().unwrap().take() {
                let _ = allocator.lock().unwrap().free(allocation);
            }
        }
    }
}

/// Downcast a texture trait object to the Vulkan type
pub(crate) fn vulkan_texture(texture: &Arc<dyn Texture>) -> &VulkanTexture {
    texture
        .as_any()
        .downcast_ref::<VulkanTexture>()
        .expect("texture was not created by the Vulkan backend")
}

// ===== TEXTURE VIEW =====

pub struct VulkanTextureView {
    pub(crate) view: vk::ImageView,
    pub(crate) base_layer: u32,
    pub(crate) layer_count: u32,
    pub(crate) device: Arc<ash::Device>,
}

impl TextureView for VulkanTextureView {
    fn base_layer(&self) -> u32 {
        self.base_layer
    }

    fn layer_count(&self) -> u32 {
        self.layer_count
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanTextureView {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
    }
}

pub(crate) fn vulkan_view(view: &Arc<dyn TextureView>) -> &VulkanTextureView {
    view.as_any()
        .downcast_ref::<VulkanTextureView>()
        .expect("texture view was not created by the Vulkan backend")
}

// ===== SAMPLER =====

pub struct VulkanSampler {
    pub(crate) sampler: vk::Sampler,
    pub(crate) device: Arc<ash::Device>,
}

impl VulkanSampler {
    pub(crate) fn address_mode_to_vk(mode: AddressMode) -> vk::SamplerAddressMode {
        match mode {
            AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            AddressMode::ClampToBorderWhite => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        }
    }
}

impl Sampler for VulkanSampler {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanSampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

pub(crate) fn vulkan_sampler(sampler: &Arc<dyn Sampler>) -> &VulkanSampler {
    sampler
        .as_any()
        .downcast_ref::<VulkanSampler>()
        .expect("sampler was not created by the Vulkan backend")
}

// ============================================================================
// Format conversion tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_formats_map_to_depth_aspect() {
        assert_eq!(aspect_of(TextureFormat::D32_FLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_of(TextureFormat::D16_UNORM), vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_of(TextureFormat::R8G8B8A8_SRGB), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_format_round_trip_is_lossless_names() {
        assert_eq!(format_to_vk(TextureFormat::D32_FLOAT), vk::Format::D32_SFLOAT);
        assert_eq!(
            format_to_vk(TextureFormat::R16G16B16A16_SFLOAT),
            vk::Format::R16G16B16A16_SFLOAT
        );
    }

    #[test]
    fn test_present_layout_maps_to_khr() {
        assert_eq!(layout_to_vk(ImageLayout::PresentSrc), vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(layout_to_vk(ImageLayout::Undefined), vk::ImageLayout::UNDEFINED);
    }
}
