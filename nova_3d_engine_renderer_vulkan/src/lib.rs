/*!
# Nova 3D Engine - Vulkan Renderer Backend

Vulkan implementation of the Nova 3D graphics device.

This crate implements the `nova_3d_engine` GPU traits using the Ash
library for Vulkan bindings and gpu-allocator for memory management.
It targets Vulkan 1.3 with dynamic rendering; render passes and
framebuffer objects are never created.

The backend registers itself under the name `"vulkan"` and is selected
at runtime through `Engine::create_device`.
*/

// Vulkan implementation modules
mod vulkan_binding;
mod vulkan_buffer;
mod vulkan_command_list;
mod vulkan_device;
mod vulkan_shader;
mod vulkan_texture;

#[cfg(feature = "vulkan-validation")]
mod debug;

pub use vulkan_binding::{VulkanBindingLayout, VulkanBindingTable};
pub use vulkan_buffer::VulkanBuffer;
pub use vulkan_command_list::VulkanCommandList;
pub use vulkan_device::VulkanDevice;
pub use vulkan_shader::{VulkanPipeline, VulkanShader};
pub use vulkan_texture::{VulkanSampler, VulkanTexture, VulkanTextureView};

use std::sync::Arc;

use winit::window::Window;

use nova_3d_engine::nova3d::gpu::GraphicsDevice;
use nova_3d_engine::nova3d::{Engine, EngineConfig, Result};

fn create_vulkan_device(
    window: &Window,
    config: &EngineConfig,
) -> Result<Arc<dyn GraphicsDevice>> {
    Ok(Arc::new(VulkanDevice::new(window, config)?))
}

/// Register the Vulkan backend with the engine's backend registry
///
/// # Example
///
/// ```no_run
/// use nova_3d_engine::nova3d::{Engine, EngineConfig};
///
/// nova_3d_engine_renderer_vulkan::register();
/// # let window: winit::window::Window = unimplemented!();
/// let device = Engine::create_device("vulkan", &window, &EngineConfig::default())?;
/// # Ok::<(), nova_3d_engine::nova3d::Error>(())
/// ```
pub fn register() {
    Engine::register_backend("vulkan", create_vulkan_device);
}
