/// VulkanDevice - Vulkan implementation of the GraphicsDevice trait
///
/// Owns the instance, logical device, surface, swapchain and per-frame
/// synchronization objects, and provides the resource factory the frame
/// scheduler records against. All methods take `&self`; mutable state
/// (swapchain, queue, allocator) sits behind interior locks.

use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{
    AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;

use nova_3d_engine::engine_info;
use nova_3d_engine::nova3d::gpu::{
    Acquire, AddressMode, BindingLayout, BindingLayoutDesc, BindingTable, BindingWrite, Buffer,
    BufferDesc, CommandList, GraphicsDevice, Pipeline, PipelineDesc, Present, Sampler,
    SamplerDesc, Shader, ShaderDesc, Texture, TextureDesc, TextureFormat, TextureInfo,
    TextureUsage, TextureView,
};
use nova_3d_engine::nova3d::{EngineConfig, Error, Result};

use crate::vulkan_binding::{
    vulkan_binding_layout, vulkan_binding_table, write_binding_table, VulkanBindingLayout,
};
use crate::vulkan_buffer::{buffer_usage_to_vk, VulkanBuffer};
use crate::vulkan_command_list::VulkanCommandList;
use crate::vulkan_shader::{VulkanPipeline, VulkanShader};
use crate::vulkan_texture::{
    aspect_of, filter_to_vk, format_to_vk, vulkan_texture, VulkanSampler, VulkanTexture,
    VulkanTextureView,
};

const LOG_SOURCE: &str = "nova3d::VulkanDevice";

/// Swapchain state, rebuilt as one unit on resize
struct SwapchainState {
    swapchain: vk::SwapchainKHR,
    images: Vec<Arc<VulkanTexture>>,
    extent: vk::Extent2D,
    /// One per swapchain image; submit signals it, present waits on it
    render_finished: Vec<vk::Semaphore>,
}

pub struct VulkanDevice {
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,

    graphics_queue_family: u32,
    /// Queue submission and presentation require external synchronization
    queue: Mutex<vk::Queue>,

    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: Mutex<SwapchainState>,

    // ManuallyDrop to control destruction order against the device
    allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    frames_in_flight: usize,
    /// One per frame slot; acquire signals it, submit waits on it
    image_available: Vec<vk::Semaphore>,
    /// One per frame slot, created signaled
    in_flight_fences: Vec<vk::Fence>,

    #[cfg(feature = "vulkan-validation")]
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

fn format_from_vk(format: vk::Format) -> TextureFormat {
    match format {
        vk::Format::R8G8B8A8_SRGB => TextureFormat::R8G8B8A8_SRGB,
        vk::Format::R8G8B8A8_UNORM => TextureFormat::R8G8B8A8_UNORM,
        vk::Format::B8G8R8A8_UNORM => TextureFormat::B8G8R8A8_UNORM,
        _ => TextureFormat::B8G8R8A8_SRGB,
    }
}

fn texture_usage_to_vk(usage: TextureUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::SAMPLED) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::COLOR_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(TextureUsage::DEPTH_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.contains(TextureUsage::TRANSFER_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::TRANSFER_DST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    flags
}

impl VulkanDevice {
    /// Create the Vulkan device for a window
    pub fn new(window: &Window, config: &EngineConfig) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                Error::InitializationFailed(format!("Failed to load Vulkan: {}", e))
            })?;

            // Instance
            let app_name = CString::new("nova3d").map_err(|e| {
                Error::InitializationFailed(format!("Invalid application name: {}", e))
            })?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Nova3D")
                .engine_version(vk::make_api_version(0, 1, 0, 0))
                .api_version(vk::API_VERSION_1_3);

            let display_handle = window.display_handle().map_err(|e| {
                Error::InitializationFailed(format!("Failed to get display handle: {}", e))
            })?;
            #[allow(unused_mut)]
            let mut extension_names =
                ash_window::enumerate_required_extensions(display_handle.as_raw())
                    .map_err(|e| {
                        Error::InitializationFailed(format!(
                            "Failed to get required extensions: {:?}",
                            e
                        ))
                    })?
                    .to_vec();
            #[cfg(feature = "vulkan-validation")]
            extension_names.push(ash::ext::debug_utils::NAME.as_ptr());

            #[cfg(feature = "vulkan-validation")]
            let layer_names = vec![c"VK_LAYER_KHRONOS_validation".as_ptr()];
            #[cfg(not(feature = "vulkan-validation"))]
            let layer_names: Vec<*const std::os::raw::c_char> = vec![];

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);
            let instance = entry.create_instance(&create_info, None).map_err(|e| {
                Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
            })?;

            #[cfg(feature = "vulkan-validation")]
            let debug_messenger = {
                let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
                let messenger_info = crate::debug::messenger_create_info();
                let messenger = loader
                    .create_debug_utils_messenger(&messenger_info, None)
                    .map_err(|e| {
                        Error::InitializationFailed(format!(
                            "Failed to create debug messenger: {:?}",
                            e
                        ))
                    })?;
                Some((loader, messenger))
            };

            // Surface
            let window_handle = window.window_handle().map_err(|e| {
                Error::InitializationFailed(format!("Failed to get window handle: {}", e))
            })?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            // Physical device and queue family
            let physical_devices = instance.enumerate_physical_devices().map_err(|e| {
                Error::InitializationFailed(format!(
                    "Failed to enumerate physical devices: {:?}",
                    e
                ))
            })?;
            let physical_device = physical_devices.into_iter().next().ok_or_else(|| {
                Error::InitializationFailed("No Vulkan-capable GPU found".to_string())
            })?;

            let queue_families =
                instance.get_physical_device_queue_family_properties(physical_device);
            let graphics_queue_family = queue_families
                .iter()
                .enumerate()
                .find(|(i, qf)| {
                    qf.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                        && surface_loader
                            .get_physical_device_surface_support(
                                physical_device,
                                *i as u32,
                                surface,
                            )
                            .unwrap_or(false)
                })
                .map(|(i, _)| i as u32)
                .ok_or_else(|| {
                    Error::InitializationFailed(
                        "No graphics queue family with present support found".to_string(),
                    )
                })?;

            // Logical device with dynamic rendering
            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family)
                .queue_priorities(&queue_priorities)];
            let device_extension_names = vec![ash::khr::swapchain::NAME.as_ptr()];
            let mut vulkan_13_features = vk::PhysicalDeviceVulkan13Features::default()
                .dynamic_rendering(true)
                .synchronization2(true);
            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .push_next(&mut vulkan_13_features);
            let device = Arc::new(
                instance
                    .create_device(physical_device, &device_create_info, None)
                    .map_err(|e| {
                        Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                    })?,
            );
            let queue = device.get_device_queue(graphics_queue_family, 0);

            // Allocator
            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: (*device).clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;
            let allocator = Arc::new(Mutex::new(allocator));

            // Swapchain
            let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
            let swapchain = Self::build_swapchain(
                &surface_loader,
                &swapchain_loader,
                &device,
                physical_device,
                surface,
                None,
                vk::SwapchainKHR::null(),
            )?;

            // Per-slot synchronization
            let frames_in_flight = config.frames_in_flight;
            let semaphore_info = vk::SemaphoreCreateInfo::default();
            let fence_info =
                vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let mut image_available = Vec::with_capacity(frames_in_flight);
            let mut in_flight_fences = Vec::with_capacity(frames_in_flight);
            for _ in 0..frames_in_flight {
                image_available.push(device.create_semaphore(&semaphore_info, None).map_err(
                    |e| {
                        Error::InitializationFailed(format!(
                            "Failed to create semaphore: {:?}",
                            e
                        ))
                    },
                )?);
                in_flight_fences.push(device.create_fence(&fence_info, None).map_err(|e| {
                    Error::InitializationFailed(format!("Failed to create fence: {:?}", e))
                })?);
            }

            engine_info!(
                LOG_SOURCE,
                "Vulkan device ready ({}x{}, {} frames in flight, {} swapchain images)",
                swapchain.extent.width,
                swapchain.extent.height,
                frames_in_flight,
                swapchain.images.len()
            );

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                device,
                graphics_queue_family,
                queue: Mutex::new(queue),
                surface,
                surface_loader,
                swapchain_loader,
                swapchain: Mutex::new(swapchain),
                allocator: ManuallyDrop::new(allocator),
                frames_in_flight,
                image_available,
                in_flight_fences,
                #[cfg(feature = "vulkan-validation")]
                debug_messenger,
            })
        }
    }

    /// Build the swapchain state for the current surface
    ///
    /// `requested_extent` overrides the surface's current extent when the
    /// platform reports an unbounded one.
    fn build_swapchain(
        surface_loader: &ash::khr::surface::Instance,
        swapchain_loader: &ash::khr::swapchain::Device,
        device: &Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        requested_extent: Option<(u32, u32)>,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<SwapchainState> {
        unsafe {
            let capabilities = surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(|e| {
                    Error::InitializationFailed(format!(
                        "Failed to get surface capabilities: {:?}",
                        e
                    ))
                })?;
            let formats = surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(|e| {
                    Error::InitializationFailed(format!(
                        "Failed to get surface formats: {:?}",
                        e
                    ))
                })?;
            let surface_format = formats
                .iter()
                .find(|f| {
                    f.format == vk::Format::B8G8R8A8_SRGB
                        || f.format == vk::Format::R8G8B8A8_SRGB
                })
                .unwrap_or(&formats[0]);

            let extent = if capabilities.current_extent.width != u32::MAX {
                capabilities.current_extent
            } else {
                let (width, height) = requested_extent.unwrap_or((1, 1));
                vk::Extent2D {
                    width: width.clamp(
                        capabilities.min_image_extent.width,
                        capabilities.max_image_extent.width,
                    ),
                    height: height.clamp(
                        capabilities.min_image_extent.height,
                        capabilities.max_image_extent.height,
                    ),
                }
            };

            let mut min_image_count = 3.max(capabilities.min_image_count);
            if capabilities.max_image_count > 0 {
                min_image_count = min_image_count.min(capabilities.max_image_count);
            }

            // The presentable images are blit destinations, never rendered
            // into directly
            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(surface)
                .min_image_count(min_image_count)
                .image_format(surface_format.format)
                .image_color_space(surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                )
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(vk::PresentModeKHR::FIFO)
                .old_swapchain(old_swapchain);

            let swapchain =
                swapchain_loader.create_swapchain(&create_info, None).map_err(|e| {
                    Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
                })?;
            let raw_images = swapchain_loader.get_swapchain_images(swapchain).map_err(|e| {
                Error::InitializationFailed(format!("Failed to get swapchain images: {:?}", e))
            })?;

            // Wrap raw images without an allocation; the swapchain owns
            // their memory
            let images: Vec<Arc<VulkanTexture>> = raw_images
                .iter()
                .map(|&image| {
                    Arc::new(VulkanTexture {
                        image,
                        info: TextureInfo {
                            width: extent.width,
                            height: extent.height,
                            format: format_from_vk(surface_format.format),
                            usage: TextureUsage::COLOR_ATTACHMENT | TextureUsage::TRANSFER_DST,
                            array_layers: 1,
                        },
                        allocation: Mutex::new(None),
                        device: device.clone(),
                        allocator: None,
                    })
                })
                .collect();

            let semaphore_info = vk::SemaphoreCreateInfo::default();
            let render_finished = (0..images.len())
                .map(|_| {
                    device.create_semaphore(&semaphore_info, None).map_err(|e| {
                        Error::InitializationFailed(format!(
                            "Failed to create semaphore: {:?}",
                            e
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(SwapchainState {
                swapchain,
                images,
                extent,
                render_finished,
            })
        }
    }

    fn destroy_swapchain_state(&self, state: &mut SwapchainState) {
        unsafe {
            for semaphore in state.render_finished.drain(..) {
                self.device.destroy_semaphore(semaphore, None);
            }
            state.images.clear();
            self.swapchain_loader.destroy_swapchain(state.swapchain, None);
            state.swapchain = vk::SwapchainKHR::null();
        }
    }

    /// Record and synchronously execute a one-shot command buffer
    fn one_shot_commands(
        &self,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) -> Result<()> {
        unsafe {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(self.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT);
            let pool = self.device.create_command_pool(&pool_info, None).map_err(|e| {
                Error::BackendError(format!("Failed to create transient pool: {:?}", e))
            })?;

            let result = (|| {
                let allocate_info = vk::CommandBufferAllocateInfo::default()
                    .command_pool(pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1);
                let buffer = self
                    .device
                    .allocate_command_buffers(&allocate_info)
                    .map_err(|e| {
                        Error::BackendError(format!(
                            "Failed to allocate one-shot command buffer: {:?}",
                            e
                        ))
                    })?[0];
                let begin_info = vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
                self.device.begin_command_buffer(buffer, &begin_info).map_err(|e| {
                    Error::BackendError(format!("Failed to begin one-shot commands: {:?}", e))
                })?;
                record(&self.device, buffer);
                self.device.end_command_buffer(buffer).map_err(|e| {
                    Error::BackendError(format!("Failed to end one-shot commands: {:?}", e))
                })?;

                let buffers = [buffer];
                let submit_info = vk::SubmitInfo::default().command_buffers(&buffers);
                let queue = self.queue.lock().unwrap();
                self.device
                    .queue_submit(*queue, &[submit_info], vk::Fence::null())
                    .map_err(|e| {
                        Error::BackendError(format!(
                            "Failed to submit one-shot commands: {:?}",
                            e
                        ))
                    })?;
                self.device.queue_wait_idle(*queue).map_err(|e| {
                    Error::BackendError(format!("Failed to wait for one-shot commands: {:?}", e))
                })
            })();

            self.device.destroy_command_pool(pool, None);
            result
        }
    }

    /// Upload initial pixel data through a staging buffer and leave the
    /// texture in ShaderReadOnly
    fn upload_texture_data(&self, texture: &VulkanTexture, data: &[u8]) -> Result<()> {
        unsafe {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(data.len() as u64)
                .usage(vk::BufferUsageFlags::TRANSFER_SRC)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let staging = self.device.create_buffer(&buffer_info, None).map_err(|e| {
                Error::BackendError(format!("Failed to create staging buffer: {:?}", e))
            })?;
            let requirements = self.device.get_buffer_memory_requirements(staging);
            let mut allocation = self
                .allocator
                .lock()
                .unwrap()
                .allocate(&AllocationCreateDesc {
                    name: "staging",
                    requirements,
                    location: MemoryLocation::CpuToGpu,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_| Error::OutOfMemory)?;
            self.device
                .bind_buffer_memory(staging, allocation.memory(), allocation.offset())
                .map_err(|e| {
                    Error::BackendError(format!("Failed to bind staging memory: {:?}", e))
                })?;
            allocation
                .mapped_slice_mut()
                .ok_or_else(|| {
                    Error::BackendError("staging memory is not host-visible".to_string())
                })?[..data.len()]
                .copy_from_slice(data);

            let info = &texture.info;
            let aspect = aspect_of(info.format);
            let range = vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: info.array_layers,
            };
            let upload = self.one_shot_commands(|device, commands| {
                let to_transfer = vk::ImageMemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(texture.image)
                    .subresource_range(range);
                device.cmd_pipeline_barrier(
                    commands,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_transfer],
                );

                let region = vk::BufferImageCopy::default()
                    .buffer_offset(0)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: aspect,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: info.array_layers,
                    })
                    .image_extent(vk::Extent3D {
                        width: info.width,
                        height: info.height,
                        depth: 1,
                    });
                device.cmd_copy_buffer_to_image(
                    commands,
                    staging,
                    texture.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );

                let to_sampled = vk::ImageMemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(vk::AccessFlags::SHADER_READ)
                    .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(texture.image)
                    .subresource_range(range);
                device.cmd_pipeline_barrier(
                    commands,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_sampled],
                );
            });

            self.device.destroy_buffer(staging, None);
            let _ = self.allocator.lock().unwrap().free(allocation);
            upload
        }
    }
}

impl GraphicsDevice for VulkanDevice {
    // ===== CAPABILITIES =====

    fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    fn surface_extent(&self) -> (u32, u32) {
        let swapchain = self.swapchain.lock().unwrap();
        (swapchain.extent.width, swapchain.extent.height)
    }

    // ===== RESOURCE FACTORY =====

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>> {
        unsafe {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let buffer = self.device.create_buffer(&buffer_info, None).map_err(|e| {
                Error::BackendError(format!("Failed to create buffer: {:?}", e))
            })?;
            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let allocation = self
                .allocator
                .lock()
                .unwrap()
                .allocate(&AllocationCreateDesc {
                    name: "buffer",
                    requirements,
                    location: MemoryLocation::CpuToGpu,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_| Error::OutOfMemory)?;
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| {
                    Error::BackendError(format!("Failed to bind buffer memory: {:?}", e))
                })?;
            Ok(Arc::new(VulkanBuffer {
                buffer,
                size: desc.size,
                allocation: Mutex::new(Some(allocation)),
                device: self.device.clone(),
                allocator: (*self.allocator).clone(),
            }))
        }
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>> {
        unsafe {
            let mut usage = texture_usage_to_vk(desc.usage);
            if desc.data.is_some() {
                usage |= vk::ImageUsageFlags::TRANSFER_DST;
            }
            let image_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format_to_vk(desc.format))
                .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: 1 })
                .mip_levels(1)
                .array_layers(desc.array_layers)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            let image = self.device.create_image(&image_info, None).map_err(|e| {
                Error::BackendError(format!("Failed to create image: {:?}", e))
            })?;
            let requirements = self.device.get_image_memory_requirements(image);
            let allocation = self
                .allocator
                .lock()
                .unwrap()
                .allocate(&AllocationCreateDesc {
                    name: "texture",
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_| Error::OutOfMemory)?;
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| {
                    Error::BackendError(format!("Failed to bind image memory: {:?}", e))
                })?;

            let texture = VulkanTexture {
                image,
                info: TextureInfo {
                    width: desc.width,
                    height: desc.height,
                    format: desc.format,
                    usage: desc.usage,
                    array_layers: desc.array_layers,
                },
                allocation: Mutex::new(Some(allocation)),
                device: self.device.clone(),
                allocator: Some((*self.allocator).clone()),
            };
            if let Some(data) = &desc.data {
                self.upload_texture_data(&texture, data)?;
            }
            Ok(Arc::new(texture))
        }
    }

    fn create_texture_view(
        &self,
        texture: &Arc<dyn Texture>,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<Arc<dyn TextureView>> {
        let vulkan = vulkan_texture(texture);
        let view_type = if layer_count > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let create_info = vk::ImageViewCreateInfo::default()
            .image(vulkan.image)
            .view_type(view_type)
            .format(format_to_vk(vulkan.info.format))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_of(vulkan.info.format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: base_layer,
                layer_count,
            });
        let view = unsafe {
            self.device.create_image_view(&create_info, None).map_err(|e| {
                Error::BackendError(format!("Failed to create image view: {:?}", e))
            })?
        };
        Ok(Arc::new(VulkanTextureView {
            view,
            base_layer,
            layer_count,
            device: self.device.clone(),
        }))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Arc<dyn Sampler>> {
        let address_mode = VulkanSampler::address_mode_to_vk(desc.address_mode);
        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter_to_vk(desc.mag_filter))
            .min_filter(filter_to_vk(desc.min_filter))
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode);
        if desc.address_mode == AddressMode::ClampToBorderWhite {
            create_info = create_info.border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE);
        }
        let sampler = unsafe {
            self.device.create_sampler(&create_info, None).map_err(|e| {
                Error::BackendError(format!("Failed to create sampler: {:?}", e))
            })?
        };
        Ok(Arc::new(VulkanSampler { sampler, device: self.device.clone() }))
    }

    fn create_shader(&self, desc: &ShaderDesc) -> Result<Arc<dyn Shader>> {
        Ok(Arc::new(VulkanShader::new(self.device.clone(), desc)?))
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<Arc<dyn Pipeline>> {
        Ok(Arc::new(VulkanPipeline::new(self.device.clone(), desc)?))
    }

    fn create_binding_layout(&self, desc: &BindingLayoutDesc) -> Result<Arc<dyn BindingLayout>> {
        Ok(Arc::new(VulkanBindingLayout::new(self.device.clone(), desc)?))
    }

    fn create_binding_table(
        &self,
        layout: &Arc<dyn BindingLayout>,
    ) -> Result<Arc<dyn BindingTable>> {
        Ok(Arc::new(vulkan_binding_layout(layout).allocate_table()?))
    }

    fn update_binding_table(
        &self,
        layout: &Arc<dyn BindingLayout>,
        table: &Arc<dyn BindingTable>,
        writes: &[BindingWrite],
    ) -> Result<()> {
        write_binding_table(
            &self.device,
            vulkan_binding_layout(layout),
            vulkan_binding_table(table),
            writes,
        )
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(VulkanCommandList::new(
            self.device.clone(),
            self.graphics_queue_family,
        )?))
    }

    // ===== FRAME SYNCHRONIZATION =====

    fn wait_frame(&self, frame_slot: usize, timeout_ns: u64) -> Result<()> {
        let fences = [self.in_flight_fences[frame_slot]];
        unsafe {
            match self.device.wait_for_fences(&fences, true, timeout_ns) {
                Ok(()) => Ok(()),
                Err(vk::Result::TIMEOUT) => Err(Error::FenceTimeout { frame_slot }),
                Err(e) => Err(Error::BackendError(format!(
                    "Failed to wait for frame fence: {:?}",
                    e
                ))),
            }
        }
    }

    fn wait_all_frames(&self) -> Result<()> {
        unsafe {
            self.device
                .wait_for_fences(&self.in_flight_fences, true, u64::MAX)
                .map_err(|e| {
                    Error::BackendError(format!("Failed to wait for frame fences: {:?}", e))
                })
        }
    }

    fn reset_frame(&self, frame_slot: usize) -> Result<()> {
        let fences = [self.in_flight_fences[frame_slot]];
        unsafe {
            self.device.reset_fences(&fences).map_err(|e| {
                Error::BackendError(format!("Failed to reset frame fence: {:?}", e))
            })
        }
    }

    fn acquire_image(&self, frame_slot: usize) -> Result<Acquire> {
        let swapchain = self.swapchain.lock().unwrap();
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                swapchain.swapchain,
                u64::MAX,
                self.image_available[frame_slot],
                vk::Fence::null(),
            )
        };
        match result {
            Ok((image_index, _suboptimal)) => Ok(Acquire::Image(image_index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::Stale),
            Err(e) => Err(Error::BackendError(format!(
                "Failed to acquire swapchain image: {:?}",
                e
            ))),
        }
    }

    fn swapchain_image(&self, image_index: u32) -> Result<Arc<dyn Texture>> {
        let swapchain = self.swapchain.lock().unwrap();
        swapchain
            .images
            .get(image_index as usize)
            .cloned()
            .map(|image| image as Arc<dyn Texture>)
            .ok_or_else(|| {
                Error::InvalidResource(format!(
                    "swapchain image index {} out of range",
                    image_index
                ))
            })
    }

    fn submit_frame(
        &self,
        frame_slot: usize,
        lists: &[&dyn CommandList],
        image_index: u32,
    ) -> Result<()> {
        let buffers: Vec<vk::CommandBuffer> = lists
            .iter()
            .map(|list| {
                list.as_any()
                    .downcast_ref::<VulkanCommandList>()
                    .expect("command list was not created by the Vulkan backend")
                    .buffer
            })
            .collect();

        let swapchain = self.swapchain.lock().unwrap();
        let wait_semaphores = [self.image_available[frame_slot]];
        // The acquired image is first touched by the presentation blit
        let wait_stages = [vk::PipelineStageFlags::TRANSFER];
        let signal_semaphores = [swapchain.render_finished[image_index as usize]];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&buffers)
            .signal_semaphores(&signal_semaphores);

        let queue = self.queue.lock().unwrap();
        unsafe {
            self.device
                .queue_submit(*queue, &[submit_info], self.in_flight_fences[frame_slot])
                .map_err(|e| {
                    Error::BackendError(format!("Failed to submit frame: {:?}", e))
                })
        }
    }

    fn present(&self, _frame_slot: usize, image_index: u32) -> Result<Present> {
        let swapchain = self.swapchain.lock().unwrap();
        let wait_semaphores = [swapchain.render_finished[image_index as usize]];
        let swapchains = [swapchain.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let queue = self.queue.lock().unwrap();
        let result = unsafe { self.swapchain_loader.queue_present(*queue, &present_info) };
        match result {
            Ok(false) => Ok(Present::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Present::Stale),
            Err(e) => Err(Error::BackendError(format!("Failed to present: {:?}", e))),
        }
    }

    fn recreate_swapchain(&self, extent: (u32, u32)) -> Result<()> {
        unsafe {
            self.device.device_wait_idle().map_err(|e| {
                Error::BackendError(format!("Failed to wait for idle device: {:?}", e))
            })?;
        }
        let mut swapchain = self.swapchain.lock().unwrap();
        let old_swapchain = swapchain.swapchain;
        let new_state = Self::build_swapchain(
            &self.surface_loader,
            &self.swapchain_loader,
            &self.device,
            self.physical_device,
            self.surface,
            Some(extent),
            old_swapchain,
        )?;
        self.destroy_swapchain_state(&mut swapchain);
        *swapchain = new_state;
        engine_info!(
            LOG_SOURCE,
            "Swapchain recreated ({}x{}, {} images)",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len()
        );
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle().map_err(|e| {
                Error::BackendError(format!("Failed to wait for idle device: {:?}", e))
            })
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            for &semaphore in &self.image_available {
                self.device.destroy_semaphore(semaphore, None);
            }
            for &fence in &self.in_flight_fences {
                self.device.destroy_fence(fence, None);
            }

            {
                let mut swapchain = self.swapchain.lock().unwrap();
                for semaphore in swapchain.render_finished.drain(..) {
                    self.device.destroy_semaphore(semaphore, None);
                }
                swapchain.images.clear();
                self.swapchain_loader.destroy_swapchain(swapchain.swapchain, None);
            }

            // The allocator must be destroyed before the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            #[cfg(feature = "vulkan-validation")]
            if let Some((loader, messenger)) = self.debug_messenger.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
