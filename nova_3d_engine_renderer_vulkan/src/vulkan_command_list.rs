/// Vulkan command list
///
/// Each list owns a private command pool with one primary buffer. Command
/// pools are not thread-safe, so per-list pools let stages record in
/// parallel without sharing locks.

use std::any::Any;
use std::sync::Arc;

use ash::vk;

use nova_3d_engine::nova3d::gpu::{
    BindingTable, Buffer, CommandList, CullMode, Filter, ImageLayout, IndexType, Pipeline,
    Rect2D, RenderingInfo, ShaderStage, Texture, Viewport,
};
use nova_3d_engine::nova3d::{Error, Result};

use crate::vulkan_binding::vulkan_binding_table;
use crate::vulkan_buffer::vulkan_buffer;
use crate::vulkan_shader::{cull_mode_to_vk, vulkan_pipeline};
use crate::vulkan_texture::{aspect_of, filter_to_vk, layout_to_vk, vulkan_texture, vulkan_view};

/// Source access and stage masks for leaving a layout
fn src_sync(layout: ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        ImageLayout::Undefined => {
            (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE)
        }
        ImageLayout::ColorAttachment => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        ImageLayout::DepthAttachment => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        ImageLayout::DepthReadOnly | ImageLayout::ShaderReadOnly => {
            (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
        }
        ImageLayout::TransferSrc => {
            (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
        }
        ImageLayout::TransferDst => {
            (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
        }
        ImageLayout::PresentSrc => {
            (vk::AccessFlags::empty(), vk::PipelineStageFlags::BOTTOM_OF_PIPE)
        }
    }
}

/// Destination access and stage masks for entering a layout
fn dst_sync(layout: ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        ImageLayout::Undefined => {
            (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE)
        }
        ImageLayout::ColorAttachment => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        ImageLayout::DepthAttachment => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        ImageLayout::DepthReadOnly | ImageLayout::ShaderReadOnly => {
            (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
        }
        ImageLayout::TransferSrc => {
            (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
        }
        ImageLayout::TransferDst => {
            (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
        }
        ImageLayout::PresentSrc => {
            (vk::AccessFlags::empty(), vk::PipelineStageFlags::BOTTOM_OF_PIPE)
        }
    }
}

pub struct VulkanCommandList {
    pool: vk::CommandPool,
    pub(crate) buffer: vk::CommandBuffer,
    device: Arc<ash::Device>,
}

impl VulkanCommandList {
    pub(crate) fn new(device: Arc<ash::Device>, queue_family_index: u32) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index);
        let pool = unsafe {
            device.create_command_pool(&pool_info, None).map_err(|e| {
                Error::BackendError(format!("Failed to create command pool: {:?}", e))
            })?
        };
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe {
            device.allocate_command_buffers(&allocate_info).map_err(|e| {
                Error::BackendError(format!("Failed to allocate command buffer: {:?}", e))
            })?
        };
        Ok(Self { pool, buffer: buffers[0], device })
    }
}

impl CommandList for VulkanCommandList {
    fn begin(&mut self) -> Result<()> {
        unsafe {
            self.device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| {
                    Error::BackendError(format!("Failed to reset command pool: {:?}", e))
                })?;
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(self.buffer, &begin_info)
                .map_err(|e| {
                    Error::BackendError(format!("Failed to begin command buffer: {:?}", e))
                })?;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        unsafe {
            self.device.end_command_buffer(self.buffer).map_err(|e| {
                Error::BackendError(format!("Failed to end command buffer: {:?}", e))
            })?;
        }
        Ok(())
    }

    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<()> {
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width: info.width, height: info.height },
        };

        let color_attachments: Vec<vk::RenderingAttachmentInfo> = info
            .color
            .iter()
            .map(|attachment| {
                let mut rendering_attachment = vk::RenderingAttachmentInfo::default()
                    .image_view(vulkan_view(&attachment.view).view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .store_op(vk::AttachmentStoreOp::STORE);
                rendering_attachment = match attachment.clear {
                    Some(color) => rendering_attachment
                        .load_op(vk::AttachmentLoadOp::CLEAR)
                        .clear_value(vk::ClearValue {
                            color: vk::ClearColorValue { float32: color },
                        }),
                    None => rendering_attachment.load_op(vk::AttachmentLoadOp::LOAD),
                };
                rendering_attachment
            })
            .collect();

        let depth_attachment = info.depth.as_ref().map(|attachment| {
            let mut rendering_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(vulkan_view(&attachment.view).view)
                .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .store_op(vk::AttachmentStoreOp::STORE);
            rendering_attachment = match attachment.clear {
                Some(depth) => rendering_attachment
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .clear_value(vk::ClearValue {
                        depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
                    }),
                None => rendering_attachment.load_op(vk::AttachmentLoadOp::LOAD),
            };
            rendering_attachment
        });

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth_attachment) = &depth_attachment {
            rendering_info = rendering_info.depth_attachment(depth_attachment);
        }

        unsafe {
            self.device.cmd_begin_rendering(self.buffer, &rendering_info);
        }
        Ok(())
    }

    fn end_rendering(&mut self) -> Result<()> {
        unsafe {
            self.device.cmd_end_rendering(self.buffer);
        }
        Ok(())
    }

    fn transition_image(
        &mut self,
        texture: &Arc<dyn Texture>,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<()> {
        let texture = vulkan_texture(texture);
        let (src_access, src_stage) = src_sync(old_layout);
        let (dst_access, dst_stage) = dst_sync(new_layout);

        let barrier = vk::ImageMemoryBarrier::default()
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .old_layout(layout_to_vk(old_layout))
            .new_layout(layout_to_vk(new_layout))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(texture.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_of(texture.info.format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: base_layer,
                layer_count,
            });

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        Ok(())
    }

    fn blit_image(
        &mut self,
        src: &Arc<dyn Texture>,
        src_layout: ImageLayout,
        dst: &Arc<dyn Texture>,
        dst_layout: ImageLayout,
        filter: Filter,
    ) -> Result<()> {
        let src = vulkan_texture(src);
        let dst = vulkan_texture(dst);

        let subresource = |format| vk::ImageSubresourceLayers {
            aspect_mask: aspect_of(format),
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageBlit::default()
            .src_subresource(subresource(src.info.format))
            .src_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: src.info.width as i32,
                    y: src.info.height as i32,
                    z: 1,
                },
            ])
            .dst_subresource(subresource(dst.info.format))
            .dst_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: dst.info.width as i32,
                    y: dst.info.height as i32,
                    z: 1,
                },
            ]);

        unsafe {
            self.device.cmd_blit_image(
                self.buffer,
                src.image,
                layout_to_vk(src_layout),
                dst.image,
                layout_to_vk(dst_layout),
                &[region],
                filter_to_vk(filter),
            );
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        let viewports = [vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        }];
        unsafe {
            self.device.cmd_set_viewport(self.buffer, 0, &viewports);
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: scissor.x, y: scissor.y },
            extent: vk::Extent2D { width: scissor.width, height: scissor.height },
        }];
        unsafe {
            self.device.cmd_set_scissor(self.buffer, 0, &scissors);
        }
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        unsafe {
            self.device.cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vulkan_pipeline(pipeline).pipeline,
            );
        }
        Ok(())
    }

    fn bind_binding_table(
        &mut self,
        pipeline: &Arc<dyn Pipeline>,
        set_index: u32,
        table: &Arc<dyn BindingTable>,
    ) -> Result<()> {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vulkan_pipeline(pipeline).layout,
                set_index,
                &[vulkan_binding_table(table).set],
                &[],
            );
        }
        Ok(())
    }

    fn push_constants(
        &mut self,
        pipeline: &Arc<dyn Pipeline>,
        _stages: &[ShaderStage],
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        // The stage flags must match the pipeline layout's push range
        let pipeline = vulkan_pipeline(pipeline);
        unsafe {
            self.device.cmd_push_constants(
                self.buffer,
                pipeline.layout,
                pipeline.push_constant_stages,
                offset,
                data,
            );
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64) -> Result<()> {
        unsafe {
            self.device.cmd_bind_vertex_buffers(
                self.buffer,
                0,
                &[vulkan_buffer(buffer).buffer],
                &[offset],
            );
        }
        Ok(())
    }

    fn bind_index_buffer(
        &mut self,
        buffer: &Arc<dyn Buffer>,
        offset: u64,
        index_type: IndexType,
    ) -> Result<()> {
        let index_type = match index_type {
            IndexType::U16 => vk::IndexType::UINT16,
            IndexType::U32 => vk::IndexType::UINT32,
        };
        unsafe {
            self.device.cmd_bind_index_buffer(
                self.buffer,
                vulkan_buffer(buffer).buffer,
                offset,
                index_type,
            );
        }
        Ok(())
    }

    fn set_depth_bias(&mut self, constant: f32, slope: f32) -> Result<()> {
        unsafe {
            self.device.cmd_set_depth_bias(self.buffer, constant, 0.0, slope);
        }
        Ok(())
    }

    fn set_cull_mode(&mut self, cull_mode: CullMode) -> Result<()> {
        unsafe {
            self.device.cmd_set_cull_mode(self.buffer, cull_mode_to_vk(cull_mode));
        }
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        unsafe {
            self.device.cmd_draw(self.buffer, vertex_count, 1, first_vertex, 0);
        }
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()> {
        unsafe {
            self.device
                .cmd_draw_indexed(self.buffer, index_count, 1, first_index, vertex_offset, 0);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}
