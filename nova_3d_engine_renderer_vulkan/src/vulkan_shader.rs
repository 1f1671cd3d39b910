/// Vulkan shader module and graphics pipeline resources
///
/// Pipelines target dynamic rendering (no render pass objects); viewport,
/// scissor, depth bias and cull mode are dynamic state so one pipeline
/// serves every pass extent.

use std::any::Any;
use std::sync::Arc;

use ash::vk;

use nova_3d_engine::nova3d::gpu::{
    validate_pipeline_desc, CullMode, FrontFace, Pipeline, PipelineDesc, Shader, ShaderDesc,
    ShaderStage,
};
use nova_3d_engine::nova3d::{Error, Result};

use crate::vulkan_binding::{stages_to_vk, vulkan_binding_layout};
use crate::vulkan_texture::format_to_vk;

/// Fixed engine vertex layout: position, normal, uv, tangent
///
/// All geometry shares this interleaved layout; pipelines do not carry a
/// per-pipeline vertex declaration.
const VERTEX_STRIDE: u32 = 48;

pub struct VulkanShader {
    pub(crate) module: vk::ShaderModule,
    name: String,
    stage: ShaderStage,
    device: Arc<ash::Device>,
}

impl VulkanShader {
    pub(crate) fn new(device: Arc<ash::Device>, desc: &ShaderDesc) -> Result<Self> {
        if desc.bytecode.len() % 4 != 0 {
            return Err(Error::InvalidResource(format!(
                "shader '{}' bytecode is not 4-byte aligned",
                desc.name
            )));
        }
        // SPIR-V words; bytecode may be unaligned in memory, so copy
        let words: Vec<u32> = desc
            .bytecode
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe {
            device.create_shader_module(&create_info, None).map_err(|e| {
                Error::BackendError(format!("Failed to create shader module '{}': {:?}", desc.name, e))
            })?
        };
        Ok(Self { module, name: desc.name.clone(), stage: desc.stage, device })
    }
}

impl Shader for VulkanShader {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

fn vulkan_shader(shader: &Arc<dyn Shader>) -> &VulkanShader {
    shader
        .as_any()
        .downcast_ref::<VulkanShader>()
        .expect("shader was not created by the Vulkan backend")
}

pub(crate) fn cull_mode_to_vk(cull_mode: CullMode) -> vk::CullModeFlags {
    match cull_mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub struct VulkanPipeline {
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    push_constant_size: u32,
    pub(crate) push_constant_stages: vk::ShaderStageFlags,
    device: Arc<ash::Device>,
}

impl VulkanPipeline {
    pub(crate) fn new(device: Arc<ash::Device>, desc: &PipelineDesc) -> Result<Self> {
        validate_pipeline_desc(desc)?;

        let vertex = vulkan_shader(&desc.vertex_shader);
        let mut shader_stages = vec![vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex.module)
            .name(c"main")];
        if let Some(fragment) = &desc.fragment_shader {
            shader_stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(vulkan_shader(fragment).module)
                    .name(c"main"),
            );
        }

        // Fixed interleaved vertex layout
        let vertex_bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: VERTEX_STRIDE,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let vertex_attributes = [
            // position
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            // normal
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            // uv
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
            // tangent
            vk::VertexInputAttributeDescription {
                location: 3,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 32,
            },
        ];
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport::default()];
        let scissors = [vk::Rect2D::default()];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let front_face = match desc.front_face {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        };
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(cull_mode_to_vk(desc.cull_mode))
            .front_face(front_face)
            .depth_bias_enable(desc.depth_bias);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_write)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false);
        let color_blend_attachments = if desc.color_format.is_some() {
            std::slice::from_ref(&color_blend_attachment)
        } else {
            &[]
        };
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(color_blend_attachments);

        let mut dynamic_states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        if desc.depth_bias {
            dynamic_states.push(vk::DynamicState::DEPTH_BIAS);
        }
        dynamic_states.push(vk::DynamicState::CULL_MODE);
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // Pipeline layout: one descriptor set + optional push constants
        let binding_layout = vulkan_binding_layout(&desc.binding_layout);
        let set_layouts = [binding_layout.layout];
        let push_constant_stages = if desc.fragment_shader.is_some() {
            stages_to_vk(&[ShaderStage::Vertex, ShaderStage::Fragment])
        } else {
            stages_to_vk(&[ShaderStage::Vertex])
        };
        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: push_constant_stages,
            offset: 0,
            size: desc.push_constant_size,
        }];
        let mut layout_info =
            vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        if desc.push_constant_size > 0 {
            layout_info = layout_info.push_constant_ranges(&push_constant_ranges);
        }
        let layout = unsafe {
            device.create_pipeline_layout(&layout_info, None).map_err(|e| {
                Error::BackendError(format!("Failed to create pipeline layout: {:?}", e))
            })?
        };

        // Dynamic rendering attachment formats
        let color_formats: Vec<vk::Format> =
            desc.color_format.iter().map(|f| format_to_vk(*f)).collect();
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats);
        if let Some(depth_format) = desc.depth_format {
            rendering_info = rendering_info.depth_attachment_format(format_to_vk(depth_format));
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|e| {
                    Error::BackendError(format!("Failed to create graphics pipeline: {:?}", e.1))
                })?
        };

        Ok(Self {
            pipeline: pipelines[0],
            layout,
            push_constant_size: desc.push_constant_size,
            push_constant_stages,
            device,
        })
    }
}

impl Pipeline for VulkanPipeline {
    fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

pub(crate) fn vulkan_pipeline(pipeline: &Arc<dyn Pipeline>) -> &VulkanPipeline {
    pipeline
        .as_any()
        .downcast_ref::<VulkanPipeline>()
        .expect("pipeline was not created by the Vulkan backend")
}
