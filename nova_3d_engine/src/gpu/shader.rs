/// Shader and pipeline traits and descriptors
///
/// Shaders are consumed as already-compiled bytecode looked up by name;
/// the engine never parses shader source.

use std::any::Any;
use std::sync::Arc;
use crate::error::Result;
use crate::gpu::binding::BindingLayout;
use crate::gpu::texture::TextureFormat;

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Descriptor for creating a shader module
#[derive(Debug, Clone)]
pub struct ShaderDesc {
    /// Name used for lookup and diagnostics (e.g. "default.frag")
    pub name: String,
    /// Pipeline stage this module is bound to
    pub stage: ShaderStage,
    /// Compiled bytecode (SPIR-V for the Vulkan backend)
    pub bytecode: Vec<u8>,
}

/// Shader module trait
pub trait Shader: Send + Sync {
    /// Name the module was created under
    fn name(&self) -> &str;

    /// Pipeline stage this module is bound to
    fn stage(&self) -> ShaderStage;

    /// Downcast support for backends and tests
    fn as_any(&self) -> &dyn Any;
}

// ===== PIPELINE =====

/// Triangle face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Winding order considered front-facing
///
/// The outline sub-pass renders silhouettes by flipping this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

/// Descriptor for creating a graphics pipeline
#[derive(Clone)]
pub struct PipelineDesc {
    /// Vertex stage module
    pub vertex_shader: Arc<dyn Shader>,
    /// Fragment stage module (None for depth-only passes)
    pub fragment_shader: Option<Arc<dyn Shader>>,
    /// Binding table layout consumed by the pipeline
    pub binding_layout: Arc<dyn BindingLayout>,
    /// Push constant range size in bytes (0 = none)
    pub push_constant_size: u32,
    /// Color attachment format (None for depth-only passes)
    pub color_format: Option<TextureFormat>,
    /// Depth attachment format (None when depth is not used)
    pub depth_format: Option<TextureFormat>,
    /// Face culling mode
    pub cull_mode: CullMode,
    /// Front-facing winding order
    pub front_face: FrontFace,
    /// Enable depth testing
    pub depth_test: bool,
    /// Enable depth writes
    pub depth_write: bool,
    /// Enable the dynamically-set depth bias (shadow passes)
    pub depth_bias: bool,
}

/// Graphics pipeline trait
pub trait Pipeline: Send + Sync {
    /// Push constant range size in bytes declared at creation
    fn push_constant_size(&self) -> u32;

    /// Downcast support for backends and tests
    fn as_any(&self) -> &dyn Any;
}

/// Validate a pipeline descriptor (shared between backends)
///
/// # Errors
///
/// Returns `Error::InvalidResource` for stage/attachment mismatches.
pub fn validate_pipeline_desc(desc: &PipelineDesc) -> Result<()> {
    if desc.vertex_shader.stage() != ShaderStage::Vertex {
        crate::engine_bail!(
            "nova3d::Pipeline",
            InvalidResource,
            "vertex_shader '{}' is not a vertex-stage module",
            desc.vertex_shader.name()
        );
    }
    if let Some(fragment) = &desc.fragment_shader {
        if fragment.stage() != ShaderStage::Fragment {
            crate::engine_bail!(
                "nova3d::Pipeline",
                InvalidResource,
                "fragment_shader '{}' is not a fragment-stage module",
                fragment.name()
            );
        }
    }
    if desc.color_format.is_none() && desc.depth_format.is_none() {
        crate::engine_bail!(
            "nova3d::Pipeline",
            InvalidResource,
            "pipeline has neither a color nor a depth attachment format"
        );
    }
    Ok(())
}
