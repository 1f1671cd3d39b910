/// Binding table layouts, tables and write descriptors
///
/// A binding table is the GPU-visible record wiring buffers and images to
/// shader binding points for one frame slot (a descriptor set in Vulkan
/// terms). Layouts declare the shape once; tables are allocated from
/// backend pools and repopulated through `GraphicsDevice::update_binding_table`.

use std::any::Any;
use std::sync::Arc;
use crate::error::Result;
use crate::gpu::buffer::Buffer;
use crate::gpu::shader::ShaderStage;
use crate::gpu::texture::{Sampler, TextureView};

/// Kind of resource wired to a binding point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Uniform buffer range
    UniformBuffer,
    /// Sampled image + sampler pair
    CombinedImageSampler,
}

/// One binding point declaration
#[derive(Debug, Clone)]
pub struct BindingDesc {
    /// Binding point index as referenced from shaders
    pub binding: u32,
    /// Kind of resource bound at this point
    pub kind: BindingKind,
    /// Array size (1 for a single resource; >1 for shader-visible arrays
    /// such as the texture table)
    pub count: u32,
    /// Shader stages that access this binding
    pub stages: Vec<ShaderStage>,
}

/// Descriptor for creating a binding table layout
///
/// `max_tables` sizes the backing pool; one table per frame slot is the
/// normal case.
#[derive(Debug, Clone)]
pub struct BindingLayoutDesc {
    pub bindings: Vec<BindingDesc>,
    pub max_tables: u32,
}

impl BindingLayoutDesc {
    /// Find the declaration of a binding point, if declared
    pub fn find(&self, binding: u32) -> Option<&BindingDesc> {
        self.bindings.iter().find(|b| b.binding == binding)
    }
}

/// Binding table layout trait (owns the backend pool + layout objects)
pub trait BindingLayout: Send + Sync {
    /// The declarations this layout was created from
    fn desc(&self) -> &BindingLayoutDesc;

    /// Downcast support for backends and tests
    fn as_any(&self) -> &dyn Any;
}

/// Binding table trait (one allocated descriptor set)
pub trait BindingTable: Send + Sync {
    /// Downcast support for backends and tests
    fn as_any(&self) -> &dyn Any;
}

/// An image + sampler pair for a combined-image-sampler binding
#[derive(Clone)]
pub struct ImageBinding {
    pub view: Arc<dyn TextureView>,
    pub sampler: Arc<dyn Sampler>,
}

/// Resource written to a binding point
pub enum BindingResource<'a> {
    /// A uniform buffer range
    Buffer {
        buffer: &'a Arc<dyn Buffer>,
        offset: u64,
        size: u64,
    },
    /// One image per array element; must fill the declared `count`
    Images(&'a [ImageBinding]),
}

/// One write into a binding table
pub struct BindingWrite<'a> {
    pub binding: u32,
    pub resource: BindingResource<'a>,
}

/// Validate a set of writes against a layout (shared between backends)
///
/// Writing to an undeclared binding point, with the wrong resource kind,
/// or with the wrong array size is a broken upstream invariant.
///
/// # Errors
///
/// Returns `Error::ContractViolation` on any mismatch.
pub fn validate_binding_writes(desc: &BindingLayoutDesc, writes: &[BindingWrite]) -> Result<()> {
    for write in writes {
        let Some(declared) = desc.find(write.binding) else {
            crate::engine_bail!(
                "nova3d::BindingTable",
                ContractViolation,
                "write to undeclared binding point {}",
                write.binding
            );
        };
        match (&write.resource, declared.kind) {
            (BindingResource::Buffer { .. }, BindingKind::UniformBuffer) => {}
            (BindingResource::Images(images), BindingKind::CombinedImageSampler) => {
                if images.len() != declared.count as usize {
                    crate::engine_bail!(
                        "nova3d::BindingTable",
                        ContractViolation,
                        "binding {} declares {} image slots but {} were written",
                        write.binding,
                        declared.count,
                        images.len()
                    );
                }
            }
            _ => {
                crate::engine_bail!(
                    "nova3d::BindingTable",
                    ContractViolation,
                    "binding {} written with a resource of the wrong kind",
                    write.binding
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "binding_tests.rs"]
mod tests;
