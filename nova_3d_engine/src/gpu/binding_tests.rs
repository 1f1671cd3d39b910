use super::*;
use std::any::Any;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::gpu::buffer::Buffer;
use crate::gpu::shader::ShaderStage;
use crate::gpu::texture::{Sampler, TextureView};

// Minimal stand-ins for the resource traits
struct StubBuffer;
impl Buffer for StubBuffer {
    fn size(&self) -> u64 {
        256
    }
    fn write(&self, _offset: u64, _data: &[u8]) -> Result<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct StubView;
impl TextureView for StubView {
    fn base_layer(&self) -> u32 {
        0
    }
    fn layer_count(&self) -> u32 {
        1
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct StubSampler;
impl Sampler for StubSampler {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn test_layout() -> BindingLayoutDesc {
    BindingLayoutDesc {
        bindings: vec![
            BindingDesc {
                binding: 0,
                kind: BindingKind::UniformBuffer,
                count: 1,
                stages: vec![ShaderStage::Vertex, ShaderStage::Fragment],
            },
            BindingDesc {
                binding: 1,
                kind: BindingKind::CombinedImageSampler,
                count: 2,
                stages: vec![ShaderStage::Fragment],
            },
        ],
        max_tables: 2,
    }
}

fn image_binding() -> ImageBinding {
    ImageBinding {
        view: Arc::new(StubView),
        sampler: Arc::new(StubSampler),
    }
}

// ============================================================================
// Layout lookup tests
// ============================================================================

#[test]
fn test_find_declared_binding() {
    let layout = test_layout();
    assert!(layout.find(0).is_some());
    assert!(layout.find(1).is_some());
    assert!(layout.find(7).is_none());
}

// ============================================================================
// Write validation tests
// ============================================================================

#[test]
fn test_valid_writes_accepted() {
    let layout = test_layout();
    let buffer: Arc<dyn Buffer> = Arc::new(StubBuffer);
    let images = [image_binding(), image_binding()];

    let writes = [
        BindingWrite {
            binding: 0,
            resource: BindingResource::Buffer { buffer: &buffer, offset: 0, size: 256 },
        },
        BindingWrite {
            binding: 1,
            resource: BindingResource::Images(&images),
        },
    ];
    assert!(validate_binding_writes(&layout, &writes).is_ok());
}

#[test]
fn test_undeclared_binding_rejected() {
    let layout = test_layout();
    let buffer: Arc<dyn Buffer> = Arc::new(StubBuffer);

    let writes = [BindingWrite {
        binding: 9,
        resource: BindingResource::Buffer { buffer: &buffer, offset: 0, size: 256 },
    }];
    match validate_binding_writes(&layout, &writes) {
        Err(Error::ContractViolation(_)) => {}
        other => panic!("expected ContractViolation, got {:?}", other),
    }
}

#[test]
fn test_wrong_kind_rejected() {
    let layout = test_layout();
    let buffer: Arc<dyn Buffer> = Arc::new(StubBuffer);

    // Binding 1 is a combined image sampler, not a buffer
    let writes = [BindingWrite {
        binding: 1,
        resource: BindingResource::Buffer { buffer: &buffer, offset: 0, size: 256 },
    }];
    assert!(validate_binding_writes(&layout, &writes).is_err());
}

#[test]
fn test_wrong_image_count_rejected() {
    let layout = test_layout();
    let images = [image_binding()]; // declared count is 2

    let writes = [BindingWrite {
        binding: 1,
        resource: BindingResource::Images(&images),
    }];
    assert!(validate_binding_writes(&layout, &writes).is_err());
}
