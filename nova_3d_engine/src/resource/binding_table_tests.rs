use super::*;
use std::sync::atomic::Ordering;

use crate::gpu::binding::{
    BindingDesc, BindingKind, BindingLayoutDesc, BindingResource, BindingTable, BindingWrite,
};
use crate::gpu::buffer::{Buffer, BufferDesc, BufferUsage};
use crate::gpu::device::GraphicsDevice;
use crate::gpu::mock_device::{MockBindingTable, MockDevice};
use crate::gpu::shader::ShaderStage;

fn uniform_layout() -> BindingLayoutDesc {
    BindingLayoutDesc {
        bindings: vec![BindingDesc {
            binding: 0,
            kind: BindingKind::UniformBuffer,
            count: 1,
            stages: vec![ShaderStage::Vertex],
        }],
        max_tables: 0, // overwritten by the manager
    }
}

fn update_count(manager: &BindingTableManager, slot: usize) -> usize {
    manager
        .table(slot)
        .as_any()
        .downcast_ref::<MockBindingTable>()
        .unwrap()
        .update_count
        .load(Ordering::SeqCst)
}

// ============================================================================
// Manager tests
// ============================================================================

#[test]
fn test_one_table_per_slot_all_dirty() {
    let device = MockDevice::new(2, 800, 600);
    let manager = BindingTableManager::new(device.clone(), uniform_layout(), 3).unwrap();

    assert_eq!(manager.slot_count(), 3);
    assert_eq!(device.created_binding_tables.load(Ordering::SeqCst), 3);
    for slot in 0..3 {
        assert!(manager.is_dirty(slot));
    }
}

#[test]
fn test_refresh_writes_once_per_invalidation() {
    let device = MockDevice::new(2, 800, 600);
    let mut manager = BindingTableManager::new(device.clone(), uniform_layout(), 2).unwrap();
    let buffer = device
        .create_buffer(&BufferDesc { size: 64, usage: BufferUsage::UNIFORM })
        .unwrap();
    let writes = [BindingWrite {
        binding: 0,
        resource: BindingResource::Buffer { buffer: &buffer, offset: 0, size: 64 },
    }];

    assert!(manager.refresh_if_dirty(0, &writes).unwrap());
    // Second refresh of a clean slot is a no-op
    assert!(!manager.refresh_if_dirty(0, &writes).unwrap());
    assert_eq!(update_count(&manager, 0), 1);

    manager.mark_dirty(0);
    assert!(manager.refresh_if_dirty(0, &writes).unwrap());
    assert_eq!(update_count(&manager, 0), 2);
}

#[test]
fn test_mark_all_dirty_touches_every_slot() {
    let device = MockDevice::new(2, 800, 600);
    let mut manager = BindingTableManager::new(device.clone(), uniform_layout(), 2).unwrap();
    let buffer = device
        .create_buffer(&BufferDesc { size: 64, usage: BufferUsage::UNIFORM })
        .unwrap();
    let writes = [BindingWrite {
        binding: 0,
        resource: BindingResource::Buffer { buffer: &buffer, offset: 0, size: 64 },
    }];
    manager.refresh_if_dirty(0, &writes).unwrap();
    manager.refresh_if_dirty(1, &writes).unwrap();

    manager.mark_all_dirty();
    assert!(manager.is_dirty(0));
    assert!(manager.is_dirty(1));
}

// ============================================================================
// GrowableUniform tests
// ============================================================================

#[test]
fn test_grow_only_never_shrinks() {
    let device = MockDevice::new(2, 800, 600);
    let mut uniform = GrowableUniform::new(device.clone(), 64);

    assert!(uniform.ensure_capacity(4).unwrap());
    assert_eq!(uniform.capacity(), 4);
    assert_eq!(uniform.buffer().unwrap().size(), 256);

    // Smaller count keeps the existing buffer
    assert!(!uniform.ensure_capacity(2).unwrap());
    assert_eq!(uniform.capacity(), 4);

    assert!(uniform.ensure_capacity(6).unwrap());
    assert_eq!(uniform.capacity(), 6);
}

#[test]
fn test_zero_count_still_allocates_one_element() {
    let device = MockDevice::new(2, 800, 600);
    let mut uniform = GrowableUniform::new(device, 32);
    assert!(uniform.ensure_capacity(0).unwrap());
    assert_eq!(uniform.capacity(), 1);
}

#[test]
fn test_element_writes_land_at_stride_offsets() {
    let device = MockDevice::new(2, 800, 600);
    let mut uniform = GrowableUniform::new(device, 16);
    uniform.ensure_capacity(3).unwrap();

    uniform.write_element(1, &[7u8; 16]).unwrap();

    let mock = uniform
        .buffer()
        .unwrap()
        .as_any()
        .downcast_ref::<crate::gpu::mock_device::MockBuffer>()
        .unwrap();
    let contents = mock.contents();
    assert_eq!(&contents[0..16], &[0u8; 16]);
    assert_eq!(&contents[16..32], &[7u8; 16]);
}

#[test]
fn test_out_of_capacity_write_rejected() {
    let device = MockDevice::new(2, 800, 600);
    let mut uniform = GrowableUniform::new(device, 16);
    uniform.ensure_capacity(2).unwrap();
    assert!(uniform.write_element(2, &[0u8; 16]).is_err());
}

#[test]
fn test_write_before_allocation_rejected() {
    let device = MockDevice::new(2, 800, 600);
    let uniform = GrowableUniform::new(device, 16);
    assert!(uniform.write_element(0, &[0u8; 16]).is_err());
}
