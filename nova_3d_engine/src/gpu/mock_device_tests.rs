use super::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::Error;
use crate::gpu::binding::{BindingDesc, BindingKind, BindingLayoutDesc, BindingResource, BindingWrite};
use crate::gpu::buffer::{BufferDesc, BufferUsage};
use crate::gpu::command_list::CommandList;
use crate::gpu::device::{Acquire, GraphicsDevice};
use crate::gpu::shader::ShaderStage;
use crate::gpu::texture::{
    Filter, ImageLayout, SamplerDesc, Texture, TextureDesc, TextureFormat, TextureUsage,
};

fn test_device() -> Arc<MockDevice> {
    MockDevice::new(2, 800, 600)
}

// ============================================================================
// Resource factory tests
// ============================================================================

#[test]
fn test_buffer_write_and_read_back() {
    let device = test_device();
    let buffer = device
        .create_buffer(&BufferDesc { size: 16, usage: BufferUsage::UNIFORM })
        .unwrap();

    buffer.write(4, &[1, 2, 3, 4]).unwrap();

    let mock = buffer.as_any().downcast_ref::<MockBuffer>().unwrap();
    let contents = mock.contents();
    assert_eq!(contents.len(), 16);
    assert_eq!(&contents[4..8], &[1, 2, 3, 4]);
}

#[test]
fn test_buffer_write_out_of_bounds_rejected() {
    let device = test_device();
    let buffer = device
        .create_buffer(&BufferDesc { size: 8, usage: BufferUsage::UNIFORM })
        .unwrap();
    assert!(buffer.write(6, &[0u8; 4]).is_err());
}

#[test]
fn test_texture_ids_are_unique() {
    let device = test_device();
    let desc = TextureDesc {
        width: 64,
        height: 64,
        format: TextureFormat::R8G8B8A8_SRGB,
        usage: TextureUsage::SAMPLED,
        array_layers: 1,
        data: None,
    };
    let a = device.create_texture(&desc).unwrap();
    let b = device.create_texture(&desc).unwrap();
    assert_ne!(mock_texture_id(&a), mock_texture_id(&b));
}

#[test]
fn test_view_layer_range_validated() {
    let device = test_device();
    let texture = device
        .create_texture(&TextureDesc {
            width: 32,
            height: 32,
            format: TextureFormat::D32_FLOAT,
            usage: TextureUsage::DEPTH_ATTACHMENT,
            array_layers: 4,
            data: None,
        })
        .unwrap();

    assert!(device.create_texture_view(&texture, 3, 1).is_ok());
    assert!(device.create_texture_view(&texture, 3, 2).is_err());
}

#[test]
fn test_update_binding_table_validates_and_counts() {
    let device = test_device();
    let layout = device
        .create_binding_layout(&BindingLayoutDesc {
            bindings: vec![BindingDesc {
                binding: 0,
                kind: BindingKind::UniformBuffer,
                count: 1,
                stages: vec![ShaderStage::Vertex],
            }],
            max_tables: 2,
        })
        .unwrap();
    let table = device.create_binding_table(&layout).unwrap();
    let buffer = device
        .create_buffer(&BufferDesc { size: 64, usage: BufferUsage::UNIFORM })
        .unwrap();

    let writes = [BindingWrite {
        binding: 0,
        resource: BindingResource::Buffer { buffer: &buffer, offset: 0, size: 64 },
    }];
    device.update_binding_table(&layout, &table, &writes).unwrap();
    device.update_binding_table(&layout, &table, &writes).unwrap();

    let mock = table.as_any().downcast_ref::<MockBindingTable>().unwrap();
    assert_eq!(mock.update_count.load(Ordering::SeqCst), 2);

    // Undeclared binding point
    let bad = [BindingWrite {
        binding: 5,
        resource: BindingResource::Buffer { buffer: &buffer, offset: 0, size: 64 },
    }];
    assert!(device.update_binding_table(&layout, &table, &bad).is_err());
}

// ============================================================================
// Fence tests
// ============================================================================

#[test]
fn test_fences_start_signaled() {
    let device = test_device();
    assert!(device.wait_frame(0, 1).is_ok());
    assert!(device.wait_frame(1, 1).is_ok());
}

#[test]
fn test_wait_after_reset_times_out_without_completion() {
    let device = test_device();
    device.set_auto_complete(false);

    device.reset_frame(0).unwrap();
    match device.wait_frame(0, 1) {
        Err(Error::FenceTimeout { frame_slot }) => assert_eq!(frame_slot, 0),
        other => panic!("expected FenceTimeout, got {:?}", other),
    }

    device.complete_frame(0);
    assert!(device.wait_frame(0, 1).is_ok());
}

#[test]
fn test_auto_complete_signals_pending_fence() {
    let device = test_device();
    device.reset_frame(1).unwrap();
    assert!(device.wait_frame(1, 1).is_ok());
}

#[test]
fn test_wait_idle_signals_all_fences() {
    let device = test_device();
    device.set_auto_complete(false);
    device.reset_frame(0).unwrap();
    device.reset_frame(1).unwrap();

    device.wait_idle().unwrap();
    assert!(device.wait_all_frames().is_ok());
}

// ============================================================================
// Swapchain tests
// ============================================================================

#[test]
fn test_acquire_cycles_image_indices() {
    let device = test_device();
    let mut indices = Vec::new();
    for _ in 0..4 {
        match device.acquire_image(0).unwrap() {
            Acquire::Image(index) => indices.push(index),
            Acquire::Stale => panic!("unexpected stale acquire"),
        }
    }
    assert_eq!(indices, vec![0, 1, 2, 0]);
}

#[test]
fn test_forced_stale_acquires_then_recover() {
    let device = test_device();
    device.force_stale_acquires(2);

    assert_eq!(device.acquire_image(0).unwrap(), Acquire::Stale);
    assert_eq!(device.acquire_image(0).unwrap(), Acquire::Stale);
    assert!(matches!(device.acquire_image(0).unwrap(), Acquire::Image(_)));
}

#[test]
fn test_recreate_swapchain_updates_extent_and_images() {
    let device = test_device();
    let before = mock_texture_id(&device.swapchain_image(0).unwrap());

    device.recreate_swapchain((1024, 768)).unwrap();

    assert_eq!(device.surface_extent(), (1024, 768));
    let image = device.swapchain_image(0).unwrap();
    assert_ne!(mock_texture_id(&image), before);
    assert_eq!(image.info().width, 1024);
    assert_eq!(device.recreate_count.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Command recording and submission tests
// ============================================================================

#[test]
fn test_begin_resets_recorded_commands() {
    let mut list = MockCommandList::new();
    list.begin().unwrap();
    list.draw(3, 0).unwrap();
    list.end().unwrap();

    list.begin().unwrap();
    list.end().unwrap();
    assert_eq!(list.commands, vec!["begin", "end"]);
}

#[test]
fn test_submit_captures_commands_per_list() {
    let device = test_device();
    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    let src = device
        .create_texture(&TextureDesc {
            width: 800,
            height: 600,
            format: TextureFormat::R16G16B16A16_SFLOAT,
            usage: TextureUsage::COLOR_ATTACHMENT | TextureUsage::TRANSFER_SRC,
            array_layers: 1,
            data: None,
        })
        .unwrap();
    let dst = device.swapchain_image(0).unwrap();
    list.blit_image(
        &src,
        ImageLayout::TransferSrc,
        &dst,
        ImageLayout::TransferDst,
        Filter::Linear,
    )
    .unwrap();
    list.end().unwrap();

    device.submit_frame(0, &[list.as_ref()], 0).unwrap();

    let submitted = device.submitted_frames();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].frame_slot, 0);
    assert_eq!(submitted[0].image_index, 0);
    let expected = format!("blit tex#{} -> tex#{}", mock_texture_id(&src), mock_texture_id(&dst));
    assert!(submitted[0].lists[0].contains(&expected));
}

#[test]
fn test_present_records_image_index() {
    let device = test_device();
    device.present(0, 2).unwrap();
    assert_eq!(device.presented_images(), vec![2]);
}
