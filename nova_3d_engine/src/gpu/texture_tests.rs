use super::*;

// ============================================================================
// Format tests
// ============================================================================

#[test]
fn test_depth_formats() {
    assert!(TextureFormat::D16_UNORM.is_depth());
    assert!(TextureFormat::D32_FLOAT.is_depth());
    assert!(TextureFormat::D24_UNORM_S8_UINT.is_depth());
}

#[test]
fn test_color_formats_are_not_depth() {
    assert!(!TextureFormat::R8G8B8A8_SRGB.is_depth());
    assert!(!TextureFormat::B8G8R8A8_UNORM.is_depth());
    assert!(!TextureFormat::R16G16B16A16_SFLOAT.is_depth());
}

// ============================================================================
// Usage flag tests
// ============================================================================

#[test]
fn test_usage_flags_combine() {
    let usage = TextureUsage::SAMPLED | TextureUsage::COLOR_ATTACHMENT | TextureUsage::TRANSFER_SRC;
    assert!(usage.contains(TextureUsage::SAMPLED));
    assert!(usage.contains(TextureUsage::TRANSFER_SRC));
    assert!(!usage.contains(TextureUsage::DEPTH_ATTACHMENT));
}

// ============================================================================
// TextureInfo tests
// ============================================================================

#[test]
fn test_texture_info_is_array() {
    let info = TextureInfo {
        width: 4096,
        height: 4096,
        format: TextureFormat::D32_FLOAT,
        usage: TextureUsage::DEPTH_ATTACHMENT | TextureUsage::SAMPLED,
        array_layers: 4,
    };
    assert!(info.is_array());

    let single = TextureInfo { array_layers: 1, ..info };
    assert!(!single.is_array());
}

// ============================================================================
// Sampler desc tests
// ============================================================================

#[test]
fn test_sampler_desc_default() {
    let desc = SamplerDesc::default();
    assert_eq!(desc.mag_filter, Filter::Linear);
    assert_eq!(desc.min_filter, Filter::Linear);
    assert_eq!(desc.address_mode, AddressMode::Repeat);
}
