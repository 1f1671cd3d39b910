/// Frame buffer resources - stage-owned render target images
///
/// Each variant wraps one GPU image plus the views a stage renders into.
/// `cleanup` is idempotent: stages are cleaned on surface recreation, on
/// unregistration and again on shutdown, whichever order those land in.

use std::sync::Arc;

use crate::error::Result;
use crate::gpu::device::GraphicsDevice;
use crate::gpu::texture::{Texture, TextureDesc, TextureFormat, TextureUsage, TextureView};

/// Common surface of stage render targets
pub trait FrameBufferResource {
    /// The backing image, when created
    fn texture(&self) -> Option<&Arc<dyn Texture>>;

    /// Release the image and views; safe to call repeatedly
    fn cleanup(&mut self);
}

// ============================================================================
// Color frame buffer
// ============================================================================

/// Single-layer color target a stage renders into and the scheduler blits
/// from
pub struct ColorFrameBuffer {
    texture: Option<Arc<dyn Texture>>,
    view: Option<Arc<dyn TextureView>>,
}

impl ColorFrameBuffer {
    pub fn new(
        device: &Arc<dyn GraphicsDevice>,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Self> {
        let texture = device.create_texture(&TextureDesc {
            width,
            height,
            format,
            usage: TextureUsage::COLOR_ATTACHMENT
                | TextureUsage::TRANSFER_SRC
                | TextureUsage::SAMPLED,
            array_layers: 1,
            data: None,
        })?;
        let view = device.create_texture_view(&texture, 0, 1)?;
        Ok(Self { texture: Some(texture), view: Some(view) })
    }

    pub fn view(&self) -> Option<&Arc<dyn TextureView>> {
        self.view.as_ref()
    }
}

impl FrameBufferResource for ColorFrameBuffer {
    fn texture(&self) -> Option<&Arc<dyn Texture>> {
        self.texture.as_ref()
    }

    fn cleanup(&mut self) {
        self.view = None;
        self.texture = None;
    }
}

// ============================================================================
// Depth frame buffer
// ============================================================================

/// Single-layer depth target for depth testing during the color pass
pub struct DepthFrameBuffer {
    texture: Option<Arc<dyn Texture>>,
    view: Option<Arc<dyn TextureView>>,
}

impl DepthFrameBuffer {
    pub fn new(
        device: &Arc<dyn GraphicsDevice>,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Self> {
        if !format.is_depth() {
            crate::engine_bail!(
                "nova3d::FrameBuffer",
                InvalidResource,
                "depth frame buffer created with color format {:?}",
                format
            );
        }
        let texture = device.create_texture(&TextureDesc {
            width,
            height,
            format,
            usage: TextureUsage::DEPTH_ATTACHMENT,
            array_layers: 1,
            data: None,
        })?;
        let view = device.create_texture_view(&texture, 0, 1)?;
        Ok(Self { texture: Some(texture), view: Some(view) })
    }

    pub fn view(&self) -> Option<&Arc<dyn TextureView>> {
        self.view.as_ref()
    }
}

impl FrameBufferResource for DepthFrameBuffer {
    fn texture(&self) -> Option<&Arc<dyn Texture>> {
        self.texture.as_ref()
    }

    fn cleanup(&mut self) {
        self.view = None;
        self.texture = None;
    }
}

// ============================================================================
// Shadow map frame buffer
// ============================================================================

/// Layer layout of a shadow map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMapKind {
    /// One layer per directional-light cascade
    Cascaded { cascades: u32 },
    /// Six cube faces of a point light
    Omni,
    /// Single perspective map of a spot light
    Spot,
}

impl ShadowMapKind {
    pub fn layer_count(&self) -> u32 {
        match self {
            ShadowMapKind::Cascaded { cascades } => *cascades,
            ShadowMapKind::Omni => 6,
            ShadowMapKind::Spot => 1,
        }
    }
}

/// Layered depth map for one shadow-casting light
///
/// Rendering uses one single-layer view per cascade or cube face; the
/// scene stage samples through the all-layers view.
pub struct ShadowMapFrameBuffer {
    kind: ShadowMapKind,
    resolution: u32,
    texture: Option<Arc<dyn Texture>>,
    sampling_view: Option<Arc<dyn TextureView>>,
    layer_views: Vec<Arc<dyn TextureView>>,
}

impl ShadowMapFrameBuffer {
    pub fn new(
        device: &Arc<dyn GraphicsDevice>,
        kind: ShadowMapKind,
        resolution: u32,
        format: TextureFormat,
    ) -> Result<Self> {
        if !format.is_depth() {
            crate::engine_bail!(
                "nova3d::FrameBuffer",
                InvalidResource,
                "shadow map created with color format {:?}",
                format
            );
        }
        let layers = kind.layer_count();
        let texture = device.create_texture(&TextureDesc {
            width: resolution,
            height: resolution,
            format,
            usage: TextureUsage::DEPTH_ATTACHMENT | TextureUsage::SAMPLED,
            array_layers: layers,
            data: None,
        })?;
        let sampling_view = device.create_texture_view(&texture, 0, layers)?;
        let mut layer_views = Vec::with_capacity(layers as usize);
        for layer in 0..layers {
            layer_views.push(device.create_texture_view(&texture, layer, 1)?);
        }
        Ok(Self {
            kind,
            resolution,
            texture: Some(texture),
            sampling_view: Some(sampling_view),
            layer_views,
        })
    }

    pub fn kind(&self) -> ShadowMapKind {
        self.kind
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// View over every layer, for sampling in the scene stage
    pub fn sampling_view(&self) -> Option<&Arc<dyn TextureView>> {
        self.sampling_view.as_ref()
    }

    /// Render view of one cascade or cube face
    pub fn layer_view(&self, layer: u32) -> Option<&Arc<dyn TextureView>> {
        self.layer_views.get(layer as usize)
    }

    pub fn layer_count(&self) -> u32 {
        self.kind.layer_count()
    }
}

impl FrameBufferResource for ShadowMapFrameBuffer {
    fn texture(&self) -> Option<&Arc<dyn Texture>> {
        self.texture.as_ref()
    }

    fn cleanup(&mut self) {
        self.layer_views.clear();
        self.sampling_view = None;
        self.texture = None;
    }
}

#[cfg(test)]
#[path = "frame_buffer_tests.rs"]
mod tests;
