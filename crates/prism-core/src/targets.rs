//! Resolution-dependent GPU resources for the OIT pipeline.
//!
//! Everything here is a function of `(width, height)` and the settings, so
//! a resize releases the lot back into the allocator pool and re-derives
//! it, including the node-pool capacity bound.

use crate::allocator::{BufKey, OwnedBuffer, OwnedTexture, RenderAllocator, TexKey};
use crate::config::OitSettings;
use crate::fragments::FragmentNode;

/// Color format of the offscreen targets. `Rgba8Unorm` keeps the resolve
/// output storage-writable, which swapchain formats are not.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Largest layer count whose node pool still fits the device's buffer
/// limits at the given dimensions. Never below one; at that point the
/// device simply cannot host the pool and creation fails loudly.
fn max_storage_layers(limits: &wgpu::Limits, width: u32, height: u32) -> u32 {
    let per_layer =
        u64::from(width) * u64::from(height) * std::mem::size_of::<FragmentNode>() as u64;
    let cap = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    ((cap / per_layer) as u32).max(1)
}

pub struct OitTargets {
    width: u32,
    height: u32,
    settings: OitSettings,
    /// Effective layer count after clamping against device limits; the
    /// requested value stays in `settings` so a resize re-derives it.
    layers: u32,
    /// Multisampled color target of the opaque pass.
    pub msaa_color: OwnedTexture,
    /// Multisampled depth; written by the opaque pass, bound as a texture
    /// during accumulation for per-sample occlusion rejection.
    pub msaa_depth: OwnedTexture,
    /// Single-sample resolve of `msaa_color`; the compositing backdrop.
    pub resolved_color: OwnedTexture,
    /// Resolve-compute output, blitted to the surface.
    pub output: OwnedTexture,
    /// Per-pixel list heads, one u32 per pixel.
    pub heads: OwnedBuffer,
    /// Flat node pool, `width * height * layers` slots.
    pub nodes: OwnedBuffer,
    /// Single atomic allocation counter.
    pub counter: OwnedBuffer,
}

impl OitTargets {
    pub fn new(
        allocator: &mut RenderAllocator,
        width: u32,
        height: u32,
        settings: OitSettings,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let samples = settings.msaa_samples;
        let layers = settings
            .storage_layers
            .min(max_storage_layers(&allocator.limits(), width, height));
        if layers < settings.storage_layers {
            log::warn!(
                "node pool for {} layers at {width}x{height} exceeds device limits, using {layers}",
                settings.storage_layers
            );
        }

        let msaa_color = allocator.allocate_texture(TexKey {
            width,
            height,
            sample_count: samples,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        });
        let msaa_depth = allocator.allocate_texture(TexKey {
            width,
            height,
            sample_count: samples,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        });
        let resolved_color = allocator.allocate_texture(TexKey {
            width,
            height,
            sample_count: 1,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        });
        let output = allocator.allocate_texture(TexKey {
            width,
            height,
            sample_count: 1,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        });

        let pixel_count = u64::from(width) * u64::from(height);
        let heads = allocator.allocate_buffer(BufKey {
            size: pixel_count * 4,
            usage: wgpu::BufferUsages::STORAGE,
        });
        let nodes = allocator.allocate_buffer(BufKey {
            size: pixel_count * u64::from(layers) * std::mem::size_of::<FragmentNode>() as u64,
            usage: wgpu::BufferUsages::STORAGE,
        });
        let counter = allocator.allocate_buffer(BufKey {
            size: 4,
            usage: wgpu::BufferUsages::STORAGE,
        });

        Self {
            width,
            height,
            settings,
            layers,
            msaa_color,
            msaa_depth,
            resolved_color,
            output,
            heads,
            nodes,
            counter,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    /// Node pool capacity for the current dimensions.
    pub fn capacity(&self) -> u32 {
        self.width * self.height * self.layers
    }

    /// Re-derive every target and buffer for new dimensions. Must complete
    /// before the next frame's accumulation begins.
    pub fn resize(&mut self, allocator: &mut RenderAllocator, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        log::debug!(
            "resizing OIT targets {}x{} -> {}x{}",
            self.width,
            self.height,
            width,
            height
        );
        let settings = self.settings;
        let next = Self::new(allocator, width, height, settings);
        let prev = std::mem::replace(self, next);
        allocator.release_texture(prev.msaa_color);
        allocator.release_texture(prev.msaa_depth);
        allocator.release_texture(prev.resolved_color);
        allocator.release_texture(prev.output);
        allocator.release_buffer(prev.heads);
        allocator.release_buffer(prev.nodes);
        allocator.release_buffer(prev.counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_pool_is_clamped_to_default_device_limits() {
        let limits = wgpu::Limits::default();
        let layers = max_storage_layers(&limits, 1920, 1280);
        let bytes = 1920u64 * 1280 * u64::from(layers) * 16;
        assert!(bytes <= u64::from(limits.max_storage_buffer_binding_size));
        assert!(bytes <= limits.max_buffer_size);
        assert!(layers >= 1);
        // Eight layers at this size would blow past both bounds.
        assert!(1920u64 * 1280 * 8 * 16 > u64::from(limits.max_storage_buffer_binding_size));
    }

    #[test]
    fn small_windows_keep_the_requested_layer_count() {
        let limits = wgpu::Limits::default();
        assert!(max_storage_layers(&limits, 640, 480) >= 8);
    }

    #[test]
    fn layer_clamp_is_stable_across_a_resize_round_trip() {
        let limits = wgpu::Limits::default();
        let effective = |w, h| 8u32.min(max_storage_layers(&limits, w, h));
        let at_start = effective(1920, 1280);
        let _ = effective(800, 600);
        assert_eq!(effective(1920, 1280), at_start);
    }
}
