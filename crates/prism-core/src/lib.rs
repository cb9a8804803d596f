//! prism-core: order-independent transparency rendering under MSAA.
//!
//! The frame pipeline runs in a fixed phase order, with wgpu's inter-pass
//! ordering acting as the global barrier between producer and consumer:
//!
//! 1. lists reset (heads to sentinel, counter to zero)
//! 2. opaque pass into the multisampled color/depth pair
//! 3. transparent accumulation into the per-pixel fragment lists
//! 4. MSAA resolve of the opaque color
//! 5. resolve compute: walk, sort, composite per covered sub-sample
//! 6. blit to the surface

use std::sync::Arc;

/// Re-export wgpu for downstream crates while avoiding direct dependency leakage.
pub use wgpu;

mod allocator;
pub mod config;
pub mod fragments;
mod pass_manager;
mod pipeline;
mod targets;
mod upload;

pub use allocator::{BufKey, OwnedBuffer, OwnedTexture, RenderAllocator, TexKey};
pub use config::{OitSettings, PrismConfig};
pub use pass_manager::OitPassManager;
pub use pipeline::{Blitter, ListsReset, OitResolver, OpaqueRenderer, TransparentAccumulator};
pub use targets::OitTargets;
pub use upload::{DrawBuffer, Vertex, upload_vertices};

/// Fatal failures of the render core. Per-pixel list overflow is not an
/// error; it degrades the image and is handled inside the shaders.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("device request failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface acquisition failed: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}

/// Top-level engine handle: shared device/queue plus the resource pool.
pub struct PrismEngine {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    allocator: RenderAllocator,
}

impl PrismEngine {
    /// Initialize the engine with an existing device/queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self::from_shared(Arc::new(device), Arc::new(queue))
    }

    /// Initialize from already-shared handles, e.g. ones a window wrapper
    /// keeps for surface configuration.
    pub fn from_shared(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let allocator = RenderAllocator::new(device.clone());
        Self {
            device,
            queue,
            allocator,
        }
    }

    pub fn device(&self) -> Arc<wgpu::Device> {
        self.device.clone()
    }

    pub fn queue(&self) -> Arc<wgpu::Queue> {
        self.queue.clone()
    }

    pub fn allocator_mut(&mut self) -> &mut RenderAllocator {
        &mut self.allocator
    }
}

/// Choose an sRGB surface format when available; otherwise, pick the first format.
pub fn choose_srgb_surface_format(
    adapter: &wgpu::Adapter,
    surface: &wgpu::Surface,
) -> wgpu::TextureFormat {
    let caps = surface.get_capabilities(adapter);
    caps.formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .unwrap_or(caps.formats[0])
}

/// Create a surface configuration for the given size, favoring FIFO present mode.
pub fn make_surface_config(
    adapter: &wgpu::Adapter,
    surface: &wgpu::Surface,
    width: u32,
    height: u32,
) -> wgpu::SurfaceConfiguration {
    let caps = surface.get_capabilities(adapter);
    let format = choose_srgb_surface_format(adapter, surface);
    let present_mode = caps
        .present_modes
        .iter()
        .copied()
        .find(|m| *m == wgpu::PresentMode::Fifo)
        .unwrap_or(caps.present_modes[0]);
    let alpha_mode = caps
        .alpha_modes
        .iter()
        .copied()
        .find(|m| *m == wgpu::CompositeAlphaMode::Opaque)
        .unwrap_or(caps.alpha_modes[0]);
    wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    }
}
