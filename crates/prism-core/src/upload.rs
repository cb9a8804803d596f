//! Vertex upload helpers for the opaque and transparent draws.

use crate::allocator::{BufKey, OwnedBuffer, RenderAllocator};

/// Vertex layout shared by the opaque and accumulation pipelines:
/// pixel-space position with normalized depth, straight-alpha linear RGBA.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 4],
}

/// A vertex buffer ready to draw, with its vertex count.
pub struct DrawBuffer {
    pub vertex: OwnedBuffer,
    pub vertices: u32,
}

/// Upload a vertex slice into a pooled buffer.
pub fn upload_vertices(
    allocator: &mut RenderAllocator,
    queue: &wgpu::Queue,
    vertices: &[Vertex],
) -> DrawBuffer {
    let size = std::mem::size_of_val(vertices) as u64;
    let vertex = allocator.allocate_buffer(BufKey {
        size: size.max(4),
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
    });
    if size > 0 {
        queue.write_buffer(&vertex.buffer, 0, bytemuck::cast_slice(vertices));
    }
    DrawBuffer {
        vertex,
        vertices: vertices.len() as u32,
    }
}
