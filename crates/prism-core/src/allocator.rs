use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

#[derive(Debug)]
pub struct OwnedTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub key: TexKey,
}

#[derive(Debug)]
pub struct OwnedBuffer {
    pub buffer: wgpu::Buffer,
    pub key: BufKey,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TexKey {
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BufKey {
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

/// Key-indexed free lists. A hit hands back a previously released
/// resource; a miss leaves creation to the caller.
struct Pool<K, R> {
    entries: HashMap<K, Vec<R>>,
}

impl<K: Copy + Eq + Hash, R> Pool<K, R> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn take(&mut self, key: &K) -> Option<R> {
        self.entries.get_mut(key)?.pop()
    }

    fn put(&mut self, key: K, resource: R) {
        self.entries.entry(key).or_default().push(resource);
    }
}

/// Simple render allocator with basic pooling for textures and buffers.
/// Resizing back to previously seen dimensions reuses the released
/// resources rather than allocating fresh ones.
pub struct RenderAllocator {
    device: Arc<wgpu::Device>,
    textures: Pool<TexKey, wgpu::Texture>,
    buffers: Pool<BufKey, wgpu::Buffer>,
}

impl RenderAllocator {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            device,
            textures: Pool::new(),
            buffers: Pool::new(),
        }
    }

    /// Limits of the underlying device, for sizing storage allocations.
    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    pub fn allocate_texture(&mut self, key: TexKey) -> OwnedTexture {
        let texture = self.textures.take(&key).unwrap_or_else(|| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("prism:tex"),
                size: wgpu::Extent3d {
                    width: key.width,
                    height: key.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: key.sample_count,
                dimension: wgpu::TextureDimension::D2,
                format: key.format,
                usage: key.usage,
                view_formats: &[],
            })
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        OwnedTexture { texture, view, key }
    }

    pub fn release_texture(&mut self, tex: OwnedTexture) {
        self.textures.put(tex.key, tex.texture);
    }

    pub fn allocate_buffer(&mut self, key: BufKey) -> OwnedBuffer {
        let buffer = self.buffers.take(&key).unwrap_or_else(|| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("prism:buf"),
                size: key.size,
                usage: key.usage,
                mapped_at_creation: false,
            })
        });
        OwnedBuffer { buffer, key }
    }

    pub fn release_buffer(&mut self, buf: OwnedBuffer) {
        self.buffers.put(buf.key, buf.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_for(width: u32, height: u32, sample_count: u32) -> TexKey {
        TexKey {
            width,
            height,
            sample_count,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }

    #[test]
    fn pool_reuses_resources_released_at_the_same_key() {
        let mut pool: Pool<TexKey, u32> = Pool::new();
        let key = key_for(640, 480, 4);
        assert!(pool.take(&key).is_none());
        pool.put(key, 7);
        assert_eq!(pool.take(&key), Some(7));
        assert!(pool.take(&key).is_none());
    }

    #[test]
    fn sample_count_distinguishes_pool_keys() {
        let mut pool: Pool<TexKey, u32> = Pool::new();
        pool.put(key_for(640, 480, 4), 1);
        assert!(pool.take(&key_for(640, 480, 1)).is_none());
        assert_eq!(pool.take(&key_for(640, 480, 4)), Some(1));
    }

    #[test]
    fn resize_round_trip_lands_on_the_pooled_resource() {
        // Release at one size, work at another, come back: the original
        // resource is reused instead of allocated fresh.
        let mut pool: Pool<BufKey, u32> = Pool::new();
        let original = BufKey {
            size: 1920 * 1280 * 4,
            usage: wgpu::BufferUsages::STORAGE,
        };
        let smaller = BufKey {
            size: 800 * 600 * 4,
            usage: wgpu::BufferUsages::STORAGE,
        };
        pool.put(original, 11);
        assert!(pool.take(&smaller).is_none());
        pool.put(smaller, 22);
        assert_eq!(pool.take(&original), Some(11));
    }
}
