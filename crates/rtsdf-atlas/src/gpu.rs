// GPU mirror of the atlas: one Rgba8Unorm texture per page.

use rtsdf_core::{PageId, PixelRect, BYTES_PER_TEXEL};

use crate::cache::AtlasUpdate;

pub struct PageTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

pub struct AtlasTextures {
    page_size: u32,
    pages: Vec<PageTexture>,
}

impl AtlasTextures {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
        }
    }

    pub fn view(&self, page: PageId) -> Option<&wgpu::TextureView> {
        self.pages.get(page as usize).map(|p| &p.view)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Apply a drained update stream in order. Returns the number of writes.
    pub fn apply(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, updates: &[AtlasUpdate]) -> usize {
        let mut writes = 0;
        for update in updates {
            match update {
                AtlasUpdate::Commit {
                    page, rect, pixels, ..
                } => {
                    self.ensure_page(device, *page);
                    self.write(queue, *page, *rect, pixels);
                    writes += 1;
                }
                // The region is only reused through a later commit.
                AtlasUpdate::Evicted { .. } => {}
                AtlasUpdate::PageCleared { page } => {
                    self.ensure_page(device, *page);
                    let zeros = vec![0u8; self.page_size as usize * self.page_size as usize * BYTES_PER_TEXEL];
                    self.write(queue, *page, self.full_page(), &zeros);
                    writes += 1;
                }
            }
        }
        writes
    }

    /// Re-upload a whole page, e.g. after the device was lost.
    pub fn upload_page(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, page: PageId, pixels: &[u8]) {
        self.ensure_page(device, page);
        self.write(queue, page, self.full_page(), pixels);
    }

    fn full_page(&self) -> PixelRect {
        PixelRect::new(0, 0, self.page_size, self.page_size)
    }

    fn ensure_page(&mut self, device: &wgpu::Device, page: PageId) {
        while self.pages.len() <= page as usize {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("rtsdf_atlas_page"),
                size: wgpu::Extent3d {
                    width: self.page_size,
                    height: self.page_size,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                // Distances are linear values, never sRGB.
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            self.pages.push(PageTexture { texture, view });
        }
    }

    fn write(&self, queue: &wgpu::Queue, page: PageId, rect: PixelRect, data: &[u8]) {
        let Some(target) = self.pages.get(page as usize) else {
            return;
        };
        if rect.is_empty() {
            return;
        }
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(rect.width * BYTES_PER_TEXEL as u32),
                rows_per_image: Some(rect.height),
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
    }
}
