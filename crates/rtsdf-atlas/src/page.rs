// CPU mirror of one atlas page: a square RGBA8 buffer.

use rtsdf_core::{PixelRect, BYTES_PER_TEXEL};

pub struct AtlasPage {
    size: u32,
    pixels: Vec<u8>,
}

impl AtlasPage {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            pixels: vec![0; size as usize * size as usize * BYTES_PER_TEXEL],
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Copy a tightly packed RGBA8 region into the page.
    /// `rect` must lie inside the page and `data` must hold exactly its texels.
    pub fn write_region(&mut self, rect: PixelRect, data: &[u8]) {
        debug_assert!(rect.right() <= self.size && rect.bottom() <= self.size);
        debug_assert_eq!(data.len(), rect.area() as usize * BYTES_PER_TEXEL);
        let row_bytes = rect.width as usize * BYTES_PER_TEXEL;
        let stride = self.size as usize * BYTES_PER_TEXEL;
        for (row, src) in data.chunks_exact(row_bytes).enumerate() {
            let start = (rect.y as usize + row) * stride + rect.x as usize * BYTES_PER_TEXEL;
            self.pixels[start..start + row_bytes].copy_from_slice(src);
        }
    }

    pub fn read_region(&self, rect: PixelRect) -> Vec<u8> {
        let row_bytes = rect.width as usize * BYTES_PER_TEXEL;
        let stride = self.size as usize * BYTES_PER_TEXEL;
        let mut out = Vec::with_capacity(rect.height as usize * row_bytes);
        for row in 0..rect.height as usize {
            let start = (rect.y as usize + row) * stride + rect.x as usize * BYTES_PER_TEXEL;
            out.extend_from_slice(&self.pixels[start..start + row_bytes]);
        }
        out
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_write_and_read() {
        let mut page = AtlasPage::new(8);
        let rect = PixelRect::new(2, 3, 2, 2);
        let data: Vec<u8> = (0..16).collect();
        page.write_region(rect, &data);
        assert_eq!(page.read_region(rect), data);

        // Row 3 starts at texel 3 * 8; the region begins two texels in.
        let row_start = (3 * 8 + 2) * 4;
        assert_eq!(&page.pixels()[row_start..row_start + 8], &data[..8]);
        assert_eq!(page.pixels()[row_start - 1], 0);
    }

    #[test]
    fn test_clear() {
        let mut page = AtlasPage::new(4);
        page.write_region(PixelRect::new(0, 0, 1, 1), &[9, 9, 9, 9]);
        page.clear();
        assert!(page.pixels().iter().all(|&b| b == 0));
    }
}
