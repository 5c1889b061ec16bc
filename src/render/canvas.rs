use std::path::Path;

use super::color::Rgba;
use super::gradient::LinearGradient;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A 2-D raster the waveform can be drawn onto.
pub trait DrawTarget {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Reset every pixel to the background.
    fn clear(&mut self);
    fn fill_rect(&mut self, rect: &Rect, paint: &LinearGradient);
}

/// In-memory RGBA8 surface, row-major, 4 bytes per pixel.
#[derive(Clone, Debug)]
pub struct RgbaCanvas {
    width: u32,
    height: u32,
    background: Rgba,
    pixels: Vec<u8>,
}

impl RgbaCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_background(width, height, Rgba::TRANSPARENT)
    }

    pub fn with_background(width: u32, height: u32, background: Rgba) -> Self {
        let mut canvas = Self {
            width,
            height,
            background,
            pixels: vec![0; width as usize * height as usize * 4],
        };
        canvas.clear();
        canvas
    }

    pub fn save_png(&self, path: &Path) -> image::ImageResult<()> {
        image::save_buffer_with_format(
            path,
            &self.pixels,
            self.width,
            self.height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
    }

    fn blend(&mut self, x: u32, y: u32, color: Rgba) {
        let idx = pixel_offset(self.width, x, y);
        let [r, g, b, _] = color.0;
        let a = color.alpha();
        if a == 255 {
            self.pixels[idx..idx + 4].copy_from_slice(&color.0);
            return;
        }
        if a == 0 {
            return;
        }
        // Source-over with straight alpha.
        let src_a = a as f32 / 255.0;
        let dst_a = self.pixels[idx + 3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        for (i, src) in [r, g, b].into_iter().enumerate() {
            let dst = self.pixels[idx + i] as f32;
            let mixed = (src as f32 * src_a + dst * dst_a * (1.0 - src_a)) / out_a;
            self.pixels[idx + i] = mixed.round() as u8;
        }
        self.pixels[idx + 3] = (out_a * 255.0).round() as u8;
    }
}

#[cfg(test)]
impl RgbaCanvas {
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = pixel_offset(self.width, x, y);
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[idx..idx + 4]);
        Some(Rgba(px))
    }

    /// True when no pixel differs from the background.
    pub fn is_blank(&self) -> bool {
        self.pixels.chunks_exact(4).all(|px| px == self.background.0)
    }
}

/// Byte offset of pixel (x, y) in a row-major RGBA buffer `width` pixels wide.
fn pixel_offset(width: u32, x: u32, y: u32) -> usize {
    (y as usize * width as usize + x as usize) * 4
}

/// Pixel indices whose centres lie in `[start, start + len)`, clipped to `limit`.
fn covered_span(start: f32, len: f32, limit: u32) -> std::ops::Range<u32> {
    if !(len > 0.0) {
        return 0..0;
    }
    let first = (start - 0.5).ceil().max(0.0);
    let end = (start + len - 0.5).ceil().min(limit as f32);
    if end <= first {
        return 0..0;
    }
    first as u32..end as u32
}

impl DrawTarget for RgbaCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        let bg = self.background.0;
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&bg);
        }
    }

    fn fill_rect(&mut self, rect: &Rect, paint: &LinearGradient) {
        let cols = covered_span(rect.x, rect.width, self.width);
        for y in covered_span(rect.y, rect.height, self.height) {
            let color = paint.row(y);
            for x in cols.clone() {
                self.blend(x, y, color);
            }
        }
    }
}
