//! CPU raster primitives over RGBA8 frame buffers.
//!
//! Pixels are stored as 4 bytes (red, green, blue, alpha), not premultiplied,
//! rows addressed through an explicit stride. Everything here is a pure
//! function of its arguments; out-of-bounds writes are silently dropped.

use crate::error::{Result, SuperscopeError};

/// An 8-bit RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ColorRgba8 {
    pub const BLACK: Self = Self::opaque(0, 0, 0);
    pub const TRANSPARENT: Self = Self { r: 0, g: 0, b: 0, a: 0 };

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for ColorRgba8 {
    fn default() -> Self {
        Self::BLACK
    }
}

/// An owned RGBA8 image with row stride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Allocate a tightly packed, fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        let stride = width as usize * 4;
        Self {
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    /// Wrap existing pixel bytes. `stride` is the number of bytes per row and
    /// must hold at least `width * 4` bytes.
    pub fn from_raw(width: u32, height: u32, stride: usize, data: Vec<u8>) -> Result<Self> {
        let row_bytes = width as usize * 4;
        if stride < row_bytes {
            return Err(SuperscopeError::InvalidFrame(format!(
                "stride {} is smaller than a {}-pixel row",
                stride, width
            )));
        }
        let needed = stride * height as usize;
        if data.len() < needed {
            return Err(SuperscopeError::InvalidFrame(format!(
                "{} bytes supplied, {}x{} with stride {} needs {}",
                data.len(),
                width,
                height,
                stride,
                needed
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride + x as usize * 4
    }

    /// Read a pixel, `None` outside the image.
    pub fn pixel(&self, x: i32, y: i32) -> Option<ColorRgba8> {
        if !self.in_bounds(x, y) {
            return None;
        }
        let o = self.offset(x as u32, y as u32);
        let p = &self.data[o..o + 4];
        Some(ColorRgba8::new(p[0], p[1], p[2], p[3]))
    }

    /// Overwrite a pixel without blending. No-op outside the image.
    pub fn put_pixel(&mut self, x: i32, y: i32, color: ColorRgba8) {
        if !self.in_bounds(x, y) {
            return;
        }
        let o = self.offset(x as u32, y as u32);
        self.data[o..o + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
    }

    /// Iterate over the visible bytes of each row, skipping stride padding.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let row_bytes = self.width as usize * 4;
        (0..self.height as usize).map(move |y| {
            let start = y * self.stride;
            &self.data[start..start + row_bytes]
        })
    }

    /// Copy the visible pixels into a tightly packed vector.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for row in self.rows() {
            out.extend_from_slice(row);
        }
        out
    }

    /// Convert to an `image` RGBA buffer for encoding.
    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.to_packed())
    }
}

/// Fill every pixel with `color`.
pub fn clear(fb: &mut FrameBuffer, color: ColorRgba8) {
    let row_bytes = fb.width as usize * 4;
    let stride = fb.stride;
    for y in 0..fb.height as usize {
        let row = &mut fb.data[y * stride..y * stride + row_bytes];
        for px in row.chunks_exact_mut(4) {
            px.copy_from_slice(&[color.r, color.g, color.b, color.a]);
        }
    }
}

/// Copy the overlapping region of `src` into `dst`, row by row.
pub fn copy_from(dst: &mut FrameBuffer, src: &FrameBuffer) {
    let width = dst.width.min(src.width) as usize;
    let height = dst.height.min(src.height) as usize;
    let row_bytes = width * 4;
    for y in 0..height {
        let d = y * dst.stride;
        let s = y * src.stride;
        dst.data[d..d + row_bytes].copy_from_slice(&src.data[s..s + row_bytes]);
    }
}

fn blend_channel(dst: u8, src: u8, alpha: u32) -> u8 {
    let inv = 255 - alpha;
    ((dst as u32 * inv + src as u32 * alpha + 127) / 255).min(255) as u8
}

/// Alpha-composite `color` over the pixel at (`x`, `y`).
///
/// The effective alpha is `coverage * color.a / 255` rounded to nearest. The
/// destination alpha accumulates by saturating addition.
pub fn blend_pixel(fb: &mut FrameBuffer, x: i32, y: i32, color: ColorRgba8, coverage: u8) {
    if !fb.in_bounds(x, y) {
        return;
    }
    let alpha = ((coverage as u32 * color.a as u32 + 127) / 255).min(255);
    if alpha == 0 {
        return;
    }
    let o = fb.offset(x as u32, y as u32);
    let p = &mut fb.data[o..o + 4];
    p[0] = blend_channel(p[0], color.r, alpha);
    p[1] = blend_channel(p[1], color.g, alpha);
    p[2] = blend_channel(p[2], color.b, alpha);
    p[3] = p[3].saturating_add(alpha as u8);
}

/// Integer Bresenham stepper visiting every point from `(x0, y0)` to
/// `(x1, y1)` inclusive.
struct LineSteps {
    x: i32,
    y: i32,
    x1: i32,
    y1: i32,
    dx: i32,
    dy: i32,
    sx: i32,
    sy: i32,
    err: i32,
    done: bool,
}

impl LineSteps {
    fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        Self {
            x: x0,
            y: y0,
            x1,
            y1,
            dx,
            dy,
            sx: if x0 < x1 { 1 } else { -1 },
            sy: if y0 < y1 { 1 } else { -1 },
            err: dx + dy,
            done: false,
        }
    }
}

impl Iterator for LineSteps {
    type Item = (i32, i32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = (self.x, self.y);
        if self.x == self.x1 && self.y == self.y1 {
            self.done = true;
            return Some(current);
        }
        let e2 = self.err << 1;
        if e2 >= self.dy {
            self.err += self.dy;
            self.x += self.sx;
        }
        if e2 <= self.dx {
            self.err += self.dx;
            self.y += self.sy;
        }
        Some(current)
    }
}

/// Draw a line of the given thickness.
///
/// Thickness 1 (or less) blends each Bresenham step. Larger thicknesses stamp
/// a filled disk of radius `thickness / 2` at every step.
pub fn draw_thick_line(
    fb: &mut FrameBuffer,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    thickness: i32,
    color: ColorRgba8,
) {
    if thickness <= 1 {
        for (x, y) in LineSteps::new(x0, y0, x1, y1) {
            blend_pixel(fb, x, y, color, 255);
        }
        return;
    }
    let radius = (thickness / 2).max(0);
    let r2 = radius * radius;
    for (x, y) in LineSteps::new(x0, y0, x1, y1) {
        for oy in -radius..=radius {
            for ox in -radius..=radius {
                if ox * ox + oy * oy > r2 {
                    continue;
                }
                blend_pixel(fb, x + ox, y + oy, color, 255);
            }
        }
    }
}

/// Map a normalised coordinate in [-1, 1] onto a pixel index of `extent`.
pub fn to_pixel_coord(normalized: f64, extent: u32) -> i32 {
    if extent == 0 {
        return 0;
    }
    let max = (extent - 1) as f64;
    let scaled = (normalized + 1.0) * 0.5 * max;
    (scaled.clamp(0.0, max) + 0.5).floor() as i32
}

/// Sample the colour under a normalised coordinate. Alpha is forced opaque;
/// an empty buffer reads as black.
pub fn sample_color(fb: &FrameBuffer, nx: f64, ny: f64) -> ColorRgba8 {
    if fb.is_empty() {
        return ColorRgba8::BLACK;
    }
    // Rounds like point placement; truncating renderers can pick the
    // neighbouring pixel, so frame hashes will not match theirs.
    let x = to_pixel_coord(nx, fb.width);
    let y = to_pixel_coord(ny, fb.height);
    match fb.pixel(x, y) {
        Some(p) => ColorRgba8::opaque(p.r, p.g, p.b),
        None => ColorRgba8::BLACK,
    }
}
