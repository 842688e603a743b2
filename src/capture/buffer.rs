//! Raw pixel buffers as they come out of display memory.
//!
//! Every buffer is top-down 32-bit BGRA with premultiplied alpha and a
//! tight stride of `width * 4`. Conversions to straight-alpha RGBA live
//! here so encoders never touch the raw layout.

use image::RgbaImage;

use super::CaptureError;

pub const BYTES_PER_PIXEL: usize = 4;

/// The only layout this crate produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra8Premultiplied,
}

#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl PixelBuffer {
    /// A fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    /// Wraps bytes read back from the OS. Rejects a length that does not
    /// match `width * 4 * height`.
    pub fn from_bgra(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(CaptureError::BufferSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Converts a straight-alpha RGBA image (what `xcap` returns).
    pub fn from_rgba_image(image: &RgbaImage) -> Self {
        let mut buffer = Self::new(image.width(), image.height());
        for (src, dst) in image
            .as_raw()
            .chunks_exact(4)
            .zip(buffer.pixels.chunks_exact_mut(4))
        {
            dst.copy_from_slice(&rgba_to_bgra_premul([src[0], src[1], src[2], src[3]]));
        }
        buffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn bytes_per_pixel(&self) -> usize {
        BYTES_PER_PIXEL
    }

    pub fn format(&self) -> PixelFormat {
        PixelFormat::Bgra8Premultiplied
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Row `y`, topmost first.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride();
        &self.pixels[start..start + self.stride()]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &mut self.pixels[start..start + stride]
    }

    /// BGRA bytes of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, bgra: [u8; 4]) {
        let i = self.offset(x, y);
        self.pixels[i..i + 4].copy_from_slice(&bgra);
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride() + x as usize * BYTES_PER_PIXEL
    }

    /// Straight-alpha RGBA copy, suitable for PNG encoding.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut raw = Vec::with_capacity(self.pixels.len());
        for px in self.pixels.chunks_exact(4) {
            raw.extend_from_slice(&bgra_premul_to_rgba([px[0], px[1], px[2], px[3]]));
        }
        // Length is width * height * 4 by construction.
        RgbaImage::from_raw(self.width, self.height, raw)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Opaque RGB composited over white. Premultiplied colour makes this
    /// `c + (255 - a)` per channel.
    pub fn to_rgb_over_white(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for px in self.pixels.chunks_exact(4) {
            let (b, g, r, a) = (px[0], px[1], px[2], px[3]);
            let back = 255 - a;
            rgb.push(r.saturating_add(back));
            rgb.push(g.saturating_add(back));
            rgb.push(b.saturating_add(back));
        }
        rgb
    }
}

fn rgba_to_bgra_premul([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    let premul = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
    [premul(b), premul(g), premul(r), a]
}

fn bgra_premul_to_rgba([b, g, r, a]: [u8; 4]) -> [u8; 4] {
    if a == 0 {
        return [0, 0, 0, 0];
    }
    let straight = |c: u8| ((c as u16 * 255 + a as u16 / 2) / a as u16).min(255) as u8;
    [straight(r), straight(g), straight(b), a]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn new_buffer_has_tight_stride() {
        let buf = PixelBuffer::new(7, 3);
        assert_eq!(buf.stride(), 28);
        assert_eq!(buf.pixels().len(), 28 * 3);
        assert_eq!(buf.format(), PixelFormat::Bgra8Premultiplied);
    }

    #[test]
    fn from_bgra_rejects_wrong_length() {
        let result = PixelBuffer::from_bgra(2, 2, vec![0; 15]);
        assert!(matches!(
            result,
            Err(CaptureError::BufferSizeMismatch { expected: 16, actual: 15 })
        ));
    }

    #[test]
    fn rgba_image_is_swizzled_to_bgra() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([10, 20, 30, 255]));
        let buf = PixelBuffer::from_rgba_image(&img);
        assert_eq!(buf.pixel(0, 0), [30, 20, 10, 255]);
    }

    #[test]
    fn half_alpha_is_premultiplied_and_restored() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([200, 100, 0, 128]));
        let buf = PixelBuffer::from_rgba_image(&img);
        assert_eq!(buf.pixel(0, 0), [0, 50, 100, 128]);

        let back = buf.to_rgba_image();
        let Rgba([r, g, b, a]) = *back.get_pixel(0, 0);
        assert_eq!(a, 128);
        assert!(r.abs_diff(200) <= 1);
        assert!(g.abs_diff(100) <= 1);
        assert_eq!(b, 0);
    }

    #[test]
    fn transparent_pixel_composites_to_white() {
        let buf = PixelBuffer::new(1, 1);
        assert_eq!(buf.to_rgb_over_white(), vec![255, 255, 255]);
    }

    #[test]
    fn rows_are_top_down() {
        let mut buf = PixelBuffer::new(2, 2);
        buf.set_pixel(1, 0, [1, 2, 3, 4]);
        assert_eq!(&buf.row(0)[4..8], &[1, 2, 3, 4]);
        assert!(buf.row(1).iter().all(|&b| b == 0));
    }
}
