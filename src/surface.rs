//! Surfaces: the pixel buffers the device reads from and renders into.
//!
//! `Surface` is the read-side contract every backend consumes; the
//! device never allocates or frees one. `SoftSurface` is the owned
//! implementation used by the software engine: a `Vec<u8>` of packed
//! pixels plus pitch, format and scale mode.

use crate::geom::Size;
use crate::pixfmt::{PixelFormat, PixelFormatType, ScaleMode};

/// Read-side contract for a pixel buffer.
pub trait Surface {
    fn size(&self) -> Size;
    fn pixel_format(&self) -> &PixelFormat;
    fn scale_mode(&self) -> ScaleMode;
    /// Bytes per row, including any padding.
    fn pitch(&self) -> usize;
    fn pixels(&self) -> &[u8];

    fn width(&self) -> i32 {
        self.size().w
    }

    fn height(&self) -> i32 {
        self.size().h
    }
}

/// A CPU-side surface owning its pixel storage.
#[derive(Debug, Clone)]
pub struct SoftSurface {
    size: Size,
    format: PixelFormat,
    scale_mode: ScaleMode,
    pitch: usize,
    data: Vec<u8>,
}

impl SoftSurface {
    /// Allocate a zeroed surface. Returns `None` for layouts without a
    /// fixed pixel size (`Custom`/`Unknown`) or degenerate dimensions.
    pub fn new(size: Size, format_type: PixelFormatType) -> Option<Self> {
        let format = PixelFormat::from_type(format_type);
        if format.pixel_bytes() == 0 || size.is_empty() {
            return None;
        }
        let pitch = size.w as usize * format.pixel_bytes();
        Some(Self {
            size,
            format,
            scale_mode: ScaleMode::Nearest,
            pitch,
            data: vec![0; pitch * size.h as usize],
        })
    }

    /// Wrap existing pixel data with an explicit pitch. Returns `None`
    /// when the buffer is too small for the declared geometry.
    pub fn with_pixels(
        size: Size,
        format_type: PixelFormatType,
        pitch: usize,
        data: Vec<u8>,
    ) -> Option<Self> {
        let format = PixelFormat::from_type(format_type);
        if format.pixel_bytes() == 0 || size.is_empty() {
            return None;
        }
        if pitch < size.w as usize * format.pixel_bytes() || data.len() < pitch * size.h as usize {
            return None;
        }
        Some(Self {
            size,
            format,
            scale_mode: ScaleMode::Nearest,
            pitch,
            data,
        })
    }

    pub fn set_scale_mode(&mut self, mode: ScaleMode) {
        self.scale_mode = mode;
    }

    #[inline]
    pub fn pixel_bytes(&self) -> usize {
        self.format.pixel_bytes()
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the surface and take its pixel storage.
    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }

    /// Byte offset of pixel (x, y). Caller guarantees the coordinate is
    /// inside the surface.
    #[inline]
    pub(crate) fn byte_index(&self, x: i32, y: i32) -> usize {
        y as usize * self.pitch + x as usize * self.pixel_bytes()
    }

    /// Read one pixel as B,G,R,A bytes; alpha is 255 for layouts
    /// without an alpha channel.
    pub fn read_bgra(&self, x: i32, y: i32) -> [u8; 4] {
        let i = self.byte_index(x, y);
        let a = if self.format.has_alpha() {
            self.data[i + 3]
        } else {
            255
        };
        [self.data[i], self.data[i + 1], self.data[i + 2], a]
    }
}

impl Surface for SoftSurface {
    fn size(&self) -> Size {
        self.size
    }

    fn pixel_format(&self) -> &PixelFormat {
        &self.format
    }

    fn scale_mode(&self) -> ScaleMode {
        self.scale_mode
    }

    fn pitch(&self) -> usize {
        self.pitch
    }

    fn pixels(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_allocates_zeroed() {
        let s = SoftSurface::new(Size::new(4, 3), PixelFormatType::Bgra8).unwrap();
        assert_eq!(s.pitch(), 16);
        assert_eq!(s.pixels().len(), 48);
        assert!(s.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_new_rejects_unsized_formats() {
        assert!(SoftSurface::new(Size::new(4, 4), PixelFormatType::Custom).is_none());
        assert!(SoftSurface::new(Size::new(0, 4), PixelFormatType::Bgra8).is_none());
    }

    #[test]
    fn test_with_pixels_checks_length() {
        let ok = SoftSurface::with_pixels(
            Size::new(2, 2),
            PixelFormatType::Bgr8,
            8, // padded rows
            vec![0; 16],
        );
        assert!(ok.is_some());
        let short = SoftSurface::with_pixels(Size::new(2, 2), PixelFormatType::Bgr8, 8, vec![0; 10]);
        assert!(short.is_none());
    }

    #[test]
    fn test_read_bgra_without_alpha() {
        let mut s = SoftSurface::new(Size::new(1, 1), PixelFormatType::Bgr8).unwrap();
        s.pixels_mut().copy_from_slice(&[10, 20, 30]);
        assert_eq!(s.read_bgra(0, 0), [10, 20, 30, 255]);
    }
}
