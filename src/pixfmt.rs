//! Pixel format descriptors for the memory layouts a canvas or blit
//! source can use.
//!
//! A descriptor is pure data: bit depth plus a mask/shift pair per
//! channel, enough to extract an 8-bit value from a packed pixel. The
//! software engine itself renders only the 24- and 32-bit BGR layouts;
//! the remaining descriptors exist so surfaces can carry their layout
//! through the system (conversion lives outside this crate).

use serde::{Deserialize, Serialize};

/// The closed set of canonical pixel layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormatType {
    /// 24-bit packed, byte order B,G,R.
    Bgr8,
    /// 32-bit, byte order B,G,R,X (padding byte ignored).
    Bgrx8,
    /// 32-bit, byte order B,G,R,A.
    Bgra8,
    /// 16-bit, 4 bits per channel.
    Bgra4,
    /// 16-bit, 5-6-5 split.
    Bgr565,
    /// 8-bit palette index.
    Index8,
    /// 8-bit alpha only.
    Alpha8,
    Custom,
    Unknown,
}

/// How stretch operations sample this surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleMode {
    #[default]
    Nearest,
    Interpolate,
}

/// Concrete in-memory pixel layout: bit depth and per-channel extraction
/// masks/shifts on the packed little-endian value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub format_type: PixelFormatType,
    pub bits: u32,
    pub r_mask: u32,
    pub r_shift: u32,
    pub g_mask: u32,
    pub g_shift: u32,
    pub b_mask: u32,
    pub b_shift: u32,
    pub a_mask: u32,
    pub a_shift: u32,
}

impl PixelFormat {
    /// Descriptor for a canonical layout. `Custom` and `Unknown` have no
    /// fixed layout and yield an all-zero descriptor.
    pub fn from_type(format_type: PixelFormatType) -> Self {
        use PixelFormatType::*;
        let (bits, masks) = match format_type {
            Bgr8 => (24, [(0xFF0000, 16), (0xFF00, 8), (0xFF, 0), (0, 0)]),
            Bgrx8 => (32, [(0xFF0000, 16), (0xFF00, 8), (0xFF, 0), (0, 0)]),
            Bgra8 => (
                32,
                [(0xFF0000, 16), (0xFF00, 8), (0xFF, 0), (0xFF000000, 24)],
            ),
            Bgra4 => (16, [(0x0F00, 8), (0x00F0, 4), (0x000F, 0), (0xF000, 12)]),
            Bgr565 => (16, [(0xF800, 11), (0x07E0, 5), (0x001F, 0), (0, 0)]),
            Index8 => (8, [(0, 0), (0, 0), (0, 0), (0, 0)]),
            Alpha8 => (8, [(0, 0), (0, 0), (0, 0), (0xFF, 0)]),
            Custom | Unknown => (0, [(0, 0), (0, 0), (0, 0), (0, 0)]),
        };
        Self {
            format_type,
            bits,
            r_mask: masks[0].0,
            r_shift: masks[0].1,
            g_mask: masks[1].0,
            g_shift: masks[1].1,
            b_mask: masks[2].0,
            b_shift: masks[2].1,
            a_mask: masks[3].0,
            a_shift: masks[3].1,
        }
    }

    /// Bytes per pixel; 0 for layouts without a fixed size.
    #[inline]
    pub fn pixel_bytes(&self) -> usize {
        (self.bits / 8) as usize
    }

    /// True when this layout carries an alpha channel.
    #[inline]
    pub fn has_alpha(&self) -> bool {
        self.a_mask != 0
    }

    /// True when the software engine can read/write this layout directly.
    #[inline]
    pub fn is_soft_renderable(&self) -> bool {
        matches!(
            self.format_type,
            PixelFormatType::Bgr8 | PixelFormatType::Bgrx8 | PixelFormatType::Bgra8
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra8_layout() {
        let f = PixelFormat::from_type(PixelFormatType::Bgra8);
        assert_eq!(f.bits, 32);
        assert_eq!(f.pixel_bytes(), 4);
        assert!(f.has_alpha());
        assert!(f.is_soft_renderable());
        // Packed 0xAARRGGBB little-endian is B,G,R,A in memory.
        let px = 0xAA112233u32;
        assert_eq!((px & f.b_mask) >> f.b_shift, 0x33);
        assert_eq!((px & f.g_mask) >> f.g_shift, 0x22);
        assert_eq!((px & f.r_mask) >> f.r_shift, 0x11);
        assert_eq!((px & f.a_mask) >> f.a_shift, 0xAA);
    }

    #[test]
    fn test_bgr8_has_no_alpha() {
        let f = PixelFormat::from_type(PixelFormatType::Bgr8);
        assert_eq!(f.pixel_bytes(), 3);
        assert!(!f.has_alpha());
        assert!(f.is_soft_renderable());
    }

    #[test]
    fn test_exotic_formats_not_renderable() {
        for t in [
            PixelFormatType::Bgra4,
            PixelFormatType::Bgr565,
            PixelFormatType::Index8,
            PixelFormatType::Alpha8,
            PixelFormatType::Custom,
            PixelFormatType::Unknown,
        ] {
            assert!(!PixelFormat::from_type(t).is_soft_renderable());
        }
    }

    #[test]
    fn test_bgr565_masks_cover_16_bits() {
        let f = PixelFormat::from_type(PixelFormatType::Bgr565);
        assert_eq!(f.r_mask | f.g_mask | f.b_mask, 0xFFFF);
        assert_eq!(f.r_mask & f.g_mask, 0);
        assert_eq!(f.g_mask & f.b_mask, 0);
    }
}
