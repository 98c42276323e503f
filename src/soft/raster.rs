//! Span filling: the per-blend-mode pixel loops behind `fill`,
//! sub-pixel fills and axis-aligned lines.
//!
//! Callers pre-clip the rectangle to the surface, pre-tint the color and
//! pre-promote the blend mode (Blend at alpha 255 becomes Opaque), so
//! each loop here is a straight run over bounds-checked rows.

use crate::color::Color;
use crate::device::BlendMode;
use crate::geom::Rect;
use crate::surface::{SoftSurface, Surface};
use crate::tables::{clamp_add, div255, mul8};

/// Apply `op` to every pixel of `rect`. `rect` must lie inside the
/// surface.
#[inline]
fn for_each_pixel(surface: &mut SoftSurface, rect: &Rect, mut op: impl FnMut(&mut [u8])) {
    let bpp = surface.pixel_bytes();
    let pitch = surface.pitch();
    let start = surface.byte_index(rect.x, rect.y);
    let row_bytes = rect.w as usize * bpp;
    let data = surface.pixels_mut();

    for row in 0..rect.h as usize {
        let row_start = start + row * pitch;
        for px in data[row_start..row_start + row_bytes].chunks_exact_mut(bpp) {
            op(px);
        }
    }
}

/// Full-coverage fill of `rect` with a pre-tinted color.
pub(crate) fn fill_rect(surface: &mut SoftSurface, rect: &Rect, c: Color, mode: BlendMode) {
    let write_alpha = surface.pixel_format().has_alpha();

    match mode {
        BlendMode::Opaque => {
            for_each_pixel(surface, rect, |px| {
                px[0] = c.b;
                px[1] = c.g;
                px[2] = c.r;
                if write_alpha {
                    px[3] = c.a;
                }
            });
        }
        BlendMode::Blend => {
            let sb = c.b as u32 * c.a as u32;
            let sg = c.g as u32 * c.a as u32;
            let sr = c.r as u32 * c.a as u32;
            let inv = 255 - c.a as u32;

            for_each_pixel(surface, rect, |px| {
                px[0] = div255(px[0] as u32 * inv + sb);
                px[1] = div255(px[1] as u32 * inv + sg);
                px[2] = div255(px[2] as u32 * inv + sr);
            });
        }
        BlendMode::Add => {
            let ab = mul8(c.b, c.a) as u32;
            let ag = mul8(c.g, c.a) as u32;
            let ar = mul8(c.r, c.a) as u32;
            if ab + ag + ar == 0 {
                return;
            }

            for_each_pixel(surface, rect, |px| {
                px[0] = clamp_add(px[0] as u32 + ab);
                px[1] = clamp_add(px[1] as u32 + ag);
                px[2] = clamp_add(px[2] as u32 + ar);
            });
        }
        BlendMode::Multiply => {
            for_each_pixel(surface, rect, |px| {
                px[0] = div255(px[0] as u32 * c.b as u32);
                px[1] = div255(px[1] as u32 * c.g as u32);
                px[2] = div255(px[2] as u32 * c.r as u32);
            });
        }
        BlendMode::Invert => {
            for_each_pixel(surface, rect, |px| {
                let d = px[0] as u32;
                px[0] = div255(c.b as u32 * (255 - d) + d * (255 - c.b as u32));
                let d = px[1] as u32;
                px[1] = div255(c.g as u32 * (255 - d) + d * (255 - c.g as u32));
                let d = px[2] as u32;
                px[2] = div255(c.r as u32 * (255 - d) + d * (255 - c.r as u32));
            });
        }
    }
}

/// Partial-coverage fill: composite `c` into `rect` weighted by the
/// coverage fraction `aa` in [0, 255]. Used for feathered rectangle
/// edges, corner pieces and sub-pixel-thin lines.
pub(crate) fn fill_rect_aa(surface: &mut SoftSurface, rect: &Rect, c: Color, mode: BlendMode, aa: u32) {
    match mode {
        BlendMode::Opaque => {
            let sb = c.b as u32 * aa;
            let sg = c.g as u32 * aa;
            let sr = c.r as u32 * aa;
            let inv = 255 - aa;

            for_each_pixel(surface, rect, |px| {
                px[0] = div255(px[0] as u32 * inv + sb);
                px[1] = div255(px[1] as u32 * inv + sg);
                px[2] = div255(px[2] as u32 * inv + sr);
            });
        }
        BlendMode::Blend => {
            let a = mul8(c.a, aa as u8) as u32;
            let sb = c.b as u32 * a;
            let sg = c.g as u32 * a;
            let sr = c.r as u32 * a;
            let inv = 255 - a;

            for_each_pixel(surface, rect, |px| {
                px[0] = div255(px[0] as u32 * inv + sb);
                px[1] = div255(px[1] as u32 * inv + sg);
                px[2] = div255(px[2] as u32 * inv + sr);
            });
        }
        BlendMode::Add => {
            let a = mul8(c.a, aa as u8);
            let ab = mul8(c.b, a) as u32;
            let ag = mul8(c.g, a) as u32;
            let ar = mul8(c.r, a) as u32;
            if ab + ag + ar == 0 {
                return;
            }

            for_each_pixel(surface, rect, |px| {
                px[0] = clamp_add(px[0] as u32 + ab);
                px[1] = clamp_add(px[1] as u32 + ag);
                px[2] = clamp_add(px[2] as u32 + ar);
            });
        }
        BlendMode::Multiply => {
            let mb = mul8(c.b, aa as u8) as u32;
            let mg = mul8(c.g, aa as u8) as u32;
            let mr = mul8(c.r, aa as u8) as u32;
            let inv = 255 - aa;

            for_each_pixel(surface, rect, |px| {
                px[0] = div255(px[0] as u32 * inv + px[0] as u32 * mb);
                px[1] = div255(px[1] as u32 * inv + px[1] as u32 * mg);
                px[2] = div255(px[2] as u32 * inv + px[2] as u32 * mr);
            });
        }
        BlendMode::Invert => {
            // Lerp between the destination and the inverted result with
            // 16 fraction bits.
            let inv = (255 - aa) << 8;

            for_each_pixel(surface, rect, |px| {
                for (i, ch) in [c.b, c.g, c.r].into_iter().enumerate() {
                    let d = px[i] as u32;
                    let inverted = (255 - d) * ch as u32 + d * (255 - ch as u32);
                    px[i] = ((d * inv + aa * inverted) >> 16) as u8;
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Size;
    use crate::pixfmt::PixelFormatType;

    fn canvas(w: i32, h: i32) -> SoftSurface {
        SoftSurface::new(Size::new(w, h), PixelFormatType::Bgra8).unwrap()
    }

    fn px(s: &SoftSurface, x: i32, y: i32) -> [u8; 4] {
        s.read_bgra(x, y)
    }

    #[test]
    fn test_opaque_fill_writes_all_channels() {
        let mut s = canvas(4, 4);
        fill_rect(&mut s, &Rect::new(1, 1, 2, 2), Color::new(255, 0, 0, 255), BlendMode::Opaque);
        assert_eq!(px(&s, 1, 1), [0, 0, 255, 255]);
        assert_eq!(px(&s, 2, 2), [0, 0, 255, 255]);
        assert_eq!(px(&s, 0, 0), [0, 0, 0, 0]);
        assert_eq!(px(&s, 3, 3), [0, 0, 0, 0]);
    }

    #[test]
    fn test_blend_fill_mixes_with_destination() {
        let mut s = canvas(1, 1);
        fill_rect(&mut s, &Rect::new(0, 0, 1, 1), Color::new(200, 100, 50, 255), BlendMode::Opaque);
        fill_rect(&mut s, &Rect::new(0, 0, 1, 1), Color::new(0, 0, 0, 128), BlendMode::Blend);
        // d' = d * (255-128) / 255
        assert_eq!(px(&s, 0, 0)[2], (200 * 127 / 255) as u8);
        assert_eq!(px(&s, 0, 0)[1], (100 * 127 / 255) as u8);
        assert_eq!(px(&s, 0, 0)[0], (50 * 127 / 255) as u8);
    }

    #[test]
    fn test_add_fill_saturates() {
        let mut s = canvas(1, 1);
        fill_rect(&mut s, &Rect::new(0, 0, 1, 1), Color::new(100, 0, 0, 255), BlendMode::Add);
        fill_rect(&mut s, &Rect::new(0, 0, 1, 1), Color::new(200, 0, 0, 255), BlendMode::Add);
        assert_eq!(px(&s, 0, 0)[2], 255);
        assert_eq!(px(&s, 0, 0)[1], 0);
    }

    #[test]
    fn test_multiply_fill() {
        let mut s = canvas(1, 1);
        fill_rect(&mut s, &Rect::new(0, 0, 1, 1), Color::new(200, 200, 200, 255), BlendMode::Opaque);
        fill_rect(&mut s, &Rect::new(0, 0, 1, 1), Color::new(128, 128, 128, 255), BlendMode::Multiply);
        assert_eq!(px(&s, 0, 0)[2], (200 * 128 / 255) as u8);
    }

    #[test]
    fn test_invert_fill_is_reversible_on_extremes() {
        let mut s = canvas(1, 1);
        // Inverting black with white gives white; doing it again gives black.
        fill_rect(&mut s, &Rect::new(0, 0, 1, 1), Color::WHITE, BlendMode::Invert);
        assert_eq!(px(&s, 0, 0)[..3], [255, 255, 255]);
        fill_rect(&mut s, &Rect::new(0, 0, 1, 1), Color::WHITE, BlendMode::Invert);
        assert_eq!(px(&s, 0, 0)[..3], [0, 0, 0]);
    }

    #[test]
    fn test_aa_fill_half_coverage() {
        let mut s = canvas(1, 1);
        fill_rect_aa(&mut s, &Rect::new(0, 0, 1, 1), Color::new(255, 255, 255, 255), BlendMode::Blend, 128);
        // d' = 255 * 128 / 255 = 128
        assert_eq!(px(&s, 0, 0)[0], 128);
        assert_eq!(px(&s, 0, 0)[1], 128);
        assert_eq!(px(&s, 0, 0)[2], 128);
    }

    #[test]
    fn test_aa_fill_full_coverage_matches_fill() {
        let mut a = canvas(1, 1);
        let mut b = canvas(1, 1);
        let c = Color::new(10, 180, 90, 200);
        fill_rect(&mut a, &Rect::new(0, 0, 1, 1), c, BlendMode::Blend);
        fill_rect_aa(&mut b, &Rect::new(0, 0, 1, 1), c, BlendMode::Blend, 255);
        assert_eq!(a.pixels(), b.pixels());
    }

    #[test]
    fn test_fill_respects_pitch_padding() {
        let mut s = SoftSurface::with_pixels(
            Size::new(2, 2),
            PixelFormatType::Bgr8,
            8, // two padding bytes per row
            vec![0; 16],
        )
        .unwrap();
        fill_rect(&mut s, &Rect::new(0, 0, 2, 2), Color::rgb(1, 2, 3), BlendMode::Opaque);
        let d = s.pixels();
        // Padding bytes stay zero.
        assert_eq!(d[6], 0);
        assert_eq!(d[7], 0);
        assert_eq!(&d[8..11], &[3, 2, 1]);
    }
}
