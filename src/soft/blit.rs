//! Blit and stretch-blit pixel loops.
//!
//! One generic driver walks the destination pixels and hands each one a
//! sampled source color; the per-blend-mode compositing is a
//! monomorphized closure picked once per call, so the mode/tint match
//! never runs inside the loop. Stretch sampling steps a 15-bit
//! fixed-point accumulator across the source, nearest or bilinear
//! depending on the source's scale mode.

use crate::color::Color;
use crate::device::BlendMode;
use crate::geom::{Coord, Rect};
use crate::pixfmt::ScaleMode;
use crate::surface::{SoftSurface, Surface};
use crate::tables::{clamp_add, div255, mul8};

/// Fraction bits of the stretch-blit source accumulator.
pub(crate) const BILINEAR_FRAC_BITS: u32 = 15;

const FRAC_ONE: i32 = 1 << BILINEAR_FRAC_BITS;

// ----------------------------------------------------------------------
// Per-pixel compositing ops. `d` is the destination pixel, `s` the
// sampled source as B,G,R,A (alpha 255 for alpha-less sources).
// ----------------------------------------------------------------------

#[inline]
fn px_blend(d: &mut [u8], s: [u8; 4]) {
    let a = s[3] as u32;
    let inv = 255 - a;
    d[0] = div255(d[0] as u32 * inv + s[0] as u32 * a);
    d[1] = div255(d[1] as u32 * inv + s[1] as u32 * a);
    d[2] = div255(d[2] as u32 * inv + s[2] as u32 * a);
}

#[inline]
fn px_blend_tinted(d: &mut [u8], s: [u8; 4], t: Color) {
    let a = mul8(s[3], t.a) as u32;
    let inv = 255 - a;
    d[0] = div255(d[0] as u32 * inv + mul8(s[0], t.b) as u32 * a);
    d[1] = div255(d[1] as u32 * inv + mul8(s[1], t.g) as u32 * a);
    d[2] = div255(d[2] as u32 * inv + mul8(s[2], t.r) as u32 * a);
}

#[inline]
fn px_add(d: &mut [u8], s: [u8; 4]) {
    d[0] = clamp_add(d[0] as u32 + mul8(s[0], s[3]) as u32);
    d[1] = clamp_add(d[1] as u32 + mul8(s[1], s[3]) as u32);
    d[2] = clamp_add(d[2] as u32 + mul8(s[2], s[3]) as u32);
}

#[inline]
fn px_add_tinted(d: &mut [u8], s: [u8; 4], t: Color) {
    let a = mul8(s[3], t.a);
    d[0] = clamp_add(d[0] as u32 + mul8(mul8(s[0], t.b), a) as u32);
    d[1] = clamp_add(d[1] as u32 + mul8(mul8(s[1], t.g), a) as u32);
    d[2] = clamp_add(d[2] as u32 + mul8(mul8(s[2], t.r), a) as u32);
}

#[inline]
fn px_multiply(d: &mut [u8], s: [u8; 4]) {
    d[0] = mul8(d[0], s[0]);
    d[1] = mul8(d[1], s[1]);
    d[2] = mul8(d[2], s[2]);
}

#[inline]
fn px_multiply_tinted(d: &mut [u8], s: [u8; 4], t: Color) {
    d[0] = mul8(d[0], mul8(s[0], t.b));
    d[1] = mul8(d[1], mul8(s[1], t.g));
    d[2] = mul8(d[2], mul8(s[2], t.r));
}

#[inline]
fn px_invert(d: &mut [u8], s: [u8; 4]) {
    for i in 0..3 {
        let sv = s[i] as u32;
        let dv = d[i] as u32;
        d[i] = div255(sv * (255 - dv) + dv * (255 - sv));
    }
}

#[inline]
fn px_invert_tinted(d: &mut [u8], s: [u8; 4], t: Color) {
    let st = [mul8(s[0], t.b), mul8(s[1], t.g), mul8(s[2], t.r), s[3]];
    px_invert(d, st);
}

// ----------------------------------------------------------------------
// Plain blit
// ----------------------------------------------------------------------

/// Walk `src_rect` and the destination region pixel by pixel. Both
/// rects must be pre-clipped to their surfaces.
fn for_each_blit_pixel(
    dst: &mut SoftSurface,
    src: &SoftSurface,
    src_rect: Rect,
    dest: Coord,
    mut op: impl FnMut(&mut [u8], [u8; 4]),
) {
    let src_bpp = src.pixel_bytes();
    let dst_bpp = dst.pixel_bytes();
    let src_pitch = src.pitch();
    let dst_pitch = dst.pitch();
    let src_start = src.byte_index(src_rect.x, src_rect.y);
    let dst_start = dst.byte_index(dest.x, dest.y);
    let has_alpha = src.pixel_format().has_alpha();

    let src_data = src.pixels();
    let dst_data = dst.pixels_mut();

    for row in 0..src_rect.h as usize {
        let s_row = &src_data[src_start + row * src_pitch..][..src_rect.w as usize * src_bpp];
        let d_row = &mut dst_data[dst_start + row * dst_pitch..][..src_rect.w as usize * dst_bpp];
        for (s, d) in s_row.chunks_exact(src_bpp).zip(d_row.chunks_exact_mut(dst_bpp)) {
            let a = if has_alpha { s[3] } else { 255 };
            op(d, [s[0], s[1], s[2], a]);
        }
    }
}

/// Pixel-exact composite of `src_rect` from `src` at `dest`. Caller has
/// already clipped both rects.
pub(crate) fn blit_rows(
    dst: &mut SoftSurface,
    src: &SoftSurface,
    src_rect: Rect,
    dest: Coord,
    tint: Color,
    mode: BlendMode,
) {
    if src_rect.is_empty() {
        return;
    }

    let mut mode = mode;
    if mode == BlendMode::Blend && !src.pixel_format().has_alpha() && tint.a == 255 {
        mode = BlendMode::Opaque;
    }
    let write_alpha = dst.pixel_format().has_alpha();

    match (mode, tint.is_opaque_white()) {
        (BlendMode::Opaque, true) => for_each_blit_pixel(dst, src, src_rect, dest, |d, s| {
            d[0] = s[0];
            d[1] = s[1];
            d[2] = s[2];
            if write_alpha {
                d[3] = s[3];
            }
        }),
        (BlendMode::Opaque, false) => for_each_blit_pixel(dst, src, src_rect, dest, |d, s| {
            d[0] = mul8(s[0], tint.b);
            d[1] = mul8(s[1], tint.g);
            d[2] = mul8(s[2], tint.r);
            if write_alpha {
                d[3] = mul8(s[3], tint.a);
            }
        }),
        (BlendMode::Blend, true) => for_each_blit_pixel(dst, src, src_rect, dest, px_blend),
        (BlendMode::Blend, false) => {
            for_each_blit_pixel(dst, src, src_rect, dest, |d, s| px_blend_tinted(d, s, tint));
        }
        (BlendMode::Add, true) => for_each_blit_pixel(dst, src, src_rect, dest, px_add),
        (BlendMode::Add, false) => {
            for_each_blit_pixel(dst, src, src_rect, dest, |d, s| px_add_tinted(d, s, tint));
        }
        (BlendMode::Multiply, true) => for_each_blit_pixel(dst, src, src_rect, dest, px_multiply),
        (BlendMode::Multiply, false) => {
            for_each_blit_pixel(dst, src, src_rect, dest, |d, s| px_multiply_tinted(d, s, tint));
        }
        (BlendMode::Invert, true) => for_each_blit_pixel(dst, src, src_rect, dest, px_invert),
        (BlendMode::Invert, false) => {
            for_each_blit_pixel(dst, src, src_rect, dest, |d, s| px_invert_tinted(d, s, tint));
        }
    }
}

// ----------------------------------------------------------------------
// Stretch blit
// ----------------------------------------------------------------------

#[inline]
fn sample_nearest(src: &SoftSurface, ofs_x: i32, ofs_y: i32) -> [u8; 4] {
    let x = (ofs_x >> BILINEAR_FRAC_BITS).clamp(0, src.width() - 1);
    let y = (ofs_y >> BILINEAR_FRAC_BITS).clamp(0, src.height() - 1);
    src.read_bgra(x, y)
}

#[inline]
fn sample_bilinear(src: &SoftSurface, ofs_x: i32, ofs_y: i32) -> [u8; 4] {
    let fx2 = (ofs_x & (FRAC_ONE - 1)) as u32;
    let fy2 = (ofs_y & (FRAC_ONE - 1)) as u32;
    let fx1 = FRAC_ONE as u32 - fx2;
    let fy1 = FRAC_ONE as u32 - fy2;

    let w = src.width();
    let h = src.height();
    let x0 = (ofs_x >> BILINEAR_FRAC_BITS).clamp(0, w - 1);
    let y0 = (ofs_y >> BILINEAR_FRAC_BITS).clamp(0, h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);

    let m11 = fx1 * fy1 >> BILINEAR_FRAC_BITS;
    let m12 = fx2 * fy1 >> BILINEAR_FRAC_BITS;
    let m21 = fx1 * fy2 >> BILINEAR_FRAC_BITS;
    let m22 = fx2 * fy2 >> BILINEAR_FRAC_BITS;

    let p11 = src.read_bgra(x0, y0);
    let p12 = src.read_bgra(x1, y0);
    let p21 = src.read_bgra(x0, y1);
    let p22 = src.read_bgra(x1, y1);

    let mut out = [0u8; 4];
    for c in 0..4 {
        out[c] = ((p11[c] as u32 * m11
            + p12[c] as u32 * m12
            + p21[c] as u32 * m21
            + p22[c] as u32 * m22)
            >> BILINEAR_FRAC_BITS) as u8;
    }
    out
}

/// Resample the fractional source window into the destination rect,
/// handing each destination pixel its sampled source color.
fn for_each_stretch_pixel(
    dst: &mut SoftSurface,
    src: &SoftSurface,
    sx: f32,
    sy: f32,
    sw: f32,
    sh: f32,
    dx: i32,
    dy: i32,
    dw: i32,
    dh: i32,
    mut op: impl FnMut(&mut [u8], [u8; 4]),
) {
    let bilinear = src.scale_mode() == ScaleMode::Interpolate;
    let bpp = dst.pixel_bytes();
    let pitch = dst.pitch();

    let inc_x = (sw * FRAC_ONE as f32 / dw as f32) as i32;
    let inc_y = (sh * FRAC_ONE as f32 / dh as f32) as i32;
    let ofs_x0 = (sx * FRAC_ONE as f32) as i32;
    let mut ofs_y = (sy * FRAC_ONE as f32) as i32;

    let dst_start = dst.byte_index(dx, dy);
    let dst_data = dst.pixels_mut();

    for y in 0..dh as usize {
        let mut ofs_x = ofs_x0;
        let row = &mut dst_data[dst_start + y * pitch..][..dw as usize * bpp];
        for px in row.chunks_exact_mut(bpp) {
            let s = if bilinear {
                sample_bilinear(src, ofs_x, ofs_y)
            } else {
                sample_nearest(src, ofs_x, ofs_y)
            };
            op(px, s);
            ofs_x += inc_x;
        }
        ofs_y += inc_y;
    }
}

/// Stretch-blit the source window into the destination rect. Caller has
/// clipped the destination rect and adjusted the source window to match.
pub(crate) fn stretch_rows(
    dst: &mut SoftSurface,
    src: &SoftSurface,
    sx: f32,
    sy: f32,
    sw: f32,
    sh: f32,
    dx: i32,
    dy: i32,
    dw: i32,
    dh: i32,
    tint: Color,
    mode: BlendMode,
) {
    if dw <= 0 || dh <= 0 || sw <= 0.0 || sh <= 0.0 {
        return;
    }

    let mut mode = mode;
    if mode == BlendMode::Blend && !src.pixel_format().has_alpha() && tint.a == 255 {
        mode = BlendMode::Opaque;
    }
    let write_alpha = dst.pixel_format().has_alpha();

    match (mode, tint.is_opaque_white()) {
        (BlendMode::Opaque, true) => {
            for_each_stretch_pixel(dst, src, sx, sy, sw, sh, dx, dy, dw, dh, |d, s| {
                d[0] = s[0];
                d[1] = s[1];
                d[2] = s[2];
                if write_alpha {
                    d[3] = s[3];
                }
            });
        }
        (BlendMode::Opaque, false) => {
            for_each_stretch_pixel(dst, src, sx, sy, sw, sh, dx, dy, dw, dh, |d, s| {
                d[0] = mul8(s[0], tint.b);
                d[1] = mul8(s[1], tint.g);
                d[2] = mul8(s[2], tint.r);
                if write_alpha {
                    d[3] = mul8(s[3], tint.a);
                }
            });
        }
        (BlendMode::Blend, true) => {
            for_each_stretch_pixel(dst, src, sx, sy, sw, sh, dx, dy, dw, dh, px_blend);
        }
        (BlendMode::Blend, false) => {
            for_each_stretch_pixel(dst, src, sx, sy, sw, sh, dx, dy, dw, dh, |d, s| {
                px_blend_tinted(d, s, tint);
            });
        }
        (BlendMode::Add, true) => {
            for_each_stretch_pixel(dst, src, sx, sy, sw, sh, dx, dy, dw, dh, px_add);
        }
        (BlendMode::Add, false) => {
            for_each_stretch_pixel(dst, src, sx, sy, sw, sh, dx, dy, dw, dh, |d, s| {
                px_add_tinted(d, s, tint);
            });
        }
        (BlendMode::Multiply, true) => {
            for_each_stretch_pixel(dst, src, sx, sy, sw, sh, dx, dy, dw, dh, px_multiply);
        }
        (BlendMode::Multiply, false) => {
            for_each_stretch_pixel(dst, src, sx, sy, sw, sh, dx, dy, dw, dh, |d, s| {
                px_multiply_tinted(d, s, tint);
            });
        }
        (BlendMode::Invert, true) => {
            for_each_stretch_pixel(dst, src, sx, sy, sw, sh, dx, dy, dw, dh, px_invert);
        }
        (BlendMode::Invert, false) => {
            for_each_stretch_pixel(dst, src, sx, sy, sw, sh, dx, dy, dw, dh, |d, s| {
                px_invert_tinted(d, s, tint);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Size;
    use crate::pixfmt::PixelFormatType;

    fn surface(w: i32, h: i32, t: PixelFormatType) -> SoftSurface {
        SoftSurface::new(Size::new(w, h), t).unwrap()
    }

    fn put(s: &mut SoftSurface, x: i32, y: i32, bgra: [u8; 4]) {
        let i = s.byte_index(x, y);
        let n = s.pixel_bytes();
        s.pixels_mut()[i..i + n].copy_from_slice(&bgra[..n]);
    }

    #[test]
    fn test_blit_copies_pixels_exactly() {
        let mut src = surface(2, 2, PixelFormatType::Bgra8);
        put(&mut src, 0, 0, [1, 2, 3, 255]);
        put(&mut src, 1, 1, [4, 5, 6, 255]);

        let mut dst = surface(4, 4, PixelFormatType::Bgra8);
        blit_rows(
            &mut dst,
            &src,
            Rect::new(0, 0, 2, 2),
            Coord::new(1, 1),
            Color::WHITE,
            BlendMode::Opaque,
        );
        assert_eq!(dst.read_bgra(1, 1), [1, 2, 3, 255]);
        assert_eq!(dst.read_bgra(2, 2), [4, 5, 6, 255]);
        assert_eq!(dst.read_bgra(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_blit_blend_uses_source_alpha() {
        let mut src = surface(1, 1, PixelFormatType::Bgra8);
        put(&mut src, 0, 0, [255, 255, 255, 128]);

        let mut dst = surface(1, 1, PixelFormatType::Bgra8);
        blit_rows(
            &mut dst,
            &src,
            Rect::new(0, 0, 1, 1),
            Coord::new(0, 0),
            Color::WHITE,
            BlendMode::Blend,
        );
        // 0 * 127/255 + 255 * 128/255 = 128
        assert_eq!(dst.read_bgra(0, 0)[0], 128);
    }

    #[test]
    fn test_blit_from_bgr_source_promotes_blend_to_opaque() {
        let mut src = surface(1, 1, PixelFormatType::Bgr8);
        put(&mut src, 0, 0, [9, 8, 7, 255]);

        let mut dst = surface(1, 1, PixelFormatType::Bgra8);
        blit_rows(
            &mut dst,
            &src,
            Rect::new(0, 0, 1, 1),
            Coord::new(0, 0),
            Color::WHITE,
            BlendMode::Blend,
        );
        assert_eq!(dst.read_bgra(0, 0), [9, 8, 7, 255]);
    }

    #[test]
    fn test_blit_tint_scales_source() {
        let mut src = surface(1, 1, PixelFormatType::Bgra8);
        put(&mut src, 0, 0, [200, 200, 200, 255]);

        let mut dst = surface(1, 1, PixelFormatType::Bgra8);
        blit_rows(
            &mut dst,
            &src,
            Rect::new(0, 0, 1, 1),
            Coord::new(0, 0),
            Color::new(255, 255, 128, 255),
            BlendMode::Opaque,
        );
        // Blue channel tinted by 128.
        assert_eq!(dst.read_bgra(0, 0)[0], (200 * 128 / 255) as u8);
        assert_eq!(dst.read_bgra(0, 0)[2], 200);
    }

    #[test]
    fn test_stretch_identity_reproduces_source() {
        let mut src = surface(3, 3, PixelFormatType::Bgra8);
        for y in 0..3 {
            for x in 0..3 {
                put(&mut src, x, y, [(x * 40) as u8, (y * 40) as u8, 77, 255]);
            }
        }

        let mut dst = surface(3, 3, PixelFormatType::Bgra8);
        stretch_rows(
            &mut dst, &src, 0.0, 0.0, 3.0, 3.0, 0, 0, 3, 3,
            Color::WHITE,
            BlendMode::Opaque,
        );
        assert_eq!(dst.pixels(), src.pixels());
    }

    #[test]
    fn test_stretch_nearest_upscale_quadrants() {
        let mut src = surface(2, 2, PixelFormatType::Bgra8);
        put(&mut src, 0, 0, [10, 0, 0, 255]);
        put(&mut src, 1, 0, [20, 0, 0, 255]);
        put(&mut src, 0, 1, [30, 0, 0, 255]);
        put(&mut src, 1, 1, [40, 0, 0, 255]);

        let mut dst = surface(4, 4, PixelFormatType::Bgra8);
        stretch_rows(
            &mut dst, &src, 0.0, 0.0, 2.0, 2.0, 0, 0, 4, 4,
            Color::WHITE,
            BlendMode::Opaque,
        );
        assert_eq!(dst.read_bgra(0, 0)[0], 10);
        assert_eq!(dst.read_bgra(1, 1)[0], 10);
        assert_eq!(dst.read_bgra(3, 0)[0], 20);
        assert_eq!(dst.read_bgra(0, 3)[0], 30);
        assert_eq!(dst.read_bgra(3, 3)[0], 40);
    }

    #[test]
    fn test_stretch_bilinear_interpolates_between_texels() {
        let mut src = surface(2, 1, PixelFormatType::Bgra8);
        src.set_scale_mode(ScaleMode::Interpolate);
        put(&mut src, 0, 0, [0, 0, 0, 255]);
        put(&mut src, 1, 0, [200, 0, 0, 255]);

        // Sample halfway between the two texels.
        let mut dst = surface(1, 1, PixelFormatType::Bgra8);
        stretch_rows(
            &mut dst, &src, 0.5, 0.0, 1.0, 1.0, 0, 0, 1, 1,
            Color::WHITE,
            BlendMode::Opaque,
        );
        let v = dst.read_bgra(0, 0)[0];
        assert!(v > 80 && v < 120, "expected midpoint blend, got {}", v);
    }

    #[test]
    fn test_invert_twice_restores_destination() {
        let mut src = surface(1, 1, PixelFormatType::Bgra8);
        put(&mut src, 0, 0, [255, 255, 255, 255]);

        let mut dst = surface(1, 1, PixelFormatType::Bgra8);
        put(&mut dst, 0, 0, [70, 0, 0, 255]);
        for _ in 0..2 {
            blit_rows(
                &mut dst,
                &src,
                Rect::new(0, 0, 1, 1),
                Coord::new(0, 0),
                Color::WHITE,
                BlendMode::Invert,
            );
        }
        assert_eq!(dst.read_bgra(0, 0)[0], 70);
    }
}
