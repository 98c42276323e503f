//! The `GfxDevice` contract: the capability set every rendering backend
//! implements, plus the compound operations that are backend-independent
//! (nine-patch, tiled and bar blits, wave drawing).
//!
//! A backend supplies the primitive set — fill, blit, stretch-blit,
//! axis-aligned lines, segment strips, ellipses — and inherits the
//! compound operations, which decompose into those primitives exactly
//! like the skin/widget layer expects.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::warn;
use thiserror::Error;

use crate::color::Color;
use crate::geom::{Border, Coord, Direction, Rect, RectF, Size};
use crate::pixfmt::ScaleMode;
use crate::surface::Surface;
use crate::tables;
use crate::wave::{trace_line, Brush, WaveLine};

/// Per-pixel compositing formula.
///
/// `S` is the tinted source, `D` the destination, `a` the effective
/// source alpha:
///
/// - `Opaque`: `D' = S`
/// - `Blend`: `D' = D*(255-a)/255 + S*a/255`
/// - `Add`: `D' = clamp(D + S*a/255)`
/// - `Multiply`: `D' = D*S/255`
/// - `Invert`: `D' = (S*(255-D) + D*(255-S))/255`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    Opaque,
    #[default]
    Blend,
    Add,
    Multiply,
    Invert,
}

/// Orientation applied when rendering waves and segment strips.
///
/// Rotations are clockwise; `FlipX` mirrors columns, `FlipY` mirrors the
/// edge axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flip {
    #[default]
    Normal,
    FlipX,
    FlipY,
    Rot90,
    Rot90FlipX,
    Rot90FlipY,
    Rot180,
    Rot180FlipX,
    Rot180FlipY,
    Rot270,
    Rot270FlipX,
    Rot270FlipY,
}

/// Column/row walking frame for a flipped destination rectangle:
/// `origin` is the canvas position of logical (column 0, row 0),
/// `col_step`/`row_step` are unit steps in canvas space.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FlipFrame {
    pub origin: Coord,
    pub col_step: Coord,
    pub row_step: Coord,
    pub n_cols: i32,
    pub col_len: i32,
}

pub(crate) fn flip_frame(dest: &Rect, flip: Flip) -> FlipFrame {
    let (x, y, w, h) = (dest.x, dest.y, dest.w, dest.h);
    let (origin, col_step, row_step) = match flip {
        Flip::Normal => ((x, y), (1, 0), (0, 1)),
        Flip::FlipX => ((x + w - 1, y), (-1, 0), (0, 1)),
        Flip::FlipY => ((x, y + h - 1), (1, 0), (0, -1)),
        Flip::Rot90 => ((x + w - 1, y), (0, 1), (-1, 0)),
        Flip::Rot90FlipX => ((x, y), (0, 1), (1, 0)),
        Flip::Rot90FlipY => ((x + w - 1, y + h - 1), (0, -1), (-1, 0)),
        Flip::Rot180 => ((x + w - 1, y + h - 1), (-1, 0), (0, -1)),
        Flip::Rot180FlipX => ((x, y + h - 1), (1, 0), (0, -1)),
        Flip::Rot180FlipY => ((x + w - 1, y), (-1, 0), (0, 1)),
        Flip::Rot270 => ((x, y + h - 1), (0, -1), (1, 0)),
        Flip::Rot270FlipX => ((x + w - 1, y + h - 1), (0, -1), (-1, 0)),
        Flip::Rot270FlipY => ((x, y), (0, 1), (1, 0)),
    };
    let horizontal = col_step.1 == 0;
    FlipFrame {
        origin: Coord::new(origin.0, origin.1),
        col_step: Coord::new(col_step.0, col_step.1),
        row_step: Coord::new(row_step.0, row_step.1),
        n_cols: if horizontal { w } else { h },
        col_len: if horizontal { h } else { w },
    }
}

/// Configuration failures. Drawing itself never errors: degenerate
/// geometry is a valid "nothing to draw" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GfxError {
    #[error("clip rectangle list extends outside the canvas")]
    ClipOutOfBounds,
    #[error("blend mode not supported by this backend")]
    UnsupportedBlendMode,
    #[error("begin_render/end_render calls are not paired")]
    RenderStateMismatch,
}

static DEVICE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Number of live device instances in the process.
pub fn live_device_count() -> usize {
    DEVICE_COUNT.load(Ordering::Relaxed)
}

pub(crate) fn register_device() {
    DEVICE_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn unregister_device() {
    DEVICE_COUNT.fetch_sub(1, Ordering::Relaxed);
}

/// The rendering backend contract.
///
/// State is plain mutable configuration: current canvas, tint color
/// (default opaque white), blend mode (default `Blend`) and a clip
/// rectangle list (default: one rect covering the canvas). The only
/// sequencing rule is that `begin_render`/`end_render` must pair up.
///
/// A canvas must not be touched by anything else while a device draws
/// into it; the device does not enforce this.
pub trait GfxDevice {
    /// The surface type this backend can read from and render into.
    type Canvas: Surface;

    // ------------------------------------------------------------------
    // Canvas management
    // ------------------------------------------------------------------

    fn canvas(&self) -> Option<&Self::Canvas>;

    /// Bind a new canvas (or unbind with `None`), returning the previous
    /// one. Rebinding resets the clip list to the new canvas bounds.
    fn set_canvas(&mut self, canvas: Option<Self::Canvas>) -> Option<Self::Canvas>;

    fn canvas_size(&self) -> Size;

    // ------------------------------------------------------------------
    // Render state
    // ------------------------------------------------------------------

    fn tint_color(&self) -> Color;
    fn set_tint_color(&mut self, color: Color);

    fn blend_mode(&self) -> BlendMode;
    fn set_blend_mode(&mut self, mode: BlendMode) -> Result<(), GfxError>;

    fn clip_list(&self) -> &[Rect];

    /// Replace the clip list. An empty slice resets to the full canvas.
    /// A list whose bounding box leaves the canvas is rejected and the
    /// prior list stays active.
    fn set_clip_list(&mut self, rects: &[Rect]) -> Result<(), GfxError>;

    fn clear_clip_list(&mut self);

    /// Bounding box of the active clip list.
    fn clip_bounds(&self) -> Rect;

    fn begin_render(&mut self) -> Result<(), GfxError>;
    fn end_render(&mut self) -> Result<(), GfxError>;

    // ------------------------------------------------------------------
    // Primitives (backend-specific)
    // ------------------------------------------------------------------

    /// Composite `color` over `rect` clipped by the active clip list.
    fn fill(&mut self, rect: Rect, color: Color);

    /// Fill with sub-pixel boundaries: full-opacity interior, feathered
    /// edges and corners weighted by fractional coverage.
    fn fill_sub_pixel(&mut self, rect: RectF, color: Color);

    /// Pixel-exact composite of `src_rect` from `src` at `dest`.
    fn blit(&mut self, src: &Self::Canvas, src_rect: Rect, dest: Coord);

    /// Resample a fractional source window into an integer destination
    /// rectangle. Sampling is nearest or bilinear depending on the
    /// source's scale mode.
    fn stretch_blit_sub_pixel(
        &mut self,
        src: &Self::Canvas,
        sx: f32,
        sy: f32,
        sw: f32,
        sh: f32,
        dx: i32,
        dy: i32,
        dw: i32,
        dh: i32,
    );

    /// Axis-aligned line. Thickness below one pixel fades the line's
    /// alpha; thicker lines get a solid band with feathered edge rows.
    fn draw_line(&mut self, begin: Coord, dir: Direction, length: i32, color: Color, thickness: f32);

    /// Render vertical segment strips: `colors.len()` segments separated
    /// by `colors.len() - 1` ordered edges per column boundary, edge
    /// values in 24.8 fixed point relative to the destination origin.
    /// `edge_strips` holds `n_cols + 1` strips of `strip_pitch` values.
    fn flip_draw_segments(
        &mut self,
        dest: Rect,
        colors: &[Color],
        edge_strips: &[i32],
        strip_pitch: usize,
        flip: Flip,
    );

    // ------------------------------------------------------------------
    // Clip-explicit variants
    // ------------------------------------------------------------------

    fn clip_fill(&mut self, clip: Rect, rect: Rect, color: Color) {
        with_narrowed_clip(self, clip, |dev| dev.fill(rect, color));
    }

    fn clip_fill_sub_pixel(&mut self, clip: Rect, rect: RectF, color: Color) {
        with_narrowed_clip(self, clip, |dev| dev.fill_sub_pixel(rect, color));
    }

    fn clip_blit(&mut self, clip: Rect, src: &Self::Canvas, src_rect: Rect, dest: Coord) {
        with_narrowed_clip(self, clip, |dev| dev.blit(src, src_rect, dest));
    }

    fn clip_stretch_blit(&mut self, clip: Rect, src: &Self::Canvas, src_rect: Rect, dest_rect: Rect) {
        with_narrowed_clip(self, clip, |dev| dev.stretch_blit(src, src_rect, dest_rect));
    }

    fn clip_draw_line(
        &mut self,
        clip: Rect,
        begin: Coord,
        dir: Direction,
        length: i32,
        color: Color,
        thickness: f32,
    ) {
        with_narrowed_clip(self, clip, |dev| dev.draw_line(begin, dir, length, color, thickness));
    }

    fn clip_draw_segments(
        &mut self,
        clip: Rect,
        dest: Rect,
        colors: &[Color],
        edge_strips: &[i32],
        strip_pitch: usize,
    ) {
        with_narrowed_clip(self, clip, |dev| {
            dev.draw_segments(dest, colors, edge_strips, strip_pitch);
        });
    }

    fn clip_draw_wave(
        &mut self,
        clip: Rect,
        dest: Rect,
        top: &WaveLine<'_>,
        bottom: &WaveLine<'_>,
        front_fill: Color,
        back_fill: Color,
    ) {
        with_narrowed_clip(self, clip, |dev| {
            dev.draw_wave(dest, top, bottom, front_fill, back_fill);
        });
    }

    fn clip_draw_ellipse(
        &mut self,
        clip: Rect,
        canvas: RectF,
        thickness: f32,
        fill: Color,
        outline_thickness: f32,
        outline: Color,
    ) {
        with_narrowed_clip(self, clip, |dev| {
            dev.draw_ellipse(canvas, thickness, fill, outline_thickness, outline);
        });
    }

    fn clip_blit_nine_patch(
        &mut self,
        clip: Rect,
        src: &Self::Canvas,
        src_rect: Rect,
        src_frame: Border,
        dst_rect: Rect,
        dst_frame: Border,
    ) {
        with_narrowed_clip(self, clip, |dev| {
            dev.blit_nine_patch(src, src_rect, src_frame, dst_rect, dst_frame);
        });
    }

    fn clip_tile_blit(&mut self, clip: Rect, src: &Self::Canvas, src_rect: Rect, dest: Rect) {
        with_narrowed_clip(self, clip, |dev| dev.tile_blit(src, src_rect, dest));
    }

    fn clip_blit_horr_bar(
        &mut self,
        clip: Rect,
        src: &Self::Canvas,
        src_rect: Rect,
        borders: Border,
        tile: bool,
        dest: Coord,
        len: i32,
    ) {
        with_narrowed_clip(self, clip, |dev| {
            dev.blit_horr_bar(src, src_rect, borders, tile, dest, len);
        });
    }

    fn clip_blit_vert_bar(
        &mut self,
        clip: Rect,
        src: &Self::Canvas,
        src_rect: Rect,
        borders: Border,
        tile: bool,
        dest: Coord,
        len: i32,
    ) {
        with_narrowed_clip(self, clip, |dev| {
            dev.blit_vert_bar(src, src_rect, borders, tile, dest, len);
        });
    }

    // ------------------------------------------------------------------
    // Compound operations (backend-independent)
    // ------------------------------------------------------------------

    /// Integer-rect stretch blit. Applies the bilinear source window
    /// pre-decrement when magnifying an interpolated source.
    fn stretch_blit(&mut self, src: &Self::Canvas, src_rect: Rect, dest_rect: Rect) {
        let mut sw = src_rect.w as f32;
        let mut sh = src_rect.h as f32;
        if src.scale_mode() == ScaleMode::Interpolate {
            if src_rect.w < dest_rect.w {
                sw -= 1.0;
            }
            if src_rect.h < dest_rect.h {
                sh -= 1.0;
            }
        }
        self.stretch_blit_sub_pixel(
            src,
            src_rect.x as f32,
            src_rect.y as f32,
            sw,
            sh,
            dest_rect.x,
            dest_rect.y,
            dest_rect.w,
            dest_rect.h,
        );
    }

    /// Blit a 3x3-partitioned source: corners 1:1, edges stretched along
    /// one axis, center stretched along both. Zero-area cells on both
    /// sides are skipped; degenerate frames collapse to a plain blit or
    /// stretch blit.
    fn blit_nine_patch(
        &mut self,
        src: &Self::Canvas,
        src_rect: Rect,
        src_frame: Border,
        dst_rect: Rect,
        dst_frame: Border,
    ) {
        if src_rect.w == dst_rect.w && src_rect.h == dst_rect.h && src_frame == dst_frame {
            self.blit(src, src_rect, dst_rect.pos());
            return;
        }
        if src_frame.is_empty() || dst_frame.is_empty() {
            self.stretch_blit(src, src_rect, dst_rect);
            return;
        }

        let src_mid = Size::new(
            src_rect.w - src_frame.left - src_frame.right,
            src_rect.h - src_frame.top - src_frame.bottom,
        );
        let dst_mid = Size::new(
            dst_rect.w - dst_frame.left - dst_frame.right,
            dst_rect.h - dst_frame.top - dst_frame.bottom,
        );

        if src_frame.top + dst_frame.top > 0 {
            let src_nw = Rect::new(src_rect.x, src_rect.y, src_frame.left, src_frame.top);
            let src_n = Rect::new(src_rect.x + src_frame.left, src_rect.y, src_mid.w, src_frame.top);
            let src_ne = Rect::new(
                src_rect.x + src_rect.w - src_frame.right,
                src_rect.y,
                src_frame.right,
                src_frame.top,
            );

            let dst_nw = Rect::new(dst_rect.x, dst_rect.y, dst_frame.left, dst_frame.top);
            let dst_n = Rect::new(dst_rect.x + dst_frame.left, dst_rect.y, dst_mid.w, dst_frame.top);
            let dst_ne = Rect::new(
                dst_rect.x + dst_rect.w - dst_frame.right,
                dst_rect.y,
                dst_frame.right,
                dst_frame.top,
            );

            if src_nw.w + dst_nw.w > 0 {
                self.stretch_blit(src, src_nw, dst_nw);
            }
            if src_n.w + dst_n.w > 0 {
                self.stretch_blit(src, src_n, dst_n);
            }
            if src_ne.w + dst_ne.w > 0 {
                self.stretch_blit(src, src_ne, dst_ne);
            }
        }

        if src_mid.h > 0 && dst_mid.h > 0 {
            let src_w = Rect::new(src_rect.x, src_rect.y + src_frame.top, src_frame.left, src_mid.h);
            let src_c = Rect::new(
                src_rect.x + src_frame.left,
                src_rect.y + src_frame.top,
                src_mid.w,
                src_mid.h,
            );
            let src_e = Rect::new(
                src_rect.x + src_rect.w - src_frame.right,
                src_rect.y + src_frame.top,
                src_frame.right,
                src_mid.h,
            );

            let dst_w = Rect::new(dst_rect.x, dst_rect.y + dst_frame.top, dst_frame.left, dst_mid.h);
            let dst_c = Rect::new(
                dst_rect.x + dst_frame.left,
                dst_rect.y + dst_frame.top,
                dst_mid.w,
                dst_mid.h,
            );
            let dst_e = Rect::new(
                dst_rect.x + dst_rect.w - dst_frame.right,
                dst_rect.y + dst_frame.top,
                dst_frame.right,
                dst_mid.h,
            );

            if src_w.w + dst_w.w > 0 {
                self.stretch_blit(src, src_w, dst_w);
            }
            if src_c.w + dst_c.w > 0 {
                self.stretch_blit(src, src_c, dst_c);
            }
            if src_e.w + dst_e.w > 0 {
                self.stretch_blit(src, src_e, dst_e);
            }
        }

        if src_frame.bottom + dst_frame.bottom > 0 {
            let src_sw = Rect::new(
                src_rect.x,
                src_rect.y + src_rect.h - src_frame.bottom,
                src_frame.left,
                src_frame.bottom,
            );
            let src_s = Rect::new(
                src_rect.x + src_frame.left,
                src_rect.y + src_rect.h - src_frame.bottom,
                src_mid.w,
                src_frame.bottom,
            );
            let src_se = Rect::new(
                src_rect.x + src_rect.w - src_frame.right,
                src_rect.y + src_rect.h - src_frame.bottom,
                src_frame.right,
                src_frame.bottom,
            );

            let dst_sw = Rect::new(
                dst_rect.x,
                dst_rect.y + dst_rect.h - dst_frame.bottom,
                dst_frame.left,
                dst_frame.bottom,
            );
            let dst_s = Rect::new(
                dst_rect.x + dst_frame.left,
                dst_rect.y + dst_rect.h - dst_frame.bottom,
                dst_mid.w,
                dst_frame.bottom,
            );
            let dst_se = Rect::new(
                dst_rect.x + dst_rect.w - dst_frame.right,
                dst_rect.y + dst_rect.h - dst_frame.bottom,
                dst_frame.right,
                dst_frame.bottom,
            );

            if src_sw.w + dst_sw.w > 0 {
                self.stretch_blit(src, src_sw, dst_sw);
            }
            if src_s.w + dst_s.w > 0 {
                self.stretch_blit(src, src_s, dst_s);
            }
            if src_se.w + dst_se.w > 0 {
                self.stretch_blit(src, src_se, dst_se);
            }
        }
    }

    /// Repeat `src_rect` across `dest`, cropping the final partial tiles.
    fn tile_blit(&mut self, src: &Self::Canvas, src_rect: Rect, dest: Rect) {
        if src_rect.is_empty() || dest.is_empty() {
            return;
        }
        let mut y = 0;
        while y < dest.h {
            let th = src_rect.h.min(dest.h - y);
            let mut x = 0;
            while x < dest.w {
                let tw = src_rect.w.min(dest.w - x);
                self.blit(
                    src,
                    Rect::new(src_rect.x, src_rect.y, tw, th),
                    Coord::new(dest.x + x, dest.y + y),
                );
                x += src_rect.w;
            }
            y += src_rect.h;
        }
    }

    /// Horizontal skin bar: fixed left/right caps, middle either tiled
    /// or stretched to cover `len` pixels.
    fn blit_horr_bar(
        &mut self,
        src: &Self::Canvas,
        src_rect: Rect,
        borders: Border,
        tile: bool,
        dest: Coord,
        len: i32,
    ) {
        let mut dest = dest;
        let mut len = len;

        // Left cap
        let mut r = Rect::new(src_rect.x, src_rect.y, borders.left, src_rect.h);
        self.blit(src, r, dest);

        len -= borders.width();
        dest.x += borders.left;

        // Middle
        r.x += borders.left;
        r.w = src_rect.w - borders.width();

        if len > 0 && r.w > 0 {
            if tile {
                self.tile_blit(src, r, Rect::new(dest.x, dest.y, len, r.h));
            } else {
                self.stretch_blit(src, r, Rect::new(dest.x, dest.y, len, r.h));
            }
        }
        dest.x += len.max(0);

        // Right cap
        r.x = src_rect.x + src_rect.w - borders.right;
        r.w = borders.right;
        self.blit(src, r, dest);
    }

    /// Vertical skin bar: fixed top/bottom caps, middle tiled or
    /// stretched to cover `len` pixels.
    fn blit_vert_bar(
        &mut self,
        src: &Self::Canvas,
        src_rect: Rect,
        borders: Border,
        tile: bool,
        dest: Coord,
        len: i32,
    ) {
        let mut dest = dest;
        let mut len = len;

        // Top cap
        let mut r = Rect::new(src_rect.x, src_rect.y, src_rect.w, borders.top);
        self.blit(src, r, dest);

        len -= borders.height();
        dest.y += borders.top;

        // Middle
        r.y += borders.top;
        r.h = src_rect.h - borders.height();

        if len > 0 && r.h > 0 {
            if tile {
                self.tile_blit(src, r, Rect::new(dest.x, dest.y, r.w, len));
            } else {
                self.stretch_blit(src, r, Rect::new(dest.x, dest.y, r.w, len));
            }
        }
        dest.y += len.max(0);

        // Bottom cap
        r.y = src_rect.y + src_rect.h - borders.bottom;
        r.h = borders.bottom;
        self.blit(src, r, dest);
    }

    fn draw_segments(&mut self, dest: Rect, colors: &[Color], edge_strips: &[i32], strip_pitch: usize) {
        self.flip_draw_segments(dest, colors, edge_strips, strip_pitch, Flip::Normal);
    }

    /// Filled wave band between two traced border lines.
    fn draw_wave(
        &mut self,
        dest: Rect,
        top: &WaveLine<'_>,
        bottom: &WaveLine<'_>,
        front_fill: Color,
        back_fill: Color,
    ) {
        self.flip_draw_wave(dest, top, bottom, front_fill, back_fill, Flip::Normal);
    }

    fn flip_draw_wave(
        &mut self,
        dest: Rect,
        top: &WaveLine<'_>,
        bottom: &WaveLine<'_>,
        front_fill: Color,
        back_fill: Color,
        flip: Flip,
    ) {
        let bounds = self.clip_bounds().intersection(&dest);
        if bounds.is_empty() {
            return;
        }

        let frame = flip_frame(&dest, flip);
        let horizontal = frame.col_step.y == 0;

        // Trim the trace to the clipped span, keeping a margin of half
        // the thickest line so brushes reaching in from outside still
        // shape the visible envelope.
        let (full_len, mut clip_beg, mut clip_end, length, seg_dest);
        if horizontal {
            full_len = dest.w;
            seg_dest = Rect::new(bounds.x, dest.y, bounds.w, dest.h);
            clip_beg = bounds.x - dest.x;
            clip_end = dest.right() - bounds.right();
            if frame.col_step.x < 0 {
                std::mem::swap(&mut clip_beg, &mut clip_end);
            }
            length = bounds.w;
        } else {
            full_len = dest.h;
            seg_dest = Rect::new(dest.x, bounds.y, dest.w, bounds.h);
            clip_beg = bounds.y - dest.y;
            clip_end = dest.bottom() - bounds.bottom();
            if frame.col_step.y < 0 {
                std::mem::swap(&mut clip_beg, &mut clip_end);
            }
            length = bounds.h;
        }

        let margin = (top.thickness.max(bottom.thickness) / 2.0 + 0.99) as i32;

        let mut trace_ofs = 0;
        let mut trace_len = full_len;
        let mut start_column = clip_beg;
        if clip_beg > margin {
            trace_ofs = clip_beg - margin;
            trace_len -= trace_ofs;
            start_column -= trace_ofs;
        }
        if clip_end > margin {
            trace_len -= clip_end - margin;
        }
        if trace_len <= 0 {
            return;
        }

        let top_brush = Brush::new(top.thickness);
        let bottom_brush = Brush::new(bottom.thickness);
        let top_trace = trace_line(top, &top_brush, (trace_len + 1) as usize, trace_ofs as usize);
        let bottom_trace = trace_line(bottom, &bottom_brush, (trace_len + 1) as usize, trace_ofs as usize);

        let start = start_column as usize;
        let n_strips = length as usize + 1;
        let mut flipped = false;

        if front_fill == back_fill {
            let mut edges = Vec::with_capacity(n_strips * 4);
            for i in start..start + n_strips {
                let (t, b) = if flipped {
                    (bottom_trace[i], top_trace[i])
                } else {
                    (top_trace[i], bottom_trace[i])
                };

                let e0 = t[0];
                let e1 = t[1];
                let mut e2 = b[0];
                let mut e3 = b[1];

                if t[0] > b[0] {
                    flipped = !flipped;
                }

                // Crossing lines must not invert the segment order.
                if e2 < e1 {
                    e2 = e1;
                    if e3 < e2 {
                        e3 = e2;
                    }
                }

                edges.extend_from_slice(&[e0, e1, e2, e3]);
            }

            let colors = [
                Color::TRANSPARENT,
                top.color,
                front_fill,
                bottom.color,
                Color::TRANSPARENT,
            ];
            self.flip_draw_segments(seg_dest, &colors, &edges, 4, flip);
        } else {
            let mut edges = Vec::with_capacity(n_strips * 5);
            let mut mid_follows = 3usize;
            for i in start..start + n_strips {
                let (t, b) = if flipped {
                    (bottom_trace[i], top_trace[i])
                } else {
                    (top_trace[i], bottom_trace[i])
                };

                let mut e = [t[0], t[1], 0, b[0], b[1]];

                if t[0] > b[0] {
                    flipped = !flipped;
                    mid_follows ^= 0x2; // toggles between 1 and 3
                }

                if e[3] < e[1] {
                    e[3] = e[1];
                    if e[4] < e[3] {
                        e[4] = e[3];
                    }
                }
                e[2] = e[mid_follows];

                edges.extend_from_slice(&e);
            }

            let colors = [
                Color::TRANSPARENT,
                top.color,
                front_fill,
                back_fill,
                bottom.color,
                Color::TRANSPARENT,
            ];
            self.flip_draw_segments(seg_dest, &colors, &edges, 5, flip);
        }
    }

    /// Elliptical ring: a band of `thickness` filled with `fill`,
    /// outlined on both sides by `outline_thickness` of `outline`.
    ///
    /// Four concentric edges are traced per column through the curve
    /// table and rendered as segment strips, one pass per half. The
    /// clip list is split at the vertical center scanline so the two
    /// halves clip independently; an off-pixel center carries its 8.8
    /// remainder into both traces.
    fn draw_ellipse(
        &mut self,
        canvas: RectF,
        thickness: f32,
        fill: Color,
        outline_thickness: f32,
        outline: Color,
    ) {
        // Corners and center in 24.8.
        let x1 = (canvas.x * 256.0) as i32;
        let y1 = (canvas.y * 256.0) as i32;
        let x2 = ((canvas.x + canvas.w) * 256.0) as i32;
        let y2 = ((canvas.y + canvas.h) * 256.0) as i32;

        let center = Coord::new((x1 + x2) / 2, (y1 + y2) / 2);

        let outer = Rect::new(
            x1 >> 8,
            y1 >> 8,
            ((x2 + 255) >> 8) - (x1 >> 8),
            ((y2 + 255) >> 8) - (y1 >> 8),
        );

        let clip = self.clip_bounds().intersection(&outer);
        if clip.is_empty() {
            return;
        }
        let clip_left = clip.x - outer.x;

        // Radii of the four concentric edges, outermost first, 24.8.
        let mut radius_x = [0i32; 4];
        let mut radius_y = [0i32; 4];
        radius_x[0] = (x2 - x1) / 2;
        radius_y[0] = (y2 - y1) / 2;
        for i in 1..4 {
            let inset = if i == 2 { thickness } else { outline_thickness };
            radius_x[i] = radius_x[i - 1] - (inset * 256.0) as i32;
            radius_y[i] = radius_y[i - 1] - (inset * 256.0) as i32;
        }

        let sample_points = clip.w as usize + 1;
        let mut upper = vec![0i32; sample_points * 4];
        let mut lower = vec![0i32; sample_points * 4];

        let y_mid = (center.y & !0xFF) - outer.y * 256;
        let y_adjust = center.y & 0xFF;
        let center_ofs = center.x - (outer.x << 8);
        let last = (tables::CURVE_TAB_ENTRIES - 1) as i64;

        for edge in 0..4 {
            // Upper strips keep outermost-first order; lower strips are
            // reversed so every column's edges stay sorted downward.
            let ui = edge;
            let li = 3 - edge;

            if radius_x[edge] <= 0 || radius_y[edge] <= 0 {
                for s in 0..sample_points {
                    upper[s * 4 + ui] = y_mid;
                    lower[s * 4 + li] = y_mid;
                }
                continue;
            }

            let x_start_raw = (center_ofs - radius_x[edge] + 255) >> 8;
            let mut x_start = x_start_raw - clip_left;
            let mut x_mid = (center_ofs >> 8) - clip_left;
            let mut x_end = ((center_ofs + radius_x[edge]) >> 8) - clip_left;

            let curve_inc = (65536i64 * 256 * last) / radius_x[edge] as i64;
            let mut curve_pos =
                (((radius_x[edge] - center_ofs) & 0xFF) as i64 * curve_inc) >> 8;
            if x_start < 0 {
                curve_pos += i64::from(-x_start) * curve_inc;
            }

            let sp = sample_points as i32;
            if x_end >= sp {
                x_end = sp - 1;
                x_start = x_start.min(x_end);
                x_mid = x_mid.min(x_end);
            }

            let mut s = 0i32;
            while s < x_start {
                upper[s as usize * 4 + ui] = y_mid;
                lower[s as usize * 4 + li] = y_mid;
                s += 1;
            }
            while s <= x_mid {
                let hf = tables::curve_from_edge(curve_pos) as i64;
                let h = ((radius_y[edge] as i64 * hf) >> 16) as i32;
                upper[s as usize * 4 + ui] = y_mid + y_adjust - h;
                lower[s as usize * 4 + li] = y_mid + y_adjust + h;
                s += 1;
                curve_pos += curve_inc;
            }
            curve_pos = last * 65536 * 2 - curve_pos;
            while s <= x_end {
                let hf = tables::curve_from_edge(curve_pos) as i64;
                let h = ((radius_y[edge] as i64 * hf) >> 16) as i32;
                upper[s as usize * 4 + ui] = y_mid + y_adjust - h;
                lower[s as usize * 4 + li] = y_mid + y_adjust + h;
                s += 1;
                curve_pos -= curve_inc;
            }
            while s < sp {
                upper[s as usize * 4 + ui] = y_mid;
                lower[s as usize * 4 + li] = y_mid;
                s += 1;
            }

            // The outermost columns cut the curve where it is steepest;
            // extrapolate one column outward from the fractional span so
            // the edge angle survives the pixel grid.
            let pix_frac_left = (x_start_raw << 8) - (center_ofs - radius_x[edge]);
            let pix_frac_right = (center_ofs + radius_x[edge]) & 0xFF;

            if pix_frac_left > 0 && x_start > 0 && x_start < sp {
                let u = upper[x_start as usize * 4 + ui];
                let l = lower[x_start as usize * 4 + li];
                upper[(x_start - 1) as usize * 4 + ui] =
                    u + (y_mid + y_adjust - u) * 256 / pix_frac_left;
                lower[(x_start - 1) as usize * 4 + li] =
                    l + (y_mid + y_adjust - l) * 256 / pix_frac_left;
            }
            if pix_frac_right > 0 && x_end >= 0 && x_end < sp - 1 {
                let u = upper[x_end as usize * 4 + ui];
                let l = lower[x_end as usize * 4 + li];
                upper[(x_end + 1) as usize * 4 + ui] =
                    u + (y_mid + y_adjust - u) * 256 / pix_frac_right;
                lower[(x_end + 1) as usize * 4 + li] =
                    l + (y_mid + y_adjust - l) * 256 / pix_frac_right;
            }
        }

        // Split the clip list at the center scanline so each half clips
        // independently of the other.
        let split = (clip.y + clip.h).min(outer.y + (y_mid >> 8));
        let saved: Vec<Rect> = self.clip_list().to_vec();
        let mut top_clips: Vec<Rect> = Vec::new();
        let mut bottom_clips: Vec<Rect> = Vec::new();
        for r in &saved {
            if r.y < split {
                let mut t = *r;
                if t.bottom() > split {
                    t.h = split - t.y;
                }
                top_clips.push(t);
            }
            if r.bottom() > split {
                let mut b = *r;
                if b.y < split {
                    b.h -= split - b.y;
                    b.y = split;
                }
                bottom_clips.push(b);
            }
        }

        let colors = [
            Color::TRANSPARENT,
            outline,
            fill,
            outline,
            Color::TRANSPARENT,
        ];
        let dest = Rect::new(clip.x, outer.y, clip.w, outer.h);

        if !top_clips.is_empty() && self.set_clip_list(&top_clips).is_ok() {
            self.flip_draw_segments(dest, &colors, &upper, 4, Flip::Normal);
        }
        if !bottom_clips.is_empty() && self.set_clip_list(&bottom_clips).is_ok() {
            self.flip_draw_segments(dest, &colors, &lower, 4, Flip::Normal);
        }
        let _ = self.set_clip_list(&saved);
    }
}

/// Run `body` with the device clip list narrowed by `clip`, restoring
/// the original list afterwards. Does nothing when the narrowed list is
/// empty.
fn with_narrowed_clip<D: GfxDevice + ?Sized>(dev: &mut D, clip: Rect, body: impl FnOnce(&mut D)) {
    let saved: Vec<Rect> = dev.clip_list().to_vec();
    let narrowed: Vec<Rect> = saved
        .iter()
        .map(|r| r.intersection(&clip))
        .filter(|r| !r.is_empty())
        .collect();
    if narrowed.is_empty() {
        return;
    }
    if dev.set_clip_list(&narrowed).is_err() {
        warn!("narrowed clip list rejected; skipping clipped draw");
        return;
    }
    body(dev);
    let _ = dev.set_clip_list(&saved);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_frame_normal() {
        let f = flip_frame(&Rect::new(10, 20, 30, 40), Flip::Normal);
        assert_eq!(f.origin, Coord::new(10, 20));
        assert_eq!(f.col_step, Coord::new(1, 0));
        assert_eq!(f.row_step, Coord::new(0, 1));
        assert_eq!(f.n_cols, 30);
        assert_eq!(f.col_len, 40);
    }

    #[test]
    fn test_flip_frame_rot90_swaps_axes() {
        let f = flip_frame(&Rect::new(0, 0, 30, 40), Flip::Rot90);
        assert_eq!(f.n_cols, 40);
        assert_eq!(f.col_len, 30);
        assert_eq!(f.origin, Coord::new(29, 0));
    }

    #[test]
    fn test_flip_frames_stay_inside_dest() {
        let dest = Rect::new(5, 7, 4, 3);
        for flip in [
            Flip::Normal,
            Flip::FlipX,
            Flip::FlipY,
            Flip::Rot90,
            Flip::Rot90FlipX,
            Flip::Rot90FlipY,
            Flip::Rot180,
            Flip::Rot180FlipX,
            Flip::Rot180FlipY,
            Flip::Rot270,
            Flip::Rot270FlipX,
            Flip::Rot270FlipY,
        ] {
            let f = flip_frame(&dest, flip);
            for c in 0..f.n_cols {
                for r in 0..f.col_len {
                    let x = f.origin.x + c * f.col_step.x + r * f.row_step.x;
                    let y = f.origin.y + c * f.col_step.y + r * f.row_step.y;
                    assert!(dest.contains(Coord::new(x, y)), "{:?} ({},{})", flip, c, r);
                }
            }
        }
    }

    #[test]
    fn test_flip_frames_cover_every_pixel_once() {
        let dest = Rect::new(0, 0, 4, 3);
        for flip in [Flip::Normal, Flip::FlipX, Flip::Rot90, Flip::Rot270FlipY] {
            let f = flip_frame(&dest, flip);
            let mut seen = [[0u8; 4]; 3];
            for c in 0..f.n_cols {
                for r in 0..f.col_len {
                    let x = f.origin.x + c * f.col_step.x + r * f.row_step.x;
                    let y = f.origin.y + c * f.col_step.y + r * f.row_step.y;
                    seen[y as usize][x as usize] += 1;
                }
            }
            assert!(seen.iter().flatten().all(|&n| n == 1), "{:?}", flip);
        }
    }
}
