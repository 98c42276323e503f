//! The software rendering backend: a `GfxDevice` that composites
//! directly into a `SoftSurface` pixel buffer.
//!
//! Geometry is clipped against the active clip list up front, colors are
//! tinted once per call and the blend mode is promoted where cheaper
//! (Blend at effective alpha 255 becomes Opaque), so the span loops in
//! the submodules run without per-pixel decisions. Only the 24- and
//! 32-bit BGR layouts are renderable; anything else is rejected in debug
//! builds and silently skipped in release.

mod blit;
mod raster;
mod segments;

use log::debug;

use crate::color::Color;
use crate::device::{self, flip_frame, BlendMode, Flip, GfxDevice, GfxError};
use crate::geom::{Axis, Coord, Direction, Rect, RectF, Size};
use crate::surface::{SoftSurface, Surface};
use crate::tables;

/// Software pixel-pipeline device.
///
/// The canvas is owned while bound and handed back on swap. Drawing
/// with no canvas bound is a no-op.
pub struct SoftGfxDevice {
    canvas: Option<SoftSurface>,
    canvas_size: Size,
    tint: Color,
    blend_mode: BlendMode,
    clip_rects: Vec<Rect>,
    clip_bounds: Rect,
    rendering: bool,
}

impl SoftGfxDevice {
    /// Device with no canvas bound; drawing no-ops until `set_canvas`.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Device bound to `canvas`.
    pub fn with_canvas(canvas: SoftSurface) -> Self {
        Self::build(Some(canvas))
    }

    fn build(canvas: Option<SoftSurface>) -> Self {
        tables::prime();
        device::register_device();
        let canvas_size = canvas.as_ref().map_or_else(Size::default, |c| c.size());
        let full = Rect::of_size(canvas_size);
        debug!(
            "software device created, canvas {}x{}",
            canvas_size.w, canvas_size.h
        );
        Self {
            canvas,
            canvas_size,
            tint: Color::WHITE,
            blend_mode: BlendMode::default(),
            clip_rects: vec![full],
            clip_bounds: full,
            rendering: false,
        }
    }

    /// The canvas, if bound and in a layout the span loops can write.
    fn target(canvas: &mut Option<SoftSurface>) -> Option<&mut SoftSurface> {
        match canvas {
            Some(c) if c.pixel_format().is_soft_renderable() => Some(c),
            _ => None,
        }
    }

    /// Tint `color` and resolve the effective blend mode, or `None`
    /// when compositing it cannot change the destination.
    fn resolve(&self, color: Color) -> Option<(Color, BlendMode)> {
        let tinted = color * self.tint;
        if tinted.a == 0 && matches!(self.blend_mode, BlendMode::Blend | BlendMode::Add) {
            return None;
        }
        let mut mode = self.blend_mode;
        if mode == BlendMode::Blend && tinted.a == 255 {
            mode = BlendMode::Opaque;
        }
        Some((tinted, mode))
    }
}

impl Default for SoftGfxDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SoftGfxDevice {
    fn drop(&mut self) {
        device::unregister_device();
    }
}

fn fill_clipped(
    surface: &mut SoftSurface,
    clips: &[Rect],
    rect: Rect,
    color: Color,
    mode: BlendMode,
) {
    for clip in clips {
        let r = rect.intersection(clip);
        if !r.is_empty() {
            raster::fill_rect(surface, &r, color, mode);
        }
    }
}

fn fill_clipped_aa(
    surface: &mut SoftSurface,
    clips: &[Rect],
    rect: Rect,
    color: Color,
    mode: BlendMode,
    aa: u32,
) {
    for clip in clips {
        let r = rect.intersection(clip);
        if !r.is_empty() {
            raster::fill_rect_aa(surface, &r, color, mode, aa);
        }
    }
}

impl GfxDevice for SoftGfxDevice {
    type Canvas = SoftSurface;

    fn canvas(&self) -> Option<&SoftSurface> {
        self.canvas.as_ref()
    }

    fn set_canvas(&mut self, canvas: Option<SoftSurface>) -> Option<SoftSurface> {
        if let Some(c) = &canvas {
            debug_assert!(
                c.pixel_format().is_soft_renderable(),
                "canvas layout not renderable by the software engine"
            );
        }
        let prev = std::mem::replace(&mut self.canvas, canvas);
        self.canvas_size = self
            .canvas
            .as_ref()
            .map_or_else(Size::default, |c| c.size());
        debug!(
            "canvas swapped, now {}x{}",
            self.canvas_size.w, self.canvas_size.h
        );
        self.clear_clip_list();
        prev
    }

    fn canvas_size(&self) -> Size {
        self.canvas_size
    }

    fn tint_color(&self) -> Color {
        self.tint
    }

    fn set_tint_color(&mut self, color: Color) {
        self.tint = color;
    }

    fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    fn set_blend_mode(&mut self, mode: BlendMode) -> Result<(), GfxError> {
        self.blend_mode = mode;
        Ok(())
    }

    fn clip_list(&self) -> &[Rect] {
        &self.clip_rects
    }

    fn set_clip_list(&mut self, rects: &[Rect]) -> Result<(), GfxError> {
        let full = Rect::of_size(self.canvas_size);
        if rects.is_empty() {
            self.clip_rects = vec![full];
            self.clip_bounds = full;
            return Ok(());
        }

        let mut bounds = rects[0];
        for r in &rects[1..] {
            bounds = bounds.grown_to_contain(r);
        }
        if !full.contains_rect(&bounds) {
            log::warn!("clip list bounding box {:?} leaves the canvas; rejected", bounds);
            return Err(GfxError::ClipOutOfBounds);
        }

        self.clip_rects = rects.to_vec();
        self.clip_bounds = bounds;
        Ok(())
    }

    fn clear_clip_list(&mut self) {
        let full = Rect::of_size(self.canvas_size);
        self.clip_rects = vec![full];
        self.clip_bounds = full;
    }

    fn clip_bounds(&self) -> Rect {
        self.clip_bounds
    }

    fn begin_render(&mut self) -> Result<(), GfxError> {
        if self.rendering {
            return Err(GfxError::RenderStateMismatch);
        }
        self.rendering = true;
        Ok(())
    }

    fn end_render(&mut self) -> Result<(), GfxError> {
        if !self.rendering {
            return Err(GfxError::RenderStateMismatch);
        }
        self.rendering = false;
        Ok(())
    }

    fn fill(&mut self, rect: Rect, color: Color) {
        let Some((tinted, mode)) = self.resolve(color) else {
            return;
        };
        let Some(surface) = Self::target(&mut self.canvas) else {
            return;
        };
        fill_clipped(surface, &self.clip_rects, rect, tinted, mode);
    }

    fn fill_sub_pixel(&mut self, rect: RectF, color: Color) {
        let Some((tinted, mode)) = self.resolve(color) else {
            return;
        };

        // Interior rounded to the fully covered pixels.
        let x1 = (rect.x + 0.999) as i32;
        let y1 = (rect.y + 0.999) as i32;
        let x2 = (rect.x + rect.w) as i32;
        let y2 = (rect.y + rect.h) as i32;

        self.fill(Rect::new(x1, y1, x2 - x1, y2 - y1), color);

        // Coverage of the fractional edge strips, 0..255.
        let aa_left = (256 - (rect.x * 256.0) as i32) & 0xFF;
        let aa_top = (256 - (rect.y * 256.0) as i32) & 0xFF;
        let aa_right = ((rect.x + rect.w) * 256.0) as i32 & 0xFF;
        let aa_bottom = ((rect.y + rect.h) * 256.0) as i32 & 0xFF;

        let left = rect.x as i32;
        let top = rect.y as i32;

        let Some(surface) = Self::target(&mut self.canvas) else {
            return;
        };
        let clips = &self.clip_rects;

        if aa_top != 0 {
            fill_clipped_aa(surface, clips, Rect::new(x1, top, x2 - x1, 1), tinted, mode, aa_top as u32);
        }
        if aa_bottom != 0 {
            fill_clipped_aa(surface, clips, Rect::new(x1, y2, x2 - x1, 1), tinted, mode, aa_bottom as u32);
        }
        if aa_left != 0 {
            fill_clipped_aa(surface, clips, Rect::new(left, y1, 1, y2 - y1), tinted, mode, aa_left as u32);
        }
        if aa_right != 0 {
            fill_clipped_aa(surface, clips, Rect::new(x2, y1, 1, y2 - y1), tinted, mode, aa_right as u32);
        }

        // Corner pieces: the product of their two edge coverages.
        let aa_tl = (aa_top * aa_left / 256) as u32;
        let aa_tr = (aa_top * aa_right / 256) as u32;
        let aa_bl = (aa_bottom * aa_left / 256) as u32;
        let aa_br = (aa_bottom * aa_right / 256) as u32;

        if aa_tl != 0 {
            fill_clipped_aa(surface, clips, Rect::new(left, top, 1, 1), tinted, mode, aa_tl);
        }
        if aa_tr != 0 {
            fill_clipped_aa(surface, clips, Rect::new(x2, top, 1, 1), tinted, mode, aa_tr);
        }
        if aa_bl != 0 {
            fill_clipped_aa(surface, clips, Rect::new(left, y2, 1, 1), tinted, mode, aa_bl);
        }
        if aa_br != 0 {
            fill_clipped_aa(surface, clips, Rect::new(x2, y2, 1, 1), tinted, mode, aa_br);
        }
    }

    fn blit(&mut self, src: &SoftSurface, src_rect: Rect, dest: Coord) {
        debug_assert!(
            src.pixel_format().is_soft_renderable(),
            "blit source layout not renderable by the software engine"
        );
        if !src.pixel_format().is_soft_renderable() {
            return;
        }

        let clipped = src_rect.intersection(&Rect::of_size(src.size()));
        if clipped.is_empty() {
            return;
        }
        let dest = Coord::new(dest.x + clipped.x - src_rect.x, dest.y + clipped.y - src_rect.y);
        let dest_rect = Rect::new(dest.x, dest.y, clipped.w, clipped.h);

        let tint = self.tint;
        let mode = self.blend_mode;
        let Some(surface) = Self::target(&mut self.canvas) else {
            return;
        };
        for clip in &self.clip_rects {
            let r = clip.intersection(&dest_rect);
            if r.is_empty() {
                continue;
            }
            let sr = Rect::new(clipped.x + r.x - dest.x, clipped.y + r.y - dest.y, r.w, r.h);
            blit::blit_rows(surface, src, sr, r.pos(), tint, mode);
        }
    }

    fn stretch_blit_sub_pixel(
        &mut self,
        src: &SoftSurface,
        sx: f32,
        sy: f32,
        sw: f32,
        sh: f32,
        dx: i32,
        dy: i32,
        dw: i32,
        dh: i32,
    ) {
        debug_assert!(
            src.pixel_format().is_soft_renderable(),
            "blit source layout not renderable by the software engine"
        );
        if !src.pixel_format().is_soft_renderable() {
            return;
        }
        if dw <= 0 || dh <= 0 || sw <= 0.0 || sh <= 0.0 {
            return;
        }

        let tint = self.tint;
        let mode = self.blend_mode;
        let Some(surface) = Self::target(&mut self.canvas) else {
            return;
        };
        for clip in &self.clip_rects {
            let cx = clip.x.max(dx);
            let cy = clip.y.max(dy);
            let cw = clip.right().min(dx + dw) - cx;
            let ch = clip.bottom().min(dy + dh) - cy;
            if cw <= 0 || ch <= 0 {
                continue;
            }

            // Shrink the source window proportionally to the clipped
            // destination so sampling stays aligned.
            let (mut csx, mut csy, mut csw, mut csh) = (sx, sy, sw, sh);
            if dw > cw {
                let ratio = sw / dw as f32;
                csw = ratio * cw as f32;
                if dx < cx {
                    csx += ratio * (cx - dx) as f32;
                }
            }
            if dh > ch {
                let ratio = sh / dh as f32;
                csh = ratio * ch as f32;
                if dy < cy {
                    csy += ratio * (cy - dy) as f32;
                }
            }
            blit::stretch_rows(surface, src, csx, csy, csw, csh, cx, cy, cw, ch, tint, mode);
        }
    }

    fn draw_line(&mut self, begin: Coord, dir: Direction, length: i32, color: Color, thickness: f32) {
        if length <= 0 || thickness <= 0.0 {
            return;
        }
        let Some((tinted, mode)) = self.resolve(color) else {
            return;
        };

        // Canonical top-left origin, endpoints inclusive.
        let span = length + 1;
        let (x, y, axis) = match dir {
            Direction::Right => (begin.x, begin.y, Axis::Horizontal),
            Direction::Left => (begin.x - length, begin.y, Axis::Horizontal),
            Direction::Down => (begin.x, begin.y, Axis::Vertical),
            Direction::Up => (begin.x, begin.y - length, Axis::Vertical),
        };

        let Some(surface) = Self::target(&mut self.canvas) else {
            return;
        };
        let clips = &self.clip_rects;

        if thickness <= 1.0 {
            // Sub-pixel-thin lines fade instead of disappearing.
            let aa = (thickness * 255.0) as u32;
            let r = match axis {
                Axis::Horizontal => Rect::new(x, y, span, 1),
                Axis::Vertical => Rect::new(x, y, 1, span),
            };
            if aa >= 255 {
                fill_clipped(surface, clips, r, tinted, mode);
            } else if aa > 0 {
                fill_clipped_aa(surface, clips, r, tinted, mode, aa);
            }
            return;
        }

        // Solid band with a feathered line on each side carrying the
        // fractional remainder of the half thickness.
        let expanse = (1.0 + (thickness - 1.0) / 2.0) as i32;
        let edge_aa = (((thickness - 1.0) / 2.0 - (expanse - 1) as f32) * 255.0) as u32;

        let band = match axis {
            Axis::Horizontal => Rect::new(x, y - expanse + 1, span, 2 * expanse - 1),
            Axis::Vertical => Rect::new(x - expanse + 1, y, 2 * expanse - 1, span),
        };
        fill_clipped(surface, clips, band, tinted, mode);

        if edge_aa > 0 {
            let (near, far) = match axis {
                Axis::Horizontal => (
                    Rect::new(x, y - expanse, span, 1),
                    Rect::new(x, y + expanse, span, 1),
                ),
                Axis::Vertical => (
                    Rect::new(x - expanse, y, 1, span),
                    Rect::new(x + expanse, y, 1, span),
                ),
            };
            fill_clipped_aa(surface, clips, near, tinted, mode, edge_aa);
            fill_clipped_aa(surface, clips, far, tinted, mode, edge_aa);
        }
    }

    fn flip_draw_segments(
        &mut self,
        dest: Rect,
        colors: &[Color],
        edge_strips: &[i32],
        strip_pitch: usize,
        flip: Flip,
    ) {
        if dest.is_empty() || colors.is_empty() || strip_pitch == 0 {
            return;
        }
        if edge_strips.len() < strip_pitch * 2 {
            return;
        }

        let frame = flip_frame(&dest, flip);
        let tint = self.tint;
        let tinted: Vec<Color> = colors.iter().map(|c| *c * tint).collect();
        let mode = self.blend_mode;

        let Some(surface) = Self::target(&mut self.canvas) else {
            return;
        };
        for clip in &self.clip_rects {
            let clip = clip.intersection(&dest);
            if clip.is_empty() {
                continue;
            }
            segments::draw_segment_strips(
                surface,
                &frame,
                &clip,
                &tinted,
                edge_strips,
                strip_pitch,
                mode,
            );
        }
    }
}
