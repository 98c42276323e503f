//! Segment-strip compositing: the column renderer behind wave bands and
//! ellipses.
//!
//! Each logical column carries an ordered list of edges in 24.8 fixed
//! point, splitting the column into one colored segment per interval.
//! A column's edges are sampled midway between its two boundary strips,
//! clamped so nested edges never invert, and each segment is composited
//! row by row: interior rows in one span fill, the fractional first and
//! last rows with coverage-scaled alpha. The flip frame maps logical
//! columns and rows onto canvas axes, so the same walk renders all 12
//! orientations.

use crate::color::Color;
use crate::device::{BlendMode, FlipFrame};
use crate::geom::{Coord, Rect};
use crate::surface::SoftSurface;

use super::raster;

/// Fraction bits of segment edge positions.
const EDGE_FRAC_BITS: i32 = 8;
const EDGE_ONE: i32 = 1 << EDGE_FRAC_BITS;

/// Rows of one column visible inside `clip`, as a half-open logical row
/// range. `None` when the column misses the clip rect entirely.
fn visible_rows(origin: Coord, row_step: Coord, col_len: i32, clip: &Rect) -> Option<(i32, i32)> {
    let (beg, end);
    if row_step.y != 0 {
        if origin.x < clip.x || origin.x >= clip.right() {
            return None;
        }
        if row_step.y > 0 {
            beg = clip.y - origin.y;
            end = clip.bottom() - origin.y;
        } else {
            beg = origin.y - clip.bottom() + 1;
            end = origin.y - clip.y + 1;
        }
    } else {
        if origin.y < clip.y || origin.y >= clip.bottom() {
            return None;
        }
        if row_step.x > 0 {
            beg = clip.x - origin.x;
            end = clip.right() - origin.x;
        } else {
            beg = origin.x - clip.right() + 1;
            end = origin.x - clip.x + 1;
        }
    }
    let beg = beg.max(0);
    let end = end.min(col_len);
    if beg < end {
        Some((beg, end))
    } else {
        None
    }
}

/// Canvas rect of a run of logical rows `[beg, end)` in one column.
fn run_rect(origin: Coord, row_step: Coord, beg: i32, end: i32) -> Rect {
    let sx = origin.x + beg * row_step.x;
    let sy = origin.y + beg * row_step.y;
    let ex = origin.x + (end - 1) * row_step.x;
    let ey = origin.y + (end - 1) * row_step.y;
    Rect::new(
        sx.min(ex),
        sy.min(ey),
        (sx - ex).abs() + 1,
        (sy - ey).abs() + 1,
    )
}

/// Composite one segment covering `[beg, end)` (24.8 row space) of a
/// column, limited to visible rows `[r0, r1)`.
fn composite_span(
    surface: &mut SoftSurface,
    origin: Coord,
    row_step: Coord,
    r0: i32,
    r1: i32,
    beg: i32,
    end: i32,
    color: Color,
    mode: BlendMode,
) {
    let lo = (beg >> EDGE_FRAC_BITS).max(r0);
    let hi = ((end + EDGE_ONE - 1) >> EDGE_FRAC_BITS).min(r1);
    if lo >= hi {
        return;
    }

    // Rows fully covered by the segment.
    let full_lo = ((beg + EDGE_ONE - 1) >> EDGE_FRAC_BITS).max(r0);
    let full_hi = (end >> EDGE_FRAC_BITS).min(r1);

    let mut r = lo;
    while r < hi {
        if r >= full_lo && r < full_hi {
            raster::fill_rect(surface, &run_rect(origin, row_step, r, full_hi), color, mode);
            r = full_hi;
            continue;
        }
        let cov = (end.min((r + 1) * EDGE_ONE) - beg.max(r * EDGE_ONE)).clamp(0, 255);
        if cov > 0 {
            raster::fill_rect_aa(
                surface,
                &run_rect(origin, row_step, r, r + 1),
                color,
                mode,
                cov as u32,
            );
        }
        r += 1;
    }
}

/// Render segment strips into `surface` through one clip rect.
///
/// `colors` are pre-tinted; `mode` is the device blend mode. `clip`
/// must already lie inside the surface.
pub(crate) fn draw_segment_strips(
    surface: &mut SoftSurface,
    frame: &FlipFrame,
    clip: &Rect,
    colors: &[Color],
    edge_strips: &[i32],
    strip_pitch: usize,
    mode: BlendMode,
) {
    if colors.is_empty() || strip_pitch == 0 {
        return;
    }
    let n_strips = edge_strips.len() / strip_pitch;
    if n_strips < 2 {
        return;
    }
    let n_cols = frame.n_cols.min((n_strips - 1) as i32);
    let n_edges = strip_pitch.min(colors.len() - 1);
    let col_max = frame.col_len * EDGE_ONE;

    let mut edges = vec![0i32; n_edges];

    for col in 0..n_cols {
        let origin = Coord::new(
            frame.origin.x + col * frame.col_step.x,
            frame.origin.y + col * frame.col_step.y,
        );
        let Some((r0, r1)) = visible_rows(origin, frame.row_step, frame.col_len, clip) else {
            continue;
        };

        // Edge positions for this column: midway between its boundary
        // strips, clamped so nested edges never invert.
        let a = &edge_strips[col as usize * strip_pitch..];
        let b = &edge_strips[(col as usize + 1) * strip_pitch..];
        for k in 0..n_edges {
            let mut e = (a[k] + b[k]) / 2;
            if k > 0 && e < edges[k - 1] {
                e = edges[k - 1];
            }
            edges[k] = e;
        }

        for seg in 0..=n_edges {
            let color = if seg < colors.len() {
                colors[seg]
            } else {
                continue;
            };
            if color.a == 0 && matches!(mode, BlendMode::Blend | BlendMode::Add) {
                continue;
            }
            let mut seg_mode = mode;
            if seg_mode == BlendMode::Blend && color.a == 255 {
                seg_mode = BlendMode::Opaque;
            }

            let beg = if seg == 0 {
                0
            } else {
                edges[seg - 1].clamp(0, col_max)
            };
            let end = if seg == n_edges {
                col_max
            } else {
                edges[seg].clamp(0, col_max)
            };
            if end > beg {
                composite_span(surface, origin, frame.row_step, r0, r1, beg, end, color, seg_mode);
            }
        }
    }
}
