//! Software 2D graphics device: a blend/blit/draw pixel pipeline for
//! retained-mode GUI toolkits.
//!
//! The crate centers on the [`GfxDevice`] trait, the capability set a
//! rendering backend exposes to the widget and skin layer: fills, the
//! blit family (plain, stretch, nine-patch, tiled, skin bars),
//! axis-aligned lines, anti-aliased wave bands, segment strips and
//! ellipse rings, each with clip-explicit variants. [`SoftGfxDevice`]
//! is the CPU implementation, compositing straight into a
//! [`SoftSurface`] packed-pixel buffer through table-driven fixed-point
//! arithmetic; GPU backends implement the same trait elsewhere.
//!
//! ```
//! use softgfx::{
//!     BlendMode, Color, GfxDevice, PixelFormatType, Rect, Size, SoftGfxDevice, SoftSurface,
//!     Surface,
//! };
//!
//! let canvas = SoftSurface::new(Size::new(64, 64), PixelFormatType::Bgra8).unwrap();
//! let mut device = SoftGfxDevice::with_canvas(canvas);
//! device.set_blend_mode(BlendMode::Blend).unwrap();
//! device.fill(Rect::new(8, 8, 48, 48), Color::new(255, 80, 0, 200));
//! let pixels = device.canvas().unwrap().pixels();
//! # assert!(pixels.iter().any(|&b| b != 0));
//! ```
//!
//! Drawing is synchronous and single-threaded: a canvas must never be
//! touched by anything else while a device renders into it. The shared
//! lookup tables behind the compositing math are built once per process
//! and read-only afterwards.

pub mod color;
pub mod device;
pub mod geom;
pub mod pixfmt;
pub mod soft;
pub mod surface;
pub mod tables;
pub mod wave;

pub use color::Color;
pub use device::{live_device_count, BlendMode, Flip, GfxDevice, GfxError};
pub use geom::{Border, Coord, Direction, Rect, RectF, Size};
pub use pixfmt::{PixelFormat, PixelFormatType, ScaleMode};
pub use soft::SoftGfxDevice;
pub use surface::{SoftSurface, Surface};
pub use wave::WaveLine;
