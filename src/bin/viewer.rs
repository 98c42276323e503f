//! SDL2 demo window presenting a scene rendered by the software device.
//!
//! Pure presentation glue: everything visible is drawn by
//! `SoftGfxDevice` into a `SoftSurface`, which is then streamed into an
//! SDL texture each frame.

use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;

use softgfx::{
    BlendMode, Border, Color, Coord, Direction, GfxDevice, PixelFormatType, Rect, RectF,
    ScaleMode, Size, SoftGfxDevice, SoftSurface, Surface, WaveLine,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

fn render_scene(device: &mut SoftGfxDevice) -> Result<(), String> {
    device.begin_render().map_err(|e| e.to_string())?;

    // Background wash.
    device.set_blend_mode(BlendMode::Opaque).map_err(|e| e.to_string())?;
    device.fill(Rect::new(0, 0, WIDTH as i32, HEIGHT as i32), Color::rgb(24, 26, 32));

    // Translucent fills in every blend mode.
    let swatches = [
        (BlendMode::Blend, Color::new(230, 90, 40, 180)),
        (BlendMode::Add, Color::new(40, 90, 230, 255)),
        (BlendMode::Multiply, Color::rgb(180, 220, 180)),
        (BlendMode::Invert, Color::rgb(255, 255, 255)),
    ];
    for (i, (mode, color)) in swatches.iter().enumerate() {
        device.set_blend_mode(*mode).map_err(|e| e.to_string())?;
        device.fill(Rect::new(20 + i as i32 * 90, 20, 70, 70), *color);
    }
    device.set_blend_mode(BlendMode::Blend).map_err(|e| e.to_string())?;

    // Sub-pixel fill and thick lines.
    device.fill_sub_pixel(RectF::new(400.5, 24.25, 80.5, 61.5), Color::new(120, 200, 255, 220));
    device.draw_line(Coord::new(20, 120), Direction::Right, 440, Color::rgb(240, 240, 240), 1.0);
    device.draw_line(Coord::new(20, 140), Direction::Right, 440, Color::rgb(240, 200, 60), 4.5);

    // Nine-patch from a procedurally built panel texture.
    let panel = build_panel().ok_or("panel surface allocation failed")?;
    device.blit_nine_patch(
        &panel,
        Rect::new(0, 0, 24, 24),
        Border::uniform(6),
        Rect::new(480, 110, 140, 90),
        Border::uniform(6),
    );

    // Stretched copy of the same texture, bilinear.
    let mut smooth = panel.clone();
    smooth.set_scale_mode(ScaleMode::Interpolate);
    device.stretch_blit(&smooth, Rect::new(0, 0, 24, 24), Rect::new(480, 220, 140, 90));

    // Traced wave band.
    let mut top_points = Vec::with_capacity(601);
    let mut bottom_points = Vec::with_capacity(601);
    for i in 0..601i32 {
        let t = i as f32 * 0.035;
        top_points.push(((60.0 + t.sin() * 30.0) * 256.0) as i32);
        bottom_points.push(((130.0 + (t * 0.7).cos() * 24.0) * 256.0) as i32);
    }
    let top = WaveLine {
        points: &top_points,
        thickness: 3.0,
        color: Color::rgb(255, 120, 40),
        hold: 60 * 256,
    };
    let bottom = WaveLine {
        points: &bottom_points,
        thickness: 2.0,
        color: Color::rgb(80, 160, 255),
        hold: 130 * 256,
    };
    device.draw_wave(
        Rect::new(20, 180, 600, 200),
        &top,
        &bottom,
        Color::new(60, 90, 140, 160),
        Color::new(60, 90, 140, 160),
    );

    // Ellipse ring.
    device.draw_ellipse(
        RectF::new(40.0, 390.0, 80.0, 70.0),
        8.0,
        Color::rgb(90, 200, 120),
        2.0,
        Color::rgb(240, 240, 240),
    );

    device.end_render().map_err(|e| e.to_string())
}

fn build_panel() -> Option<SoftSurface> {
    let surface = SoftSurface::new(Size::new(24, 24), PixelFormatType::Bgra8)?;
    let mut dev = SoftGfxDevice::with_canvas(surface);
    dev.set_blend_mode(BlendMode::Opaque).ok()?;
    dev.fill(Rect::new(0, 0, 24, 24), Color::rgb(70, 74, 90));
    dev.fill(Rect::new(2, 2, 20, 20), Color::rgb(100, 106, 128));
    dev.fill(Rect::new(6, 6, 12, 12), Color::rgb(140, 148, 170));
    dev.set_canvas(None)
}

fn main() -> Result<(), String> {
    let sdl_context = sdl2::init()?;
    let video_subsystem = sdl_context.video()?;

    let window = video_subsystem
        .window("softgfx viewer", WIDTH, HEIGHT)
        .position_centered()
        .build()
        .map_err(|e| e.to_string())?;

    let mut canvas = window
        .into_canvas()
        .accelerated()
        .present_vsync()
        .build()
        .map_err(|e| e.to_string())?;
    let texture_creator = canvas.texture_creator();
    let mut texture = texture_creator
        .create_texture_streaming(PixelFormatEnum::ARGB8888, WIDTH, HEIGHT)
        .map_err(|e| e.to_string())?;
    let mut event_pump = sdl_context.event_pump()?;

    let surface = SoftSurface::new(Size::new(WIDTH as i32, HEIGHT as i32), PixelFormatType::Bgra8)
        .ok_or("canvas allocation failed")?;
    let mut device = SoftGfxDevice::with_canvas(surface);
    render_scene(&mut device)?;

    'running: loop {
        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => break 'running,
                _ => {}
            }
        }

        if let Some(rendered) = device.canvas() {
            texture
                .update(None, rendered.pixels(), rendered.pitch())
                .map_err(|e| e.to_string())?;
        }
        canvas.copy(&texture, None, None)?;
        canvas.present();
    }

    Ok(())
}
