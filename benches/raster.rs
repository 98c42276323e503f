use criterion::{black_box, criterion_group, criterion_main, Criterion};

use softgfx::{
    BlendMode, Color, Coord, GfxDevice, PixelFormatType, Rect, ScaleMode, Size, SoftGfxDevice,
    SoftSurface, WaveLine,
};

fn checker(size: Size) -> SoftSurface {
    let mut s = SoftSurface::new(size, PixelFormatType::Bgra8).unwrap();
    let w = size.w as usize;
    for (i, b) in s.pixels_mut().iter_mut().enumerate() {
        let px = i / 4;
        *b = if (px % w + px / w) % 2 == 0 { 40 } else { 215 };
    }
    s
}

fn bench_fill(c: &mut Criterion) {
    let mut dev = SoftGfxDevice::with_canvas(checker(Size::new(512, 512)));

    c.bench_function("fill_blend_512", |b| {
        b.iter(|| {
            dev.fill(
                black_box(Rect::new(0, 0, 512, 512)),
                black_box(Color::new(200, 80, 40, 128)),
            );
        });
    });

    dev.set_blend_mode(BlendMode::Add).unwrap();
    c.bench_function("fill_add_512", |b| {
        b.iter(|| {
            dev.fill(
                black_box(Rect::new(0, 0, 512, 512)),
                black_box(Color::new(3, 2, 1, 255)),
            );
        });
    });
}

fn bench_blit(c: &mut Criterion) {
    let src = checker(Size::new(256, 256));
    let mut dev = SoftGfxDevice::with_canvas(checker(Size::new(512, 512)));

    c.bench_function("blit_256", |b| {
        b.iter(|| {
            dev.blit(
                black_box(&src),
                black_box(Rect::new(0, 0, 256, 256)),
                black_box(Coord::new(64, 64)),
            );
        });
    });

    c.bench_function("stretch_blit_nearest_256_to_512", |b| {
        b.iter(|| {
            dev.stretch_blit(
                black_box(&src),
                black_box(Rect::new(0, 0, 256, 256)),
                black_box(Rect::new(0, 0, 512, 512)),
            );
        });
    });

    let mut smooth = checker(Size::new(256, 256));
    smooth.set_scale_mode(ScaleMode::Interpolate);
    c.bench_function("stretch_blit_bilinear_256_to_512", |b| {
        b.iter(|| {
            dev.stretch_blit(
                black_box(&smooth),
                black_box(Rect::new(0, 0, 256, 256)),
                black_box(Rect::new(0, 0, 512, 512)),
            );
        });
    });
}

fn bench_wave(c: &mut Criterion) {
    let mut dev = SoftGfxDevice::with_canvas(checker(Size::new(512, 256)));

    let mut top_points = Vec::with_capacity(513);
    let mut bottom_points = Vec::with_capacity(513);
    for i in 0..513i32 {
        let t = i as f32 * 0.05;
        top_points.push(((80.0 + t.sin() * 40.0) * 256.0) as i32);
        bottom_points.push(((180.0 + t.cos() * 30.0) * 256.0) as i32);
    }
    let top = WaveLine {
        points: &top_points,
        thickness: 3.0,
        color: Color::rgb(255, 140, 40),
        hold: 80 * 256,
    };
    let bottom = WaveLine {
        points: &bottom_points,
        thickness: 2.0,
        color: Color::rgb(60, 140, 255),
        hold: 180 * 256,
    };

    c.bench_function("draw_wave_512", |b| {
        b.iter(|| {
            dev.draw_wave(
                black_box(Rect::new(0, 0, 512, 256)),
                black_box(&top),
                black_box(&bottom),
                black_box(Color::new(60, 90, 140, 160)),
                black_box(Color::new(60, 90, 140, 160)),
            );
        });
    });
}

criterion_group!(benches, bench_fill, bench_blit, bench_wave);
criterion_main!(benches);
