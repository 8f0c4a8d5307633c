use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgba, RgbaImage};
use pilgrimage_overlay::{
    apply_mask,
    bounds::{content_bounds_or_full, DEFAULT_PADDING},
    compose_on_photo,
    config::{Captions, LayoutConfig},
    preprocessing::{preprocess, PreprocessingConfig},
    BoundingBox, Compositor, Cutout, MaskTensor, OverlayTransform, RenderMode, SourceImage,
};

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    })
}

fn disc_mask(size: usize) -> MaskTensor {
    let center = size as f32 / 2.0;
    let radius = size as f32 / 3.0;
    let data = (0..size * size)
        .map(|i| {
            let dx = (i % size) as f32 - center;
            let dy = (i / size) as f32 - center;
            if dx.hypot(dy) < radius {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    MaskTensor::new(data, vec![1, 1, size, size]).unwrap()
}

fn cutout_for(screenshot: &RgbaImage) -> Cutout {
    let masked = apply_mask(&DynamicImage::ImageRgba8(screenshot.clone()), &disc_mask(256)).unwrap();
    let bounds = content_bounds_or_full(&masked, DEFAULT_PADDING);
    Cutout {
        image: masked,
        bounds,
    }
}

fn bench_render_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    group.sample_size(20);

    for pane_height in [270u32, 540, 1080] {
        let layout = LayoutConfig {
            pane_height,
            ..LayoutConfig::default()
        };
        let compositor = Compositor::new(layout, Captions::default());
        let screenshot = SourceImage::from_rgba(gradient(1920, 1080)).unwrap();
        let photo = SourceImage::from_rgba(gradient(3000, 2000)).unwrap();
        let cutout = cutout_for(screenshot.pixels());
        let transform = OverlayTransform::centered_on(3000, 2000, 0.8);

        let placeholder = RenderMode::StaticPlaceholder {
            screenshot: &screenshot,
            photo: &photo,
        };
        group.bench_with_input(
            BenchmarkId::new("static_placeholder", pane_height),
            &placeholder,
            |b, mode| b.iter(|| black_box(compositor.render(mode))),
        );

        let overlay = RenderMode::LocalOverlay {
            screenshot: &screenshot,
            photo: &photo,
            cutout: &cutout,
            transform,
        };
        group.bench_with_input(
            BenchmarkId::new("local_overlay", pane_height),
            &overlay,
            |b, mode| b.iter(|| black_box(compositor.render(mode))),
        );
    }

    group.finish();
}

fn bench_photo_composite(c: &mut Criterion) {
    let screenshot = gradient(1920, 1080);
    let photo = SourceImage::from_rgba(gradient(3000, 2000)).unwrap();
    let cutout = cutout_for(&screenshot);
    let mut transform = OverlayTransform::centered_on(3000, 2000, 1.0);
    transform.set_scale(1.3);

    c.bench_function("compose_on_photo", |b| {
        b.iter(|| black_box(compose_on_photo(&photo, Some((&cutout, &transform)), 1920)))
    });
}

fn bench_extraction_stages(c: &mut Criterion) {
    let screenshot = DynamicImage::ImageRgba8(gradient(1920, 1080));
    let config = PreprocessingConfig::isnet_anime();
    let mask = disc_mask(1024);

    c.bench_function("preprocess_1024", |b| {
        b.iter(|| black_box(preprocess(&screenshot, &config).unwrap()))
    });

    c.bench_function("apply_mask_1080p", |b| {
        b.iter(|| black_box(apply_mask(&screenshot, &mask).unwrap()))
    });

    let masked = apply_mask(&screenshot, &mask).unwrap();
    c.bench_function("content_bounds_1080p", |b| {
        b.iter(|| black_box(content_bounds_or_full(&masked, DEFAULT_PADDING)))
    });

    let bounds = BoundingBox::full(1920, 1080);
    c.bench_function("crop_full_1080p", |b| b.iter(|| black_box(bounds.crop(&masked))));
}

criterion_group!(
    benches,
    bench_render_modes,
    bench_photo_composite,
    bench_extraction_stages
);
criterion_main!(benches);
