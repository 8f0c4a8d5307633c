//! End-to-end overlay workflows through the public API
//!
//! Uses the mock segmentation and generative backends so no model file or
//! network access is needed.

use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use pilgrimage_overlay::{
    fit_cover, overlay_placement, pane_geometry, render_comparison_from_bytes, ActiveTab,
    BoundingBox, CharacterExtractor, ExportKind, ImageGenerator, MaskTensor, MockGenerativeBackend,
    MockSegmentationBackend, OverlayConfig, OverlaySession, OverlayTransform, RenderModeKind,
    Result, SessionStatus, SourceImage,
};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;

const RED: [u8; 4] = [200, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 200, 255];
const EPS: f64 = 1e-6;

fn solid(width: u32, height: u32, color: [u8; 4]) -> SourceImage {
    SourceImage::from_rgba(RgbaImage::from_pixel(width, height, Rgba(color))).unwrap()
}

fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Session with a mask that keeps every screenshot pixel
fn full_mask_session(margin: u32) -> OverlaySession {
    let mask = MaskTensor::new(vec![0.6; 64], vec![1, 1, 8, 8]).unwrap();
    let backend = MockSegmentationBackend::new().with_mask(mask);
    let config = OverlayConfig::builder()
        .pane_height(90)
        .margin(margin)
        .build()
        .unwrap();
    OverlaySession::new(config)
        .unwrap()
        .with_extractor(CharacterExtractor::new(Box::new(backend), 5))
}

fn assert_close(actual: Rgba<u8>, expected: [u8; 4]) {
    for (a, e) in actual.0.iter().zip(expected) {
        assert!(
            (i16::from(*a) - i16::from(e)).abs() <= 1,
            "expected {expected:?}, got {:?}",
            actual.0
        );
    }
}

#[test]
fn test_full_hd_layout_scenario() {
    // 1920x1080 screenshot over a 3840x2160 photo, no margin
    let geometry = pane_geometry(1920.0 / 1080.0, 1080.0, 0.0);
    assert_eq!((geometry.canvas_width, geometry.canvas_height), (1920, 2160));
    assert!((geometry.scale_for(1920) - 1.0).abs() < EPS);
    assert!((geometry.scale_for(3840) - 0.5).abs() < EPS);

    let fit = fit_cover(3840.0, 2160.0, 1920.0, 1080.0);
    assert!((fit.draw_width - 3840.0).abs() < EPS);
    assert!((fit.draw_height - 2160.0).abs() < EPS);
    assert!(fit.offset_x.abs() < EPS && fit.offset_y.abs() < EPS);

    // A centred cut-out at unit scale lands in the middle of the bottom pane
    let transform = OverlayTransform::centered_on(3840, 2160, 1.0);
    let bounds = BoundingBox::new(860, 440, 200, 200);
    let placed = overlay_placement(&transform, &bounds, 1.0, 0.5, &geometry);
    assert!((placed.width - 200.0).abs() < EPS);
    assert!((placed.x - (960.0 - 100.0)).abs() < EPS);
    assert!((placed.y - (1080.0 + 540.0 - 100.0)).abs() < EPS);
}

#[test]
fn test_static_comparison_from_bytes() -> Result<()> {
    let config = OverlayConfig::builder().pane_height(90).margin(10).build()?;
    let frame = render_comparison_from_bytes(
        &png_bytes(160, 90, RED),
        &png_bytes(640, 360, BLUE),
        &config,
    )?;

    assert_eq!(frame.mode, RenderModeKind::StaticPlaceholder);
    assert_eq!(frame.image.dimensions(), (180, 210));
    assert_eq!(*frame.image.get_pixel(2, 2), config.layout.background);
    assert_eq!(*frame.image.get_pixel(90, 55), Rgba(RED));
    assert_eq!(*frame.image.get_pixel(90, 155), Rgba(BLUE));
    Ok(())
}

#[test]
fn test_single_image_shows_upload_hint() -> Result<()> {
    let mut session = full_mask_session(0);
    let frame = session.set_screenshot(solid(160, 90, RED))?;
    assert_eq!(frame.mode, RenderModeKind::UploadingHint);
    assert_eq!(frame.image.dimensions(), (160, 180));
    assert_eq!(*frame.image.get_pixel(80, 45), Rgba(RED));
    Ok(())
}

#[tokio::test]
async fn test_local_overlay_workflow() -> Result<()> {
    let mut session = full_mask_session(0);
    session.set_screenshot(solid(160, 90, RED))?;
    session.set_photo(solid(320, 180, BLUE))?;

    let frame = session.extract().await?;
    assert_eq!(frame.mode, RenderModeKind::LocalOverlay);
    // The whole screenshot survives the mask and covers the bottom pane
    assert_eq!(*frame.image.get_pixel(80, 135), Rgba(RED));

    let cutout = session.cutout().unwrap();
    assert_eq!(cutout.bounds, BoundingBox::full(160, 90));
    assert_eq!(cutout.image.get_pixel(10, 10)[3], 255);
    match session.status() {
        SessionStatus::Extracted { foreground_ratio } => assert_eq!(*foreground_ratio, 1.0),
        other => panic!("unexpected status {other:?}"),
    }

    let frame = session.set_opacity(0.5)?.unwrap();
    assert_close(*frame.image.get_pixel(80, 135), [100, 0, 100, 255]);
    Ok(())
}

#[tokio::test]
async fn test_scale_and_move_overlay() -> Result<()> {
    let mut session = full_mask_session(0);
    session.set_screenshot(solid(160, 90, RED))?;
    session.set_photo(solid(320, 180, BLUE))?;
    session.extract().await?;

    // Half size, moved to the photo's top-left quadrant centre
    session.set_scale(0.5)?;
    let frame = session.set_overlay_center(80.0, 45.0)?.unwrap();
    assert_eq!(*frame.image.get_pixel(40, 90 + 22), Rgba(RED));
    assert_eq!(*frame.image.get_pixel(120, 90 + 70), Rgba(BLUE));

    let composite = session.export_photo_composite()?;
    assert_eq!(composite.image.dimensions(), (320, 180));
    assert_eq!(*composite.image.get_pixel(80, 45), Rgba(RED));
    assert_eq!(*composite.image.get_pixel(240, 135), Rgba(BLUE));
    Ok(())
}

#[tokio::test]
async fn test_ai_and_local_tabs() -> Result<()> {
    let result = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 36, Rgba([9, 9, 9, 255])));
    let backend = MockGenerativeBackend::returning(&result)?;
    let mut session =
        full_mask_session(0).with_generator(ImageGenerator::new(Arc::new(backend.clone())));
    session.set_screenshot(solid(160, 90, RED))?;
    session.set_photo(solid(320, 180, BLUE))?;

    // A generated result alone is shown even while the local tab is active
    let frame = session.generate("test-key").await?;
    assert_eq!(frame.mode, RenderModeKind::AiOverlay);
    assert_eq!(*frame.image.get_pixel(80, 135), Rgba([9, 9, 9, 255]));
    assert_eq!(backend.call_count(), 1);

    session.extract().await?;
    assert_eq!(session.tab(), ActiveTab::Local);
    assert_eq!(session.render()?.mode, RenderModeKind::LocalOverlay);

    let frame = session.set_tab(ActiveTab::Ai)?.unwrap();
    assert_eq!(frame.mode, RenderModeKind::AiOverlay);

    // While the generated result is displayed it is the photo composite
    let composite = session.export_photo_composite()?;
    assert_eq!(composite.image.dimensions(), (64, 36));
    Ok(())
}

#[tokio::test]
async fn test_exports_written_to_disk() -> Result<()> {
    let temp = TempDir::new().unwrap();
    let mut session = full_mask_session(4);
    session.set_screenshot(solid(160, 90, RED))?;
    session.set_photo(solid(320, 180, BLUE))?;
    session.extract().await?;

    let exports = [
        session.export_comparison()?,
        session.export_photo_composite()?,
        session.export_cutout()?,
    ];
    let expected = [
        (ExportKind::Comparison, "comparison", (168, 192)),
        (ExportKind::PhotoComposite, "composite", (320, 180)),
        (ExportKind::Cutout, "cutout", (160, 90)),
    ];

    for (export, (kind, label, dimensions)) in exports.iter().zip(expected) {
        assert_eq!(export.kind, kind);
        let path = export.save_to_dir(temp.path())?;
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(
            name.starts_with(&format!("[pilgrimage-overlay][{label}][")),
            "unexpected file name {name}"
        );
        assert!(name.ends_with("].png"));

        let saved = image::open(&path).unwrap();
        assert_eq!(saved.dimensions(), dimensions);
    }
    Ok(())
}

#[tokio::test]
async fn test_new_screenshot_discards_results() -> Result<()> {
    let result = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([1, 1, 1, 255])));
    let backend = MockGenerativeBackend::returning(&result)?;
    let mut session = full_mask_session(0).with_generator(ImageGenerator::new(Arc::new(backend)));
    session.set_screenshot(solid(160, 90, RED))?;
    session.set_photo(solid(320, 180, BLUE))?;
    session.extract().await?;
    session.generate("key").await?;

    let frame = session.set_screenshot(solid(160, 90, BLUE))?;
    assert_eq!(frame.mode, RenderModeKind::StaticPlaceholder);
    assert!(session.cutout().is_none());
    assert!(session.ai_result().is_none());
    assert_eq!(session.tab(), ActiveTab::Local);
    Ok(())
}
