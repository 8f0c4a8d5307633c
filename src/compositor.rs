//! Two-pane render engine
//!
//! The canvas is always screenshot on top, photo on the bottom, separated and
//! framed by `margin` pixels of background. [`RenderMode`] decides what goes
//! into each pane; [`Compositor::render`] is the single dispatch point.

use crate::bounds::BoundingBox;
use crate::config::{Captions, LayoutConfig};
use crate::error::{InputSlot, OverlayError, Result};
use crate::extractor::Extraction;
use crate::geometry::{
    fit_cover_ratio, overlay_placement, pane_geometry, photo_space_placement, OverlayTransform,
    PaneGeometry, Rect, DEFAULT_ASPECT_RATIO,
};
use crate::image_io::{encode_png, SourceImage};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Caption colour (#999999)
pub const CAPTION_COLOR: Rgba<u8> = Rgba([0x99, 0x99, 0x99, 0xFF]);

/// Caption glyph height in canvas pixels
pub const CAPTION_HEIGHT: u32 = 48;

const GLYPH_SIZE: u32 = 8;

/// Largest canvas edge [`Compositor::render`] will allocate
pub const MAX_CANVAS_DIMENSION: u32 = 16_384;

/// Locally extracted character and its padded content box
#[derive(Debug, Clone)]
pub struct Cutout {
    pub image: RgbaImage,
    pub bounds: BoundingBox,
}

impl From<Extraction> for Cutout {
    fn from(extraction: Extraction) -> Self {
        Self {
            image: extraction.cutout,
            bounds: extraction.bounds,
        }
    }
}

/// Which result tab is in front when both results exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveTab {
    #[default]
    Local,
    Ai,
}

/// The single image present while the other slot still waits for an upload
#[derive(Debug, Clone, Copy)]
pub enum HintPane<'a> {
    ScreenshotOnly(&'a SourceImage),
    PhotoOnly(&'a SourceImage),
}

/// What the next frame draws
#[derive(Debug, Clone, Copy)]
pub enum RenderMode<'a> {
    /// One image and an upload caption in the other pane
    UploadingHint(HintPane<'a>),
    /// Both images, no overlay
    StaticPlaceholder {
        screenshot: &'a SourceImage,
        photo: &'a SourceImage,
    },
    /// Both images with the cut-out drawn over the photo
    LocalOverlay {
        screenshot: &'a SourceImage,
        photo: &'a SourceImage,
        cutout: &'a Cutout,
        transform: OverlayTransform,
    },
    /// Screenshot over the generated composite
    AiOverlay {
        screenshot: &'a SourceImage,
        result: &'a SourceImage,
    },
}

/// Discriminant of [`RenderMode`] without the borrowed images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderModeKind {
    UploadingHint,
    StaticPlaceholder,
    LocalOverlay,
    AiOverlay,
}

impl std::fmt::Display for RenderModeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UploadingHint => write!(f, "uploading-hint"),
            Self::StaticPlaceholder => write!(f, "static-placeholder"),
            Self::LocalOverlay => write!(f, "local-overlay"),
            Self::AiOverlay => write!(f, "ai-overlay"),
        }
    }
}

/// Borrowed view of everything that decides the render mode
#[derive(Debug, Clone, Copy, Default)]
pub struct Scene<'a> {
    pub screenshot: Option<&'a SourceImage>,
    pub photo: Option<&'a SourceImage>,
    pub cutout: Option<&'a Cutout>,
    pub transform: OverlayTransform,
    pub ai_result: Option<&'a SourceImage>,
    pub tab: ActiveTab,
}

impl<'a> Scene<'a> {
    /// Resolve the render mode
    ///
    /// With both images present, a single available result is shown
    /// regardless of the tab; the tab only chooses when both exist.
    ///
    /// # Errors
    /// - `MissingInput(Screenshot)` when neither image is present
    pub fn render_mode(&self) -> Result<RenderMode<'a>> {
        let (screenshot, photo) = match (self.screenshot, self.photo) {
            (None, None) => return Err(OverlayError::missing(InputSlot::Screenshot)),
            (Some(screenshot), None) => {
                return Ok(RenderMode::UploadingHint(HintPane::ScreenshotOnly(screenshot)))
            },
            (None, Some(photo)) => return Ok(RenderMode::UploadingHint(HintPane::PhotoOnly(photo))),
            (Some(screenshot), Some(photo)) => (screenshot, photo),
        };

        let local = self.cutout.map(|cutout| RenderMode::LocalOverlay {
            screenshot,
            photo,
            cutout,
            transform: self.transform,
        });
        let ai = self
            .ai_result
            .map(|result| RenderMode::AiOverlay { screenshot, result });

        Ok(match (self.tab, local, ai) {
            (ActiveTab::Ai, _, Some(ai)) | (ActiveTab::Local, None, Some(ai)) => ai,
            (_, Some(local), _) => local,
            (_, None, None) => RenderMode::StaticPlaceholder { screenshot, photo },
        })
    }
}

impl RenderMode<'_> {
    #[must_use]
    pub fn kind(&self) -> RenderModeKind {
        match self {
            Self::UploadingHint(_) => RenderModeKind::UploadingHint,
            Self::StaticPlaceholder { .. } => RenderModeKind::StaticPlaceholder,
            Self::LocalOverlay { .. } => RenderModeKind::LocalOverlay,
            Self::AiOverlay { .. } => RenderModeKind::AiOverlay,
        }
    }

    /// Pane aspect ratio: the screenshot's, or 16:9 before one exists
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        match self {
            Self::UploadingHint(HintPane::PhotoOnly(_)) => DEFAULT_ASPECT_RATIO,
            Self::UploadingHint(HintPane::ScreenshotOnly(screenshot))
            | Self::StaticPlaceholder { screenshot, .. }
            | Self::LocalOverlay { screenshot, .. }
            | Self::AiOverlay { screenshot, .. } => screenshot.aspect_ratio(),
        }
    }
}

/// One rendered canvas
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,
    pub geometry: PaneGeometry,
    pub mode: RenderModeKind,
}

impl Frame {
    /// # Errors
    /// - PNG encoding failure
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.image)
    }
}

/// Stateless renderer over a layout and caption table
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    layout: LayoutConfig,
    captions: Captions,
}

impl Compositor {
    #[must_use]
    pub fn new(layout: LayoutConfig, captions: Captions) -> Self {
        Self { layout, captions }
    }

    #[must_use]
    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn set_layout(&mut self, layout: LayoutConfig) {
        self.layout = layout;
    }

    pub fn set_captions(&mut self, captions: Captions) {
        self.captions = captions;
    }

    /// Pane layout for `mode` under the current layout parameters
    #[must_use]
    pub fn geometry(&self, mode: &RenderMode<'_>) -> PaneGeometry {
        pane_geometry(
            mode.aspect_ratio(),
            f64::from(self.layout.pane_height),
            f64::from(self.layout.margin),
        )
    }

    /// Draw a full frame
    ///
    /// # Errors
    /// - `InvalidConfig` when either canvas edge exceeds [`MAX_CANVAS_DIMENSION`]
    #[instrument(skip_all, fields(mode = %mode.kind()))]
    pub fn render(&self, mode: &RenderMode<'_>) -> Result<Frame> {
        let geometry = self.geometry(mode);
        if geometry.canvas_width > MAX_CANVAS_DIMENSION
            || geometry.canvas_height > MAX_CANVAS_DIMENSION
        {
            return Err(OverlayError::invalid_config(format!(
                "Canvas {}x{} exceeds the {MAX_CANVAS_DIMENSION}px limit; lower the pane height",
                geometry.canvas_width, geometry.canvas_height
            )));
        }
        let mut canvas = RgbaImage::from_pixel(
            geometry.canvas_width.max(1),
            geometry.canvas_height.max(1),
            self.layout.background,
        );
        let full = Rect::new(
            0.0,
            0.0,
            f64::from(canvas.width()),
            f64::from(canvas.height()),
        );

        match *mode {
            RenderMode::UploadingHint(HintPane::ScreenshotOnly(screenshot)) => {
                draw_screenshot(&mut canvas, screenshot, &geometry, &full);
                let (x, y) = geometry.bottom_pane().center();
                draw_caption(&mut canvas, &self.captions.upload_photo, x, y);
            },
            RenderMode::UploadingHint(HintPane::PhotoOnly(photo)) => {
                let (x, y) = geometry.top_pane().center();
                draw_caption(&mut canvas, &self.captions.upload_screenshot, x, y);
                draw_cover(&mut canvas, photo, &geometry, &full);
            },
            RenderMode::StaticPlaceholder { screenshot, photo } => {
                draw_screenshot(&mut canvas, screenshot, &geometry, &full);
                draw_cover(&mut canvas, photo, &geometry, &full);
            },
            RenderMode::LocalOverlay {
                screenshot,
                photo,
                cutout,
                transform,
            } => {
                draw_screenshot(&mut canvas, screenshot, &geometry, &full);
                draw_cover(&mut canvas, photo, &geometry, &full);

                let placement = overlay_placement(
                    &transform,
                    &cutout.bounds,
                    geometry.scale_for(screenshot.width()),
                    geometry.scale_for(photo.width()),
                    &geometry,
                );
                draw_image(
                    &mut canvas,
                    &cutout.image,
                    &bounds_rect(&cutout.bounds),
                    &placement,
                    &geometry.bottom_pane(),
                    transform.opacity,
                );
            },
            RenderMode::AiOverlay { screenshot, result } => {
                draw_screenshot(&mut canvas, screenshot, &geometry, &full);
                draw_cover(&mut canvas, result, &geometry, &full);
            },
        }

        log::debug!(
            "Rendered {} frame at {}x{}",
            mode.kind(),
            canvas.width(),
            canvas.height()
        );
        Ok(Frame {
            image: canvas,
            geometry,
            mode: mode.kind(),
        })
    }
}

/// Photo at natural resolution with the cut-out drawn at its transform
///
/// The cut-out is sized by `bounds * scale * (photo.width / screenshot.width)`
/// and clipped only by the photo edges. Without a cut-out this is the photo.
#[must_use]
pub fn compose_on_photo(
    photo: &SourceImage,
    overlay: Option<(&Cutout, &OverlayTransform)>,
    screenshot_width: u32,
) -> RgbaImage {
    let mut canvas = photo.pixels().clone();
    if let Some((cutout, transform)) = overlay {
        let placement =
            photo_space_placement(transform, &cutout.bounds, screenshot_width, photo.width());
        let clip = Rect::new(
            0.0,
            0.0,
            f64::from(photo.width()),
            f64::from(photo.height()),
        );
        draw_image(
            &mut canvas,
            &cutout.image,
            &bounds_rect(&cutout.bounds),
            &placement,
            &clip,
            transform.opacity,
        );
    }
    canvas
}

fn bounds_rect(bounds: &BoundingBox) -> Rect {
    Rect::new(
        f64::from(bounds.x),
        f64::from(bounds.y),
        f64::from(bounds.width),
        f64::from(bounds.height),
    )
}

fn full_rect(image: &SourceImage) -> Rect {
    Rect::new(0.0, 0.0, f64::from(image.width()), f64::from(image.height()))
}

/// Screenshot stretched into the top pane
fn draw_screenshot(canvas: &mut RgbaImage, screenshot: &SourceImage, geometry: &PaneGeometry, clip: &Rect) {
    draw_image(
        canvas,
        screenshot.pixels(),
        &full_rect(screenshot),
        &geometry.top_pane(),
        clip,
        1.0,
    );
}

/// Image cover-fitted into the bottom pane
fn draw_cover(canvas: &mut RgbaImage, image: &SourceImage, geometry: &PaneGeometry, clip: &Rect) {
    let fit = fit_cover_ratio(
        f64::from(image.width()),
        f64::from(image.height()),
        geometry.aspect_ratio(),
    );
    draw_image(
        canvas,
        image.pixels(),
        &fit.source_rect(),
        &geometry.bottom_pane(),
        clip,
        1.0,
    );
}

/// Draw the `src` region of `source` scaled into `dst`, restricted to `clip`
///
/// A canvas pixel is covered when its centre lies inside both `dst` and
/// `clip`. Samples are bilinear and blended source-over with `alpha`.
pub fn draw_image(
    canvas: &mut RgbaImage,
    source: &RgbaImage,
    src: &Rect,
    dst: &Rect,
    clip: &Rect,
    alpha: f64,
) {
    if alpha <= 0.0 || dst.width <= 0.0 || dst.height <= 0.0 || src.width <= 0.0 || src.height <= 0.0 {
        return;
    }
    let canvas_rect = Rect::new(
        0.0,
        0.0,
        f64::from(canvas.width()),
        f64::from(canvas.height()),
    );
    let Some(area) = dst.intersect(clip).and_then(|r| r.intersect(&canvas_rect)) else {
        return;
    };
    let Some(sampler) = Sampler::new(source, src) else {
        return;
    };

    let scale_x = src.width / dst.width;
    let scale_y = src.height / dst.height;
    let alpha = alpha.min(1.0);

    // Pixels whose centres fall inside the area
    let x_start = (area.x - 0.5).ceil().max(0.0) as u32;
    let x_end = (area.right() - 0.5).ceil().max(0.0) as u32;
    let y_start = (area.y - 0.5).ceil().max(0.0) as u32;
    let y_end = (area.bottom() - 0.5).ceil().max(0.0) as u32;

    for py in y_start..y_end.min(canvas.height()) {
        let v = src.y + (f64::from(py) + 0.5 - dst.y) * scale_y;
        for px in x_start..x_end.min(canvas.width()) {
            let u = src.x + (f64::from(px) + 0.5 - dst.x) * scale_x;
            let sample = sampler.sample(u, v);
            let dst_pixel = canvas.get_pixel_mut(px, py);
            *dst_pixel = blend_pixel(*dst_pixel, sample, alpha);
        }
    }
}

/// Bilinear lookups restricted to a pixel region of the source
struct Sampler<'a> {
    source: &'a RgbaImage,
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl<'a> Sampler<'a> {
    fn new(source: &'a RgbaImage, region: &Rect) -> Option<Self> {
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = (region.right().ceil() - 1.0).min(f64::from(width - 1));
        let max_y = (region.bottom().ceil() - 1.0).min(f64::from(height - 1));
        let min_x = region.x.floor().max(0.0).min(max_x);
        let min_y = region.y.floor().max(0.0).min(max_y);
        (max_x >= 0.0 && max_y >= 0.0).then_some(Self {
            source,
            min_x,
            max_x,
            min_y,
            max_y,
        })
    }

    /// Sample at continuous source coordinates (pixel centres at +0.5)
    ///
    /// Colour taps are weighted by their alpha so fully transparent pixels
    /// contribute no colour. The result is straight (non-premultiplied) RGBA.
    fn sample(&self, u: f64, v: f64) -> [f64; 4] {
        let fx = (u - 0.5).clamp(self.min_x, self.max_x);
        let fy = (v - 0.5).clamp(self.min_y, self.max_y);
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let x1 = (x0 + 1.0).min(self.max_x);
        let y1 = (y0 + 1.0).min(self.max_y);

        let p00 = self.source.get_pixel(x0 as u32, y0 as u32);
        let p10 = self.source.get_pixel(x1 as u32, y0 as u32);
        let p01 = self.source.get_pixel(x0 as u32, y1 as u32);
        let p11 = self.source.get_pixel(x1 as u32, y1 as u32);

        let taps = [
            (p00, (1.0 - tx) * (1.0 - ty)),
            (p10, tx * (1.0 - ty)),
            (p01, (1.0 - tx) * ty),
            (p11, tx * ty),
        ];
        let mut premultiplied = [0.0; 4];
        for (pixel, weight) in taps {
            let coverage = f64::from(pixel[3]) / 255.0 * weight;
            for (channel, value) in premultiplied.iter_mut().take(3).enumerate() {
                *value += f64::from(pixel[channel]) * coverage;
            }
            premultiplied[3] += f64::from(pixel[3]) * weight;
        }

        let alpha = premultiplied[3];
        if alpha <= 0.0 {
            return [0.0; 4];
        }
        let unpremultiply = |value: f64| value * 255.0 / alpha;
        [
            unpremultiply(premultiplied[0]),
            unpremultiply(premultiplied[1]),
            unpremultiply(premultiplied[2]),
            alpha,
        ]
    }
}

/// Source-over blend of `src` (channels 0..=255) with an extra global alpha
#[must_use]
pub fn blend_pixel(dst: Rgba<u8>, src: [f64; 4], global_alpha: f64) -> Rgba<u8> {
    let src_a = src[3] / 255.0 * global_alpha;
    if src_a <= 0.0 {
        return dst;
    }
    let dst_a = f64::from(dst[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |i: usize| {
        let value = (src[i] * src_a + f64::from(dst[i]) * dst_a * (1.0 - src_a)) / out_a;
        value.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Centre `text` on (`center_x`, `center_y`) in the 8x8 bitmap font
///
/// Glyphs are scaled to [`CAPTION_HEIGHT`], shrinking when the line would be
/// wider than the canvas.
pub fn draw_caption(canvas: &mut RgbaImage, text: &str, center_x: f64, center_y: f64) {
    let chars = text.chars().count() as u32;
    if chars == 0 {
        return;
    }
    let fit_scale = canvas.width() / (chars * GLYPH_SIZE).max(1);
    let scale = (CAPTION_HEIGHT / GLYPH_SIZE).min(fit_scale).max(1);
    let width = f64::from(chars * GLYPH_SIZE * scale);
    let height = f64::from(GLYPH_SIZE * scale);

    draw_bitmap_text(
        canvas,
        (center_x - width / 2.0).round() as i64,
        (center_y - height / 2.0).round() as i64,
        text,
        CAPTION_COLOR,
        scale,
    );
}

fn draw_bitmap_text(canvas: &mut RgbaImage, x: i64, y: i64, text: &str, color: Rgba<u8>, scale: u32) {
    let scale = i64::from(scale);
    let step = i64::from(GLYPH_SIZE) * scale;
    let (width, height) = (i64::from(canvas.width()), i64::from(canvas.height()));
    let color = color.0.map(f64::from);

    for (index, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            continue;
        };
        let cursor_x = x + index as i64 * step;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8 {
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col * scale;
                let py = y + row as i64 * scale;
                for ty in py.max(0)..(py + scale).min(height) {
                    for tx in px.max(0)..(px + scale).min(width) {
                        let pixel = canvas.get_pixel_mut(tx as u32, ty as u32);
                        *pixel = blend_pixel(*pixel, color, 1.0);
                    }
                }
            }
        }
    }
}
