//! Coordinate mapping between source-image pixels and the two-pane canvas
//!
//! Three spaces are involved: the natural pixel space of each source image,
//! the canvas space of the rendered comparison, and (for interaction) the
//! on-screen display space. Everything here is pure arithmetic in `f64`;
//! rounding to whole pixels happens only when the compositor rasterizes.

use crate::bounds::BoundingBox;
use serde::{Deserialize, Serialize};

/// Aspect ratio used for the panes when only the photo is present
pub const DEFAULT_ASPECT_RATIO: f64 = 16.0 / 9.0;

/// Axis-aligned rectangle in floating point pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Overlapping region, `None` when the rectangles do not intersect
    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (right > x && bottom > y).then(|| Rect::new(x, y, right - x, bottom - y))
    }
}

/// Source crop for a cover fit: the region of the source to draw so that it
/// fills the target while keeping its aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverFit {
    /// Width of the source region
    pub draw_width: f64,
    /// Height of the source region
    pub draw_height: f64,
    /// Left edge of the source region
    pub offset_x: f64,
    /// Top edge of the source region
    pub offset_y: f64,
}

impl CoverFit {
    /// Source region as a rectangle
    #[must_use]
    pub fn source_rect(&self) -> Rect {
        Rect::new(self.offset_x, self.offset_y, self.draw_width, self.draw_height)
    }
}

/// Center-crop `src` so it covers a target of the given size
///
/// A source wider than the target is cropped horizontally, anything else
/// (including an exactly equal ratio) is cropped vertically.
///
/// ```
/// use pilgrimage_overlay::geometry::fit_cover;
///
/// let fit = fit_cover(3000.0, 1000.0, 16.0, 9.0);
/// assert_eq!(fit.offset_y, 0.0);
/// assert!((fit.draw_width / fit.draw_height - 16.0 / 9.0).abs() < 1e-12);
/// ```
#[must_use]
pub fn fit_cover(src_width: f64, src_height: f64, target_width: f64, target_height: f64) -> CoverFit {
    let target_ratio = target_width / target_height;
    fit_cover_ratio(src_width, src_height, target_ratio)
}

/// [`fit_cover`] with the target given as a width / height ratio
#[must_use]
pub fn fit_cover_ratio(src_width: f64, src_height: f64, target_ratio: f64) -> CoverFit {
    let src_ratio = src_width / src_height;

    if src_ratio > target_ratio {
        let draw_width = src_height * target_ratio;
        CoverFit {
            draw_width,
            draw_height: src_height,
            offset_x: (src_width - draw_width) / 2.0,
            offset_y: 0.0,
        }
    } else {
        let draw_height = src_width / target_ratio;
        CoverFit {
            draw_width: src_width,
            draw_height,
            offset_x: 0.0,
            offset_y: (src_height - draw_height) / 2.0,
        }
    }
}

/// Dimensions of the two stacked panes and the canvas around them
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaneGeometry {
    pub pane_width: f64,
    pub pane_height: f64,
    pub margin: f64,
    /// `pane_width + 2 * margin`, truncated to whole pixels
    pub canvas_width: u32,
    /// `2 * pane_height + 3 * margin`, truncated to whole pixels
    pub canvas_height: u32,
}

impl PaneGeometry {
    /// Width / height ratio shared by both panes
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        self.pane_width / self.pane_height
    }

    /// Screenshot pane
    #[must_use]
    pub fn top_pane(&self) -> Rect {
        Rect::new(self.margin, self.margin, self.pane_width, self.pane_height)
    }

    /// Photo pane
    #[must_use]
    pub fn bottom_pane(&self) -> Rect {
        Rect::new(
            self.margin,
            self.pane_height + 2.0 * self.margin,
            self.pane_width,
            self.pane_height,
        )
    }

    /// Whole canvas
    #[must_use]
    pub fn canvas(&self) -> Rect {
        Rect::new(
            0.0,
            0.0,
            f64::from(self.canvas_width),
            f64::from(self.canvas_height),
        )
    }

    /// Factor from an image of `natural_width` to pane pixels
    #[must_use]
    pub fn scale_for(&self, natural_width: u32) -> f64 {
        if natural_width == 0 {
            return 0.0;
        }
        self.pane_width / f64::from(natural_width)
    }
}

/// Lay out both panes for a screenshot of the given aspect ratio
///
/// ```
/// use pilgrimage_overlay::geometry::pane_geometry;
///
/// let g = pane_geometry(1920.0 / 1080.0, 1080.0, 0.0);
/// assert_eq!((g.canvas_width, g.canvas_height), (1920, 2160));
/// ```
#[must_use]
pub fn pane_geometry(aspect_ratio: f64, pane_height: f64, margin: f64) -> PaneGeometry {
    let pane_width = pane_height * aspect_ratio;
    PaneGeometry {
        pane_width,
        pane_height,
        margin,
        canvas_width: whole_pixels(pane_width + 2.0 * margin),
        canvas_height: whole_pixels(2.0 * pane_height + 3.0 * margin),
    }
}

/// Truncate to whole pixels, absorbing float error just below an integer
fn whole_pixels(value: f64) -> u32 {
    (value + 1e-6).floor().max(0.0) as u32
}

/// User-adjustable placement of the cut-out on the photo
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayTransform {
    /// Overlay centre in photo pixels
    pub center_x: f64,
    pub center_y: f64,
    /// Size multiplier relative to the screenshot scale
    pub scale: f64,
    /// Global alpha in `[0, 1]`
    pub opacity: f64,
}

impl Default for OverlayTransform {
    fn default() -> Self {
        Self {
            center_x: 0.0,
            center_y: 0.0,
            scale: 1.0,
            opacity: 1.0,
        }
    }
}

impl OverlayTransform {
    /// Transform centred on a photo of the given size, keeping `opacity`
    #[must_use]
    pub fn centered_on(photo_width: u32, photo_height: u32, opacity: f64) -> Self {
        Self {
            center_x: f64::from(photo_width) / 2.0,
            center_y: f64::from(photo_height) / 2.0,
            scale: 1.0,
            opacity,
        }
    }

    /// Move the centre by a delta in photo pixels
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.center_x += dx;
        self.center_y += dy;
    }

    pub fn set_scale(&mut self, scale: f64) {
        if scale.is_finite() {
            self.scale = scale.max(0.0);
        }
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        if opacity.is_finite() {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
    }
}

/// Canvas rectangle the cut-out's bounding box is drawn into
///
/// The size follows the screenshot scale so a character keeps the size it
/// had in the anime frame; the centre follows the photo scale and sits in
/// the bottom pane.
#[must_use]
pub fn overlay_placement(
    transform: &OverlayTransform,
    bounds: &BoundingBox,
    screenshot_scale: f64,
    photo_scale: f64,
    geometry: &PaneGeometry,
) -> Rect {
    let width = f64::from(bounds.width) * transform.scale * screenshot_scale;
    let height = f64::from(bounds.height) * transform.scale * screenshot_scale;

    let center_x = transform.center_x * photo_scale + geometry.margin;
    let center_y = transform.center_y * photo_scale + geometry.margin;

    Rect::new(
        center_x - width / 2.0,
        center_y - height / 2.0 + geometry.pane_height + 2.0 * geometry.margin,
        width,
        height,
    )
}

/// Size and top-left of the cut-out when drawn onto the photo at natural
/// resolution (photo-composite export)
#[must_use]
pub fn photo_space_placement(
    transform: &OverlayTransform,
    bounds: &BoundingBox,
    screenshot_width: u32,
    photo_width: u32,
) -> Rect {
    let ratio = if screenshot_width == 0 {
        0.0
    } else {
        f64::from(photo_width) / f64::from(screenshot_width)
    };
    let width = f64::from(bounds.width) * transform.scale * ratio;
    let height = f64::from(bounds.height) * transform.scale * ratio;
    Rect::new(
        transform.center_x - width / 2.0,
        transform.center_y - height / 2.0,
        width,
        height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_fit_cover_wider_source_crops_horizontally() {
        let fit = fit_cover(4000.0, 1000.0, 1920.0, 1080.0);
        assert!(fit.offset_x > 0.0);
        assert_eq!(fit.offset_y, 0.0);
        assert_eq!(fit.draw_height, 1000.0);
        assert!((fit.draw_width / fit.draw_height - 1920.0 / 1080.0).abs() < EPS);
    }

    #[test]
    fn test_fit_cover_taller_source_crops_vertically() {
        let fit = fit_cover(1000.0, 3000.0, 1920.0, 1080.0);
        assert_eq!(fit.offset_x, 0.0);
        assert!(fit.offset_y > 0.0);
        assert_eq!(fit.draw_width, 1000.0);
    }

    #[test]
    fn test_fit_cover_equal_ratio_takes_vertical_branch() {
        let fit = fit_cover(3840.0, 2160.0, 1920.0, 1080.0);
        assert_eq!(fit.offset_x, 0.0);
        assert_eq!(fit.offset_y, 0.0);
        assert_eq!(fit.draw_width, 3840.0);
        assert_eq!(fit.draw_height, 2160.0);
    }

    #[test]
    fn test_fit_cover_ratio_and_offsets_hold_across_sizes() {
        let sizes = [1.0, 3.0, 7.0, 640.0, 1080.0, 1920.0, 4031.0];
        for &sw in &sizes {
            for &sh in &sizes {
                for &(tw, th) in &[(16.0, 9.0), (1.0, 1.0), (3.0, 4.0), (1920.0, 1080.0)] {
                    let fit = fit_cover(sw, sh, tw, th);
                    let ratio = fit.draw_width / fit.draw_height;
                    assert!((ratio - tw / th).abs() < 1e-9 * (tw / th).max(1.0));
                    assert!(fit.offset_x >= 0.0 && fit.offset_y >= 0.0);
                    assert!(fit.draw_width <= sw + EPS && fit.draw_height <= sh + EPS);
                }
            }
        }
    }

    #[test]
    fn test_pane_geometry_with_margin() {
        let g = pane_geometry(4.0 / 3.0, 600.0, 20.0);
        assert_eq!(g.pane_width, 800.0);
        assert_eq!(g.canvas_width, 840);
        assert_eq!(g.canvas_height, 1260);
        assert_eq!(g.top_pane(), Rect::new(20.0, 20.0, 800.0, 600.0));
        assert_eq!(g.bottom_pane(), Rect::new(20.0, 640.0, 800.0, 600.0));
    }

    #[test]
    fn test_pane_geometry_full_hd_scenario() {
        let g = pane_geometry(1920.0 / 1080.0, 1080.0, 0.0);
        assert!((g.pane_width - 1920.0).abs() < EPS);
        assert_eq!((g.canvas_width, g.canvas_height), (1920, 2160));
    }

    #[test]
    fn test_overlay_placement_unit_scale_matches_bounds() {
        let g = pane_geometry(1920.0 / 1080.0, 540.0, 0.0);
        let bounds = BoundingBox::new(100, 50, 400, 300);
        let transform = OverlayTransform::centered_on(3840, 2160, 1.0);
        let screenshot_scale = g.scale_for(1920);
        let photo_scale = g.scale_for(3840);

        let rect = overlay_placement(&transform, &bounds, screenshot_scale, photo_scale, &g);
        assert!((rect.width - 200.0).abs() < EPS);
        assert!((rect.height - 150.0).abs() < EPS);

        let (cx, cy) = rect.center();
        let (pane_cx, pane_cy) = g.bottom_pane().center();
        assert!((cx - pane_cx).abs() < EPS);
        assert!((cy - pane_cy).abs() < EPS);
    }

    #[test]
    fn test_overlay_placement_with_margin_and_scale() {
        let g = pane_geometry(2.0, 100.0, 10.0);
        let bounds = BoundingBox::new(0, 0, 20, 10);
        let transform = OverlayTransform {
            center_x: 50.0,
            center_y: 20.0,
            scale: 2.0,
            opacity: 0.5,
        };
        let rect = overlay_placement(&transform, &bounds, 0.5, 1.0, &g);
        assert_eq!(rect.width, 20.0);
        assert_eq!(rect.height, 10.0);
        assert_eq!(rect.x, 50.0 + 10.0 - 10.0);
        assert_eq!(rect.y, 20.0 + 10.0 - 5.0 + 100.0 + 20.0);
    }

    #[test]
    fn test_photo_space_placement() {
        let bounds = BoundingBox::new(0, 0, 100, 200);
        let transform = OverlayTransform::centered_on(4000, 3000, 1.0);
        let rect = photo_space_placement(&transform, &bounds, 1000, 4000);
        assert_eq!(rect, Rect::new(1800.0, 1100.0, 400.0, 800.0));
    }

    #[test]
    fn test_transform_setters_clamp() {
        let mut t = OverlayTransform::default();
        t.set_opacity(1.5);
        assert_eq!(t.opacity, 1.0);
        t.set_opacity(f64::NAN);
        assert_eq!(t.opacity, 1.0);
        t.set_scale(-1.0);
        assert_eq!(t.scale, 0.0);
        t.translate(3.0, -4.0);
        assert_eq!((t.center_x, t.center_y), (3.0, -4.0));
    }

    #[test]
    fn test_rect_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersect(&b), Some(Rect::new(5.0, 5.0, 5.0, 5.0)));
        assert_eq!(a.intersect(&Rect::new(20.0, 0.0, 1.0, 1.0)), None);
    }
}
