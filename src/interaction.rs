//! Pointer and control input for the output surface
//!
//! Nothing here touches pixels. The controllers turn raw input into
//! session calls: an upload slot, a new overlay centre, or a throttled
//! control change. Time is passed in so callers drive the clock.

use crate::error::InputSlot;
use crate::geometry::OverlayTransform;
use image::Rgba;
use instant::{Duration, Instant};

/// Throttle window for the margin slider
pub const MARGIN_THROTTLE: Duration = Duration::from_millis(300);

/// Throttle window for the colour, scale and opacity controls
pub const CONTROL_THROTTLE: Duration = Duration::from_millis(10);

/// Point relative to the top-left of the displayed output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

impl PointerPosition {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// On-screen size of the displayed output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Where an upload came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UploadSource {
    /// Click or drop on the output at `offset_y` within a surface of `height`
    Pointer { offset_y: f64, height: f64 },
    /// Clipboard paste
    Paste,
}

/// Top half uploads the screenshot, bottom half the photo
#[must_use]
pub fn slot_for_pointer(offset_y: f64, height: f64) -> InputSlot {
    if offset_y < height / 2.0 {
        InputSlot::Screenshot
    } else {
        InputSlot::Photo
    }
}

/// Slot an upload should fill, or `None` while a cut-out exists
#[must_use]
pub fn upload_target(source: UploadSource, has_cutout: bool) -> Option<InputSlot> {
    if has_cutout {
        log::debug!("Upload ignored: the output is a drag surface while a cut-out exists");
        return None;
    }
    Some(match source {
        UploadSource::Pointer { offset_y, height } => slot_for_pointer(offset_y, height),
        UploadSource::Paste => InputSlot::Screenshot,
    })
}

/// Result of pressing on the output surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerDown {
    /// No cut-out yet: open an upload for this slot
    Upload(InputSlot),
    /// A drag of the overlay began
    DragStarted,
}

#[derive(Debug, Clone, Copy)]
struct DragOrigin {
    pointer: PointerPosition,
    center_x: f64,
    center_y: f64,
}

/// Overlay drag with per-frame coalescing
///
/// Moves only record the latest pointer position; the overlay centre is
/// computed once per [`DragController::animation_frame`]. A newer move
/// replaces a pending one, and releasing the pointer drops it.
#[derive(Debug, Clone, Default)]
pub struct DragController {
    origin: Option<DragOrigin>,
    pending: Option<PointerPosition>,
}

impl DragController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `overlay` is the current transform when a cut-out exists
    pub fn pointer_down(
        &mut self,
        at: PointerPosition,
        surface: DisplaySize,
        overlay: Option<&OverlayTransform>,
    ) -> PointerDown {
        match overlay {
            None => PointerDown::Upload(slot_for_pointer(at.y, surface.height)),
            Some(transform) => {
                self.origin = Some(DragOrigin {
                    pointer: at,
                    center_x: transform.center_x,
                    center_y: transform.center_y,
                });
                self.pending = None;
                PointerDown::DragStarted
            },
        }
    }

    /// Record a move; returns `true` when a new frame must be requested
    pub fn pointer_move(&mut self, at: PointerPosition) -> bool {
        if self.origin.is_none() {
            return false;
        }
        let needs_frame = self.pending.is_none();
        self.pending = Some(at);
        needs_frame
    }

    /// Consume the pending move and return the new overlay centre in photo
    /// pixels
    ///
    /// Display deltas are scaled by `photo_size / surface` on each axis.
    pub fn animation_frame(
        &mut self,
        surface: DisplaySize,
        photo_size: (u32, u32),
    ) -> Option<(f64, f64)> {
        let origin = self.origin?;
        let at = self.pending.take()?;
        if surface.width <= 0.0 || surface.height <= 0.0 {
            return None;
        }

        let scale_x = f64::from(photo_size.0) / surface.width;
        let scale_y = f64::from(photo_size.1) / surface.height;
        Some((
            origin.center_x + (at.x - origin.pointer.x) * scale_x,
            origin.center_y + (at.y - origin.pointer.y) * scale_y,
        ))
    }

    /// End the drag unconditionally, dropping any pending frame
    pub fn pointer_up(&mut self) {
        self.origin = None;
        self.pending = None;
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.origin.is_some()
    }

    #[must_use]
    pub fn has_pending_frame(&self) -> bool {
        self.pending.is_some()
    }
}

/// Rate limiter for one control
///
/// The first value in a quiet period applies immediately; values arriving
/// inside the window replace each other and the latest is released by
/// [`Throttle::poll`] once the window has passed.
#[derive(Debug, Clone)]
pub struct Throttle<T> {
    interval: Duration,
    last_applied: Option<Instant>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_applied: None,
            pending: None,
        }
    }

    fn window_open(&self, now: Instant) -> bool {
        self.last_applied
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Offer a value; returns it when it should be applied now
    pub fn submit(&mut self, value: T, now: Instant) -> Option<T> {
        if self.window_open(now) {
            self.last_applied = Some(now);
            self.pending = None;
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    /// Release the held value once the window has passed
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        if self.pending.is_some() && self.window_open(now) {
            self.last_applied = Some(now);
            return self.pending.take();
        }
        None
    }

    /// When the held value becomes due
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match (&self.pending, self.last_applied) {
            (Some(_), Some(last)) => Some(last + self.interval),
            _ => None,
        }
    }
}

/// A change from one of the layout or overlay controls
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlChange {
    Margin(u32),
    Background(Rgba<u8>),
    /// Scale factor, 1.0 = 100%
    Scale(f64),
    /// Opacity in `[0, 1]`
    Opacity(f64),
}

/// Independent throttles for each control
#[derive(Debug, Clone)]
pub struct ControlThrottles {
    margin: Throttle<u32>,
    background: Throttle<Rgba<u8>>,
    scale: Throttle<f64>,
    opacity: Throttle<f64>,
}

impl Default for ControlThrottles {
    fn default() -> Self {
        Self {
            margin: Throttle::new(MARGIN_THROTTLE),
            background: Throttle::new(CONTROL_THROTTLE),
            scale: Throttle::new(CONTROL_THROTTLE),
            opacity: Throttle::new(CONTROL_THROTTLE),
        }
    }
}

impl ControlThrottles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a change through its control's throttle
    pub fn submit(&mut self, change: ControlChange, now: Instant) -> Option<ControlChange> {
        match change {
            ControlChange::Margin(v) => self.margin.submit(v, now).map(ControlChange::Margin),
            ControlChange::Background(v) => {
                self.background.submit(v, now).map(ControlChange::Background)
            },
            ControlChange::Scale(v) => self.scale.submit(v, now).map(ControlChange::Scale),
            ControlChange::Opacity(v) => self.opacity.submit(v, now).map(ControlChange::Opacity),
        }
    }

    /// Held changes that are now due
    pub fn poll(&mut self, now: Instant) -> Vec<ControlChange> {
        [
            self.margin.poll(now).map(ControlChange::Margin),
            self.background.poll(now).map(ControlChange::Background),
            self.scale.poll(now).map(ControlChange::Scale),
            self.opacity.poll(now).map(ControlChange::Opacity),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Earliest time a held change becomes due
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.margin.deadline(),
            self.background.deadline(),
            self.scale.deadline(),
            self.opacity.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}
