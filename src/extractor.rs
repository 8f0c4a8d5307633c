//! Local character extraction: segmentation, mask application and bounds
//!
//! A [`CharacterExtractor`] owns one segmentation backend and runs at most
//! one load or extraction at a time. A call made while another is in flight
//! is rejected with [`OverlayError::Busy`] instead of being queued, so the
//! model is never loaded twice.

use crate::bounds::{content_bounds_or_full, BoundingBox};
use crate::error::{OverlayError, Result};
use crate::inference::SegmentationBackend;
use crate::mask::{apply_mask, MaskStatistics};
use crate::preprocessing::preprocess;
use crate::progress::{ExtractionStage, ExtractionTimings, ProgressReporter, ProgressUpdate};
use image::{DynamicImage, RgbaImage};
use instant::Instant;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info_span, instrument};

/// Result of one successful extraction
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Screenshot with the binarized mask in its alpha channel
    pub cutout: RgbaImage,
    /// Padded extent of the visible pixels
    pub bounds: BoundingBox,
    pub statistics: MaskStatistics,
    pub timings: ExtractionTimings,
}

/// Single in-flight flag, released when the guard drops
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag, or `None` when already held
    #[must_use]
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(Arc::clone(&self.0)))
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Holds a [`BusyFlag`] until dropped
#[derive(Debug)]
pub struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

type SharedBackend = Arc<Mutex<Box<dyn SegmentationBackend>>>;

/// Runs the segmentation pipeline on a blocking worker thread
#[derive(Clone)]
pub struct CharacterExtractor {
    backend: SharedBackend,
    busy: BusyFlag,
    padding: u32,
}

impl std::fmt::Debug for CharacterExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacterExtractor")
            .field("busy", &self.busy.is_busy())
            .field("padding", &self.padding)
            .finish_non_exhaustive()
    }
}

impl CharacterExtractor {
    #[must_use]
    pub fn new(backend: Box<dyn SegmentationBackend>, padding: u32) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            busy: BusyFlag::new(),
            padding,
        }
    }

    /// Whether a load or extraction is currently running
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.backend
            .lock()
            .map(|backend| backend.is_loaded())
            .unwrap_or(false)
    }

    /// Load the model ahead of the first extraction
    ///
    /// # Errors
    /// - `Busy` while another load or extraction runs
    /// - `ModelLoad` from the backend
    pub async fn load(&self, reporter: Arc<dyn ProgressReporter>) -> Result<()> {
        let _guard = self
            .busy
            .try_acquire()
            .ok_or(OverlayError::Busy("model loading"))?;
        let backend = Arc::clone(&self.backend);

        tokio::task::spawn_blocking(move || {
            let mut backend = lock_backend(&backend)?;
            load_backend(&mut **backend, reporter.as_ref()).map(|_| ())
        })
        .await
        .map_err(|e| OverlayError::internal(format!("Model loading task failed: {e}")))?
    }

    /// Extract the character from `screenshot`
    ///
    /// Loads the model first when needed.
    ///
    /// # Errors
    /// - `Busy` while another load or extraction runs
    /// - `ModelLoad` or `Inference` from the backend
    #[instrument(skip_all, fields(width = screenshot.width(), height = screenshot.height()))]
    pub async fn extract(
        &self,
        screenshot: Arc<DynamicImage>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Extraction> {
        let _guard = self
            .busy
            .try_acquire()
            .ok_or(OverlayError::Busy("character extraction"))?;
        let backend = Arc::clone(&self.backend);
        let padding = self.padding;

        tokio::task::spawn_blocking(move || {
            let mut backend = lock_backend(&backend)?;
            let result = run_pipeline(&mut **backend, &screenshot, padding, reporter.as_ref());
            if let Err(e) = &result {
                reporter.report_error(failed_stage(e), &e.to_string());
            }
            result
        })
        .await
        .map_err(|e| OverlayError::internal(format!("Extraction task failed: {e}")))?
    }
}

fn lock_backend(
    backend: &SharedBackend,
) -> Result<std::sync::MutexGuard<'_, Box<dyn SegmentationBackend>>> {
    backend
        .lock()
        .map_err(|_| OverlayError::internal("Segmentation backend lock poisoned"))
}

fn failed_stage(error: &OverlayError) -> ExtractionStage {
    match error {
        OverlayError::ModelLoad(_) => ExtractionStage::ModelLoading,
        _ => ExtractionStage::Inference,
    }
}

fn load_backend(
    backend: &mut dyn SegmentationBackend,
    reporter: &dyn ProgressReporter,
) -> Result<Option<u64>> {
    let _span = info_span!("model_load", backend = backend.name()).entered();
    let elapsed = backend.load(reporter)?;
    Ok(elapsed.map(|d| d.as_millis() as u64))
}

fn run_pipeline(
    backend: &mut dyn SegmentationBackend,
    screenshot: &DynamicImage,
    padding: u32,
    reporter: &dyn ProgressReporter,
) -> Result<Extraction> {
    let start = Instant::now();
    let mut timings = ExtractionTimings {
        model_load_ms: load_backend(backend, reporter)?,
        ..ExtractionTimings::default()
    };

    reporter.report_progress(ProgressUpdate::new(ExtractionStage::Preprocessing, start));
    let stage_start = Instant::now();
    let input = preprocess(screenshot, &backend.preprocessing_config())?;
    timings.preprocessing_ms = stage_start.elapsed().as_millis() as u64;

    reporter.report_progress(ProgressUpdate::new(ExtractionStage::Inference, start));
    let stage_start = Instant::now();
    let mask = {
        let _span = info_span!("inference", backend = backend.name()).entered();
        backend.infer(&input)?
    };
    timings.inference_ms = stage_start.elapsed().as_millis() as u64;

    reporter.report_progress(ProgressUpdate::new(ExtractionStage::MaskApplication, start));
    let stage_start = Instant::now();
    let cutout = apply_mask(screenshot, &mask)?;

    reporter.report_progress(ProgressUpdate::new(ExtractionStage::BoundsDetection, start));
    let bounds = content_bounds_or_full(&cutout, padding);
    let statistics = MaskStatistics::from_alpha(&cutout);
    timings.postprocessing_ms = stage_start.elapsed().as_millis() as u64;
    timings.total_ms = start.elapsed().as_millis() as u64;

    reporter.report_progress(ProgressUpdate::new(ExtractionStage::Completed, start));
    reporter.report_completion(&timings);
    log::info!(
        "Extracted character: bounds {}x{} at ({}, {}), {:.1}% foreground",
        bounds.width,
        bounds.height,
        bounds.x,
        bounds.y,
        statistics.foreground_ratio * 100.0
    );

    Ok(Extraction {
        cutout,
        bounds,
        statistics,
        timings,
    })
}
