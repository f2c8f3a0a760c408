pub mod classify;
pub mod faces;
pub mod spots;
pub mod tract_model;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::archive::ImageRecord;
use crate::utils::verbose_println;
use faces::FaceDetector;
pub use spots::{SpotBox, SpotModel};

/// Constant marker written into every annotation file.
pub const SELFIE_MARKER: &str = "selfie";

/// Per-image label emitted for every accepted image: the display name, the
/// fixed selfie marker and the detected spot boxes in model output order.
///
/// Exists only for images that passed classification and yielded at least
/// one spot. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub filename: String,
    pub selfie: String,
    pub spots: Vec<SpotBox>,
}

impl AnnotationRecord {
    pub fn new(filename: String, spots: Vec<SpotBox>) -> Self {
        Self {
            filename,
            selfie: SELFIE_MARKER.to_string(),
            spots,
        }
    }
}

/// Terminal state of one image's trip through the pipeline.
///
/// `Failed` covers decode and detector errors recovered at the per-image
/// boundary; it is tracked separately and never folded into the two skip
/// categories.
#[derive(Debug)]
pub enum ImageOutcome {
    Accepted(AnnotationRecord),
    SkippedNotSelfie,
    SkippedNoSpot,
    Failed(String),
}

/// Run-level counters, one per terminal state.
///
/// Invariant: the four counters sum to the number of discovered images.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub accepted: usize,
    pub skipped_not_selfie: usize,
    pub skipped_no_spot: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &ImageOutcome) {
        match outcome {
            ImageOutcome::Accepted(_) => self.accepted += 1,
            ImageOutcome::SkippedNotSelfie => self.skipped_not_selfie += 1,
            ImageOutcome::SkippedNoSpot => self.skipped_no_spot += 1,
            ImageOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.accepted + self.skipped_not_selfie + self.skipped_no_spot + self.failed
    }
}

/// Everything a finished batch produced: the per-image outcomes in
/// discovery order plus the reduced counters.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<(ImageRecord, ImageOutcome)>,
    pub summary: RunSummary,
}

impl BatchReport {
    /// Failed images with their error messages, in discovery order.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.outcomes
            .iter()
            .filter_map(|(record, outcome)| match outcome {
                ImageOutcome::Failed(reason) => Some((record.name.clone(), reason.clone())),
                _ => None,
            })
            .collect()
    }

    /// Consume the report, keeping only the accepted images and their
    /// annotations, ready for packaging.
    pub fn into_accepted(self) -> Vec<(ImageRecord, AnnotationRecord)> {
        self.outcomes
            .into_iter()
            .filter_map(|(record, outcome)| match outcome {
                ImageOutcome::Accepted(annotation) => Some((record, annotation)),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct LabelingConfig {
    pub confidence_threshold: f32,
    pub parallel_jobs: usize,
    pub verbose: bool,
}

/// Orchestrates classification and spot detection across a batch.
///
/// Images are independent, so the batch fans out over a worker pool. The
/// face detector is shared read-only across workers; the spot model keeps
/// mutable inference state, so calls to it are serialized behind a mutex
/// while decode and classification still run in parallel around it.
pub struct LabelingEngine {
    config: LabelingConfig,
    faces: Arc<dyn FaceDetector>,
    spots: Mutex<Box<dyn SpotModel>>,
    pool: rayon::ThreadPool,
}

impl LabelingEngine {
    pub fn new(
        config: LabelingConfig,
        faces: Arc<dyn FaceDetector>,
        spots: Box<dyn SpotModel>,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_jobs)
            .build()
            .context("failed to initialize thread pool")?;

        Ok(Self {
            config,
            faces,
            spots: Mutex::new(spots),
            pool,
        })
    }

    /// Run the pipeline over a batch of discovered images.
    ///
    /// Per-image failures are captured as `ImageOutcome::Failed`; only the
    /// batch-level machinery itself can abort a run.
    pub fn run(&self, images: &[ImageRecord], progress: &ProgressBar) -> BatchReport {
        let outcomes: Vec<(ImageRecord, ImageOutcome)> = self.pool.install(|| {
            images
                .par_iter()
                .map(|record| {
                    let outcome = self.label_image(record);
                    progress.inc(1);
                    (record.clone(), outcome)
                })
                .collect()
        });

        let mut summary = RunSummary::default();
        for (_, outcome) in &outcomes {
            summary.record(outcome);
        }

        BatchReport { outcomes, summary }
    }

    fn label_image(&self, record: &ImageRecord) -> ImageOutcome {
        let outcome = match self.try_label(record) {
            Ok(outcome) => outcome,
            Err(err) => ImageOutcome::Failed(format!("{:#}", err)),
        };

        if self.config.verbose {
            let state = match &outcome {
                ImageOutcome::Accepted(a) => format!("accepted ({} spots)", a.spots.len()),
                ImageOutcome::SkippedNotSelfie => "skipped: not a selfie".to_string(),
                ImageOutcome::SkippedNoSpot => "skipped: no spot detected".to_string(),
                ImageOutcome::Failed(reason) => format!("failed: {}", reason),
            };
            verbose_println(true, &format!("{} - {}", record.name, state));
        }

        outcome
    }

    /// One image's state machine, strictly sequential, no backtracking:
    /// classify, then detect, then build the annotation.
    fn try_label(&self, record: &ImageRecord) -> Result<ImageOutcome> {
        let image = image::open(&record.path)
            .with_context(|| format!("failed to decode {}", record.name))?;

        if !classify::is_selfie(&image, self.faces.as_ref()) {
            return Ok(ImageOutcome::SkippedNotSelfie);
        }

        let rgb = image.to_rgb8();
        let boxes = {
            // A model call that panics must fail only its own image, not
            // poison the batch for the remaining workers.
            let mut model = self.spots.lock().unwrap_or_else(|e| e.into_inner());
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                spots::detect_spots(model.as_mut(), &rgb, self.config.confidence_threshold)
            })) {
                Ok(result) => result
                    .with_context(|| format!("spot detection failed for {}", record.name))?,
                Err(_) => anyhow::bail!("spot detection panicked for {}", record.name),
            }
        };

        if boxes.is_empty() {
            return Ok(ImageOutcome::SkippedNoSpot);
        }

        Ok(ImageOutcome::Accepted(AnnotationRecord::new(
            record.name.clone(),
            boxes,
        )))
    }
}
