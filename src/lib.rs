// Library exports for reuse by the CLI binary and the integration tests
pub mod archive;
pub mod cli;
pub mod json_output;
pub mod labeling;
pub mod utils;

// Re-export commonly used types
pub use archive::ImageRecord;
pub use json_output::JsonMessage;
pub use labeling::faces::{FaceDetector, FaceRegion, RustfaceDetector};
pub use labeling::spots::{RawDetection, SpotBox, SpotModel, StubSpotModel};
pub use labeling::{
    AnnotationRecord, BatchReport, ImageOutcome, LabelingConfig, LabelingEngine, RunSummary,
};
