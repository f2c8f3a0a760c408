use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "spot-labeler",
    about = "Batch selfie + spot labeling over ZIP archives of images",
    long_about = "
Spot Labeler

Takes a ZIP archive of photos, keeps only the selfie-style portraits
(exactly one face, centered, filling more than 20% of the frame), runs a
spot detection model over them and writes one output ZIP containing the
accepted images plus a JSON annotation per image:

  images/<name>             byte-identical copy of the accepted image
  annotations/<name>.json   { filename, selfie, spots: [{x1,y1,x2,y2}, ...] }

Images the classifier rejects, images with no detected spot and images
that fail to decode are counted separately and reported at the end.

Example Usage:
  # Label every image in photos.zip, write labels.zip next to it
  spot-labeler -i photos.zip -o labels.zip --face-model seeta_fd_frontal_v1.0.bin \\
    --spot-model best.onnx

  # Lower the detection threshold and show per-image decisions
  spot-labeler -i photos.zip -o labels.zip --face-model seeta_fd_frontal_v1.0.bin \\
    --spot-model best.onnx --confidence 0.1 --verbose

  # Machine-readable summary for scripted callers
  spot-labeler -i photos.zip --face-model seeta_fd_frontal_v1.0.bin \\
    --spot-model best.onnx --json"
)]
pub struct Args {
    /// Input ZIP archive containing images (arbitrary nesting allowed)
    #[arg(short = 'i', long = "input", value_name = "ZIP")]
    pub input_zip: PathBuf,

    /// Output ZIP archive for accepted images and annotations
    #[arg(
        short = 'o',
        long = "output",
        value_name = "ZIP",
        default_value = "labels.zip"
    )]
    pub output_zip: PathBuf,

    /// Path to the SeetaFace frontal-face model used by the selfie classifier
    #[arg(long = "face-model", value_name = "FILE")]
    pub face_model: PathBuf,

    /// Path to the ONNX spot detection model (requires the backend-tract
    /// feature; without it every selfie is reported as no-spot)
    #[arg(long = "spot-model", value_name = "FILE")]
    pub spot_model: Option<PathBuf>,

    /// Confidence threshold for spot detection (0.0-1.0)
    #[arg(long = "confidence", default_value = "0.25", value_name = "THRESHOLD")]
    pub confidence_threshold: f32,

    /// Comma-separated list of image extensions to process
    #[arg(long = "extensions", default_value = "jpg,jpeg,png")]
    pub extensions_str: String,

    /// Number of parallel processing jobs (0 = auto-detect CPU cores)
    #[arg(short = 'j', long = "jobs", default_value = "0", value_name = "N")]
    pub jobs: usize,

    /// Enable verbose output with per-image decisions
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Emit the run summary as a single JSON line instead of styled output
    #[arg(long = "json")]
    pub json: bool,
}

impl Args {
    /// Parse the extensions string into a lowercase vector
    pub fn parse_extensions(&self) -> Vec<String> {
        self.extensions_str
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn extensions(&self) -> Vec<String> {
        self.parse_extensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extensions() {
        let args = Args {
            extensions_str: "jpg,jpeg,png".to_string(),
            ..Default::default()
        };
        assert_eq!(args.parse_extensions(), vec!["jpg", "jpeg", "png"]);

        let args = Args {
            extensions_str: "JPG, PNG , JPEG ".to_string(),
            ..Default::default()
        };
        assert_eq!(args.parse_extensions(), vec!["jpg", "png", "jpeg"]);
    }

    #[test]
    fn test_parse_extensions_skips_empty_entries() {
        let args = Args {
            extensions_str: "jpg,,png,".to_string(),
            ..Default::default()
        };
        assert_eq!(args.parse_extensions(), vec!["jpg", "png"]);
    }
}

// Default implementation for tests
#[cfg(test)]
impl Default for Args {
    fn default() -> Self {
        Self {
            input_zip: PathBuf::new(),
            output_zip: PathBuf::from("labels.zip"),
            face_model: PathBuf::new(),
            spot_model: None,
            confidence_threshold: 0.25,
            extensions_str: "jpg,jpeg,png".to_string(),
            jobs: 0,
            verbose: false,
            json: false,
        }
    }
}
