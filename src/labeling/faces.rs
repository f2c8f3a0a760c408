use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};

/// Bounding box of a detected face, together with the dimensions of the
/// image it was found in. Produced transiently by the face-detection step
/// and never persisted.
#[derive(Debug, Clone)]
pub struct FaceRegion {
    /// X coordinate of the top-left corner (pixels).
    pub x: f32,
    /// Y coordinate of the top-left corner (pixels).
    pub y: f32,
    /// Width of the bounding box (pixels).
    pub width: f32,
    /// Height of the bounding box (pixels).
    pub height: f32,
    /// Width of the source image (pixels).
    pub image_width: u32,
    /// Height of the source image (pixels).
    pub image_height: u32,
}

impl FaceRegion {
    /// Center point of the bounding box.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// True when the box center lies strictly inside the central 40% band
    /// of both image dimensions (30%-70% of width and height).
    pub fn is_centered(&self) -> bool {
        let (cx, cy) = self.center();
        let w = self.image_width as f32;
        let h = self.image_height as f32;
        cx > w * 0.3 && cx < w * 0.7 && cy > h * 0.3 && cy < h * 0.7
    }

    /// True when the box covers strictly more than 20% of the image area.
    pub fn is_prominent(&self) -> bool {
        let image_area = self.image_width as f32 * self.image_height as f32;
        self.width * self.height > image_area * 0.2
    }
}

/// Pluggable frontal-face detection backend.
///
/// Implement this trait to swap in another detection engine (ONNX, dlib,
/// a test double) without touching the pipeline logic.
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a row-major grayscale buffer of `width` × `height` bytes.
    fn detect_faces(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceRegion>;
}

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// The model file is read once on construction; each `detect_faces` call
/// builds a fresh detector from a clone of the loaded model, so the backend
/// is safe to share across worker threads.
pub struct RustfaceDetector {
    model: rustface::Model,
}

impl RustfaceDetector {
    /// Load a SeetaFace frontal-face model from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open face model: {}", path.display()))?;
        let model = rustface::read_model(BufReader::new(file))
            .map_err(|e| anyhow::anyhow!("failed to load face model {}: {}", path.display(), e))?;
        Ok(Self { model })
    }
}

impl FaceDetector for RustfaceDetector {
    fn detect_faces(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceRegion> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(20);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(gray, width, height));

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceRegion {
                    x: bbox.x() as f32,
                    y: bbox.y() as f32,
                    width: bbox.width() as f32,
                    height: bbox.height() as f32,
                    image_width: width,
                    image_height: height,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f32, y: f32, w: f32, h: f32, iw: u32, ih: u32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: w,
            height: h,
            image_width: iw,
            image_height: ih,
        }
    }

    #[test]
    fn test_center() {
        let r = region(200.0, 200.0, 100.0, 100.0, 500, 500);
        assert_eq!(r.center(), (250.0, 250.0));
    }

    #[test]
    fn test_centered_small_face_fails_area_gate() {
        // 500x500 image, face at (200,200) 100x100: center (250,250) = 50%/50%,
        // area 10000/250000 = 4% of the image
        let r = region(200.0, 200.0, 100.0, 100.0, 500, 500);
        assert!(r.is_centered());
        assert!(!r.is_prominent());
    }

    #[test]
    fn test_nine_percent_area_fails_gate() {
        // 1000x1000 image, face at (400,400) 300x300: center 55%/55%, area 9%
        let r = region(400.0, 400.0, 300.0, 300.0, 1000, 1000);
        assert!(r.is_centered());
        assert!(!r.is_prominent());
    }

    #[test]
    fn test_sixteen_percent_area_fails_gate() {
        let r = region(350.0, 350.0, 400.0, 400.0, 1000, 1000);
        assert!(r.is_centered());
        assert!(!r.is_prominent());
    }

    #[test]
    fn test_large_centered_face_passes_both_gates() {
        // 1000x1000 image, face at (300,300) 500x500: center 55%/55%, area 25%
        let r = region(300.0, 300.0, 500.0, 500.0, 1000, 1000);
        assert!(r.is_centered());
        assert!(r.is_prominent());
    }

    #[test]
    fn test_off_center_face_rejected() {
        // Large face hugging the left edge: center at 15% of width
        let r = region(0.0, 250.0, 300.0, 500.0, 1000, 1000);
        assert!(!r.is_centered());
    }

    #[test]
    fn test_band_boundaries_are_strict() {
        // Center exactly at 30% of both axes must not pass
        let r = region(250.0, 250.0, 100.0, 100.0, 1000, 1000);
        assert_eq!(r.center(), (300.0, 300.0));
        assert!(!r.is_centered());
    }

    #[test]
    fn test_area_boundary_is_strict() {
        // Exactly 20% of the image area must not pass
        let r = region(300.0, 275.0, 400.0, 500.0, 1000, 1000);
        assert_eq!(r.width * r.height, 200_000.0);
        assert!(!r.is_prominent());
    }
}
