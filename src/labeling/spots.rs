use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// One raw detection as reported by a spot model: a floating-point box in
/// source-image pixel space plus the model's confidence score.
#[derive(Debug, Clone, Copy)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

/// Axis-aligned spot bounding box with integer corner coordinates,
/// `x1 < x2` and `y1 < y2`, as serialized into the annotation files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl SpotBox {
    /// Normalize a raw detection: reorder inverted corners, then truncate
    /// toward the origin. The confidence score is dropped here and never
    /// travels further down the pipeline.
    pub fn from_raw(raw: &RawDetection) -> Self {
        let (x1, x2) = if raw.x1 <= raw.x2 {
            (raw.x1, raw.x2)
        } else {
            (raw.x2, raw.x1)
        };
        let (y1, y2) = if raw.y1 <= raw.y2 {
            (raw.y1, raw.y2)
        } else {
            (raw.y2, raw.y1)
        };

        Self {
            x1: x1.floor() as i32,
            y1: y1.floor() as i32,
            x2: x2.floor() as i32,
            y2: y2.floor() as i32,
        }
    }
}

/// Spot detection backend trait.
///
/// Implementations wrap a pretrained object-detection model. The pipeline
/// holds a single shared instance behind a mutex, so backends may keep
/// mutable inference state but never see concurrent calls.
pub trait SpotModel: Send {
    /// Backend identifier, used in diagnostics.
    fn name(&self) -> &'static str;

    /// Run the model over an RGB image and return every detection at or
    /// above the confidence threshold, in the model's native output order.
    fn predict(&mut self, image: &RgbImage, confidence_threshold: f32)
        -> Result<Vec<RawDetection>>;
}

/// Backend that never detects anything.
///
/// Used when no model file is supplied, and as a baseline in tests: every
/// selfie routed through it ends up in the no-spot bucket.
#[derive(Debug, Default)]
pub struct StubSpotModel;

impl SpotModel for StubSpotModel {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn predict(
        &mut self,
        _image: &RgbImage,
        _confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>> {
        Ok(Vec::new())
    }
}

/// Run spot detection over an image and normalize the model output.
///
/// An empty result means "no detections" and is a legitimate outcome, not
/// an error. Box order follows the model's output order.
pub fn detect_spots(
    model: &mut dyn SpotModel,
    image: &RgbImage,
    confidence_threshold: f32,
) -> Result<Vec<SpotBox>> {
    let raw = model.predict(image, confidence_threshold)?;

    Ok(raw
        .iter()
        .filter(|d| d.confidence >= confidence_threshold)
        .map(SpotBox::from_raw)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSpots(Vec<RawDetection>);

    impl SpotModel for FixedSpots {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn predict(
            &mut self,
            _image: &RgbImage,
            _confidence_threshold: f32,
        ) -> Result<Vec<RawDetection>> {
            Ok(self.0.clone())
        }
    }

    fn raw(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    fn blank(width: u32, height: u32) -> RgbImage {
        RgbImage::new(width, height)
    }

    #[test]
    fn test_from_raw_truncates_toward_origin() {
        let b = SpotBox::from_raw(&raw(10.9, 20.1, 110.7, 220.99, 0.9));
        assert_eq!(
            b,
            SpotBox {
                x1: 10,
                y1: 20,
                x2: 110,
                y2: 220
            }
        );
    }

    #[test]
    fn test_from_raw_reorders_inverted_boxes() {
        let b = SpotBox::from_raw(&raw(300.0, 250.0, 100.0, 50.0, 0.5));
        assert!(b.x1 < b.x2);
        assert!(b.y1 < b.y2);
        assert_eq!(
            b,
            SpotBox {
                x1: 100,
                y1: 50,
                x2: 300,
                y2: 250
            }
        );
    }

    #[test]
    fn test_detect_spots_filters_below_threshold() {
        let mut model = FixedSpots(vec![
            raw(0.0, 0.0, 10.0, 10.0, 0.9),
            raw(5.0, 5.0, 20.0, 20.0, 0.1),
        ]);
        let boxes = detect_spots(&mut model, &blank(32, 32), 0.25).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(
            boxes[0],
            SpotBox {
                x1: 0,
                y1: 0,
                x2: 10,
                y2: 10
            }
        );
    }

    #[test]
    fn test_detect_spots_preserves_model_order() {
        let mut model = FixedSpots(vec![
            raw(100.0, 100.0, 200.0, 200.0, 0.5),
            raw(0.0, 0.0, 50.0, 50.0, 0.8),
        ]);
        let boxes = detect_spots(&mut model, &blank(256, 256), 0.25).unwrap();
        assert_eq!(boxes[0].x1, 100);
        assert_eq!(boxes[1].x1, 0);
    }

    #[test]
    fn test_stub_returns_no_detections() {
        let mut model = StubSpotModel;
        let boxes = detect_spots(&mut model, &blank(32, 32), 0.25).unwrap();
        assert!(boxes.is_empty());
    }
}
