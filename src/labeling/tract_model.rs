#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use super::spots::{RawDetection, SpotModel};

/// Default model input resolution (square), the usual export size for
/// YOLO-family detectors.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Spot detection backend running a YOLO-style ONNX model via tract.
///
/// The model is loaded and optimized once; inference happens fully
/// in-process with no intermediate artifacts written to disk.
pub struct TractSpotModel {
    model: TypedSimplePlan<TypedModel>,
    input_size: u32,
}

impl TractSpotModel {
    /// Load an ONNX model from disk and prepare it for inference with the
    /// default 640x640 input resolution.
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Self::load_with_input_size(model_path, DEFAULT_INPUT_SIZE)
    }

    /// Load an ONNX model expecting a `1x3xSxS` float input.
    pub fn load_with_input_size<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, input_size })
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let size = self.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let size = size as usize;

        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });

        input.into_tensor()
    }

    /// Decode a `1 x (4+nc) x n` (or transposed) YOLO output head into raw
    /// detections in model-input coordinates.
    fn decode(
        &self,
        outputs: TVec<TValue>,
        confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        let shape = view.shape();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }

        // Attributes per candidate box are cx, cy, w, h followed by one
        // score per class; the candidate axis is the larger of the two.
        let attrs_first = shape[1] < shape[2];
        let (attrs, candidates) = if attrs_first {
            (shape[1], shape[2])
        } else {
            (shape[2], shape[1])
        };
        if attrs < 5 {
            return Err(anyhow!(
                "model reports {} attributes per box, need at least 5",
                attrs
            ));
        }

        let at = |attr: usize, candidate: usize| {
            if attrs_first {
                view[[0, attr, candidate]]
            } else {
                view[[0, candidate, attr]]
            }
        };

        let mut detections = Vec::new();
        for i in 0..candidates {
            let mut confidence = f32::NEG_INFINITY;
            for class in 4..attrs {
                confidence = confidence.max(at(class, i));
            }
            if !confidence.is_finite() || confidence < confidence_threshold {
                continue;
            }

            let cx = at(0, i);
            let cy = at(1, i);
            let w = at(2, i);
            let h = at(3, i);
            detections.push(RawDetection {
                x1: cx - w / 2.0,
                y1: cy - h / 2.0,
                x2: cx + w / 2.0,
                y2: cy + h / 2.0,
                confidence,
            });
        }

        Ok(detections)
    }
}

impl SpotModel for TractSpotModel {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn predict(
        &mut self,
        image: &RgbImage,
        confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;

        let detections = self.decode(outputs, confidence_threshold)?;

        // Map boxes from model-input coordinates back to source pixels
        let (width, height) = image.dimensions();
        let sx = width as f32 / self.input_size as f32;
        let sy = height as f32 / self.input_size as f32;

        Ok(detections
            .into_iter()
            .map(|d| RawDetection {
                x1: d.x1 * sx,
                y1: d.y1 * sy,
                x2: d.x2 * sx,
                y2: d.y2 * sy,
                confidence: d.confidence,
            })
            .collect())
    }
}
