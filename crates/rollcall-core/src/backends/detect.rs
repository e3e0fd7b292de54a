//! Shared ONNX face detector used by both encoder backends.
//!
//! Runs a single-stage detector over a fixed 320×320 input and maps box
//! coordinates back to the normalized frame, with NMS post-processing.

use crate::encoder::EncoderError;
use crate::normalizer::NormalizedImage;
use crate::types::BoundingBox;
use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const DETECTOR_INPUT_SIZE: u32 = 320;
const DETECTOR_NMS_THRESHOLD: f32 = 0.4;

/// Face detector over an ONNX session.
///
/// Output contract: two tensors, `[1, N]` face scores and `[1, N, 4]`
/// corner boxes (x1, y1, x2, y2) normalized to the input square.
pub struct FaceDetector {
    session: Session,
    confidence_threshold: f32,
}

impl FaceDetector {
    /// Load the detection model, failing fast when the file is missing.
    pub fn load(model_path: &Path, confidence_threshold: f32) -> Result<Self, EncoderError> {
        if !model_path.exists() {
            return Err(EncoderError::ModelNotFound(
                model_path.to_string_lossy().into_owned(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            confidence_threshold,
            "loaded face detection model"
        );

        Ok(Self {
            session,
            confidence_threshold,
        })
    }

    /// Detect faces in a normalized frame, sorted by confidence descending.
    pub fn detect(&mut self, image: &NormalizedImage) -> Result<Vec<BoundingBox>, EncoderError> {
        let input = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("detector scores: {e}")))?;
        let (_, boxes) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("detector boxes: {e}")))?;

        let detections = decode_detections(
            scores,
            boxes,
            image.width,
            image.height,
            self.confidence_threshold,
        );

        let mut result = nms(detections, DETECTOR_NMS_THRESHOLD);
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(result)
    }
}

/// Resize to the detector input square and lay out as a NCHW tensor in [0, 1].
fn preprocess(image: &NormalizedImage) -> Array4<f32> {
    let size = DETECTOR_INPUT_SIZE;
    let resized = image::imageops::resize(
        &image.to_rgb_image(),
        size,
        size,
        FilterType::Triangle,
    );

    let s = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

/// Map raw model output to frame-space bounding boxes above the threshold.
fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    frame_width: u32,
    frame_height: u32,
    threshold: f32,
) -> Vec<BoundingBox> {
    let mut detections = Vec::new();

    for (i, &score) in scores.iter().enumerate() {
        if score <= threshold {
            continue;
        }
        let off = i * 4;
        if off + 3 >= boxes.len() {
            break;
        }
        let x1 = boxes[off].clamp(0.0, 1.0) * frame_width as f32;
        let y1 = boxes[off + 1].clamp(0.0, 1.0) * frame_height as f32;
        let x2 = boxes[off + 2].clamp(0.0, 1.0) * frame_width as f32;
        let y2 = boxes[off + 3].clamp(0.0, 1.0) * frame_height as f32;

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
        });
    }

    detections
}

/// Non-Maximum Suppression: drop detections overlapping a better one.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Intersection-over-Union between two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_decode_filters_by_threshold() {
        let scores = [0.3, 0.9];
        let boxes = [
            0.0, 0.0, 0.5, 0.5, // below threshold
            0.25, 0.25, 0.75, 0.75,
        ];
        let dets = decode_detections(&scores, &boxes, 640, 480, 0.5);
        assert_eq!(dets.len(), 1);
        assert!((dets[0].x - 0.25 * 640.0).abs() < 1e-3);
        assert!((dets[0].y - 0.25 * 480.0).abs() < 1e-3);
        assert!((dets[0].width - 0.5 * 640.0).abs() < 1e-3);
        assert!((dets[0].height - 0.5 * 480.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_skips_degenerate_boxes() {
        let scores = [0.9];
        let boxes = [0.5, 0.5, 0.5, 0.5]; // zero area
        assert!(decode_detections(&scores, &boxes, 640, 480, 0.5).is_empty());
    }

    #[test]
    fn test_decode_clamps_out_of_range_coords() {
        let scores = [0.9];
        let boxes = [-0.2, -0.2, 1.4, 1.4];
        let dets = decode_detections(&scores, &boxes, 100, 100, 0.5);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].x, 0.0);
        assert_eq!(dets[0].y, 0.0);
        assert!((dets[0].width - 100.0).abs() < 1e-3);
        assert!((dets[0].height - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let image = NormalizedImage {
            pixels: vec![255; 8 * 8 * 3],
            width: 8,
            height: 8,
        };
        let tensor = preprocess(&image);
        assert_eq!(
            tensor.shape(),
            &[1, 3, DETECTOR_INPUT_SIZE as usize, DETECTOR_INPUT_SIZE as usize]
        );
        // White input stays 1.0 after scaling.
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 100, 100]] - 1.0).abs() < 1e-6);
    }
}
