//! Descriptor backend — 128-dimensional face descriptors via ONNX.
//!
//! Classical descriptor embeddings compared by Euclidean distance. The
//! conventional tolerance for this family of models is 0.5.

use super::{crop_face, detect::FaceDetector};
use crate::encoder::{DetectedFace, EncoderError, FaceEncoder};
use crate::normalizer::NormalizedImage;
use crate::types::{Embedding, Metric};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const DESCRIPTOR_INPUT_SIZE: u32 = 112;
const DESCRIPTOR_MEAN: f32 = 127.5;
const DESCRIPTOR_STD: f32 = 127.5;
const DESCRIPTOR_DIM: usize = 128;
const DESCRIPTOR_BACKEND_TAG: &str = "descriptor-r128";
const DESCRIPTOR_DEFAULT_TOLERANCE: f32 = 0.5;

/// Descriptor-style face encoder: shared detector plus a 128-d embedding model.
pub struct DescriptorEncoder {
    detector: FaceDetector,
    session: Session,
}

impl DescriptorEncoder {
    pub fn load(
        detector_path: &Path,
        model_path: &Path,
        detection_confidence: f32,
    ) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(detector_path, detection_confidence)?;

        if !model_path.exists() {
            return Err(EncoderError::ModelNotFound(
                model_path.to_string_lossy().into_owned(),
            ));
        }
        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded descriptor embedding model");

        Ok(Self { detector, session })
    }

    fn embed(&mut self, crop: &image::RgbImage) -> Result<Embedding, EncoderError> {
        let input = preprocess(crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("descriptor output: {e}")))?;

        if raw.len() != DESCRIPTOR_DIM {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {DESCRIPTOR_DIM}-dim descriptor, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(raw.to_vec(), DESCRIPTOR_BACKEND_TAG))
    }
}

impl FaceEncoder for DescriptorEncoder {
    fn encode_all(&mut self, image: &NormalizedImage) -> Result<Vec<DetectedFace>, EncoderError> {
        let faces = self.detector.detect(image)?;
        let mut encoded = Vec::with_capacity(faces.len());

        for bbox in faces {
            let crop = crop_face(image, &bbox, DESCRIPTOR_INPUT_SIZE);
            let embedding = self.embed(&crop)?;
            encoded.push(DetectedFace { bbox, embedding });
        }

        Ok(encoded)
    }

    fn backend_tag(&self) -> &'static str {
        DESCRIPTOR_BACKEND_TAG
    }

    fn metric(&self) -> Metric {
        Metric::Distance
    }

    fn default_cutoff(&self) -> f32 {
        DESCRIPTOR_DEFAULT_TOLERANCE
    }
}

/// Symmetric normalization into a NCHW tensor: (pixel - 127.5) / 127.5.
fn preprocess(crop: &image::RgbImage) -> Array4<f32> {
    let s = DESCRIPTOR_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 - DESCRIPTOR_MEAN) / DESCRIPTOR_STD;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_output_shape() {
        let crop = image::RgbImage::new(DESCRIPTOR_INPUT_SIZE, DESCRIPTOR_INPUT_SIZE);
        let tensor = preprocess(&crop);
        let s = DESCRIPTOR_INPUT_SIZE as usize;
        assert_eq!(tensor.shape(), &[1, 3, s, s]);
    }

    #[test]
    fn test_preprocess_symmetric_normalization() {
        // Black pixels map to -1, white pixels to +1.
        let black = image::RgbImage::new(DESCRIPTOR_INPUT_SIZE, DESCRIPTOR_INPUT_SIZE);
        let tensor = preprocess(&black);
        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);

        let white = image::RgbImage::from_pixel(
            DESCRIPTOR_INPUT_SIZE,
            DESCRIPTOR_INPUT_SIZE,
            image::Rgb([255, 255, 255]),
        );
        let tensor = preprocess(&white);
        assert!((tensor[[0, 1, 5, 5]] - 1.0).abs() < 1e-2);
    }
}
