//! Mesh backend — face-mesh landmark embeddings via ONNX.
//!
//! The landmark model regresses 468 (x, y, z) mesh points over a face
//! crop; the flattened, L2-normalized coordinates form the embedding,
//! compared by cosine similarity (conventional threshold 0.85).

use super::{crop_face, detect::FaceDetector};
use crate::encoder::{DetectedFace, EncoderError, FaceEncoder};
use crate::normalizer::NormalizedImage;
use crate::types::{Embedding, Metric};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const MESH_INPUT_SIZE: u32 = 192;
const MESH_LANDMARKS: usize = 468;
const MESH_DIM: usize = MESH_LANDMARKS * 3;
const MESH_BACKEND_TAG: &str = "mesh-l468";
const MESH_DEFAULT_THRESHOLD: f32 = 0.85;

/// Mesh-landmark face encoder: shared detector plus a landmark regressor.
pub struct MeshEncoder {
    detector: FaceDetector,
    session: Session,
}

impl MeshEncoder {
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

        tracing::info!(path = %model_path.display(), "loaded face mesh model");

        Ok(Self { detector, session })
    }

    fn embed(&mut self, crop: &image::RgbImage) -> Result<Embedding, EncoderError> {
        let input = preprocess(crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("mesh output: {e}")))?;

        if raw.len() != MESH_DIM {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {MESH_DIM} landmark coordinates, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(
            l2_normalize(raw.to_vec()),
            MESH_BACKEND_TAG,
        ))
    }
}

impl FaceEncoder for MeshEncoder {
    fn encode_all(&mut self, image: &NormalizedImage) -> Result<Vec<DetectedFace>, EncoderError> {
        let faces = self.detector.detect(image)?;
        let mut encoded = Vec::with_capacity(faces.len());

        for bbox in faces {
            let crop = crop_face(image, &bbox, MESH_INPUT_SIZE);
            let embedding = self.embed(&crop)?;
            encoded.push(DetectedFace { bbox, embedding });
        }

        Ok(encoded)
    }

    fn backend_tag(&self) -> &'static str {
        MESH_BACKEND_TAG
    }

    fn metric(&self) -> Metric {
        Metric::Similarity
    }

    fn default_cutoff(&self) -> f32 {
        MESH_DEFAULT_THRESHOLD
    }
}

/// Scale into a NCHW tensor in [0, 1], the mesh model's input distribution.
fn preprocess(crop: &image::RgbImage) -> Array4<f32> {
    let s = MESH_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

fn l2_normalize(values: Vec<f32>) -> Vec<f32> {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|x| x / norm).collect()
    } else {
        values
    }
}
