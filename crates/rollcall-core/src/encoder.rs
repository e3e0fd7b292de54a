//! Encoder adapter — the seam between the admission pipeline and a
//! concrete face-encoding backend.
//!
//! Backends are constructed once at startup and injected; callers depend
//! only on "fixed-length vector comparable under the backend's metric".

use crate::normalizer::NormalizedImage;
use crate::types::{BoundingBox, Embedding, Metric};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0} — place ONNX models in the configured model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One detected face with its embedding, as returned by `encode_all`.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Outcome of a registration encoding, which requires exactly one face.
#[derive(Debug, Clone)]
pub enum RegistrationEncoding {
    Face(Embedding),
    NoFace,
    /// More than one face in the frame — ambiguous reference data.
    MultipleFaces,
}

/// A pluggable face-encoding backend.
///
/// Pure with respect to the image: the same frame and configuration always
/// yield the same detections and vectors, and no call mutates state beyond
/// the inference session itself.
pub trait FaceEncoder: Send {
    /// Detect and encode every face in the frame.
    fn encode_all(&mut self, image: &NormalizedImage) -> Result<Vec<DetectedFace>, EncoderError>;

    /// Encode for registration: exactly one face or a structured refusal.
    fn encode_single(
        &mut self,
        image: &NormalizedImage,
    ) -> Result<RegistrationEncoding, EncoderError> {
        let mut faces = self.encode_all(image)?;
        match faces.len() {
            0 => Ok(RegistrationEncoding::NoFace),
            1 => Ok(RegistrationEncoding::Face(faces.remove(0).embedding)),
            _ => Ok(RegistrationEncoding::MultipleFaces),
        }
    }

    /// Tag persisted with every embedding this backend produces.
    ///
    /// Stored embeddings whose tag differs from the active backend are
    /// excluded from matching rather than compared across vector spaces.
    fn backend_tag(&self) -> &'static str;

    /// The comparison metric paired with this backend's vectors.
    fn metric(&self) -> Metric;

    /// Operator-tunable default cutoff for the paired metric.
    fn default_cutoff(&self) -> f32;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal encoder returning a canned face list, to exercise the
    /// `encode_single` cardinality rules.
    struct CannedEncoder {
        faces: Vec<DetectedFace>,
    }

    fn face(v: Vec<f32>) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                confidence: 0.9,
            },
            embedding: Embedding::new(v, "canned"),
        }
    }

    impl FaceEncoder for CannedEncoder {
        fn encode_all(
            &mut self,
            _image: &NormalizedImage,
        ) -> Result<Vec<DetectedFace>, EncoderError> {
            Ok(self.faces.clone())
        }

        fn backend_tag(&self) -> &'static str {
            "canned"
        }

        fn metric(&self) -> Metric {
            Metric::Similarity
        }

        fn default_cutoff(&self) -> f32 {
            0.85
        }
    }

    fn blank_image() -> NormalizedImage {
        NormalizedImage {
            pixels: vec![0; 4 * 4 * 3],
            width: 4,
            height: 4,
        }
    }

    #[test]
    fn test_encode_single_no_face() {
        let mut enc = CannedEncoder { faces: vec![] };
        assert!(matches!(
            enc.encode_single(&blank_image()).unwrap(),
            RegistrationEncoding::NoFace
        ));
    }

    #[test]
    fn test_encode_single_exactly_one() {
        let mut enc = CannedEncoder {
            faces: vec![face(vec![1.0, 2.0])],
        };
        match enc.encode_single(&blank_image()).unwrap() {
            RegistrationEncoding::Face(e) => assert_eq!(e.values, vec![1.0, 2.0]),
            other => panic!("expected Face, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_single_rejects_multiple() {
        let mut enc = CannedEncoder {
            faces: vec![face(vec![1.0]), face(vec![2.0])],
        };
        assert!(matches!(
            enc.encode_single(&blank_image()).unwrap(),
            RegistrationEncoding::MultipleFaces
        ));
    }
}
