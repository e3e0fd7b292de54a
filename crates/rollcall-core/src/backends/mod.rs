//! Encoder backends — interchangeable ONNX pipelines behind `FaceEncoder`.
//!
//! The backend is selected by configuration at daemon startup; both
//! variants share one face detector and differ in the embedding model
//! and its paired comparison metric.

pub mod descriptor;
pub mod detect;
pub mod mesh;

use crate::encoder::{EncoderError, FaceEncoder};
use crate::normalizer::NormalizedImage;
use crate::types::BoundingBox;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DETECTOR_MODEL_FILE: &str = "face_det_320.onnx";
const DESCRIPTOR_MODEL_FILE: &str = "face_desc_r128.onnx";
const MESH_MODEL_FILE: &str = "face_mesh_l468.onnx";

/// Which encoder backend the deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Descriptor,
    Mesh,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "descriptor" => Ok(BackendKind::Descriptor),
            "mesh" => Ok(BackendKind::Mesh),
            other => Err(format!(
                "unknown backend {other:?} (expected \"descriptor\" or \"mesh\")"
            )),
        }
    }
}

/// Default location for the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/rollcall/models")
}

/// Construct the configured backend, loading its models from `model_dir`.
pub fn load_backend(
    kind: BackendKind,
    model_dir: &Path,
    detection_confidence: f32,
) -> Result<Box<dyn FaceEncoder>, EncoderError> {
    let detector_path = model_dir.join(DETECTOR_MODEL_FILE);

    let encoder: Box<dyn FaceEncoder> = match kind {
        BackendKind::Descriptor => Box::new(descriptor::DescriptorEncoder::load(
            &detector_path,
            &model_dir.join(DESCRIPTOR_MODEL_FILE),
            detection_confidence,
        )?),
        BackendKind::Mesh => Box::new(mesh::MeshEncoder::load(
            &detector_path,
            &model_dir.join(MESH_MODEL_FILE),
            detection_confidence,
        )?),
    };

    tracing::info!(backend = encoder.backend_tag(), "encoder backend ready");
    Ok(encoder)
}

/// Crop a detected face out of the frame and resize to the embedding
/// model's input square. Box coordinates are clamped to the frame.
pub(crate) fn crop_face(
    image: &NormalizedImage,
    bbox: &BoundingBox,
    size: u32,
) -> image::RgbImage {
    let frame = image.to_rgb_image();

    let x = (bbox.x.max(0.0) as u32).min(image.width.saturating_sub(1));
    let y = (bbox.y.max(0.0) as u32).min(image.height.saturating_sub(1));
    let w = (bbox.width as u32).clamp(1, image.width.saturating_sub(x).max(1));
    let h = (bbox.height as u32).clamp(1, image.height.saturating_sub(y).max(1));

    let crop = image::imageops::crop_imm(&frame, x, y, w, h).to_image();
    image::imageops::resize(&crop, size, size, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("descriptor".parse::<BackendKind>().unwrap(), BackendKind::Descriptor);
        assert_eq!("mesh".parse::<BackendKind>().unwrap(), BackendKind::Mesh);
        assert!("hog".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_crop_face_clamps_to_frame() {
        let image = NormalizedImage {
            pixels: vec![10; 20 * 20 * 3],
            width: 20,
            height: 20,
        };
        // Box extends past the frame edge.
        let bbox = BoundingBox {
            x: 15.0,
            y: 15.0,
            width: 30.0,
            height: 30.0,
            confidence: 0.9,
        };
        let crop = crop_face(&image, &bbox, 8);
        assert_eq!(crop.dimensions(), (8, 8));
    }

    #[test]
    fn test_crop_face_output_size() {
        let image = NormalizedImage {
            pixels: vec![200; 64 * 48 * 3],
            width: 64,
            height: 48,
        };
        let bbox = BoundingBox {
            x: 10.0,
            y: 10.0,
            width: 20.0,
            height: 20.0,
            confidence: 0.8,
        };
        let crop = crop_face(&image, &bbox, 112);
        assert_eq!(crop.dimensions(), (112, 112));
    }
}
