//! Test doubles shared by the daemon's unit tests.

use rollcall_core::{
    BoundingBox, DetectedFace, Embedding, EncoderError, FaceEncoder, Metric, NormalizedImage,
};

pub const STUB_BACKEND_TAG: &str = "stub-v1";

/// Encoder returning a fixed face list for any decodable frame —
/// exercises the pipeline without ONNX models.
pub struct StubEncoder {
    faces: Vec<Embedding>,
}

impl StubEncoder {
    pub fn seeing(faces: Vec<Embedding>) -> Self {
        Self { faces }
    }
}

impl FaceEncoder for StubEncoder {
    fn encode_all(&mut self, _image: &NormalizedImage) -> Result<Vec<DetectedFace>, EncoderError> {
        Ok(self
            .faces
            .iter()
            .enumerate()
            .map(|(i, embedding)| DetectedFace {
                bbox: BoundingBox {
                    x: 10.0 * i as f32,
                    y: 0.0,
                    width: 8.0,
                    height: 8.0,
                    confidence: 0.9,
                },
                embedding: embedding.clone(),
            })
            .collect())
    }

    fn backend_tag(&self) -> &'static str {
        STUB_BACKEND_TAG
    }

    fn metric(&self) -> Metric {
        Metric::Similarity
    }

    fn default_cutoff(&self) -> f32 {
        0.85
    }
}

/// A small valid PNG frame.
pub fn png_frame() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(16, 16, image::Rgb([120, 110, 100]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}
