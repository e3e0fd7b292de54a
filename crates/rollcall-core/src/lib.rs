//! rollcall-core — face-matching pipeline primitives.
//!
//! Image normalization, pluggable ONNX encoder backends, and the
//! nearest-match search used for attendance admission.

pub mod backends;
pub mod encoder;
pub mod matcher;
pub mod normalizer;
pub mod types;

pub use backends::{default_model_dir, load_backend, BackendKind};
pub use encoder::{DetectedFace, EncoderError, FaceEncoder, RegistrationEncoding};
pub use matcher::{find_best_match, MatchResult, ReferenceEntry, ReferenceSet};
pub use normalizer::{normalize, NormalizeError, NormalizedImage, DEFAULT_MAX_WIDTH};
pub use types::{BoundingBox, Embedding, Metric};
