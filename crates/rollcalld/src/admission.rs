//! Attendance admission control.
//!
//! Runs one attempt through normalize → probe → match → verify →
//! duplicate check → persist, short-circuiting to a structured rejection
//! at any step. Every policy outcome is a verdict; only encoder and
//! storage connectivity failures propagate as errors.

use chrono::{DateTime, FixedOffset, Utc};
use rollcall_core::{
    find_best_match, normalize, EncoderError, FaceEncoder, MatchResult, RegistrationEncoding,
};
use rollcall_store::{AttendanceStore, NewAttendance, ProofImageStore, StoreError};
use thiserror::Error;

/// Unexpected failure underneath the pipeline — surfaced to callers as a
/// generic service error, never as an admission verdict.
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("encoder: {0}")]
    Encoder(#[from] EncoderError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Optional client-supplied coordinates, stored as-is.
#[derive(Debug, Clone, Copy)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Why an attempt was refused. Each reason carries one caller-visible
/// message; scores and embeddings are never exposed.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    BadImage,
    NoFaceDetected,
    MultipleFacesDetected,
    FaceNotRecognized,
    EmptyReferenceSet,
    IdentityMismatch { matched: String },
    DuplicateAttendance,
    StorageError,
    Timeout,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::BadImage => "bad_image",
            Rejection::NoFaceDetected => "no_face_detected",
            Rejection::MultipleFacesDetected => "multiple_faces_detected",
            Rejection::FaceNotRecognized => "face_not_recognized",
            Rejection::EmptyReferenceSet => "empty_reference_set",
            Rejection::IdentityMismatch { .. } => "identity_mismatch",
            Rejection::DuplicateAttendance => "duplicate_attendance",
            Rejection::StorageError => "storage_error",
            Rejection::Timeout => "timeout",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Rejection::BadImage => "The submitted frame could not be read as an image.",
            Rejection::NoFaceDetected => "No face detected in the frame.",
            Rejection::MultipleFacesDetected => {
                "More than one face detected; registration needs exactly one."
            }
            Rejection::FaceNotRecognized => "Face does not match any registered student.",
            Rejection::EmptyReferenceSet => "No faces have been registered yet.",
            Rejection::IdentityMismatch { .. } => {
                "The detected face belongs to a different registered student."
            }
            Rejection::DuplicateAttendance => {
                "Attendance for this course has already been recorded today."
            }
            Rejection::StorageError => "The attendance record could not be saved. Please try again.",
            Rejection::Timeout => "The attendance check timed out. Please try again.",
        }
    }
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone)]
pub enum RegistrationVerdict {
    Stored { identity: String },
    Rejected(Rejection),
}

/// Outcome of an attendance attempt.
#[derive(Debug, Clone)]
pub enum AttendanceVerdict {
    Admitted {
        record_id: String,
        identity: String,
        course: String,
        timestamp: DateTime<Utc>,
    },
    Rejected(Rejection),
}

/// Tunables threaded through every attempt.
pub struct AdmissionPolicy {
    /// Cutoff for the backend-paired metric.
    pub match_cutoff: f32,
    /// Maximum working frame width.
    pub max_image_width: u32,
    /// Fixed offset in which the attendance calendar day is derived.
    pub day_offset: FixedOffset,
}

/// Register (or re-register) the claimed identity's face.
///
/// Requires exactly one detected face; a failed attempt never touches the
/// store, a successful one overwrites unconditionally.
pub fn register_face(
    encoder: &mut dyn FaceEncoder,
    store: &AttendanceStore,
    policy: &AdmissionPolicy,
    identity: &str,
    frame: &[u8],
) -> Result<RegistrationVerdict, AdmissionError> {
    let image = match normalize(frame, policy.max_image_width) {
        Ok(image) => image,
        Err(e) => {
            tracing::debug!(identity, error = %e, "registration frame undecodable");
            return Ok(RegistrationVerdict::Rejected(Rejection::BadImage));
        }
    };

    match encoder.encode_single(&image)? {
        RegistrationEncoding::NoFace => {
            Ok(RegistrationVerdict::Rejected(Rejection::NoFaceDetected))
        }
        RegistrationEncoding::MultipleFaces => Ok(RegistrationVerdict::Rejected(
            Rejection::MultipleFacesDetected,
        )),
        RegistrationEncoding::Face(embedding) => {
            store.save_embedding(identity, &embedding)?;
            tracing::info!(identity, "face registered");
            Ok(RegistrationVerdict::Stored {
                identity: identity.to_string(),
            })
        }
    }
}

/// Run one attendance attempt for the claimed identity.
#[allow(clippy::too_many_arguments)]
pub fn submit_attendance(
    encoder: &mut dyn FaceEncoder,
    store: &AttendanceStore,
    proofs: &ProofImageStore,
    policy: &AdmissionPolicy,
    identity: &str,
    course: &str,
    frame: &[u8],
    geolocation: Option<Geolocation>,
) -> Result<AttendanceVerdict, AdmissionError> {
    let rejected = |r: Rejection| Ok(AttendanceVerdict::Rejected(r));

    // Normalized
    let image = match normalize(frame, policy.max_image_width) {
        Ok(image) => image,
        Err(e) => {
            tracing::debug!(identity, error = %e, "attendance frame undecodable");
            return rejected(Rejection::BadImage);
        }
    };

    // Probed
    let faces = encoder.encode_all(&image)?;
    if faces.is_empty() {
        return rejected(Rejection::NoFaceDetected);
    }

    // Matched — against a snapshot rebuilt for this attempt, so the probe
    // always sees the latest registrations.
    let reference = store.load_reference_set(encoder.backend_tag())?;
    if reference.is_empty() {
        return rejected(Rejection::EmptyReferenceSet);
    }

    let metric = encoder.metric();
    let mut foreign_match: Option<MatchResult> = None;
    let mut verified = false;

    // Verified — the claimed identity must be among the matched faces.
    // Any face matching the claimant admits; other people in the frame
    // are ignored.
    for face in &faces {
        let Some(result) = find_best_match(&face.embedding, &reference, metric, policy.match_cutoff)
        else {
            continue;
        };
        if result.identity == identity {
            verified = true;
            break;
        }
        let better = match &foreign_match {
            None => true,
            Some(prev) => metric.improves(result.score, prev.score),
        };
        if better {
            foreign_match = Some(result);
        }
    }

    if !verified {
        return match foreign_match {
            Some(other) => {
                tracing::warn!(
                    claimed = identity,
                    matched = %other.identity,
                    "attendance face matched a different identity"
                );
                rejected(Rejection::IdentityMismatch {
                    matched: other.identity,
                })
            }
            None => rejected(Rejection::FaceNotRecognized),
        };
    }

    // Duplicate check — backed by the store's unique constraint, so a
    // concurrent double submit still cannot produce two records.
    let now = Utc::now();
    let day = local_day(now, policy.day_offset);
    if store.record_exists(identity, course, &day)? {
        return rejected(Rejection::DuplicateAttendance);
    }

    // Admitted — proof image first, then the record referencing it.
    let proof_path = match proofs.store(frame) {
        Ok(path) => path,
        Err(e) => {
            tracing::error!(identity, course, error = %e, "proof image write failed");
            return rejected(Rejection::StorageError);
        }
    };

    let record = NewAttendance {
        identity: identity.to_string(),
        course: course.to_string(),
        day,
        timestamp: now,
        latitude: geolocation.map(|g| g.latitude),
        longitude: geolocation.map(|g| g.longitude),
        proof_path: proof_path.to_string_lossy().into_owned(),
        status: "present".to_string(),
    };

    match store.insert_attendance(&record) {
        Ok(record_id) => {
            tracing::info!(identity, course, record_id, "attendance admitted");
            Ok(AttendanceVerdict::Admitted {
                record_id,
                identity: identity.to_string(),
                course: course.to_string(),
                timestamp: now,
            })
        }
        Err(e) => {
            // The record never landed; do not keep an orphan proof image.
            if let Err(rm) = proofs.remove(&proof_path) {
                tracing::warn!(path = %proof_path.display(), error = %rm, "proof image rollback failed");
            }
            rejected(insert_failure(e))
        }
    }
}

/// Calendar day of `ts` in the configured deployment offset, `YYYY-MM-DD`.
fn local_day(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).date_naive().to_string()
}

/// Map a failed record insert to its verdict: a constraint hit lost a
/// same-day race and is a policy outcome, anything else is a storage fault.
fn insert_failure(e: StoreError) -> Rejection {
    match e {
        StoreError::DuplicateRecord => Rejection::DuplicateAttendance,
        other => {
            tracing::error!(error = %other, "attendance record insert failed");
            Rejection::StorageError
        }
    }
}
