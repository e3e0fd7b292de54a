//! Engine thread — owns the encoder and the store.
//!
//! Encoder inference is CPU-bound, so every attempt runs on one dedicated
//! OS thread fed through an mpsc channel with oneshot replies. The async
//! D-Bus handlers never block; each call carries a request-scoped timeout.

use crate::admission::{
    self, AdmissionError, AdmissionPolicy, AttendanceVerdict, Geolocation, RegistrationVerdict,
    Rejection,
};
use crate::config::Config;
use rollcall_core::{EncoderError, FaceEncoder, Metric};
use rollcall_store::{AttendanceStore, Course, ProofImageStore, StoreError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("proof image store: {0}")]
    Proof(#[from] std::io::Error),
    #[error("admission failure: {0}")]
    Admission(#[from] AdmissionError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Daemon self-description for the Status surface.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub backend: &'static str,
    pub metric: Metric,
    pub match_cutoff: f32,
    pub enrolled: u64,
}

/// Messages sent from the D-Bus handlers to the engine thread.
enum EngineRequest {
    Register {
        identity: String,
        frame: Vec<u8>,
        reply: oneshot::Sender<Result<RegistrationVerdict, AdmissionError>>,
    },
    Attend {
        identity: String,
        course: String,
        frame: Vec<u8>,
        geolocation: Option<Geolocation>,
        reply: oneshot::Sender<Result<AttendanceVerdict, AdmissionError>>,
    },
    ListCourses {
        reply: oneshot::Sender<Result<Vec<Course>, StoreError>>,
    },
    Status {
        reply: oneshot::Sender<Result<EngineStatus, StoreError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    attempt_timeout: Duration,
}

impl EngineHandle {
    /// Register a face; an attempt exceeding the timeout is a `Timeout`
    /// rejection, not an error.
    pub async fn register(
        &self,
        identity: String,
        frame: Vec<u8>,
    ) -> Result<RegistrationVerdict, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Register {
                identity,
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;

        match tokio::time::timeout(self.attempt_timeout, reply_rx).await {
            Err(_) => Ok(RegistrationVerdict::Rejected(Rejection::Timeout)),
            Ok(Err(_)) => Err(EngineError::ChannelClosed),
            Ok(Ok(result)) => Ok(result?),
        }
    }

    /// Run an attendance attempt with the request-scoped timeout.
    pub async fn attend(
        &self,
        identity: String,
        course: String,
        frame: Vec<u8>,
        geolocation: Option<Geolocation>,
    ) -> Result<AttendanceVerdict, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Attend {
                identity,
                course,
                frame,
                geolocation,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;

        match tokio::time::timeout(self.attempt_timeout, reply_rx).await {
            Err(_) => Ok(AttendanceVerdict::Rejected(Rejection::Timeout)),
            Ok(Err(_)) => Err(EngineError::ChannelClosed),
            Ok(Ok(result)) => Ok(result?),
        }
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ListCourses { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Spawn the engine from daemon configuration.
///
/// Loads the configured backend's models, opens the store and proof
/// directory synchronously (fail-fast), then enters the request loop.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let encoder = rollcall_core::load_backend(
        config.backend,
        &config.model_dir,
        config.detection_confidence,
    )?;

    let store = AttendanceStore::open(&config.db_path, &config.key_path)?;
    let proofs = ProofImageStore::open(&config.proof_dir)?;

    let policy = AdmissionPolicy {
        match_cutoff: config.match_cutoff.unwrap_or(encoder.default_cutoff()),
        max_image_width: config.max_image_width,
        day_offset: config.day_offset,
    };

    tracing::info!(
        backend = encoder.backend_tag(),
        cutoff = policy.match_cutoff,
        day_offset = %policy.day_offset,
        "admission policy configured"
    );

    Ok(spawn_with(
        encoder,
        store,
        proofs,
        policy,
        Duration::from_secs(config.attempt_timeout_secs),
    ))
}

/// Spawn the engine loop around already-constructed parts.
pub(crate) fn spawn_with(
    mut encoder: Box<dyn FaceEncoder>,
    store: AttendanceStore,
    proofs: ProofImageStore,
    policy: AdmissionPolicy,
    attempt_timeout: Duration,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Register {
                        identity,
                        frame,
                        reply,
                    } => {
                        let result = admission::register_face(
                            encoder.as_mut(),
                            &store,
                            &policy,
                            &identity,
                            &frame,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::Attend {
                        identity,
                        course,
                        frame,
                        geolocation,
                        reply,
                    } => {
                        let result = admission::submit_attendance(
                            encoder.as_mut(),
                            &store,
                            &proofs,
                            &policy,
                            &identity,
                            &course,
                            &frame,
                            geolocation,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::ListCourses { reply } => {
                        let _ = reply.send(store.list_courses());
                    }
                    EngineRequest::Status { reply } => {
                        let status = store.enrolled_count().map(|enrolled| EngineStatus {
                            backend: encoder.backend_tag(),
                            metric: encoder.metric(),
                            match_cutoff: policy.match_cutoff,
                            enrolled,
                        });
                        let _ = reply.send(status);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle {
        tx,
        attempt_timeout,
    }
}
