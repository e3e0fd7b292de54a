//! D-Bus surface of the attendance daemon.
//!
//! Bus name: edu.campus.RollCall1
//! Object path: /edu/campus/RollCall1
//!
//! Every expected outcome — including all rejection reasons — returns a
//! JSON verdict string. Only encoder/store faults become D-Bus errors.

use crate::admission::{AttendanceVerdict, Geolocation, RegistrationVerdict, Rejection};
use crate::engine::{EngineError, EngineHandle};
use rollcall_core::Metric;
use zbus::interface;

pub struct RollCallService {
    engine: EngineHandle,
}

impl RollCallService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

#[interface(name = "edu.campus.RollCall1")]
impl RollCallService {
    /// Register (or overwrite) the face sample for an identity.
    async fn register_face(&self, identity: &str, frame: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(identity, bytes = frame.len(), "register_face requested");
        let verdict = self
            .engine
            .register(identity.to_string(), frame)
            .await
            .map_err(service_error)?;
        Ok(registration_json(&verdict).to_string())
    }

    /// Submit an attendance attempt for a course session.
    async fn submit_attendance(
        &self,
        identity: &str,
        course: &str,
        frame: Vec<u8>,
        has_geolocation: bool,
        latitude: f64,
        longitude: f64,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(identity, course, bytes = frame.len(), "submit_attendance requested");
        let geolocation = has_geolocation.then_some(Geolocation {
            latitude,
            longitude,
        });
        let verdict = self
            .engine
            .attend(identity.to_string(), course.to_string(), frame, geolocation)
            .await
            .map_err(service_error)?;
        Ok(attendance_json(&verdict).to_string())
    }

    /// Courses available for today's sessions.
    async fn list_courses(&self) -> zbus::fdo::Result<String> {
        let courses = self.engine.list_courses().await.map_err(service_error)?;
        let list: Vec<_> = courses
            .into_iter()
            .map(|c| serde_json::json!({ "code": c.code, "name": c.name }))
            .collect();
        Ok(serde_json::Value::Array(list).to_string())
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(service_error)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "backend": status.backend,
            "metric": metric_name(status.metric),
            "match_cutoff": status.match_cutoff,
            "enrolled": status.enrolled,
        })
        .to_string())
    }
}

/// Expected outcomes are verdicts; everything reaching here is a fault.
/// The caller gets a generic error, the detail stays in the daemon log.
fn service_error(e: EngineError) -> zbus::fdo::Error {
    tracing::error!(error = %e, "engine failure");
    zbus::fdo::Error::Failed("attendance service failure".into())
}

fn metric_name(metric: Metric) -> &'static str {
    match metric {
        Metric::Distance => "distance",
        Metric::Similarity => "similarity",
    }
}

fn rejection_json(rejection: &Rejection) -> serde_json::Value {
    let mut value = serde_json::json!({
        "verdict": "rejected",
        "code": rejection.code(),
        "message": rejection.message(),
    });
    // The mismatched identity is the only extra detail ever revealed.
    if let Rejection::IdentityMismatch { matched } = rejection {
        value["matched"] = serde_json::json!(matched);
    }
    value
}

fn registration_json(verdict: &RegistrationVerdict) -> serde_json::Value {
    match verdict {
        RegistrationVerdict::Stored { identity } => serde_json::json!({
            "verdict": "stored",
            "identity": identity,
        }),
        RegistrationVerdict::Rejected(rejection) => rejection_json(rejection),
    }
}

fn attendance_json(verdict: &AttendanceVerdict) -> serde_json::Value {
    match verdict {
        AttendanceVerdict::Admitted {
            record_id,
            identity,
            course,
            timestamp,
        } => serde_json::json!({
            "verdict": "admitted",
            "record_id": record_id,
            "identity": identity,
            "course": course,
            "timestamp": timestamp.to_rfc3339(),
        }),
        AttendanceVerdict::Rejected(rejection) => rejection_json(rejection),
    }
}
