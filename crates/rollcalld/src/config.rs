use chrono::FixedOffset;
use rollcall_core::BackendKind;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path to the embedding encryption key.
    pub key_path: PathBuf,
    /// Directory for accepted proof images.
    pub proof_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Which encoder backend to run.
    pub backend: BackendKind,
    /// Match cutoff override; the backend's paired default when unset.
    pub match_cutoff: Option<f32>,
    /// Face-detection confidence threshold.
    pub detection_confidence: f32,
    /// Maximum working frame width in pixels.
    pub max_image_width: u32,
    /// Timeout in seconds for one registration or attendance attempt.
    pub attempt_timeout_secs: u64,
    /// Fixed UTC offset in which the attendance calendar day is derived.
    pub day_offset: FixedOffset,
}

/// Campus default: UTC+7.
fn default_day_offset() -> FixedOffset {
    FixedOffset::east_opt(7 * 3600).expect("+07:00 is a valid offset")
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));
        let key_path = std::env::var("ROLLCALL_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("embedding.key"));
        let proof_dir = std::env::var("ROLLCALL_PROOF_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("proofs"));
        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_core::default_model_dir());

        let backend = std::env::var("ROLLCALL_BACKEND")
            .ok()
            .and_then(|v| match v.parse() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring ROLLCALL_BACKEND");
                    None
                }
            })
            .unwrap_or(BackendKind::Descriptor);

        let day_offset = std::env::var("ROLLCALL_UTC_OFFSET")
            .ok()
            .and_then(|v| {
                let parsed = parse_utc_offset(&v);
                if parsed.is_none() {
                    tracing::warn!(value = %v, "ignoring unparsable ROLLCALL_UTC_OFFSET");
                }
                parsed
            })
            .unwrap_or_else(default_day_offset);

        Self {
            db_path,
            key_path,
            proof_dir,
            model_dir,
            backend,
            match_cutoff: std::env::var("ROLLCALL_MATCH_CUTOFF")
                .ok()
                .and_then(|v| v.parse().ok()),
            detection_confidence: env_f32("ROLLCALL_DETECTION_CONFIDENCE", 0.5),
            max_image_width: env_u32("ROLLCALL_MAX_IMAGE_WIDTH", rollcall_core::DEFAULT_MAX_WIDTH),
            attempt_timeout_secs: env_u64("ROLLCALL_ATTEMPT_TIMEOUT_SECS", 10),
            day_offset,
        }
    }
}

/// Parse a `+HH:MM` / `-HH:MM` offset string.
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1i32, &s[1..]),
        b'-' => (-1i32, &s[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
