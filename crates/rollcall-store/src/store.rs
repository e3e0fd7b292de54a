//! SQLite persistence for reference embeddings and attendance records.

use crate::crypto::{CryptoError, EmbeddingCipher};
use chrono::{DateTime, Utc};
use rollcall_core::{Embedding, ReferenceSet};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("stored embedding for {0} is corrupt (blob length not a multiple of 4)")]
    CorruptEmbedding(String),
    /// An attendance record for the same (identity, course, day) already
    /// exists — the unique constraint fired.
    #[error("attendance record already exists for this identity, course and day")]
    DuplicateRecord,
}

/// A new attendance record, ready to persist.
#[derive(Debug, Clone, Serialize)]
pub struct NewAttendance {
    pub identity: String,
    pub course: String,
    /// Calendar day in the deployment timezone, `YYYY-MM-DD`.
    pub day: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub proof_path: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub code: String,
    pub name: String,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS embeddings (
    identity    TEXT PRIMARY KEY,
    vector      BLOB NOT NULL,
    backend     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    id          TEXT PRIMARY KEY,
    identity    TEXT NOT NULL,
    course      TEXT NOT NULL,
    day         TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    latitude    REAL,
    longitude   REAL,
    proof_path  TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'present',
    UNIQUE (identity, course, day)
);

CREATE TABLE IF NOT EXISTS courses (
    code  TEXT PRIMARY KEY,
    name  TEXT NOT NULL
);
";

/// Store over a single SQLite connection plus the embedding cipher.
///
/// The daemon owns one instance on its engine thread; SQLite's own
/// transactional guarantees cover concurrent daemon instances.
pub struct AttendanceStore {
    conn: Connection,
    cipher: EmbeddingCipher,
}

impl AttendanceStore {
    /// Open (creating if needed) the database at `db_path` and the
    /// embedding key at `key_path`.
    pub fn open(db_path: &Path, key_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;

        let cipher = EmbeddingCipher::load_or_generate(key_path)?;

        tracing::info!(path = %db_path.display(), "attendance store opened");
        Ok(Self { conn, cipher })
    }

    /// Store (or overwrite) the live embedding for an identity.
    ///
    /// Overwrite is unconditional; no history is retained. The original
    /// registration order is preserved for snapshot ordering.
    pub fn save_embedding(&self, identity: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let blob = self.cipher.seal(&encode_vector(&embedding.values))?;
        self.conn.execute(
            "INSERT INTO embeddings (identity, vector, backend, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (identity) DO UPDATE SET
                 vector = excluded.vector,
                 backend = excluded.backend,
                 created_at = excluded.created_at",
            params![identity, blob, embedding.backend, Utc::now().to_rfc3339()],
        )?;
        tracing::info!(identity, backend = %embedding.backend, "embedding saved");
        Ok(())
    }

    /// Rebuild the reference snapshot for the active backend, in
    /// registration order.
    ///
    /// Rows sealed by a different backend are not comparable and are
    /// skipped with a warning.
    pub fn load_reference_set(&self, backend_tag: &str) -> Result<ReferenceSet, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT identity, vector, backend FROM embeddings ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut set = ReferenceSet::new();
        for row in rows {
            let (identity, blob, backend) = row?;
            if backend != backend_tag {
                tracing::warn!(
                    identity,
                    stored = %backend,
                    active = backend_tag,
                    "skipping embedding from another backend"
                );
                continue;
            }
            let plaintext = self.cipher.open(&blob)?;
            let values = decode_vector(&plaintext)
                .ok_or_else(|| StoreError::CorruptEmbedding(identity.clone()))?;
            set.push(identity, Embedding::new(values, backend));
        }
        Ok(set)
    }

    /// Whether an attendance record exists for (identity, course, day).
    pub fn record_exists(&self, identity: &str, course: &str, day: &str) -> Result<bool, StoreError> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM attendance WHERE identity = ?1 AND course = ?2 AND day = ?3",
                params![identity, course, day],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    /// Insert an attendance record, returning its id.
    ///
    /// A unique-constraint hit maps to [`StoreError::DuplicateRecord`] so
    /// a same-day double submit is a policy outcome, not a fatal error.
    pub fn insert_attendance(&self, record: &NewAttendance) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let result = self.conn.execute(
            "INSERT INTO attendance
                 (id, identity, course, day, timestamp, latitude, longitude, proof_path, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                record.identity,
                record.course,
                record.day,
                record.timestamp.to_rfc3339(),
                record.latitude,
                record.longitude,
                record.proof_path,
                record.status,
            ],
        );

        match result {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateRecord),
            Err(e) => Err(e.into()),
        }
    }

    /// Courses available for today's sessions (seeded externally).
    pub fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT code, name FROM courses ORDER BY code")?;
        let rows = stmt.query_map([], |row| {
            Ok(Course {
                code: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Seed a course row (used by provisioning tooling and tests).
    pub fn add_course(&self, code: &str, name: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO courses (code, name) VALUES (?1, ?2)
             ON CONFLICT (code) DO UPDATE SET name = excluded.name",
            params![code, name],
        )?;
        Ok(())
    }

    /// Number of identities with a live embedding.
    pub fn enrolled_count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// f32 vector as little-endian bytes.
fn encode_vector(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
