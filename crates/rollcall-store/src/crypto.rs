//! Embedding encryption at rest.
//!
//! Face embeddings are biometric data; blobs in the database are sealed
//! with AES-256-GCM under a key kept outside the database file. Each blob
//! carries its own random nonce: `nonce (12 bytes) || ciphertext`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("key file {0} has wrong length (expected 32 bytes)")]
    KeyLength(String),
    #[error("cipher operation failed — blob corrupt or sealed under a different key")]
    Cipher,
}

/// AES-256-GCM cipher for embedding blobs.
pub struct EmbeddingCipher {
    cipher: Aes256Gcm,
}

impl EmbeddingCipher {
    /// Load the key from `path`, generating and persisting one (mode 0600)
    /// on first use.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        let io_err = |source| CryptoError::Io {
            path: path.to_string_lossy().into_owned(),
            source,
        };

        let key_bytes: [u8; KEY_LEN] = if path.exists() {
            let bytes = std::fs::read(path).map_err(io_err)?;
            bytes
                .try_into()
                .map_err(|_| CryptoError::KeyLength(path.to_string_lossy().into_owned()))?
        } else {
            let mut key = [0u8; KEY_LEN];
            rand::rngs::OsRng.fill_bytes(&mut key);

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
            std::fs::write(path, key).map_err(io_err)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                    .map_err(io_err)?;
            }
            tracing::info!(path = %path.display(), "generated new embedding key");
            key
        };

        let fingerprint = Sha256::digest(key_bytes);
        tracing::info!(
            fingerprint = %hex_prefix(&fingerprint),
            "embedding cipher ready"
        );

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Seal a plaintext blob: random nonce prepended to the ciphertext.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut aes_gcm::aead::OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Cipher)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Open a sealed blob produced by [`seal`](Self::seal).
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < NONCE_LEN {
            return Err(CryptoError::Cipher);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Cipher)
    }
}

fn hex_prefix(digest: &[u8]) -> String {
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_seal_open_round_trip() {
        let dir = tempdir().unwrap();
        let cipher = EmbeddingCipher::load_or_generate(&dir.path().join("key")).unwrap();

        let plaintext = b"embedding bytes".to_vec();
        let blob = cipher.seal(&plaintext).unwrap();
        assert_ne!(blob, plaintext);
        assert_eq!(cipher.open(&blob).unwrap(), plaintext);
    }

    #[test]
    fn test_key_persists_across_instances() {
        let dir = tempdir().unwrap();
        let key_path = dir.path().join("key");

        let first = EmbeddingCipher::load_or_generate(&key_path).unwrap();
        let blob = first.seal(b"data").unwrap();

        let second = EmbeddingCipher::load_or_generate(&key_path).unwrap();
        assert_eq!(second.open(&blob).unwrap(), b"data");
    }

    #[test]
    fn test_tampered_blob_rejected() {
        let dir = tempdir().unwrap();
        let cipher = EmbeddingCipher::load_or_generate(&dir.path().join("key")).unwrap();

        let mut blob = cipher.seal(b"data").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        assert!(matches!(cipher.open(&blob), Err(CryptoError::Cipher)));
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let dir = tempdir().unwrap();
        let cipher = EmbeddingCipher::load_or_generate(&dir.path().join("key")).unwrap();
        assert!(matches!(cipher.open(&[0u8; 4]), Err(CryptoError::Cipher)));
    }

    #[test]
    fn test_wrong_length_key_file_rejected() {
        let dir = tempdir().unwrap();
        let key_path = dir.path().join("key");
        std::fs::write(&key_path, [0u8; 16]).unwrap();
        assert!(matches!(
            EmbeddingCipher::load_or_generate(&key_path),
            Err(CryptoError::KeyLength(_))
        ));
    }

    #[test]
    fn test_nonces_differ_between_seals() {
        let dir = tempdir().unwrap();
        let cipher = EmbeddingCipher::load_or_generate(&dir.path().join("key")).unwrap();
        let a = cipher.seal(b"same").unwrap();
        let b = cipher.seal(b"same").unwrap();
        assert_ne!(a, b);
    }
}
