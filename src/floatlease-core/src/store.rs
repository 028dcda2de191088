//! Offline-lease credential persistence with encrypted storage.
//!
//! Offline leases must survive process restarts: the granted credential
//! is written to disk, encrypted with XChaCha20-Poly1305 AEAD under a key
//! derived from the product id and the machine fingerprint. Moving the
//! file to another machine (or a fingerprint change on this one) makes
//! decryption fail, which surfaces as `MachineFingerprintChanged`.

// Allow deprecated from_slice until chacha20poly1305 upgrades to generic-array 1.x
#![allow(deprecated)]

use std::path::PathBuf;

use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::status::StatusCode;

/// XChaCha20-Poly1305 nonce size (24 bytes)
const NONCE_SIZE: usize = 24;

/// A persisted offline-lease credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineCredential {
    /// Product the lease was granted for.
    pub product_id: String,
    /// Fingerprint of the machine the lease is bound to.
    pub fingerprint: String,
    /// Seat token issued by the server.
    pub lease_token: String,
    /// Grant timestamp (Unix seconds).
    pub issued_at: i64,
    /// Expiry timestamp (Unix seconds).
    pub expires_at: i64,
}

/// Persistence seam for offline-lease credentials.
pub trait OfflineStore: Send + Sync {
    /// Persist a credential, replacing any existing one for the product.
    ///
    /// # Errors
    ///
    /// `Fail` when the credential cannot be written.
    fn save(&self, credential: &OfflineCredential) -> Result<(), StatusCode>;

    /// Load the stored credential for a product, if one exists.
    ///
    /// # Errors
    ///
    /// `MachineFingerprintChanged` when a credential exists but was bound
    /// to a different fingerprint.
    fn load(
        &self,
        product_id: &str,
        fingerprint: &str,
    ) -> Result<Option<OfflineCredential>, StatusCode>;

    /// Remove the stored credential for a product, if any.
    fn remove(&self, product_id: &str);
}

/// Store that persists nothing (offline leases live only in memory).
#[derive(Debug, Default)]
pub struct NullStore;

impl OfflineStore for NullStore {
    fn save(&self, _credential: &OfflineCredential) -> Result<(), StatusCode> {
        Ok(())
    }

    fn load(
        &self,
        _product_id: &str,
        _fingerprint: &str,
    ) -> Result<Option<OfflineCredential>, StatusCode> {
        Ok(None)
    }

    fn remove(&self, _product_id: &str) {}
}

/// Encrypted file-backed credential store.
pub struct EncryptedFileStore {
    dir: PathBuf,
}

impl EncryptedFileStore {
    /// Store rooted at the given directory (created on first save).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Derive the encryption key from product id and fingerprint.
    fn derive_key(product_id: &str, fingerprint: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"floatlease-store-key:");
        hasher.update(product_id.as_bytes());
        hasher.update(b":");
        hasher.update(fingerprint.as_bytes());
        hasher.finalize().into()
    }

    /// File path for a product's credential. The name hashes the product
    /// id so arbitrary ids stay filesystem-safe.
    fn entry_path(&self, product_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(b"floatlease-store-entry:");
        hasher.update(product_id.as_bytes());
        let hash = hex::encode(&hasher.finalize()[..16]);
        self.dir.join(format!("{hash}.lease"))
    }

    /// Encrypt with a random nonce; returns nonce || ciphertext.
    fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Option<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let cipher = XChaCha20Poly1305::new_from_slice(key).ok()?;
        let ciphertext = cipher.encrypt(nonce, plaintext).ok()?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Some(result)
    }

    /// Decrypt nonce || ciphertext.
    fn decrypt(key: &[u8; 32], data: &[u8]) -> Option<Vec<u8>> {
        if data.len() < NONCE_SIZE {
            warn!(data_len = data.len(), "store: credential file too short");
            return None;
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);
        let cipher = XChaCha20Poly1305::new_from_slice(key).ok()?;
        cipher.decrypt(nonce, ciphertext).ok()
    }
}

impl OfflineStore for EncryptedFileStore {
    fn save(&self, credential: &OfflineCredential) -> Result<(), StatusCode> {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!("store: failed to create credential directory: {}", e);
            return Err(StatusCode::Fail);
        }

        let data = serde_json::to_vec(credential).map_err(|e| {
            warn!("store: failed to serialize credential: {}", e);
            StatusCode::Fail
        })?;

        let key = Self::derive_key(&credential.product_id, &credential.fingerprint);
        let encrypted = Self::encrypt(&key, &data).ok_or(StatusCode::Fail)?;

        let path = self.entry_path(&credential.product_id);
        std::fs::write(&path, &encrypted).map_err(|e| {
            warn!("store: failed to write credential: {}", e);
            StatusCode::Fail
        })?;
        debug!(
            product_id = %credential.product_id,
            expires_at = credential.expires_at,
            "store: persisted offline credential"
        );
        Ok(())
    }

    fn load(
        &self,
        product_id: &str,
        fingerprint: &str,
    ) -> Result<Option<OfflineCredential>, StatusCode> {
        let path = self.entry_path(product_id);
        let encrypted = match std::fs::read(&path) {
            Ok(data) => data,
            Err(_) => return Ok(None),
        };

        let key = Self::derive_key(product_id, fingerprint);
        let decrypted = match Self::decrypt(&key, &encrypted) {
            Some(data) => data,
            None => {
                // The key binds the fingerprint; a credential that exists
                // but will not decrypt was issued to a different machine
                // identity (or was tampered with).
                warn!(product_id = %product_id, "store: credential failed to decrypt");
                return Err(StatusCode::MachineFingerprintChanged);
            },
        };

        let credential: OfflineCredential = match serde_json::from_slice(&decrypted) {
            Ok(credential) => credential,
            Err(e) => {
                warn!("store: failed to parse credential: {}", e);
                return Err(StatusCode::Fail);
            },
        };

        if credential.fingerprint != fingerprint {
            warn!(product_id = %product_id, "store: credential fingerprint mismatch");
            return Err(StatusCode::MachineFingerprintChanged);
        }
        Ok(Some(credential))
    }

    fn remove(&self, product_id: &str) {
        let _ = std::fs::remove_file(self.entry_path(product_id));
    }
}
