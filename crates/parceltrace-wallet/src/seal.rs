//! Key sealing: AES-256-GCM with a service key derived by a slow KDF.
//!
//! The service key is derived once at startup from the configured secret
//! (Argon2id, fixed salt), lives only in process memory, and is zeroized
//! on drop. Each sealed record carries its own 12-byte IV and the GCM
//! authentication tag.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use parceltrace_types::{CustodyError, Result};

/// Fixed KDF salt. Changing it invalidates every sealed record.
const KDF_SALT: &[u8] = b"parceltrace-wallet-kdf-v1";

/// GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// IV length in bytes.
const IV_LEN: usize = 12;

/// The sealing algorithm identifier persisted with each record.
pub const SEAL_ALGORITHM: &str = "aes-256-gcm";

/// The in-memory service key. Zeroized when the wallet shuts down.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ServiceKey([u8; 32]);

impl ServiceKey {
    /// Derive the service key from the configured secret via Argon2id.
    pub fn derive(secret: &str) -> Result<Self> {
        let mut key = [0u8; 32];
        argon2::Argon2::default()
            .hash_password_into(secret.as_bytes(), KDF_SALT, &mut key)
            .map_err(|e| CustodyError::internal(format!("wallet KDF failed: {}", e)))?;
        Ok(Self(key))
    }
}

/// A private key sealed for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedKey {
    /// Hex-encoded ciphertext (tag excluded).
    pub ciphertext: String,
    /// Hex-encoded 12-byte IV.
    pub iv: String,
    /// Hex-encoded 16-byte GCM authentication tag.
    pub auth_tag: String,
    pub algorithm: String,
}

/// Seal plaintext key material under the service key.
pub fn seal(key: &ServiceKey, plaintext: &[u8]) -> Result<SealedKey> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CustodyError::internal("wallet encryption failed"))?;
    let (body, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(SealedKey {
        ciphertext: hex::encode(body),
        iv: hex::encode(iv),
        auth_tag: hex::encode(tag),
        algorithm: SEAL_ALGORITHM.to_string(),
    })
}

/// Open a sealed record. Fails when the tag does not authenticate, which
/// is what a wrong service key looks like.
pub fn unseal(key: &ServiceKey, sealed: &SealedKey) -> Result<Vec<u8>> {
    if sealed.algorithm != SEAL_ALGORITHM {
        return Err(CustodyError::internal(format!(
            "unsupported wallet seal algorithm '{}'",
            sealed.algorithm
        )));
    }
    let iv = hex::decode(&sealed.iv)
        .map_err(|_| CustodyError::internal("malformed wallet record iv"))?;
    if iv.len() != IV_LEN {
        return Err(CustodyError::internal("malformed wallet record iv"));
    }
    let mut body = hex::decode(&sealed.ciphertext)
        .map_err(|_| CustodyError::internal("malformed wallet record ciphertext"))?;
    let tag = hex::decode(&sealed.auth_tag)
        .map_err(|_| CustodyError::internal("malformed wallet record tag"))?;
    body.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    cipher
        .decrypt(Nonce::from_slice(&iv), body.as_slice())
        .map_err(|_| {
            CustodyError::internal("wallet decryption failed: authentication tag mismatch")
        })
}
