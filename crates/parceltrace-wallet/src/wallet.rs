//! The identity wallet: durable encrypted records plus a decrypted cache.
//!
//! One JSON record per user under the wallet directory. `get` is the hot
//! path and serves from the cache after first decryption; `put`, `revoke`,
//! and `remove` are rare and serialize file mutations. A revoke evicts the
//! cache entry before it returns, so no caller can observe a revoked
//! identity through the cache.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use parceltrace_types::{CustodyError, Organization, Result};

use crate::seal::{seal, unseal, SealedKey, ServiceKey};

/// A persisted wallet record. Private key material appears only sealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletIdentity {
    pub user_id: String,
    pub msp_id: String,
    /// Armored certificate text.
    pub certificate: String,
    pub encrypted_private_key: SealedKey,
    pub organization: Organization,
    pub enrollment_id: String,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A decrypted identity as served to the gateway's signer. The private key
/// is zeroized when the value is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct UnlockedIdentity {
    #[zeroize(skip)]
    pub user_id: String,
    #[zeroize(skip)]
    pub msp_id: String,
    #[zeroize(skip)]
    pub certificate: String,
    /// Hex-encoded ed25519 signing key.
    pub private_key: String,
    #[zeroize(skip)]
    pub organization: Organization,
    #[zeroize(skip)]
    pub enrollment_id: String,
}

impl std::fmt::Debug for UnlockedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedIdentity")
            .field("user_id", &self.user_id)
            .field("msp_id", &self.msp_id)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

/// The gateway-side wallet.
pub struct Wallet {
    dir: PathBuf,
    key: ServiceKey,
    cache: DashMap<String, UnlockedIdentity>,
    /// Serializes file mutations; reads go lock-free through the cache.
    write_lock: Mutex<()>,
}

impl Wallet {
    /// Open (or create) a wallet directory, deriving the service key from
    /// the configured secret.
    pub fn open(dir: impl Into<PathBuf>, encryption_secret: &str) -> Result<Self> {
        if encryption_secret.len() < 16 {
            return Err(CustodyError::invalid_argument(
                "walletEncryptionKey",
                "must be at least 16 bytes",
            ));
        }
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| CustodyError::internal(format!("wallet dir {}: {}", dir.display(), e)))?;
        Ok(Self {
            dir,
            key: ServiceKey::derive(encryption_secret)?,
            cache: DashMap::new(),
            write_lock: Mutex::new(()),
        })
    }

    /// Store (or re-activate) an identity. Exactly one non-revoked record
    /// exists per user; a put over a revoked record replaces it.
    #[allow(clippy::too_many_arguments)]
    pub fn put(
        &self,
        user_id: &str,
        msp_id: &str,
        certificate: &str,
        private_key_hex: &str,
        organization: Organization,
        enrollment_id: &str,
    ) -> Result<()> {
        let path = self.record_path(user_id)?;
        let sealed = seal(&self.key, private_key_hex.as_bytes())?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let created_at = self
            .read_record(&path)?
            .map(|existing| existing.created_at)
            .unwrap_or_else(Utc::now);
        let record = WalletIdentity {
            user_id: user_id.to_string(),
            msp_id: msp_id.to_string(),
            certificate: certificate.to_string(),
            encrypted_private_key: sealed,
            organization,
            enrollment_id: enrollment_id.to_string(),
            is_revoked: false,
            created_at,
            updated_at: Utc::now(),
        };
        self.write_record(&path, &record)?;
        self.cache.remove(user_id);
        tracing::debug!(user_id, org = %organization, "wallet identity stored");
        Ok(())
    }

    /// Decrypt and serve an identity; `None` when absent or revoked.
    pub fn get(&self, user_id: &str) -> Result<Option<UnlockedIdentity>> {
        if let Some(cached) = self.cache.get(user_id) {
            return Ok(Some(cached.value().clone()));
        }

        let path = self.record_path(user_id)?;
        let record = match self.read_record(&path)? {
            Some(record) if !record.is_revoked => record,
            _ => return Ok(None),
        };

        let plaintext = unseal(&self.key, &record.encrypted_private_key)?;
        let private_key = String::from_utf8(plaintext)
            .map_err(|_| CustodyError::internal("wallet record key is not valid utf-8"))?;
        let identity = UnlockedIdentity {
            user_id: record.user_id,
            msp_id: record.msp_id,
            certificate: record.certificate,
            private_key,
            organization: record.organization,
            enrollment_id: record.enrollment_id,
        };
        self.cache.insert(user_id.to_string(), identity.clone());
        Ok(Some(identity))
    }

    /// Whether a non-revoked identity exists for the user.
    pub fn exists(&self, user_id: &str) -> Result<bool> {
        if self.cache.contains_key(user_id) {
            return Ok(true);
        }
        let path = self.record_path(user_id)?;
        Ok(self.read_record(&path)?.map(|r| !r.is_revoked).unwrap_or(false))
    }

    /// Soft-revoke an identity. The cache entry is evicted before this
    /// returns.
    pub fn revoke(&self, user_id: &str) -> Result<()> {
        self.cache.remove(user_id);

        let path = self.record_path(user_id)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut record = self
            .read_record(&path)?
            .ok_or_else(|| CustodyError::not_found("WalletIdentity", user_id))?;
        record.is_revoked = true;
        record.updated_at = Utc::now();
        self.write_record(&path, &record)?;
        tracing::info!(user_id, "wallet identity revoked");
        Ok(())
    }

    /// Hard-delete an identity record.
    pub fn remove(&self, user_id: &str) -> Result<()> {
        self.cache.remove(user_id);

        let path = self.record_path(user_id)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CustodyError::not_found("WalletIdentity", user_id))
            }
            Err(e) => Err(CustodyError::internal(format!("wallet remove: {}", e))),
        }
    }

    /// All records (revoked included) for an organization.
    pub fn list_by_organization(&self, organization: Organization) -> Result<Vec<WalletIdentity>> {
        let mut records = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| CustodyError::internal(format!("wallet dir read: {}", e)))?;
        for entry in entries {
            let entry = entry.map_err(|e| CustodyError::internal(format!("wallet dir read: {}", e)))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = self.read_record(&path)? {
                if record.organization == organization {
                    records.push(record);
                }
            }
        }
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(records)
    }

    /// Drop every decrypted identity. The service key itself is zeroized
    /// when the wallet is dropped.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn record_path(&self, user_id: &str) -> Result<PathBuf> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(CustodyError::invalid_argument(
                "userId",
                "must be non-empty and contain only [A-Za-z0-9._-]",
            ));
        }
        Ok(self.dir.join(format!("{}.json", user_id)))
    }

    fn read_record(&self, path: &Path) -> Result<Option<WalletIdentity>> {
        match fs::read(path) {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes).map_err(|e| {
                    CustodyError::internal(format!("corrupt wallet record {}: {}", path.display(), e))
                })?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CustodyError::internal(format!("wallet read: {}", e))),
        }
    }

    fn write_record(&self, path: &Path, record: &WalletIdentity) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| CustodyError::internal(format!("wallet record encode: {}", e)))?;
        fs::write(path, bytes).map_err(|e| CustodyError::internal(format!("wallet write: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "parceltrace-wallet-test-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    const SECRET: &str = "a-sufficiently-long-wallet-secret";

    fn put_sample(wallet: &Wallet, user_id: &str) {
        wallet
            .put(
                user_id,
                "PlatformOrgMSP",
                "-----BEGIN PARCELTRACE CERTIFICATE-----\nZm9v\n-----END PARCELTRACE CERTIFICATE-----",
                "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff",
                Organization::Platform,
                user_id,
            )
            .unwrap();
    }

    #[test]
    fn put_get_roundtrip_and_ciphertext_differs() {
        let wallet = Wallet::open(temp_dir("roundtrip"), SECRET).unwrap();
        put_sample(&wallet, "user-1");

        let identity = wallet.get("user-1").unwrap().unwrap();
        assert_eq!(
            identity.private_key,
            "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff"
        );

        let records = wallet.list_by_organization(Organization::Platform).unwrap();
        assert_eq!(records.len(), 1);
        assert_ne!(
            records[0].encrypted_private_key.ciphertext,
            hex::encode(identity.private_key.as_bytes()),
            "sealed record must not contain the key in the clear"
        );
    }

    #[test]
    fn revoke_is_observed_and_put_reactivates() {
        let wallet = Wallet::open(temp_dir("revoke"), SECRET).unwrap();
        put_sample(&wallet, "user-1");
        assert!(wallet.exists("user-1").unwrap());
        // Warm the cache, then revoke.
        wallet.get("user-1").unwrap().unwrap();

        wallet.revoke("user-1").unwrap();
        assert!(!wallet.exists("user-1").unwrap());
        assert!(wallet.get("user-1").unwrap().is_none());

        put_sample(&wallet, "user-1");
        assert!(wallet.exists("user-1").unwrap());
        assert!(wallet.get("user-1").unwrap().is_some());
    }

    #[test]
    fn restart_with_same_secret_roundtrips() {
        let dir = temp_dir("restart");
        {
            let wallet = Wallet::open(&dir, SECRET).unwrap();
            put_sample(&wallet, "user-1");
        }
        let wallet = Wallet::open(&dir, SECRET).unwrap();
        let identity = wallet.get("user-1").unwrap().unwrap();
        assert_eq!(
            identity.private_key,
            "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff"
        );
    }

    #[test]
    fn restart_with_different_secret_fails_authentication() {
        let dir = temp_dir("restart-wrong");
        {
            let wallet = Wallet::open(&dir, SECRET).unwrap();
            put_sample(&wallet, "user-1");
        }
        let wallet = Wallet::open(&dir, "a-completely-different-secret!").unwrap();
        let err = wallet.get("user-1").unwrap_err();
        assert!(err.to_string().contains("authentication tag mismatch"));
    }

    #[test]
    fn remove_deletes_the_record() {
        let wallet = Wallet::open(temp_dir("remove"), SECRET).unwrap();
        put_sample(&wallet, "user-1");
        wallet.remove("user-1").unwrap();
        assert!(!wallet.exists("user-1").unwrap());
        assert!(wallet.remove("user-1").is_err());
    }

    #[test]
    fn list_by_organization_filters() {
        let wallet = Wallet::open(temp_dir("list"), SECRET).unwrap();
        put_sample(&wallet, "user-1");
        put_sample(&wallet, "user-2");
        assert_eq!(wallet.list_by_organization(Organization::Platform).unwrap().len(), 2);
        assert!(wallet.list_by_organization(Organization::Sellers).unwrap().is_empty());
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = Wallet::open(temp_dir("short"), "tooshort").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn hostile_user_ids_are_rejected() {
        let wallet = Wallet::open(temp_dir("hostile"), SECRET).unwrap();
        assert!(wallet.get("../escape").is_err());
        assert!(wallet.get("").is_err());
    }

    #[test]
    fn clear_cache_keeps_durable_records() {
        let wallet = Wallet::open(temp_dir("clear"), SECRET).unwrap();
        put_sample(&wallet, "user-1");
        wallet.get("user-1").unwrap().unwrap();
        wallet.clear_cache();
        assert!(wallet.get("user-1").unwrap().is_some());
    }
}
