//! ParcelTrace identity wallet.
//!
//! Durable, encrypted storage for users' enrolment certificates and
//! private keys, plus an in-memory cache of decrypted identities for the
//! gateway's signer. Key material is sealed with AES-256-GCM under a
//! service key derived from the configured secret by a slow KDF; the
//! service key and every cached identity are zeroized on shutdown.

pub mod seal;
pub mod wallet;

pub use seal::{SealedKey, ServiceKey, SEAL_ALGORITHM};
pub use wallet::{UnlockedIdentity, Wallet, WalletIdentity};
