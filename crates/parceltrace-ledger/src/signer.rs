//! Per-user proposal signer.
//!
//! A `Signer` pairs an enrolment certificate with its decrypted ed25519
//! key. The gateway builds one per live user handle from the wallet;
//! dropping the handle drops the key material with it.

use ed25519_dalek::{Signer as _, SigningKey};
use parceltrace_ca::Certificate;
use parceltrace_types::{CustodyError, Result};

/// A proposal signer bound to one enrolled identity.
pub struct Signer {
    certificate: Certificate,
    signing_key: SigningKey,
}

impl Signer {
    /// The `newSigner(key)` factory: bind a certificate to its hex-encoded
    /// private key. Fails if the key does not match the certificate's
    /// public key.
    pub fn new(certificate: Certificate, private_key_hex: &str) -> Result<Self> {
        let bytes: [u8; 32] = hex::decode(private_key_hex)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| {
                CustodyError::invalid_argument("privateKey", "expected 32 hex-encoded bytes")
            })?;
        let signing_key = SigningKey::from_bytes(&bytes);
        if signing_key.verifying_key() != certificate.subject_key()? {
            return Err(CustodyError::invalid_argument(
                "privateKey",
                "key does not match the certificate subject",
            ));
        }
        Ok(Self { certificate, signing_key })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Sign proposal bytes; returns the hex-encoded signature.
    pub fn sign(&self, payload: &[u8]) -> String {
        hex::encode(self.signing_key.sign(payload).to_bytes())
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("enrollment_id", &self.certificate.document.enrollment_id)
            .field("msp_id", &self.certificate.document.msp_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ed25519_dalek::Verifier;
    use parceltrace_ca::{generate_keypair, CertificateDocument};

    fn certificate_for(subject: &SigningKey) -> Certificate {
        let root = generate_keypair();
        let now = Utc::now();
        Certificate::issue(
            CertificateDocument {
                serial: "s".to_string(),
                msp_id: "SellersOrgMSP".to_string(),
                enrollment_id: "seller-1".to_string(),
                public_key: hex::encode(subject.verifying_key().to_bytes()),
                attributes: None,
                not_before: now,
                not_after: now + Duration::days(1),
                issuer: "test".to_string(),
            },
            &root,
        )
        .unwrap()
    }

    #[test]
    fn signer_signs_verifiably() {
        let subject = generate_keypair();
        let cert = certificate_for(&subject);
        let signer = Signer::new(cert, &hex::encode(subject.to_bytes())).unwrap();

        let sig_hex = signer.sign(b"proposal");
        let sig_bytes: [u8; 64] = hex::decode(sig_hex).unwrap().try_into().unwrap();
        subject
            .verifying_key()
            .verify(b"proposal", &ed25519_dalek::Signature::from_bytes(&sig_bytes))
            .unwrap();
    }

    #[test]
    fn signer_rejects_mismatched_key() {
        let subject = generate_keypair();
        let other = generate_keypair();
        let cert = certificate_for(&subject);
        let err = Signer::new(cert, &hex::encode(other.to_bytes())).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let subject = generate_keypair();
        let cert = certificate_for(&subject);
        let key_hex = hex::encode(subject.to_bytes());
        let signer = Signer::new(cert, &key_hex).unwrap();
        let debug = format!("{:?}", signer);
        assert!(!debug.contains(&key_hex));
    }
}
