//! The enrolment certificate format.
//!
//! A certificate binds an ed25519 public key to an organization (MSP), an
//! enrolment id, and the custody attributes the chaincode reads during
//! endorsement. The issuing CA signs the canonical JSON document; the
//! armored encoding is base64 of that JSON between BEGIN/END markers so the
//! wallet can persist it as text.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use parceltrace_types::{CertAttributes, CustodyError, Result};

const ARMOR_BEGIN: &str = "-----BEGIN PARCELTRACE CERTIFICATE-----";
const ARMOR_END: &str = "-----END PARCELTRACE CERTIFICATE-----";

/// The signed portion of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDocument {
    pub serial: String,
    pub msp_id: String,
    pub enrollment_id: String,
    /// Subject ed25519 public key, hex-encoded.
    pub public_key: String,
    /// Custody attributes bound into the enrolment certificate. Absent for
    /// pure service identities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<CertAttributes>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub issuer: String,
}

/// A CA-issued enrolment certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    #[serde(flatten)]
    pub document: CertificateDocument,
    /// Issuer signature over the canonical document JSON, hex-encoded.
    pub signature: String,
}

impl Certificate {
    /// Issue a certificate by signing the document with the CA root key.
    pub fn issue(document: CertificateDocument, issuer_key: &SigningKey) -> Result<Self> {
        let bytes = canonical_bytes(&document)?;
        let signature = issuer_key.sign(&bytes);
        Ok(Self {
            document,
            signature: hex::encode(signature.to_bytes()),
        })
    }

    /// Verify the issuer signature and the validity window.
    pub fn verify(&self, issuer_key: &VerifyingKey, at: DateTime<Utc>) -> Result<()> {
        let bytes = canonical_bytes(&self.document)?;
        let sig_bytes: [u8; 64] = hex::decode(&self.signature)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| CustodyError::not_authorized("malformed certificate signature"))?;
        issuer_key
            .verify(&bytes, &Signature::from_bytes(&sig_bytes))
            .map_err(|_| CustodyError::not_authorized("certificate signature does not verify"))?;

        if at < self.document.not_before || at > self.document.not_after {
            return Err(CustodyError::not_authorized("certificate is outside its validity window"));
        }
        Ok(())
    }

    /// The subject's verifying key.
    pub fn subject_key(&self) -> Result<VerifyingKey> {
        let bytes: [u8; 32] = hex::decode(&self.document.public_key)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| CustodyError::not_authorized("malformed certificate public key"))?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|_| CustodyError::not_authorized("certificate public key is not a valid point"))
    }

    /// Armored text encoding for persistence.
    pub fn encode(&self) -> Result<String> {
        use base64::Engine as _;
        let json = serde_json::to_vec(self)
            .map_err(|e| CustodyError::internal(format!("certificate encode: {}", e)))?;
        let body = base64::engine::general_purpose::STANDARD.encode(json);
        Ok(format!("{}\n{}\n{}", ARMOR_BEGIN, body, ARMOR_END))
    }

    /// Parse the armored text encoding.
    pub fn decode(text: &str) -> Result<Self> {
        use base64::Engine as _;
        let body: String = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && *l != ARMOR_BEGIN && *l != ARMOR_END)
            .collect();
        let json = base64::engine::general_purpose::STANDARD
            .decode(body)
            .map_err(|e| CustodyError::invalid_argument("certificate", e.to_string()))?;
        serde_json::from_slice(&json)
            .map_err(|e| CustodyError::invalid_argument("certificate", e.to_string()))
    }
}

/// Canonical signing bytes: the document JSON with serde's stable field
/// order (struct declaration order).
fn canonical_bytes(document: &CertificateDocument) -> Result<Vec<u8>> {
    serde_json::to_vec(document)
        .map_err(|e| CustodyError::internal(format!("certificate canonicalize: {}", e)))
}

/// Generate a fresh subject keypair.
pub fn generate_keypair() -> SigningKey {
    SigningKey::generate(&mut rand::rngs::OsRng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parceltrace_types::Role;

    fn sample_document() -> (CertificateDocument, SigningKey) {
        let subject = generate_keypair();
        let now = Utc::now();
        let document = CertificateDocument {
            serial: "serial-1".to_string(),
            msp_id: "SellersOrgMSP".to_string(),
            enrollment_id: "seller-1".to_string(),
            public_key: hex::encode(subject.verifying_key().to_bytes()),
            attributes: Some(CertAttributes {
                user_id: "seller-1".to_string(),
                role: Role::Seller,
                company_id: None,
                company_name: None,
            }),
            not_before: now - Duration::minutes(5),
            not_after: now + Duration::days(365),
            issuer: "SellersOrg CA".to_string(),
        };
        (document, subject)
    }

    #[test]
    fn issue_verify_roundtrip() {
        let root = generate_keypair();
        let (document, _) = sample_document();
        let cert = Certificate::issue(document, &root).unwrap();
        cert.verify(&root.verifying_key(), Utc::now()).unwrap();
    }

    #[test]
    fn verify_fails_with_wrong_issuer() {
        let root = generate_keypair();
        let other = generate_keypair();
        let (document, _) = sample_document();
        let cert = Certificate::issue(document, &root).unwrap();
        assert!(cert.verify(&other.verifying_key(), Utc::now()).is_err());
    }

    #[test]
    fn verify_fails_outside_validity_window() {
        let root = generate_keypair();
        let (document, _) = sample_document();
        let not_after = document.not_after;
        let cert = Certificate::issue(document, &root).unwrap();
        let err = cert.verify(&root.verifying_key(), not_after + Duration::days(1)).unwrap_err();
        assert_eq!(err.error_code(), "NOT_AUTHORIZED");
    }

    #[test]
    fn verify_fails_on_tampered_attributes() {
        let root = generate_keypair();
        let (document, _) = sample_document();
        let mut cert = Certificate::issue(document, &root).unwrap();
        if let Some(attrs) = cert.document.attributes.as_mut() {
            attrs.role = Role::Admin;
        }
        assert!(cert.verify(&root.verifying_key(), Utc::now()).is_err());
    }

    #[test]
    fn armored_encoding_roundtrip() {
        let root = generate_keypair();
        let (document, _) = sample_document();
        let cert = Certificate::issue(document, &root).unwrap();
        let text = cert.encode().unwrap();
        assert!(text.starts_with(ARMOR_BEGIN));
        let back = Certificate::decode(&text).unwrap();
        assert_eq!(back, cert);
    }

    #[test]
    fn subject_key_recovers_verifying_key() {
        let root = generate_keypair();
        let (document, subject) = sample_document();
        let cert = Certificate::issue(document, &root).unwrap();
        assert_eq!(cert.subject_key().unwrap(), subject.verifying_key());
    }
}
