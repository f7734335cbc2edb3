//! The certificate-authority seam.
//!
//! One authority per organization. The gateway registers a user with the
//! org CA and immediately enrolls it, handing the resulting certificate and
//! key to the wallet. Registration without successful enrolment must leave
//! no usable identity behind; the gateway owns that rollback.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use parceltrace_types::{CertAttributes, Organization, Result};

use crate::certificate::Certificate;

/// Length of a generated per-user enrolment secret.
pub const ENROLLMENT_SECRET_LEN: usize = 16;

/// A CA registration request for a new identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub enrollment_id: String,
    /// The per-user enrolment secret the caller generated.
    pub secret: String,
    /// `orgName` or `orgName.companyId`.
    pub affiliation: String,
    /// Attributes to bind into the enrolment certificate.
    pub attributes: CertAttributes,
}

/// The enrolment result: a certificate and the matching private key, both
/// text-encoded for wallet persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub certificate: Certificate,
    /// Subject ed25519 signing key, hex-encoded.
    pub private_key: String,
}

/// An organization's certificate authority.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// The organization this CA serves.
    fn organization(&self) -> Organization;

    /// Register a new client identity. Idempotence is not assumed; a second
    /// registration for the same id fails with `CONFLICT`.
    async fn register(&self, request: RegistrationRequest) -> Result<()>;

    /// Enroll a registered identity, generating its keypair and certificate.
    async fn enroll(&self, enrollment_id: &str, secret: &str) -> Result<Enrollment>;

    /// The CA root verifying key, hex-encoded, for ledger trust
    /// registration.
    async fn root_public_key(&self) -> Result<String>;
}

/// Generate a 16-char alphanumeric enrolment secret.
pub fn generate_enrollment_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ENROLLMENT_SECRET_LEN)
        .map(char::from)
        .collect()
}

/// CA affiliation string for an org and optional company.
pub fn affiliation(org: Organization, company_id: Option<&str>) -> String {
    match company_id {
        Some(company) => format!("{}.{}", org.name(), company),
        None => org.name().to_string(),
    }
}
