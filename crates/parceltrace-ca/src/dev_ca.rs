//! In-process certificate authority.
//!
//! Serves a single organization from a root key held in memory. Intended
//! for single-binary deployments and tests; the remote profile swaps in
//! [`crate::http_ca::HttpCa`] behind the same trait.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use ed25519_dalek::SigningKey;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use parceltrace_types::{CertAttributes, CustodyError, Organization, Result};

use crate::authority::{CertificateAuthority, Enrollment, RegistrationRequest};
use crate::certificate::{generate_keypair, Certificate, CertificateDocument};

/// Validity window for issued certificates.
const CERT_VALIDITY_DAYS: i64 = 365;

struct Registration {
    secret: String,
    attributes: CertAttributes,
}

/// A single-org CA running inside the gateway process.
pub struct DevCa {
    organization: Organization,
    root_key: SigningKey,
    registrations: DashMap<String, Registration>,
}

impl DevCa {
    /// Create a CA with a fresh root key.
    pub fn new(organization: Organization) -> Self {
        Self {
            organization,
            root_key: generate_keypair(),
            registrations: DashMap::new(),
        }
    }

    /// Create a CA from a hex-encoded root key (stable across restarts).
    pub fn with_root_key(organization: Organization, root_key_hex: &str) -> Result<Self> {
        let bytes: [u8; 32] = hex::decode(root_key_hex)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| {
                CustodyError::invalid_argument("rootKey", "expected 32 hex-encoded bytes")
            })?;
        Ok(Self {
            organization,
            root_key: SigningKey::from_bytes(&bytes),
            registrations: DashMap::new(),
        })
    }

    /// Issue a certificate directly, bypassing register/enroll. Used for
    /// the gateway's own service identity at startup.
    pub fn issue_service_identity(&self, enrollment_id: &str) -> Result<Enrollment> {
        self.issue(enrollment_id, None)
    }

    fn issue(&self, enrollment_id: &str, attributes: Option<CertAttributes>) -> Result<Enrollment> {
        let subject_key = generate_keypair();
        let now = Utc::now();
        let document = CertificateDocument {
            serial: Uuid::new_v4().to_string(),
            msp_id: self.organization.msp_id().to_string(),
            enrollment_id: enrollment_id.to_string(),
            public_key: hex::encode(subject_key.verifying_key().to_bytes()),
            attributes,
            not_before: now - Duration::minutes(5),
            not_after: now + Duration::days(CERT_VALIDITY_DAYS),
            issuer: format!("{} CA", self.organization.name()),
        };
        let certificate = Certificate::issue(document, &self.root_key)?;
        Ok(Enrollment {
            certificate,
            private_key: hex::encode(subject_key.to_bytes()),
        })
    }
}

#[async_trait]
impl CertificateAuthority for DevCa {
    fn organization(&self) -> Organization {
        self.organization
    }

    async fn register(&self, request: RegistrationRequest) -> Result<()> {
        if !self.organization.accepts(request.attributes.role) {
            return Err(CustodyError::not_authorized(format!(
                "{} does not enroll role {}",
                self.organization,
                request.attributes.role
            )));
        }
        let expected_prefix = self.organization.name();
        if request.affiliation != expected_prefix
            && !request.affiliation.starts_with(&format!("{}.", expected_prefix))
        {
            return Err(CustodyError::invalid_argument(
                "affiliation",
                format!("must be under {}", expected_prefix),
            ));
        }

        use dashmap::mapref::entry::Entry;
        match self.registrations.entry(request.enrollment_id.clone()) {
            Entry::Occupied(_) => Err(CustodyError::conflict("Registration", request.enrollment_id)),
            Entry::Vacant(slot) => {
                slot.insert(Registration {
                    secret: request.secret,
                    attributes: request.attributes,
                });
                tracing::debug!(
                    enrollment_id = %request.enrollment_id,
                    org = %self.organization,
                    "identity registered"
                );
                Ok(())
            }
        }
    }

    async fn enroll(&self, enrollment_id: &str, secret: &str) -> Result<Enrollment> {
        let registration = self
            .registrations
            .get(enrollment_id)
            .ok_or_else(|| CustodyError::not_found("Registration", enrollment_id))?;

        let matches: bool = registration
            .secret
            .as_bytes()
            .ct_eq(secret.as_bytes())
            .into();
        if !matches {
            return Err(CustodyError::not_authorized("enrolment secret mismatch"));
        }

        let enrollment = self.issue(enrollment_id, Some(registration.attributes.clone()))?;
        tracing::info!(enrollment_id, org = %self.organization, "identity enrolled");
        Ok(enrollment)
    }

    async fn root_public_key(&self) -> Result<String> {
        Ok(hex::encode(self.root_key.verifying_key().to_bytes()))
    }
}
