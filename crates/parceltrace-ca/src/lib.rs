//! ParcelTrace CA bridge.
//!
//! Certificate issuance for the three organizations. Certificates bind an
//! ed25519 public key to an MSP and the custody attributes (`userId`,
//! `role`, optional company fields) the chaincode reads during endorsement.
//! Two authority implementations sit behind one trait: an in-process dev CA
//! and a JSON client for a remote CA service.

pub mod authority;
pub mod certificate;
pub mod dev_ca;
pub mod http_ca;

pub use authority::{
    affiliation, generate_enrollment_secret, CertificateAuthority, Enrollment,
    RegistrationRequest, ENROLLMENT_SECRET_LEN,
};
pub use certificate::{generate_keypair, Certificate, CertificateDocument};
pub use dev_ca::DevCa;
pub use http_ca::HttpCa;
