//! Remote CA client.
//!
//! Speaks JSON over HTTPS to an organization CA service using the
//! process-global admin credentials. Transport failures surface as
//! `DEPENDENCY_FAILURE`; the CA's own structured errors are resurfaced by
//! kind where the service provides one.

use async_trait::async_trait;
use serde::Deserialize;

use parceltrace_types::{CustodyError, Organization, Result};

use crate::authority::{CertificateAuthority, Enrollment, RegistrationRequest};

/// JSON client for a remote organization CA.
pub struct HttpCa {
    organization: Organization,
    base_url: String,
    admin_id: String,
    admin_secret: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CaErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RootKeyBody {
    public_key: String,
}

impl HttpCa {
    pub fn new(
        organization: Organization,
        base_url: impl Into<String>,
        admin_id: impl Into<String>,
        admin_secret: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CustodyError::dependency("ca", e.to_string()))?;
        Ok(Self {
            organization,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_id: admin_id.into(),
            admin_secret: admin_secret.into(),
            client,
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body: CaErrorBody = response.json().await.unwrap_or(CaErrorBody {
            code: None,
            message: None,
        });
        let message = body.message.unwrap_or_else(|| format!("CA returned {}", status));
        Err(match body.code.as_deref() {
            Some("CONFLICT") => CustodyError::conflict("Registration", message),
            Some("NOT_FOUND") => CustodyError::not_found("Registration", message),
            Some("NOT_AUTHORIZED") => CustodyError::not_authorized(message),
            _ => CustodyError::dependency("ca", message),
        })
    }
}

#[async_trait]
impl CertificateAuthority for HttpCa {
    fn organization(&self) -> Organization {
        self.organization
    }

    async fn register(&self, request: RegistrationRequest) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/api/v1/identities", self.base_url))
            .basic_auth(&self.admin_id, Some(&self.admin_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| CustodyError::dependency("ca", e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn enroll(&self, enrollment_id: &str, secret: &str) -> Result<Enrollment> {
        let response = self
            .client
            .post(format!("{}/api/v1/enroll", self.base_url))
            .basic_auth(enrollment_id, Some(secret))
            .send()
            .await
            .map_err(|e| CustodyError::dependency("ca", e.to_string()))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CustodyError::dependency("ca", e.to_string()))
    }

    async fn root_public_key(&self) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/api/v1/root", self.base_url))
            .send()
            .await
            .map_err(|e| CustodyError::dependency("ca", e.to_string()))?;
        let body: RootKeyBody = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CustodyError::dependency("ca", e.to_string()))?;
        Ok(body.public_key)
    }
}
