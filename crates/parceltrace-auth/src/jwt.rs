//! JWT session tokens.
//!
//! HS256 access tokens carrying the caller's userId and role. The gateway
//! treats the token as the session; the ledger never sees it - custody
//! authorization always re-derives identity from the certificate.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parceltrace_types::{CustodyError, Result, Role};

/// JWT configuration.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in: std::time::Duration,
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "change-me-in-production".to_string(),
            expires_in: std::time::Duration::from_secs(24 * 60 * 60),
            issuer: "parceltrace-gateway".to_string(),
        }
    }
}

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id.
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub jti: String,
}

/// Issues and validates session tokens.
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self { config, encoding_key, decoding_key }
    }

    /// Issue a session token for an authenticated user.
    pub fn issue(&self, user_id: &str, role: Role) -> Result<(String, i64)> {
        let now = Utc::now();
        let exp = now
            + Duration::from_std(self.config.expires_in)
                .map_err(|e| CustodyError::internal(e.to_string()))?;
        let claims = TokenClaims {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| CustodyError::internal(format!("token encode: {}", e)))?;
        Ok((token, exp.timestamp()))
    }

    /// Validate a session token and return its claims.
    pub fn validate(&self, token: &str) -> Result<TokenClaims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);
        validation.validate_exp = true;

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| CustodyError::unauthenticated(format!("invalid token: {}", e)))?;
        Ok(data.claims)
    }
}
