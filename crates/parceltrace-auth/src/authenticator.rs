//! The pluggable request-authentication strategy.
//!
//! The HTTP front-end is parameterized by one
//! `authenticate(header) -> (userId, role)` strategy. A deployment picks
//! Bearer-JWT or HTTP Basic by configuration; both bind the same
//! downstream contract and neither leaks into the custody authorization
//! path, which always re-derives identity from the certificate.

use std::sync::Arc;

use async_trait::async_trait;

use parceltrace_store::{EntityStore, UserStatus};
use parceltrace_types::{CustodyError, Result, Role};

use crate::jwt::JwtService;
use crate::password::PasswordService;

/// The authenticated session identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub role: Role,
}

/// A request-authentication strategy.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate from the `Authorization` header value.
    async fn authenticate(&self, authorization: Option<&str>) -> Result<AuthContext>;
}

/// Bearer-JWT strategy.
pub struct JwtAuthenticator {
    jwt: JwtService,
}

impl JwtAuthenticator {
    pub fn new(jwt: JwtService) -> Self {
        Self { jwt }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, authorization: Option<&str>) -> Result<AuthContext> {
        let header = authorization
            .ok_or_else(|| CustodyError::unauthenticated("missing Authorization header"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| CustodyError::unauthenticated("expected a Bearer token"))?;
        let claims = self.jwt.validate(token)?;
        Ok(AuthContext { user_id: claims.sub, role: claims.role })
    }
}

/// HTTP Basic strategy, verifying against the entity store.
pub struct BasicAuthenticator {
    store: Arc<dyn EntityStore>,
    passwords: PasswordService,
}

impl BasicAuthenticator {
    pub fn new(store: Arc<dyn EntityStore>, passwords: PasswordService) -> Self {
        Self { store, passwords }
    }
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    async fn authenticate(&self, authorization: Option<&str>) -> Result<AuthContext> {
        use base64::Engine as _;

        let header = authorization
            .ok_or_else(|| CustodyError::unauthenticated("missing Authorization header"))?;
        let encoded = header
            .strip_prefix("Basic ")
            .ok_or_else(|| CustodyError::unauthenticated("expected Basic credentials"))?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .ok()
            .and_then(|b| String::from_utf8(b).ok())
            .ok_or_else(|| CustodyError::unauthenticated("malformed Basic credentials"))?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| CustodyError::unauthenticated("malformed Basic credentials"))?;

        let user = self
            .store
            .user_by_username(username)
            .await?
            .ok_or_else(|| CustodyError::unauthenticated("unknown user or bad password"))?;
        if user.status != UserStatus::Active {
            return Err(CustodyError::unauthenticated("account is not usable"));
        }
        if !self.passwords.verify(password, &user.password_hash)? {
            return Err(CustodyError::unauthenticated("unknown user or bad password"));
        }
        Ok(AuthContext { user_id: user.user_id, role: user.role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::JwtConfig;
    use base64::Engine as _;
    use chrono::Utc;
    use parceltrace_store::{MemoryStore, User};

    fn jwt_service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "test-secret-key-for-session-tokens!".to_string(),
            expires_in: std::time::Duration::from_secs(900),
            issuer: "test-gateway".to_string(),
        })
    }

    #[tokio::test]
    async fn jwt_strategy_roundtrip() {
        let jwt = jwt_service();
        let (token, _) = jwt.issue("user-1", Role::DeliveryPerson).unwrap();
        let authenticator = JwtAuthenticator::new(jwt);

        let header = format!("Bearer {}", token);
        let ctx = authenticator.authenticate(Some(&header)).await.unwrap();
        assert_eq!(ctx, AuthContext { user_id: "user-1".to_string(), role: Role::DeliveryPerson });

        let err = authenticator.authenticate(None).await.unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHENTICATED");
        let err = authenticator.authenticate(Some("Basic abcd")).await.unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn basic_strategy_verifies_against_store() {
        let passwords = PasswordService::new();
        let store = Arc::new(MemoryStore::new());
        store
            .create_user(User {
                user_id: "user-1".to_string(),
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: passwords.hash("a strong password!").unwrap(),
                role: Role::Customer,
                full_name: "Alice".to_string(),
                address: None,
                company_id: None,
                company_name: None,
                vehicle_info: None,
                status: UserStatus::Active,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        let authenticator = BasicAuthenticator::new(store, passwords);

        let good = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("alice:a strong password!")
        );
        let ctx = authenticator.authenticate(Some(&good)).await.unwrap();
        assert_eq!(ctx.user_id, "user-1");
        assert_eq!(ctx.role, Role::Customer);

        let bad = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("alice:wrong password")
        );
        let err = authenticator.authenticate(Some(&bad)).await.unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn basic_strategy_rejects_unusable_accounts() {
        let passwords = PasswordService::new();
        let store = Arc::new(MemoryStore::new());
        store
            .create_user(User {
                user_id: "user-1".to_string(),
                username: "bob".to_string(),
                email: "bob@example.com".to_string(),
                password_hash: passwords.hash("a strong password!").unwrap(),
                role: Role::Seller,
                full_name: "Bob".to_string(),
                address: None,
                company_id: None,
                company_name: None,
                vehicle_info: None,
                status: UserStatus::Unusable,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        let authenticator = BasicAuthenticator::new(store, passwords);

        let header = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("bob:a strong password!")
        );
        let err = authenticator.authenticate(Some(&header)).await.unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHENTICATED");
    }
}
