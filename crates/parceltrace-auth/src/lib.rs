//! ParcelTrace authentication layer.
//!
//! Session tokens (HS256 JWT), Argon2id password hashing, and the
//! pluggable request-authentication strategy the gateway's HTTP front-end
//! is parameterized by.

pub mod authenticator;
pub mod jwt;
pub mod password;

pub use authenticator::{AuthContext, Authenticator, BasicAuthenticator, JwtAuthenticator};
pub use jwt::{JwtConfig, JwtService, TokenClaims};
pub use password::{PasswordService, MIN_PASSWORD_LEN};
