//! Server configuration.
//!
//! Layered: config file, then environment variables with the PARCELTRACE_
//! prefix, then CLI overrides in main.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use parceltrace_ledger::LedgerTimeouts;

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub ca: CaSettings,

    #[serde(default)]
    pub wallet: WalletSettings,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Public listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub http_port: u16,

    /// TLS certificate path (listener TLS is optional).
    pub tls_cert: Option<PathBuf>,

    /// TLS key path.
    pub tls_key: Option<PathBuf>,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_port(),
            tls_cert: None,
            tls_key: None,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.http_port).parse()?)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Target ledger binding plus per-org transport endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(default = "default_channel")]
    pub channel_name: String,

    #[serde(default = "default_chaincode")]
    pub chaincode_name: String,

    /// Per-org peer endpoints (`PlatformOrg`, `SellersOrg`, `LogisticsOrg`).
    /// Unused by the embedded backend, carried for remote deployments.
    #[serde(default)]
    pub peers: HashMap<String, PeerSettings>,

    /// Contractual per-call ceilings.
    #[serde(default)]
    pub deadlines: DeadlineSettings,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            channel_name: default_channel(),
            chaincode_name: default_chaincode(),
            peers: HashMap::new(),
            deadlines: DeadlineSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSettings {
    pub endpoint: String,
    pub tls_cert: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineSettings {
    #[serde(default = "default_evaluate_ms")]
    pub evaluate_ms: u64,
    #[serde(default = "default_endorse_ms")]
    pub endorse_ms: u64,
    #[serde(default = "default_submit_ms")]
    pub submit_ms: u64,
    #[serde(default = "default_commit_status_ms")]
    pub commit_status_ms: u64,
}

impl Default for DeadlineSettings {
    fn default() -> Self {
        Self {
            evaluate_ms: default_evaluate_ms(),
            endorse_ms: default_endorse_ms(),
            submit_ms: default_submit_ms(),
            commit_status_ms: default_commit_status_ms(),
        }
    }
}

impl DeadlineSettings {
    pub fn timeouts(&self) -> LedgerTimeouts {
        LedgerTimeouts {
            evaluate_ms: self.evaluate_ms,
            endorse_ms: self.endorse_ms,
            submit_ms: self.submit_ms,
            commit_status_ms: self.commit_status_ms,
        }
    }
}

/// Organization CA settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaSettings {
    /// `dev` runs in-process CAs; `remote` uses the per-org URLs.
    #[serde(default = "default_ca_mode")]
    pub mode: String,

    #[serde(default = "default_ca_admin_id")]
    pub admin_id: String,

    #[serde(default)]
    pub admin_secret: String,

    /// Per-org CA endpoints and trust material, keyed by org name.
    #[serde(default)]
    pub orgs: HashMap<String, CaOrgSettings>,
}

impl Default for CaSettings {
    fn default() -> Self {
        Self {
            mode: default_ca_mode(),
            admin_id: default_ca_admin_id(),
            admin_secret: String::new(),
            orgs: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaOrgSettings {
    /// Remote CA base URL (remote mode).
    pub url: Option<String>,

    /// CA TLS certificate path (remote mode).
    pub tls_cert: Option<PathBuf>,

    /// Hex-encoded dev-CA root key, stable across restarts (dev mode).
    pub root_key: Option<String>,
}

/// Wallet settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSettings {
    #[serde(default = "default_wallet_dir")]
    pub dir: PathBuf,

    /// KDF input for the wallet service key; at least 16 bytes.
    #[serde(default)]
    pub encryption_key: String,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self { dir: default_wallet_dir(), encryption_key: String::new() }
    }
}

/// Session-auth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// `jwt` or `basic`.
    #[serde(default = "default_auth_strategy")]
    pub strategy: String,

    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_jwt_expires_in")]
    pub jwt_expires_in_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            strategy: default_auth_strategy(),
            jwt_secret: default_jwt_secret(),
            jwt_expires_in_secs: default_jwt_expires_in(),
        }
    }
}

/// Gateway behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Single-org restriction (optional): this instance only enrolls the
    /// named org's roles.
    pub org_name: Option<String>,

    #[serde(default = "default_max_user_handles")]
    pub max_user_handles: usize,

    #[serde(default = "default_handle_idle_secs")]
    pub handle_idle_secs: u64,

    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_socket: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            org_name: None,
            max_user_handles: default_max_user_handles(),
            handle_idle_secs: default_handle_idle_secs(),
            max_subscriptions_per_socket: default_max_subscriptions(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_channel() -> String {
    "custody-channel".to_string()
}

fn default_chaincode() -> String {
    "delivery".to_string()
}

fn default_evaluate_ms() -> u64 {
    30_000
}

fn default_endorse_ms() -> u64 {
    60_000
}

fn default_submit_ms() -> u64 {
    60_000
}

fn default_commit_status_ms() -> u64 {
    120_000
}

fn default_ca_mode() -> String {
    "dev".to_string()
}

fn default_ca_admin_id() -> String {
    "admin".to_string()
}

fn default_wallet_dir() -> PathBuf {
    PathBuf::from("./wallet")
}

fn default_auth_strategy() -> String {
    "jwt".to_string()
}

fn default_jwt_secret() -> String {
    "change-me-in-production".to_string()
}

fn default_jwt_expires_in() -> u64 {
    24 * 60 * 60
}

fn default_max_user_handles() -> usize {
    256
}

fn default_handle_idle_secs() -> u64 {
    900
}

fn default_max_subscriptions() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl ServerConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("PARCELTRACE")
                    .separator("__")
                    .try_parsing(true),
            );

        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract_deadlines() {
        let config = ServerConfig::default();
        let timeouts = config.ledger.deadlines.timeouts();
        assert_eq!(timeouts.evaluate_ms, 30_000);
        assert_eq!(timeouts.endorse_ms, 60_000);
        assert_eq!(timeouts.submit_ms, 60_000);
        assert_eq!(timeouts.commit_status_ms, 120_000);
    }

    #[test]
    fn default_gateway_bounds() {
        let config = ServerConfig::default();
        assert_eq!(config.gateway.max_user_handles, 256);
        assert_eq!(config.gateway.max_subscriptions_per_socket, 64);
        assert!(config.gateway.org_name.is_none());
    }
}
