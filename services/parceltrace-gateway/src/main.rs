//! ParcelTrace Gateway Server
//!
//! The deployable front-end of the custody tracker:
//!
//! - Terminates client HTTP and WebSocket connections
//! - Brokers CA enrolment and the encrypted identity wallet
//! - Routes requests to the delivery ledger under each caller's identity
//! - Fans ledger events out to subscribed clients
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (embedded ledger, in-process CAs)
//! parceltrace-gateway
//!
//! # Start with a config file
//! parceltrace-gateway --config /etc/parceltrace/gateway.toml
//!
//! # Environment overrides
//! PARCELTRACE__SERVER__HTTP_PORT=8080 parceltrace-gateway
//! ```

mod config;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use parceltrace_api::{
    create_router, event_bus, ApiConfig, AppState, EventConsumer, GatewayRegistry,
};
use parceltrace_auth::{
    BasicAuthenticator, JwtAuthenticator, JwtConfig, JwtService, PasswordService,
};
use parceltrace_ca::{
    generate_enrollment_secret, CertificateAuthority, DevCa, HttpCa, RegistrationRequest,
};
use parceltrace_ledger::{EmbeddedLedger, LedgerService, Signer};
use parceltrace_store::MemoryStore;
use parceltrace_types::{CertAttributes, Organization, Role};
use parceltrace_wallet::Wallet;

use crate::config::ServerConfig;

/// Enrollment id of the gateway's own service identity (event consumer).
const SERVICE_IDENTITY: &str = "gateway-service";

// =============================================================================
// CLI Arguments
// =============================================================================

/// ParcelTrace gateway - package-custody tracking over a three-org ledger
#[derive(Parser, Debug)]
#[command(name = "parceltrace-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, env = "PARCELTRACE_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "PARCELTRACE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PARCELTRACE_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PARCELTRACE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "PARCELTRACE_LOG_FORMAT")]
    log_format: Option<String>,

    /// JWT secret key
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,

    /// Wallet encryption secret
    #[arg(long, env = "WALLET_ENCRYPTION_KEY")]
    wallet_key: Option<String>,

    /// Enable development mode (relaxed secret checks)
    #[arg(long, env = "PARCELTRACE_DEV_MODE")]
    dev_mode: bool,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        server_config.server.host = host;
    }
    if let Some(port) = args.port {
        server_config.server.http_port = port;
    }
    if let Some(level) = args.log_level {
        server_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        server_config.logging.format = format;
    }
    if let Some(jwt_secret) = args.jwt_secret {
        server_config.auth.jwt_secret = jwt_secret;
    }
    if let Some(wallet_key) = args.wallet_key {
        server_config.wallet.encryption_key = wallet_key;
    }

    init_logging(&server_config.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting ParcelTrace gateway");

    validate_config(&server_config, args.dev_mode)?;

    let state = build_state(&server_config).await?;
    let app = create_router(state.clone());

    let addr = server_config.server.socket_addr()?;
    tracing::info!(
        host = %server_config.server.host,
        port = server_config.server.http_port,
        channel = %server_config.ledger.channel_name,
        chaincode = %server_config.ledger.chaincode_name,
        "Gateway listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(server_config.server.shutdown_timeout()))
        .await?;

    // Decrypted identities do not outlive the process.
    state.wallet.clear_cache();
    tracing::info!("Gateway shutdown complete");
    Ok(())
}

// =============================================================================
// Initialization
// =============================================================================

fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::registry().with(env_filter);
    match config.format.as_str() {
        "json" => subscriber.with(fmt::layer().json().with_target(true)).init(),
        _ => subscriber.with(fmt::layer().pretty().with_target(true)).init(),
    }
    Ok(())
}

fn validate_config(config: &ServerConfig, dev_mode: bool) -> anyhow::Result<()> {
    if !dev_mode && config.auth.jwt_secret == "change-me-in-production" {
        anyhow::bail!("JWT secret must be changed in production. Set JWT_SECRET.");
    }
    if config.wallet.encryption_key.len() < 16 {
        if dev_mode {
            tracing::warn!("wallet encryption key is short; dev mode only");
        } else {
            anyhow::bail!(
                "walletEncryptionKey must be at least 16 bytes. Set WALLET_ENCRYPTION_KEY."
            );
        }
    }
    if config.server.tls_cert.is_some() != config.server.tls_key.is_some() {
        anyhow::bail!("TLS requires both tls_cert and tls_key");
    }
    match config.auth.strategy.as_str() {
        "jwt" | "basic" => {}
        other => anyhow::bail!("unknown auth strategy '{}' (expected jwt or basic)", other),
    }
    if config.ca.mode == "remote" && config.ca.admin_secret.is_empty() {
        anyhow::bail!("remote CA mode requires ca.admin_secret");
    }
    Ok(())
}

/// Wire every component into the shared application state.
async fn build_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let store = Arc::new(MemoryStore::new());

    let wallet_key = if config.wallet.encryption_key.len() < 16 {
        // Dev-mode fallback validated above.
        "parceltrace-dev-wallet-secret".to_string()
    } else {
        config.wallet.encryption_key.clone()
    };
    let wallet = Arc::new(Wallet::open(&config.wallet.dir, &wallet_key)?);

    let ledger = Arc::new(EmbeddedLedger::new(
        config.ledger.channel_name.clone(),
        config.ledger.chaincode_name.clone(),
    ));

    // One CA per organization, dev or remote by configuration.
    let mut cas: HashMap<Organization, Arc<dyn CertificateAuthority>> = HashMap::new();
    for org in Organization::ALL {
        let org_settings = config.ca.orgs.get(org.name());
        let ca: Arc<dyn CertificateAuthority> = match config.ca.mode.as_str() {
            "remote" => {
                let url = org_settings.and_then(|s| s.url.clone()).ok_or_else(|| {
                    anyhow::anyhow!("remote CA mode requires ca.orgs.{}.url", org.name())
                })?;
                Arc::new(HttpCa::new(org, url, &config.ca.admin_id, &config.ca.admin_secret)?)
            }
            _ => match org_settings.and_then(|s| s.root_key.as_deref()) {
                Some(root_key) => Arc::new(DevCa::with_root_key(org, root_key)?),
                None => Arc::new(DevCa::new(org)),
            },
        };
        let root = ca.root_public_key().await?;
        ledger.register_trust_root(org.msp_id(), &root)?;
        cas.insert(org, ca);
    }

    let service_signer = Arc::new(enroll_service_identity(&cas).await?);

    let jwt = JwtService::new(JwtConfig {
        secret: config.auth.jwt_secret.clone(),
        expires_in: Duration::from_secs(config.auth.jwt_expires_in_secs),
        issuer: "parceltrace-gateway".to_string(),
    });
    let passwords = PasswordService::new();
    let authenticator: Arc<dyn parceltrace_auth::Authenticator> =
        match config.auth.strategy.as_str() {
            "basic" => Arc::new(BasicAuthenticator::new(store.clone(), passwords.clone())),
            _ => Arc::new(JwtAuthenticator::new(jwt.clone())),
        };
    tracing::info!(strategy = %config.auth.strategy, "authentication strategy selected");

    let ledger_service: Arc<dyn LedgerService> = ledger;
    let gateways = GatewayRegistry::new(
        wallet.clone(),
        ledger_service.clone(),
        config.ledger.deadlines.timeouts(),
        config.gateway.max_user_handles,
        Duration::from_secs(config.gateway.handle_idle_secs),
    );

    let events = event_bus();
    let consumer_healthy = Arc::new(AtomicBool::new(false));
    let _consumer_task = EventConsumer::new(
        ledger_service.clone(),
        service_signer,
        events.clone(),
        consumer_healthy.clone(),
    )
    .spawn();
    tracing::info!("event consumer started");

    let org_name = match &config.gateway.org_name {
        Some(name) => Some(
            Organization::parse(name)
                .map_err(|e| anyhow::anyhow!("gateway.org_name: {}", e))?,
        ),
        None => None,
    };

    Ok(Arc::new(AppState {
        store,
        wallet,
        cas,
        gateways,
        jwt,
        passwords,
        authenticator,
        events,
        consumer_healthy,
        config: ApiConfig {
            org_name,
            max_subscriptions_per_socket: config.gateway.max_subscriptions_per_socket,
        },
    }))
}

/// Enroll the gateway's service identity (an org admin) used by the event
/// consumer to resolve delivery party sets.
async fn enroll_service_identity(
    cas: &HashMap<Organization, Arc<dyn CertificateAuthority>>,
) -> anyhow::Result<Signer> {
    let platform_ca = cas
        .get(&Organization::Platform)
        .ok_or_else(|| anyhow::anyhow!("no Platform CA configured"))?;

    let secret = generate_enrollment_secret();
    platform_ca
        .register(RegistrationRequest {
            enrollment_id: SERVICE_IDENTITY.to_string(),
            secret: secret.clone(),
            affiliation: Organization::Platform.name().to_string(),
            attributes: CertAttributes {
                user_id: SERVICE_IDENTITY.to_string(),
                role: Role::Admin,
                company_id: None,
                company_name: None,
            },
        })
        .await?;
    let enrollment = platform_ca.enroll(SERVICE_IDENTITY, &secret).await?;
    Ok(Signer::new(enrollment.certificate, &enrollment.private_key)?)
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    tracing::info!(
        timeout_secs = timeout.as_secs(),
        "Waiting for in-flight requests to complete..."
    );
    tokio::time::sleep(timeout).await;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parsing() {
        let args = Args::parse_from(["parceltrace-gateway", "--port", "8080", "--dev-mode"]);
        assert_eq!(args.port, Some(8080));
        assert!(args.dev_mode);
    }

    #[test]
    fn production_rejects_default_secrets() {
        let config = ServerConfig::default();
        assert!(validate_config(&config, false).is_err());
        assert!(validate_config(&config, true).is_ok());
    }

    #[tokio::test]
    async fn state_builds_with_dev_defaults() {
        let mut config = ServerConfig::default();
        config.wallet.dir = std::env::temp_dir().join(format!(
            "parceltrace-gateway-main-test-{}",
            std::process::id()
        ));
        config.wallet.encryption_key = "a-long-enough-dev-wallet-secret".to_string();
        let state = build_state(&config).await.unwrap();
        assert_eq!(state.cas.len(), 3);
        assert_eq!(state.gateways.open_handles(), 0);
    }
}
