//! Shared application state.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::broadcast;

use parceltrace_auth::{Authenticator, JwtService, PasswordService};
use parceltrace_ca::CertificateAuthority;
use parceltrace_store::EntityStore;
use parceltrace_types::Organization;
use parceltrace_wallet::Wallet;

use crate::events::RoutedEvent;
use crate::gateway::GatewayRegistry;

/// Gateway behavior knobs surfaced from configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Single-org restriction: when set, only roles this org accepts may
    /// register through this instance.
    pub org_name: Option<Organization>,
    /// Per-connection WebSocket subscription ceiling.
    pub max_subscriptions_per_socket: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { org_name: None, max_subscriptions_per_socket: 64 }
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub wallet: Arc<Wallet>,
    pub cas: HashMap<Organization, Arc<dyn CertificateAuthority>>,
    pub gateways: GatewayRegistry,
    pub jwt: JwtService,
    pub passwords: PasswordService,
    pub authenticator: Arc<dyn Authenticator>,
    pub events: broadcast::Sender<RoutedEvent>,
    pub consumer_healthy: Arc<AtomicBool>,
    pub config: ApiConfig,
}
