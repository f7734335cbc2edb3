//! Per-user ledger handles.
//!
//! For each user the gateway keeps at most one live handle, lazily built
//! from the wallet's decrypted identity. The registry is bounded: idle
//! handles are evicted on a TTL, and the least-recently-used handle makes
//! room when the ceiling is hit. Evicting a handle drops its signer and
//! with it the decrypted key material.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use parceltrace_ca::Certificate;
use parceltrace_ledger::{CommitReceipt, LedgerService, LedgerTimeouts, Signer};
use parceltrace_types::{CustodyError, Result};
use parceltrace_wallet::Wallet;

/// A live connection to the ledger under one user's identity.
pub struct GatewayHandle {
    user_id: String,
    signer: Signer,
    ledger: Arc<dyn LedgerService>,
    timeouts: LedgerTimeouts,
    last_used: Mutex<Instant>,
}

impl std::fmt::Debug for GatewayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayHandle")
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl GatewayHandle {
    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    /// Submit a transaction under this user's identity, within the
    /// configured ceiling. Timed-out submits are surfaced as dependency
    /// failures and never retried; the caller must query to reconcile.
    pub async fn submit<A: Serialize>(&self, fn_name: &str, args: &A) -> Result<CommitReceipt> {
        self.touch();
        let args = encode_args(args)?;
        let ceiling = Duration::from_millis(self.timeouts.submit_ms);
        match tokio::time::timeout(ceiling, self.ledger.submit(&self.signer, fn_name, &args)).await
        {
            Ok(result) => result,
            Err(_) => Err(CustodyError::DeadlineExceeded {
                operation: format!("submit:{}", fn_name),
                millis: self.timeouts.submit_ms,
            }),
        }
    }

    /// Evaluate a query under this user's identity. One retry is allowed
    /// on a transient dependency failure; queries are idempotent.
    pub async fn evaluate<A: Serialize>(&self, fn_name: &str, args: &A) -> Result<Vec<u8>> {
        self.touch();
        let args = encode_args(args)?;
        match self.evaluate_once(fn_name, &args).await {
            Err(err) if err.is_retriable() => {
                tracing::warn!(user_id = %self.user_id, fn_name, "retrying query after {}", err);
                self.evaluate_once(fn_name, &args).await
            }
            other => other,
        }
    }

    /// Evaluate and decode the result document.
    pub async fn evaluate_json<A: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        fn_name: &str,
        args: &A,
    ) -> Result<T> {
        let bytes = self.evaluate(fn_name, args).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CustodyError::internal(format!("ledger result decode: {}", e)))
    }

    async fn evaluate_once(&self, fn_name: &str, args: &[u8]) -> Result<Vec<u8>> {
        let ceiling = Duration::from_millis(self.timeouts.evaluate_ms);
        match tokio::time::timeout(ceiling, self.ledger.evaluate(&self.signer, fn_name, args)).await
        {
            Ok(result) => result,
            Err(_) => Err(CustodyError::DeadlineExceeded {
                operation: format!("evaluate:{}", fn_name),
                millis: self.timeouts.evaluate_ms,
            }),
        }
    }
}

fn encode_args<A: Serialize>(args: &A) -> Result<Vec<u8>> {
    serde_json::to_vec(args).map_err(|e| CustodyError::internal(format!("args encode: {}", e)))
}

/// Bounded cache of per-user handles.
pub struct GatewayRegistry {
    wallet: Arc<Wallet>,
    ledger: Arc<dyn LedgerService>,
    timeouts: LedgerTimeouts,
    handles: DashMap<String, Arc<GatewayHandle>>,
    max_handles: usize,
    idle_ttl: Duration,
}

impl GatewayRegistry {
    pub fn new(
        wallet: Arc<Wallet>,
        ledger: Arc<dyn LedgerService>,
        timeouts: LedgerTimeouts,
        max_handles: usize,
        idle_ttl: Duration,
    ) -> Self {
        Self {
            wallet,
            ledger,
            timeouts,
            handles: DashMap::new(),
            max_handles: max_handles.max(1),
            idle_ttl,
        }
    }

    /// The caller's handle, building one from the wallet on first use.
    pub fn handle_for(&self, user_id: &str) -> Result<Arc<GatewayHandle>> {
        if let Some(handle) = self.handles.get(user_id) {
            handle.touch();
            return Ok(handle.value().clone());
        }

        let identity = self.wallet.get(user_id)?.ok_or_else(|| {
            CustodyError::not_authorized(format!("no enrolled identity for user '{}'", user_id))
        })?;
        let certificate = Certificate::decode(&identity.certificate)?;
        let signer = Signer::new(certificate, &identity.private_key)?;

        self.evict();
        let handle = Arc::new(GatewayHandle {
            user_id: user_id.to_string(),
            signer,
            ledger: self.ledger.clone(),
            timeouts: self.timeouts,
            last_used: Mutex::new(Instant::now()),
        });
        self.handles.insert(user_id.to_string(), handle.clone());
        tracing::debug!(user_id, open_handles = self.handles.len(), "gateway handle opened");
        Ok(handle)
    }

    /// Drop a user's handle (revocation, re-enrolment).
    pub fn invalidate(&self, user_id: &str) {
        self.handles.remove(user_id);
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Drop idle handles, then make room if the ceiling is still hit.
    fn evict(&self) {
        self.handles.retain(|_, handle| handle.idle_for() < self.idle_ttl);

        while self.handles.len() >= self.max_handles {
            let oldest = self
                .handles
                .iter()
                .max_by_key(|entry| entry.idle_for())
                .map(|entry| entry.key().clone());
            match oldest {
                Some(user_id) => {
                    tracing::debug!(user_id = %user_id, "evicting least-recently-used handle");
                    self.handles.remove(&user_id);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parceltrace_ca::{
        generate_enrollment_secret, CertificateAuthority, DevCa, RegistrationRequest,
    };
    use parceltrace_chaincode::RawHistoryRecord;
    use parceltrace_ledger::LedgerEvent;
    use parceltrace_types::{CertAttributes, Organization, Role};
    use tokio::sync::broadcast;

    /// A ledger that never answers within any deadline.
    struct StalledLedger {
        events: broadcast::Sender<LedgerEvent>,
    }

    impl StalledLedger {
        fn new() -> Self {
            Self { events: broadcast::channel(8).0 }
        }
    }

    #[async_trait]
    impl LedgerService for StalledLedger {
        async fn submit(
            &self,
            _signer: &Signer,
            _fn_name: &str,
            _args: &[u8],
        ) -> parceltrace_types::Result<CommitReceipt> {
            std::future::pending().await
        }

        async fn evaluate(
            &self,
            _signer: &Signer,
            _fn_name: &str,
            _args: &[u8],
        ) -> parceltrace_types::Result<Vec<u8>> {
            std::future::pending().await
        }

        async fn get_history(
            &self,
            _signer: &Signer,
            _key: &str,
        ) -> parceltrace_types::Result<Vec<RawHistoryRecord>> {
            std::future::pending().await
        }

        fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent> {
            self.events.subscribe()
        }
    }

    async fn wallet_with_user(tag: &str, user_id: &str) -> Arc<Wallet> {
        let dir = std::env::temp_dir().join(format!(
            "parceltrace-gateway-registry-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        let wallet = Arc::new(Wallet::open(dir, "an-adequately-long-test-secret").unwrap());

        let ca = DevCa::new(Organization::Sellers);
        let secret = generate_enrollment_secret();
        ca.register(RegistrationRequest {
            enrollment_id: user_id.to_string(),
            secret: secret.clone(),
            affiliation: Organization::Sellers.name().to_string(),
            attributes: CertAttributes {
                user_id: user_id.to_string(),
                role: Role::Seller,
                company_id: None,
                company_name: None,
            },
        })
        .await
        .unwrap();
        let enrollment = ca.enroll(user_id, &secret).await.unwrap();
        wallet
            .put(
                user_id,
                Organization::Sellers.msp_id(),
                &enrollment.certificate.encode().unwrap(),
                &enrollment.private_key,
                Organization::Sellers,
                user_id,
            )
            .unwrap();
        wallet
    }

    fn tight_timeouts() -> LedgerTimeouts {
        LedgerTimeouts { evaluate_ms: 50, endorse_ms: 50, submit_ms: 50, commit_status_ms: 100 }
    }

    #[tokio::test]
    async fn elapsed_deadlines_surface_as_dependency_failures() {
        let wallet = wallet_with_user("deadline", "seller-1").await;
        let registry = GatewayRegistry::new(
            wallet,
            Arc::new(StalledLedger::new()),
            tight_timeouts(),
            4,
            Duration::from_secs(900),
        );
        let handle = registry.handle_for("seller-1").unwrap();

        let err = handle
            .submit("CreateDelivery", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.is_deadline());
        assert_eq!(err.error_code(), "DEPENDENCY_FAILURE");

        let err = handle
            .evaluate("ReadDelivery", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.is_deadline());
    }

    #[tokio::test]
    async fn unknown_users_get_no_handle() {
        let wallet = wallet_with_user("unknown", "seller-1").await;
        let registry = GatewayRegistry::new(
            wallet,
            Arc::new(StalledLedger::new()),
            tight_timeouts(),
            4,
            Duration::from_secs(900),
        );
        let err = registry.handle_for("nobody").unwrap_err();
        assert_eq!(err.error_code(), "NOT_AUTHORIZED");
    }

    #[tokio::test]
    async fn registry_is_bounded() {
        let wallet = wallet_with_user("bounded", "seller-1").await;
        // Same wallet dir gains a second user.
        let ca = DevCa::new(Organization::Sellers);
        let secret = generate_enrollment_secret();
        ca.register(RegistrationRequest {
            enrollment_id: "seller-2".to_string(),
            secret: secret.clone(),
            affiliation: Organization::Sellers.name().to_string(),
            attributes: CertAttributes {
                user_id: "seller-2".to_string(),
                role: Role::Seller,
                company_id: None,
                company_name: None,
            },
        })
        .await
        .unwrap();
        let enrollment = ca.enroll("seller-2", &secret).await.unwrap();
        wallet
            .put(
                "seller-2",
                Organization::Sellers.msp_id(),
                &enrollment.certificate.encode().unwrap(),
                &enrollment.private_key,
                Organization::Sellers,
                "seller-2",
            )
            .unwrap();

        let registry = GatewayRegistry::new(
            wallet,
            Arc::new(StalledLedger::new()),
            tight_timeouts(),
            1,
            Duration::from_secs(900),
        );
        registry.handle_for("seller-1").unwrap();
        assert_eq!(registry.open_handles(), 1);
        registry.handle_for("seller-2").unwrap();
        assert_eq!(registry.open_handles(), 1, "ceiling holds; LRU handle evicted");

        registry.invalidate("seller-2");
        assert_eq!(registry.open_handles(), 0);
    }
}
